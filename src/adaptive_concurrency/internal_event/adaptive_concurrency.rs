use metrics::{counter, histogram};

use super::InternalEvent;
use crate::adaptive_concurrency::{LimiterState, Outcome};

/// The ceiling observed at admission, or right after a settle.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveConcurrencyLimit {
    pub limit: usize,
    /// Set when the value was read right after settling a unit with this outcome.
    pub outcome: Option<Outcome>,
}

impl InternalEvent for AdaptiveConcurrencyLimit {
    fn emit_logs(&self) {
        trace!(
            target: "adaptive_concurrency::stats",
            concurrency_limit = self.limit,
            overload = self.outcome.map(Outcome::is_overload),
            "Limit observed."
        );
    }

    fn emit_metrics(&self) {
        // Histograms, as the limit may take several values over each reporting interval.
        histogram!("adaptive_concurrency_limit").record(self.limit as f64);
        if self.outcome.is_some_and(Outcome::is_overload) {
            counter!("adaptive_concurrency_overload_signals_total").increment(1);
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AdaptiveConcurrencyInFlight {
    pub in_flight: usize,
}

impl InternalEvent for AdaptiveConcurrencyInFlight {
    fn emit_logs(&self) {
        trace!(
            target: "adaptive_concurrency::stats",
            in_flight = self.in_flight,
            "In-flight updated."
        );
    }

    fn emit_metrics(&self) {
        histogram!("adaptive_concurrency_in_flight").record(self.in_flight as f64);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AdaptiveConcurrencyRejected {
    pub state: LimiterState,
}

impl InternalEvent for AdaptiveConcurrencyRejected {
    fn emit_logs(&self) {
        debug!(
            message = "Request rejected; server concurrency limit reached.",
            concurrency_limit = self.state.ceiling(),
            in_flight = self.state.in_flight(),
        );
    }

    fn emit_metrics(&self) {
        counter!("adaptive_concurrency_rejected_requests_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use metrics_util::{
        CompositeKey, MetricKind,
        debugging::{DebugValue, DebuggingRecorder},
    };

    use super::*;
    use crate::adaptive_concurrency::{AdaptiveConcurrencySettings, Limiter, internal_event::emit};

    fn capture(f: impl FnOnce()) -> Vec<(CompositeKey, DebugValue)> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, f);

        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _unit, _description, value)| (key, value))
            .collect()
    }

    fn find<'a>(
        captured: &'a [(CompositeKey, DebugValue)],
        kind: MetricKind,
        name: &str,
    ) -> Option<&'a DebugValue> {
        captured
            .iter()
            .find(|(key, _)| key.kind() == kind && key.key().name() == name)
            .map(|(_, value)| value)
    }

    #[test]
    fn rejected_increments_counter() {
        let limiter = Limiter::new(AdaptiveConcurrencySettings::default()).unwrap();
        let _tickets = (0..2).map(|_| limiter.admit().unwrap()).collect::<Vec<_>>();
        let rejected = limiter.admit().unwrap_err();

        let captured = capture(|| {
            emit(AdaptiveConcurrencyRejected {
                state: rejected.state(),
            });
            emit(AdaptiveConcurrencyRejected {
                state: rejected.state(),
            });
        });

        assert_eq!(
            find(
                &captured,
                MetricKind::Counter,
                "adaptive_concurrency_rejected_requests_total"
            ),
            Some(&DebugValue::Counter(2))
        );
    }

    #[test]
    fn limit_and_in_flight_are_histograms() {
        let captured = capture(|| {
            emit(AdaptiveConcurrencyLimit {
                limit: 4,
                outcome: Some(Outcome::Overload),
            });
            emit(AdaptiveConcurrencyInFlight { in_flight: 3 });
        });

        assert!(matches!(
            find(&captured, MetricKind::Histogram, "adaptive_concurrency_limit"),
            Some(DebugValue::Histogram(values)) if values.len() == 1 && values[0].0 == 4.0
        ));
        assert!(matches!(
            find(&captured, MetricKind::Histogram, "adaptive_concurrency_in_flight"),
            Some(DebugValue::Histogram(values)) if values.len() == 1 && values[0].0 == 3.0
        ));
        assert_eq!(
            find(
                &captured,
                MetricKind::Counter,
                "adaptive_concurrency_overload_signals_total"
            ),
            Some(&DebugValue::Counter(1))
        );
    }

    #[test]
    fn other_outcome_does_not_count_overload() {
        let captured = capture(|| {
            emit(AdaptiveConcurrencyLimit {
                limit: 2,
                outcome: Some(Outcome::Other),
            });
        });

        assert!(
            find(
                &captured,
                MetricKind::Counter,
                "adaptive_concurrency_overload_signals_total"
            )
            .is_none()
        );
    }
}
