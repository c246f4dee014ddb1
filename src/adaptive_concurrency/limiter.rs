use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use super::{AdaptiveConcurrencySettings, ConfigError, outcome::Outcome};

/// Adaptive concurrency limiter driven by AIMD (Additive Increase, Multiplicative Decrease).
///
/// Callers [`admit`](Limiter::admit) before running a unit of work and
/// [`settle`](Limiter::settle) the returned [`Ticket`] once the work completes, whatever the
/// result. Overload outcomes shrink the ceiling multiplicatively, other outcomes grow it by one
/// while at least half of the ceiling is in use.
///
/// The ceiling and the in-flight count live behind a single lock since the settle rules read
/// both of them together.
#[derive(Debug)]
pub struct Limiter {
    backoff_ratio: f64,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    ceiling: usize,
    in_flight: usize,
}

/// Proof of admission, handed back to [`Limiter::settle`] exactly once.
///
/// Deliberately neither `Clone` nor `Copy`.
#[derive(Debug)]
#[must_use = "an admitted ticket must be settled"]
pub struct Ticket {
    in_flight: usize,
    ceiling: usize,
}

/// Returned by [`Limiter::admit`] when the server is at capacity.
///
/// This is back-pressure, not a failure of the work itself: translate it into an
/// unavailable/overloaded response upstream and do not retry internally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rejected {
    state: LimiterState,
}

/// A consistent snapshot of the [`Limiter`], taken under its lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimiterState {
    ceiling: usize,
    in_flight: usize,
}

impl Limiter {
    /// Create a limiter from validated settings.
    pub fn new(settings: AdaptiveConcurrencySettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        Ok(Self {
            backoff_ratio: settings.backoff_ratio(),
            inner: Mutex::new(Inner {
                ceiling: settings.initial_concurrency(),
                in_flight: 0,
            }),
        })
    }

    /// Try to admit a new unit of work.
    ///
    /// The capacity check runs before the increment and uses "greater than", so up to
    /// `ceiling + 1` units are admitted at once. A rejection leaves the counters untouched.
    pub fn admit(&self) -> Result<Ticket, Rejected> {
        let mut inner = self.lock();

        if inner.in_flight > inner.ceiling {
            return Err(Rejected {
                state: inner.snapshot(),
            });
        }

        inner.in_flight += 1;

        Ok(Ticket {
            in_flight: inner.in_flight,
            ceiling: inner.ceiling,
        })
    }

    /// Settle an admitted unit of work, adjusting the ceiling from its outcome.
    ///
    /// Returns the state right after this settle, read in the same critical section.
    pub fn settle(&self, ticket: Ticket, outcome: Outcome) -> LimiterState {
        let mut inner = self.lock();
        let previous = inner.ceiling;

        match outcome {
            Outcome::Overload => {
                // A concurrent overload already shrank the ceiling below what this unit saw,
                // only one decrease per observed window.
                if inner.ceiling >= ticket.ceiling {
                    let decreased = (inner.ceiling as f64 * self.backoff_ratio) as usize;
                    inner.ceiling = decreased.max(1);
                }
            }
            Outcome::Other => {
                // The settling unit still counts as in flight here.
                if inner.in_flight > inner.ceiling / 2 {
                    inner.ceiling += 1;
                }
            }
        }

        inner.in_flight = inner.in_flight.saturating_sub(1);

        if inner.ceiling < previous {
            debug!(
                message = "Decreased concurrency limit.",
                previous,
                ceiling = inner.ceiling,
                in_flight = inner.in_flight,
            );
        } else if inner.ceiling > previous {
            trace!(
                message = "Increased concurrency limit.",
                previous,
                ceiling = inner.ceiling,
                in_flight = inner.in_flight,
            );
        }

        inner.snapshot()
    }

    /// Snapshot of the current ceiling and in-flight count.
    pub fn state(&self) -> LimiterState {
        self.lock().snapshot()
    }

    // The guarded fields are plain integers written without intermediate panics, so a
    // poisoned lock still holds a coherent state.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    const fn snapshot(&self) -> LimiterState {
        LimiterState {
            ceiling: self.ceiling,
            in_flight: self.in_flight,
        }
    }
}

impl Ticket {
    /// In-flight count immediately after this unit was admitted.
    pub const fn in_flight_at_admission(&self) -> usize {
        self.in_flight
    }

    /// Ceiling observed when this unit was admitted.
    pub const fn ceiling_at_admission(&self) -> usize {
        self.ceiling
    }
}

impl Rejected {
    /// The limiter state that caused the rejection.
    pub const fn state(&self) -> LimiterState {
        self.state
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "server concurrency limit reached (limit {}, in flight {})",
            self.state.ceiling, self.state.in_flight
        )
    }
}

impl std::error::Error for Rejected {}

impl LimiterState {
    /// The current concurrency ceiling.
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Units of work admitted and not yet settled.
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }
}
