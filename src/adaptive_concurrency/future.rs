use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use pin_project::{pin_project, pinned_drop};

use super::{
    Limiter, Outcome, OutcomeLogic, Rejected, Ticket,
    internal_event::{self, AdaptiveConcurrencyInFlight, emit},
};

/// Future for [`AdaptiveConcurrencyLimit`](super::AdaptiveConcurrencyLimit) calls.
#[pin_project(PinnedDrop)]
pub struct ResponseFuture<F, L> {
    #[pin]
    kind: Kind<F>,
    // Taken exactly once, on completion or on drop.
    pending: Option<Pending<L>>,
}

#[pin_project(project = KindProj)]
enum Kind<F> {
    Called {
        #[pin]
        future: F,
    },
    Rejected {
        rejected: Rejected,
    },
}

struct Pending<L> {
    ticket: Ticket,
    limiter: Arc<Limiter>,
    logic: L,
}

impl<F, L> ResponseFuture<F, L> {
    pub(super) fn admitted(
        future: F,
        ticket: Ticket,
        limiter: Arc<Limiter>,
        logic: L,
    ) -> Self {
        ResponseFuture {
            kind: Kind::Called { future },
            pending: Some(Pending {
                ticket,
                limiter,
                logic,
            }),
        }
    }

    pub(super) fn rejected(rejected: Rejected) -> Self {
        ResponseFuture {
            kind: Kind::Rejected { rejected },
            pending: None,
        }
    }
}

impl<F, L, T, E> Future for ResponseFuture<F, L>
where
    F: Future<Output = Result<T, E>>,
    E: Into<crate::Error>,
    L: OutcomeLogic<Response = T>,
{
    type Output = Result<T, crate::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.kind.project() {
            KindProj::Rejected { rejected } => Poll::Ready(Err((*rejected).into())),
            KindProj::Called { future } => {
                let output = ready!(future.poll(cx)).map_err(Into::into);
                if let Some(pending) = this.pending.take() {
                    let outcome = pending.logic.classify(&output);
                    pending.settle(outcome);
                }
                Poll::Ready(output)
            }
        }
    }
}

#[pinned_drop]
impl<F, L> PinnedDrop for ResponseFuture<F, L> {
    fn drop(self: Pin<&mut Self>) {
        if let Some(pending) = self.project().pending.take() {
            debug!(message = "Request dropped before completion; settling as overload.");
            pending.settle(Outcome::Overload);
        }
    }
}

impl<L> Pending<L> {
    fn settle(self, outcome: Outcome) {
        let state = self.limiter.settle(self.ticket, outcome);
        emit(internal_event::AdaptiveConcurrencyLimit {
            limit: state.ceiling(),
            outcome: Some(outcome),
        });
        emit(AdaptiveConcurrencyInFlight {
            in_flight: state.in_flight(),
        });
    }
}
