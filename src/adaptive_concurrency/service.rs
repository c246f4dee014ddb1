use std::{
    sync::Arc,
    task::{Context, Poll},
};

use tower::Service;

use super::{
    Limiter, OutcomeLogic,
    future::ResponseFuture,
    internal_event::{self, AdaptiveConcurrencyInFlight, AdaptiveConcurrencyRejected, emit},
};

/// Gates calls to the inner service through an adaptive [`Limiter`].
///
/// Each call is admitted before it reaches the inner service. A rejected call never reaches it:
/// the returned future resolves right away to a [`Rejected`](super::Rejected) error. An admitted
/// call is settled when its future completes, or as an overload signal if the future is dropped
/// first.
///
/// The inner service must be `Clone`: on rejection it is swapped for a fresh clone, so any
/// capacity the inner `poll_ready` reserved (a `ConcurrencyLimit` permit, a `Buffer` slot) is
/// released instead of being held until the next call.
#[derive(Debug)]
pub struct AdaptiveConcurrencyLimit<S, L> {
    inner: S,
    limiter: Arc<Limiter>,
    logic: L,
}

impl<S, L> AdaptiveConcurrencyLimit<S, L> {
    pub const fn new(inner: S, limiter: Arc<Limiter>, logic: L) -> Self {
        AdaptiveConcurrencyLimit {
            inner,
            limiter,
            logic,
        }
    }

    pub const fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }

    pub const fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, L, R> Service<R> for AdaptiveConcurrencyLimit<S, L>
where
    S: Service<R> + Clone,
    S::Error: Into<crate::Error>,
    L: OutcomeLogic<Response = S::Response>,
{
    type Response = S::Response;
    type Error = crate::Error;
    type Future = ResponseFuture<S::Future, L>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: R) -> Self::Future {
        match self.limiter.admit() {
            Ok(ticket) => {
                emit(internal_event::AdaptiveConcurrencyLimit {
                    limit: ticket.ceiling_at_admission(),
                    outcome: None,
                });
                emit(AdaptiveConcurrencyInFlight {
                    in_flight: ticket.in_flight_at_admission(),
                });

                let future = self.inner.call(request);
                ResponseFuture::admitted(
                    future,
                    ticket,
                    Arc::clone(&self.limiter),
                    self.logic.clone(),
                )
            }
            Err(rejected) => {
                let fresh = self.inner.clone();
                drop(std::mem::replace(&mut self.inner, fresh));

                emit(AdaptiveConcurrencyRejected {
                    state: rejected.state(),
                });
                ResponseFuture::rejected(rejected)
            }
        }
    }
}

impl<S, L> Clone for AdaptiveConcurrencyLimit<S, L>
where
    S: Clone,
    L: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            logic: self.logic.clone(),
        }
    }
}
