//! Adaptive admission control for server handlers using AIMD (Additive Increase Multiplicative
//! Decrease).
//!
//! A [`Limiter`](adaptive_concurrency::Limiter) decides whether a new request may start, and
//! adjusts its concurrency ceiling from how requests end:
//!
//! 1. **Admission**: a request is admitted while the in-flight count does not exceed the ceiling.
//! 2. **Multiplicative decrease**: an overload signal (cancellation, timeout, explicit
//!    unavailability) scales the ceiling down by the backoff ratio, at most once per window.
//! 3. **Additive increase**: any other outcome raises the ceiling by one, provided more than half
//!    of it is in use.
//!
//! The limiter is plain synchronous state behind one lock. The
//! [`AdaptiveConcurrencyLimitLayer`](adaptive_concurrency::AdaptiveConcurrencyLimitLayer) wires it
//! around any `tower::Service` and reports limit, in-flight and rejection metrics.
//!
//! # Basic Usage
//! ```
//! use adaptive_admission::adaptive_concurrency::{
//!     AdaptiveConcurrencySettings, Limiter, Outcome,
//! };
//!
//! let limiter = Limiter::new(
//!     AdaptiveConcurrencySettings::builder()
//!         .initial_concurrency(4)
//!         .backoff_ratio(0.5)
//!         .build(),
//! )
//! .unwrap();
//!
//! let ticket = limiter.admit().expect("below capacity");
//! // ... run the request ...
//! limiter.settle(ticket, Outcome::Overload);
//! assert_eq!(limiter.state().ceiling(), 2);
//! ```
pub mod adaptive_concurrency;
#[cfg(test)]
pub mod test_utils;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
