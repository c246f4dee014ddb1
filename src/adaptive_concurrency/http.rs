//! HTTP flavoured outcome classification and rejection responses.

use std::{fmt, marker::PhantomData};

use http::{Response, StatusCode};
use snafu::Snafu;

use super::{Outcome, OutcomeLogic, Rejected};
use crate::Error as CrateError;

/// Nginx's non-standard "client closed request".
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Errors an HTTP handler can report to the limiter.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    /// The handler or one of its dependencies ran out of time.
    #[snafu(display("HTTP request timed out"))]
    Timeout,

    /// The request was cancelled before it completed.
    #[snafu(display("HTTP request canceled"))]
    Canceled,

    /// A downstream dependency explicitly reported it cannot take more work.
    #[snafu(display("downstream unavailable: {reason}"))]
    Unavailable { reason: String },

    /// Any other handler failure.
    #[snafu(display("HTTP handler failed: {source}"))]
    Handler { source: CrateError },
}

impl HttpError {
    pub const fn is_overload(&self) -> bool {
        matches!(
            self,
            HttpError::Timeout | HttpError::Canceled | HttpError::Unavailable { .. }
        )
    }
}

/// Classify a response status.
///
/// Timeouts, cancellation, throttling and unavailability are overload signals: `408`, `429`,
/// `499`, `503` and `504`. Everything else, including other server errors, is not.
pub fn status_outcome(status: StatusCode) -> Outcome {
    let overload = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    ) || status.as_u16() == CLIENT_CLOSED_REQUEST;

    overload.into()
}

/// [`OutcomeLogic`] for services answering with [`http::Response`]s and failing with
/// [`HttpError`].
pub struct HttpOutcomeLogic<B> {
    _body: PhantomData<fn() -> B>,
}

impl<B> HttpOutcomeLogic<B> {
    pub const fn new() -> Self {
        Self { _body: PhantomData }
    }
}

impl<B> Default for HttpOutcomeLogic<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> Clone for HttpOutcomeLogic<B> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<B> fmt::Debug for HttpOutcomeLogic<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpOutcomeLogic").finish()
    }
}

impl<B: 'static> OutcomeLogic for HttpOutcomeLogic<B> {
    type Error = HttpError;
    type Response = Response<B>;

    fn is_overload_error(&self, error: &Self::Error) -> bool {
        error.is_overload()
    }

    fn is_overload_response(&self, response: &Self::Response) -> bool {
        status_outcome(response.status()).is_overload()
    }
}

/// The response to send upstream when the limiter refuses a request.
pub fn rejection_response<B: Default>() -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
}

/// Map a middleware error to the rejection response, if it is a capacity rejection.
///
/// Other errors are left to the caller: they are downstream failures, not back-pressure.
pub fn response_for_error<B: Default>(error: &CrateError) -> Option<Response<B>> {
    error
        .downcast_ref::<Rejected>()
        .map(|_| rejection_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive_concurrency::{AdaptiveConcurrencySettings, Limiter};

    #[test]
    fn overload_statuses() {
        for status in [408, 429, 499, 503, 504] {
            let status = StatusCode::from_u16(status).unwrap();
            assert_eq!(status_outcome(status), Outcome::Overload, "{status}");
        }
    }

    #[test]
    fn other_statuses() {
        for status in [200, 201, 204, 400, 404, 500, 502] {
            let status = StatusCode::from_u16(status).unwrap();
            assert_eq!(status_outcome(status), Outcome::Other, "{status}");
        }
    }

    #[test]
    fn http_errors() {
        assert!(HttpError::Timeout.is_overload());
        assert!(HttpError::Canceled.is_overload());
        assert!(
            HttpError::Unavailable {
                reason: "database pool exhausted".into()
            }
            .is_overload()
        );
        assert!(
            !HttpError::Handler {
                source: "bad input".into()
            }
            .is_overload()
        );
    }

    #[test]
    fn logic_classifies_responses_and_errors() {
        let logic = HttpOutcomeLogic::<String>::new();

        let mut busy = Response::new(String::new());
        *busy.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        assert_eq!(logic.classify(&Ok(busy)), Outcome::Overload);
        assert_eq!(logic.classify(&Ok(Response::new(String::new()))), Outcome::Other);

        let timeout: CrateError = Box::new(HttpError::Timeout);
        assert_eq!(logic.classify(&Err(timeout)), Outcome::Overload);
    }

    #[test]
    fn rejection_maps_to_service_unavailable() {
        let limiter = Limiter::new(AdaptiveConcurrencySettings::default()).unwrap();
        let _tickets = (0..2).map(|_| limiter.admit().unwrap()).collect::<Vec<_>>();
        let rejected: CrateError = Box::new(limiter.admit().unwrap_err());

        let response = response_for_error::<String>(&rejected).unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.body().is_empty());
    }

    #[test]
    fn downstream_failures_are_not_rejections() {
        let failure: CrateError = Box::new(HttpError::Timeout);
        assert!(response_for_error::<String>(&failure).is_none());
    }
}
