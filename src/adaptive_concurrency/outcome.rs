use tower::timeout::error::Elapsed;

use super::Rejected;
use crate::Error;

/// How a settled unit of work affects the concurrency ceiling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Outcome {
    /// The work was cancelled, timed out, or the downstream reported unavailability.
    Overload,
    /// Success, or any failure unrelated to overload.
    ///
    /// Ambiguous results fall here: under-reacting only slows growth.
    #[default]
    Other,
}

impl Outcome {
    pub const fn is_overload(self) -> bool {
        matches!(self, Outcome::Overload)
    }
}

impl From<bool> for Outcome {
    fn from(overload: bool) -> Self {
        if overload {
            Outcome::Overload
        } else {
            Outcome::Other
        }
    }
}

/// Decides which results of a wrapped service are overload signals.
///
/// # Example
/// ```rust
/// use adaptive_admission::adaptive_concurrency::OutcomeLogic;
///
/// #[derive(Clone)]
/// struct BusyLogic;
///
/// #[derive(Debug)]
/// struct Busy;
///
/// impl std::fmt::Display for Busy {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "busy")
///     }
/// }
///
/// impl std::error::Error for Busy {}
///
/// impl OutcomeLogic for BusyLogic {
///     type Error = Busy;
///     type Response = String;
///
///     fn is_overload_error(&self, _error: &Self::Error) -> bool {
///         true
///     }
///
///     fn is_overload_response(&self, response: &Self::Response) -> bool {
///         response == "try later"
///     }
/// }
/// ```
pub trait OutcomeLogic: Clone + Send + Sync + 'static {
    /// The error type produced by the wrapped service.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The successful response type of the wrapped service.
    type Response;

    /// Whether an error produced by the service signals overload.
    fn is_overload_error(&self, error: &Self::Error) -> bool;

    /// Whether a successful response still signals overload, e.g. an explicit
    /// "unavailable" status carried in an otherwise successful transport response.
    fn is_overload_response(&self, _response: &Self::Response) -> bool {
        false
    }

    /// Classify a completed call. Errors of unknown type are not overload signals, except
    /// for elapsed `tower` timeouts and [`Rejected`] errors from a limiter further down the
    /// stack.
    fn classify(&self, result: &Result<Self::Response, Error>) -> Outcome {
        match result {
            Ok(response) => self.is_overload_response(response).into(),
            Err(error) => {
                if let Some(expected) = error.downcast_ref::<Self::Error>() {
                    self.is_overload_error(expected).into()
                } else if error.downcast_ref::<Elapsed>().is_some()
                    || error.downcast_ref::<Rejected>().is_some()
                {
                    Outcome::Overload
                } else {
                    debug!(
                        message = "Unclassified error; not treated as overload.",
                        %error,
                    );
                    Outcome::Other
                }
            }
        }
    }
}
