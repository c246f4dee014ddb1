//! Admission control for server handlers with an adaptively sized concurrency limit.

mod future;
pub mod http;
pub mod internal_event;
mod layer;
mod limiter;
mod outcome;
mod service;


pub use future::ResponseFuture;
pub use layer::AdaptiveConcurrencyLimitLayer;
pub use limiter::{Limiter, LimiterState, Rejected, Ticket};
pub use outcome::{Outcome, OutcomeLogic};
pub use service::AdaptiveConcurrencyLimit;

use bon::Builder;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

/// Construction parameters of a [`Limiter`].
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `initial_concurrency` | 1 | Starting ceiling, at least 1 |
/// | `backoff_ratio` | 0.9 | Multiplier applied to the ceiling on overload, strictly between 0 and 1 |
///
/// # Example
///
/// ```rust
/// use adaptive_admission::adaptive_concurrency::{AdaptiveConcurrencySettings, Limiter};
///
/// let settings = AdaptiveConcurrencySettings::builder()
///     .initial_concurrency(16)
///     .backoff_ratio(0.5)
///     .build();
/// let limiter = Limiter::new(settings).unwrap();
/// assert_eq!(limiter.state().ceiling(), 16);
/// ```
#[derive(Builder, Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdaptiveConcurrencySettings {
    /// The ceiling the limiter starts from before any outcome has been observed.
    ///
    /// The limiter admits up to one unit of work beyond the ceiling, so a value of `1` lets two
    /// requests run at once.
    #[builder(default = default_initial_concurrency())]
    initial_concurrency: usize,

    /// The fraction of the current ceiling kept after an overload signal.
    ///
    /// Valid values are greater than `0` and less than `1`. Smaller values back off more
    /// aggressively. The decreased ceiling is rounded down, and never drops below `1`.
    #[builder(default = default_backoff_ratio())]
    backoff_ratio: f64,
}

const fn default_initial_concurrency() -> usize {
    1
}

const fn default_backoff_ratio() -> f64 {
    0.9
}

impl Default for AdaptiveConcurrencySettings {
    fn default() -> Self {
        Self {
            initial_concurrency: default_initial_concurrency(),
            backoff_ratio: default_backoff_ratio(),
        }
    }
}

impl AdaptiveConcurrencySettings {
    /// Parse settings from JSON, falling back to defaults for missing fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json).context(ParseSnafu)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that the settings describe a usable limiter.
    ///
    /// Fails if `initial_concurrency` is zero, or if `backoff_ratio` is not strictly between
    /// `0` and `1`. [`Limiter::new`] runs this before building the limiter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.initial_concurrency >= 1,
            InitialConcurrencySnafu {
                value: self.initial_concurrency
            }
        );
        // Written so that NaN fails too.
        ensure!(
            self.backoff_ratio > 0.0 && self.backoff_ratio < 1.0,
            BackoffRatioSnafu {
                value: self.backoff_ratio
            }
        );
        Ok(())
    }

    /// The ceiling a new limiter starts from.
    pub const fn initial_concurrency(&self) -> usize {
        self.initial_concurrency
    }

    /// The multiplier applied to the ceiling on an overload signal.
    pub const fn backoff_ratio(&self) -> f64 {
        self.backoff_ratio
    }
}

/// Invalid limiter configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("initial concurrency must be at least 1, got {value}"))]
    InitialConcurrency { value: usize },

    #[snafu(display("backoff ratio must be between 0 and 1 exclusive, got {value}"))]
    BackoffRatio { value: f64 },

    #[snafu(display("failed to parse adaptive concurrency settings: {source}"))]
    Parse { source: serde_json::Error },
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let settings = AdaptiveConcurrencySettings::builder().build();
        assert_eq!(settings, AdaptiveConcurrencySettings::default());
        assert_eq!(settings.initial_concurrency(), 1);
        assert_eq!(settings.backoff_ratio(), 0.9);
    }

    #[test]
    fn rejects_zero_initial_concurrency() {
        let settings = AdaptiveConcurrencySettings::builder()
            .initial_concurrency(0)
            .build();

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InitialConcurrency { value: 0 })
        ));
        assert!(Limiter::new(settings).is_err());
    }

    #[test]
    fn rejects_out_of_range_backoff_ratio() {
        for ratio in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let settings = AdaptiveConcurrencySettings::builder()
                .backoff_ratio(ratio)
                .build();

            assert!(
                matches!(settings.validate(), Err(ConfigError::BackoffRatio { .. })),
                "ratio {ratio} should be rejected"
            );
        }
    }

    #[test]
    fn parses_json() {
        let settings = AdaptiveConcurrencySettings::from_json(
            r#"{ "initial_concurrency": 8, "backoff_ratio": 0.5 }"#,
        )
        .unwrap();

        assert_eq!(settings.initial_concurrency(), 8);
        assert_eq!(settings.backoff_ratio(), 0.5);
    }

    #[test]
    fn json_missing_fields_use_defaults() {
        let settings = AdaptiveConcurrencySettings::from_json(r#"{ "initial_concurrency": 3 }"#)
            .unwrap();

        assert_eq!(settings.initial_concurrency(), 3);
        assert_eq!(settings.backoff_ratio(), 0.9);
    }

    #[test]
    fn json_unknown_fields_fail() {
        let err = AdaptiveConcurrencySettings::from_json(r#"{ "ewma_alpha": 0.4 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn json_invalid_values_fail() {
        let err =
            AdaptiveConcurrencySettings::from_json(r#"{ "backoff_ratio": 2.0 }"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "backoff ratio must be between 0 and 1 exclusive, got 2"
        );
    }
}
