use std::path::PathBuf;

use thiserror::Error;

use crate::{config::REGRESSION_TOLERANCE, metrics::Metric};

/// Result alias used across the harness.
pub type GateResult<T> = std::result::Result<T, GateError>;

/// Errors raised by a validation run.
///
/// A missing baseline is not an error: [`crate::BaselineStore::load`] returns
/// `Ok(None)` and the run establishes one.
#[derive(Debug, Error)]
pub enum GateError {
    /// Cache file absent and the remote fallback failed (or none is configured).
    #[error("dataset unavailable at {}: {reason}", .path.display())]
    DataUnavailable {
        /// Cache path that was requested.
        path: PathBuf,
        /// Why the remote fallback could not supply the data.
        reason: String,
    },
    /// Header, column or value violation detected while loading a dataset.
    #[error("dataset schema violation: {0}")]
    Schema(String),
    /// A quality gate failed.
    #[error("{metric} failed threshold: observed {value:.4}, threshold {threshold:.4}")]
    BelowThreshold {
        /// Metric that failed.
        metric: Metric,
        /// Observed value.
        value: f64,
        /// Configured threshold.
        threshold: f64,
    },
    /// Accuracy dropped beyond tolerance against the baseline.
    #[error(
        "accuracy regressed: current {current:.4} < baseline {baseline:.4} x {}",
        REGRESSION_TOLERANCE
    )]
    Regression {
        /// Accuracy of the freshly trained model.
        current: f64,
        /// Accuracy of the baseline model on the same test rows.
        baseline: f64,
    },
    /// Dataset too small to produce both partitions.
    #[error("split requires at least two rows, got {0}")]
    EmptySplit(usize),
    /// Degenerate training input.
    #[error("training error: {0}")]
    Training(String),
    /// Model artifact could not be produced or understood.
    #[error("artifact error: {0}")]
    Artifact(String),
    /// Invalid harness configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON encoding failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// CSV encoding failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// TOML parsing failure.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl GateError {
    /// Returns true for quality outcomes (threshold breach, regression) as opposed to
    /// infrastructure failures.
    #[must_use]
    pub const fn is_quality_failure(&self) -> bool {
        matches!(self, Self::BelowThreshold { .. } | Self::Regression { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = GateError::BelowThreshold {
            metric: Metric::Accuracy,
            value: 0.7412,
            threshold: 0.75,
        };
        assert_eq!(
            err.to_string(),
            "accuracy failed threshold: observed 0.7412, threshold 0.7500"
        );
        let err = GateError::Regression {
            current: 0.7,
            baseline: 0.8,
        };
        assert!(err.to_string().contains("baseline 0.8000 x 0.95"));
        assert!(err.is_quality_failure());
        assert!(!GateError::EmptySplit(1).is_quality_failure());
    }
}
