use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// Independently invocable validation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckName {
    /// Dataset cache present or obtainable.
    DatasetExists,
    /// A saved model artifact is present (skipped when absent).
    ModelExists,
    /// Accuracy threshold.
    Accuracy,
    /// Single-batch inference latency bound.
    InferenceLatency,
    /// Two independently trained pipelines predict identically.
    Reproducibility,
    /// F1 threshold.
    F1,
    /// Precision and recall thresholds.
    PrecisionRecall,
    /// Regression gate against the stored baseline.
    BaselineComparison,
}

impl CheckName {
    /// Every check, in execution order.
    pub const ALL: [Self; 8] = [
        Self::DatasetExists,
        Self::ModelExists,
        Self::Accuracy,
        Self::InferenceLatency,
        Self::Reproducibility,
        Self::F1,
        Self::PrecisionRecall,
        Self::BaselineComparison,
    ];

    /// Kebab-case name used on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatasetExists => "dataset-exists",
            Self::ModelExists => "model-exists",
            Self::Accuracy => "accuracy",
            Self::InferenceLatency => "inference-latency",
            Self::Reproducibility => "reproducibility",
            Self::F1 => "f1",
            Self::PrecisionRecall => "precision-recall",
            Self::BaselineComparison => "baseline-comparison",
        }
    }

    /// True when the check is scored on the shared trained run context.
    ///
    /// `reproducibility` trains its own pair of pipelines and is not one of them.
    #[must_use]
    pub const fn uses_run_context(self) -> bool {
        !matches!(
            self,
            Self::DatasetExists | Self::ModelExists | Self::Reproducibility
        )
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckName {
    type Err = GateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|check| check.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|c| c.as_str()).collect();
                GateError::Config(format!(
                    "unknown check '{raw}', expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Result status of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Check passed.
    Passed,
    /// Check failed.
    Failed,
    /// Preconditions absent; nothing was checked.
    Skipped,
    /// No baseline existed; the current model became the baseline.
    Established,
}

/// Outcome of one check with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Which check ran.
    pub check: CheckName,
    /// Status.
    pub status: CheckStatus,
    /// Observed values and thresholds, or the failure reason.
    pub message: String,
}

impl CheckOutcome {
    /// Passing outcome.
    pub fn passed(check: CheckName, message: impl Into<String>) -> Self {
        Self::with(check, CheckStatus::Passed, message)
    }

    /// Failing outcome.
    pub fn failed(check: CheckName, message: impl Into<String>) -> Self {
        Self::with(check, CheckStatus::Failed, message)
    }

    /// Skipped outcome.
    pub fn skipped(check: CheckName, message: impl Into<String>) -> Self {
        Self::with(check, CheckStatus::Skipped, message)
    }

    /// Baseline-established outcome.
    pub fn established(check: CheckName, message: impl Into<String>) -> Self {
        Self::with(check, CheckStatus::Established, message)
    }

    fn with(check: CheckName, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            check,
            status,
            message: message.into(),
        }
    }

    /// True only for [`CheckStatus::Failed`].
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == CheckStatus::Failed
    }
}
