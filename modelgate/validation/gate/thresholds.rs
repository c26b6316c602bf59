use serde::{Deserialize, Serialize};

use crate::{
    config::Thresholds,
    error::{GateError, GateResult},
    metrics::{Metric, MetricReport},
};

/// A metric that missed its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    /// Failing metric.
    pub metric: Metric,
    /// Observed value.
    pub value: f64,
    /// Configured threshold.
    pub threshold: f64,
}

impl From<ThresholdBreach> for GateError {
    fn from(breach: ThresholdBreach) -> Self {
        Self::BelowThreshold {
            metric: breach.metric,
            value: breach.value,
            threshold: breach.threshold,
        }
    }
}

/// Applies [`Thresholds`] to a [`MetricReport`].
///
/// Quality metrics pass at or above their threshold; latency passes strictly below it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdGate {
    thresholds: Thresholds,
}

impl ThresholdGate {
    /// Wraps thresholds.
    #[must_use]
    pub const fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Threshold for `metric`.
    #[must_use]
    pub const fn threshold(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Accuracy => self.thresholds.accuracy,
            Metric::Precision => self.thresholds.precision,
            Metric::Recall => self.thresholds.recall,
            Metric::F1 => self.thresholds.f1,
            Metric::InferenceLatency => self.thresholds.max_latency_secs,
        }
    }

    /// Checks one metric.
    pub fn check(&self, metric: Metric, report: &MetricReport) -> GateResult<()> {
        match self.breach(metric, report) {
            Some(breach) => Err(breach.into()),
            None => Ok(()),
        }
    }

    /// Every breach, in [`Metric::ALL`] order. Empty means the gate passed.
    #[must_use]
    pub fn evaluate(&self, report: &MetricReport) -> Vec<ThresholdBreach> {
        Metric::ALL
            .iter()
            .filter_map(|metric| self.breach(*metric, report))
            .collect()
    }

    fn breach(&self, metric: Metric, report: &MetricReport) -> Option<ThresholdBreach> {
        let value = report.value(metric);
        let threshold = self.threshold(metric);
        let passed = if metric.is_upper_bound() {
            value < threshold
        } else {
            value >= threshold
        };
        (!passed).then_some(ThresholdBreach {
            metric,
            value,
            threshold,
        })
    }
}
