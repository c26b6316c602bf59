use std::{fmt, time::Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{dataset::table::Dataset, error::GateResult, model::Model};

/// Gated metric identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Fraction of correct predictions.
    Accuracy,
    /// Positive predictive value for class 1.
    Precision,
    /// True positive rate for class 1.
    Recall,
    /// Harmonic mean of precision and recall.
    F1,
    /// Wall time of one batched predict call, in seconds.
    InferenceLatency,
}

impl Metric {
    /// Every metric, in report order.
    pub const ALL: [Self; 5] = [
        Self::Accuracy,
        Self::Precision,
        Self::Recall,
        Self::F1,
        Self::InferenceLatency,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
            Self::InferenceLatency => "inference_latency",
        }
    }

    /// True when smaller values are better.
    #[must_use]
    pub const fn is_upper_bound(self) -> bool {
        matches!(self, Self::InferenceLatency)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metrics of one model on one test partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    /// Accuracy.
    pub accuracy: f64,
    /// Precision (class 1).
    pub precision: f64,
    /// Recall (class 1).
    pub recall: f64,
    /// F1 (class 1).
    pub f1: f64,
    /// Seconds spent in one batched predict call.
    pub latency_secs: f64,
    /// Rows evaluated.
    pub samples: usize,
}

impl MetricReport {
    /// Runs exactly one batched prediction over `test`, timing it.
    pub fn measure<M: Model + ?Sized>(model: &M, test: &Dataset) -> GateResult<Self> {
        let started = Instant::now();
        let predictions = model.predict(&test.records)?;
        let latency_secs = started.elapsed().as_secs_f64();
        Ok(Self::from_predictions(&test.labels(), &predictions, latency_secs))
    }

    /// Scores predictions against labels (positive class 1, zero denominators give 0).
    #[must_use]
    pub fn from_predictions(labels: &[u8], predictions: &[u8], latency_secs: f64) -> Self {
        let counts = Confusion::tally(labels, predictions);
        let precision = ratio(counts.tp, counts.tp + counts.fp);
        let recall = ratio(counts.tp, counts.tp + counts.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            accuracy: ratio(counts.tp + counts.tn, counts.total()),
            precision,
            recall,
            f1,
            latency_secs,
            samples: counts.total(),
        }
    }

    /// Value of one metric.
    #[must_use]
    pub const fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Accuracy => self.accuracy,
            Metric::Precision => self.precision,
            Metric::Recall => self.recall,
            Metric::F1 => self.f1,
            Metric::InferenceLatency => self.latency_secs,
        }
    }

    /// Named values in [`Metric::ALL`] order.
    #[must_use]
    pub fn to_map(&self) -> IndexMap<String, f64> {
        Metric::ALL
            .iter()
            .map(|metric| (metric.name().to_string(), self.value(*metric)))
            .collect()
    }
}

#[derive(Default)]
struct Confusion {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl Confusion {
    fn tally(labels: &[u8], predictions: &[u8]) -> Self {
        labels
            .iter()
            .zip(predictions)
            .fold(Self::default(), |mut acc, (&label, &predicted)| {
                match (label == 1, predicted == 1) {
                    (true, true) => acc.tp += 1,
                    (false, true) => acc.fp += 1,
                    (false, false) => acc.tn += 1,
                    (true, false) => acc.fn_ += 1,
                }
                acc
            })
    }

    const fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
