#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Modelgate validation harness: cached Titanic dataset, deterministic split,
//! column preprocessing, seeded random forest, metric threshold gates and a
//! baseline regression gate.

/// Harness configuration objects and TOML loading.
#[path = "../config.rs"]
pub mod config;

/// Error taxonomy shared by every stage.
#[path = "../error.rs"]
pub mod error;

/// Telemetry helpers for logging/event emission.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Dataset schema, cache-backed provider and train/test split.
#[path = "../dataset/main.rs"]
pub mod dataset;

/// Column-wise imputation, scaling and one-hot encoding.
#[path = "../preprocess/main.rs"]
pub mod preprocess;

/// CART decision trees and the bootstrap random forest.
#[path = "../forest/main.rs"]
pub mod forest;

/// `Model` interface and the composed preprocessing + forest pipeline.
#[path = "../model.rs"]
pub mod model;

/// Versioned model artifacts and atomic file replacement.
#[path = "../artifact.rs"]
pub mod artifact;

/// Classification metrics and inference latency measurement.
#[path = "../metrics.rs"]
pub mod metrics;

/// Threshold gate, baseline store, independent checks and the run state machine.
#[path = "../gate/main.rs"]
pub mod gate;

#[cfg(test)]
#[path = "../testdata.rs"]
mod testdata;

pub use artifact::{load_model, save_model, write_atomic, ModelArtifact};
pub use config::{
    BaselineConfig, DatasetConfig, HarnessConfig, ModelConfig, RemoteConfig, Thresholds,
    TrainConfig, REGRESSION_TOLERANCE,
};
pub use dataset::{
    provider::{DatasetProvider, HttpSource, LoadOrigin, RemoteSource},
    record::TitanicRecord,
    split::Split,
    table::Dataset,
};
pub use error::{GateError, GateResult};
pub use forest::{ForestParams, RandomForest};
pub use gate::{
    baseline::{
        evaluate_against_baseline, BaselineComparison, BaselineStore, BaselineVerdict,
        RegressionGate,
    },
    checks::{CheckName, CheckOutcome, CheckStatus},
    runner::{Outcome, RunContext, RunState, ValidationHarness, ValidationReport},
    thresholds::{ThresholdBreach, ThresholdGate},
};
pub use metrics::{Metric, MetricReport};
pub use model::{train, train_with, ForestPipeline, Model};
pub use preprocess::{build_preprocessor, FittedPreprocessor, PreprocessorSpec};
pub use telemetry::{ValidationTelemetry, ValidationTelemetryBuilder};
