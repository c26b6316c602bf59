use gate_logging::LogLevel;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    artifact::{ModelArtifact, FOREST_FORMAT},
    dataset::{record::TitanicRecord, split::Split, table::Dataset},
    error::{GateError, GateResult},
    forest::{ForestParams, RandomForest},
    preprocess::{FittedPreprocessor, PreprocessorSpec},
    telemetry::{self, ValidationTelemetry},
};

/// Binary classifier over passenger records.
///
/// The harness only relies on this interface; serialized bytes are opaque to it.
pub trait Model {
    /// Learns from labelled rows.
    fn fit(&mut self, rows: &Dataset) -> GateResult<()>;

    /// Predicts one class (0 or 1) per row.
    fn predict(&self, rows: &[TitanicRecord]) -> GateResult<Vec<u8>>;

    /// Encodes the fitted model.
    fn serialize(&self) -> GateResult<Vec<u8>>;

    /// Decodes a model produced by [`Model::serialize`].
    fn deserialize(bytes: &[u8]) -> GateResult<Self>
    where
        Self: Sized;
}

/// Preprocessor followed by a random forest.
#[derive(Debug, Clone)]
pub struct ForestPipeline {
    spec: PreprocessorSpec,
    params: ForestParams,
    fitted: Option<Fitted>,
    telemetry: Option<ValidationTelemetry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fitted {
    preprocessor: FittedPreprocessor,
    forest: RandomForest,
}

#[derive(Serialize, Deserialize)]
struct PipelineState {
    spec: PreprocessorSpec,
    params: ForestParams,
    preprocessor: FittedPreprocessor,
    forest: RandomForest,
}

// Telemetry is a sink, not model state.
impl PartialEq for ForestPipeline {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec && self.params == other.params && self.fitted == other.fitted
    }
}

impl ForestPipeline {
    /// Unfitted pipeline.
    #[must_use]
    pub const fn new(spec: PreprocessorSpec, params: ForestParams) -> Self {
        Self {
            spec,
            params,
            fitted: None,
            telemetry: None,
        }
    }

    /// Attaches telemetry used while fitting.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ValidationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// True once [`Model::fit`] has succeeded.
    #[must_use]
    pub const fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Forest hyperparameters.
    #[must_use]
    pub const fn params(&self) -> ForestParams {
        self.params
    }

    /// Transformed feature names, once fitted.
    #[must_use]
    pub fn feature_names(&self) -> Option<Vec<String>> {
        self.fitted
            .as_ref()
            .map(|fitted| fitted.preprocessor.feature_names())
    }

    fn fitted(&self) -> GateResult<&Fitted> {
        self.fitted
            .as_ref()
            .ok_or_else(|| GateError::Training("pipeline has not been fitted".into()))
    }
}

impl Model for ForestPipeline {
    fn fit(&mut self, rows: &Dataset) -> GateResult<()> {
        let telemetry = self.telemetry.as_ref();
        let preprocessor = self.spec.fit_with_telemetry(&rows.records, telemetry)?;
        let x = preprocessor.transform(&rows.records);
        let forest = RandomForest::fit(x.view(), &rows.labels(), self.params, telemetry)?;
        self.fitted = Some(Fitted {
            preprocessor,
            forest,
        });
        Ok(())
    }

    fn predict(&self, rows: &[TitanicRecord]) -> GateResult<Vec<u8>> {
        let fitted = self.fitted()?;
        let x = fitted.preprocessor.transform(rows);
        fitted.forest.predict(x.view())
    }

    fn serialize(&self) -> GateResult<Vec<u8>> {
        let fitted = self.fitted()?;
        let state = PipelineState {
            spec: self.spec.clone(),
            params: self.params,
            preprocessor: fitted.preprocessor.clone(),
            forest: fitted.forest.clone(),
        };
        ModelArtifact::wrap(FOREST_FORMAT, &state)?.to_bytes()
    }

    fn deserialize(bytes: &[u8]) -> GateResult<Self> {
        let state: PipelineState = ModelArtifact::from_bytes(bytes)?.unwrap_as(FOREST_FORMAT)?;
        Ok(Self {
            spec: state.spec,
            params: state.params,
            fitted: Some(Fitted {
                preprocessor: state.preprocessor,
                forest: state.forest,
            }),
            telemetry: None,
        })
    }
}

/// Trains a fresh 100-tree pipeline on `split.train`.
pub fn train(split: &Split, preprocessor: &PreprocessorSpec, seed: u64) -> GateResult<ForestPipeline> {
    train_with(split, preprocessor, ForestParams { seed, ..ForestParams::default() }, None)
}

/// [`train`] with explicit forest parameters and optional telemetry.
pub fn train_with(
    split: &Split,
    preprocessor: &PreprocessorSpec,
    params: ForestParams,
    telemetry: Option<&ValidationTelemetry>,
) -> GateResult<ForestPipeline> {
    telemetry::log(
        telemetry,
        LogLevel::Info,
        "training.start",
        json!({
            "rows": split.train.len(),
            "n_estimators": params.n_estimators,
            "seed": params.seed,
        }),
    );
    let mut pipeline = ForestPipeline::new(preprocessor.clone(), params);
    if let Some(tel) = telemetry {
        pipeline = pipeline.with_telemetry(tel.clone());
    }
    pipeline.fit(&split.train)?;
    telemetry::log(
        telemetry,
        LogLevel::Info,
        "training.complete",
        json!({ "features": pipeline.feature_names() }),
    );
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{preprocess::build_preprocessor, testdata::synthetic_dataset};

    fn split() -> Split {
        Split::new(&synthetic_dataset(240, 11), 0.2, 42).unwrap()
    }

    #[test]
    fn independent_pipelines_predict_identically() {
        let split = split();
        let a = train(&split, &build_preprocessor(), 42).unwrap();
        let b = train(&split, &build_preprocessor(), 42).unwrap();
        assert_eq!(
            a.predict(&split.test.records).unwrap(),
            b.predict(&split.test.records).unwrap()
        );
        assert_eq!(a, b);
    }

    #[test]
    fn serialized_pipeline_predicts_the_same() {
        let split = split();
        let model = train_with(
            &split,
            &build_preprocessor(),
            ForestParams {
                n_estimators: 15,
                seed: 3,
            },
            None,
        )
        .unwrap();
        let restored = ForestPipeline::deserialize(&model.serialize().unwrap()).unwrap();
        assert_eq!(
            model.predict(&split.test.records).unwrap(),
            restored.predict(&split.test.records).unwrap()
        );
        assert_eq!(restored.params().n_estimators, 15);
    }

    #[test]
    fn unfitted_pipeline_refuses_to_predict_or_serialize() {
        let pipeline = ForestPipeline::new(build_preprocessor(), ForestParams::default());
        assert!(!pipeline.is_fitted());
        assert!(pipeline.predict(&split().test.records).is_err());
        assert!(pipeline.serialize().is_err());
    }

    #[test]
    fn learns_the_survival_rule() {
        let split = split();
        let model = train(&split, &build_preprocessor(), 42).unwrap();
        let predictions = model.predict(&split.test.records).unwrap();
        let correct = predictions
            .iter()
            .zip(split.test.labels())
            .filter(|(p, y)| **p == *y)
            .count();
        assert!(correct * 100 >= split.test.len() * 80, "{correct}/{}", split.test.len());
    }
}
