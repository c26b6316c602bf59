use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    artifact::{load_model, save_model, write_atomic},
    config::{BaselineConfig, REGRESSION_TOLERANCE},
    dataset::table::Dataset,
    error::{GateError, GateResult},
    metrics::MetricReport,
    model::Model,
};

/// Persists the reference model that later runs are compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    /// Store backed by the configured artifact path.
    #[must_use]
    pub fn new(config: &BaselineConfig) -> Self {
        Self {
            path: config.path.clone(),
        }
    }

    /// Artifact path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when a baseline artifact exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the baseline; `Ok(None)` when none has been established yet.
    pub fn load<M: Model>(&self) -> GateResult<Option<M>> {
        load_model(&self.path)
    }

    /// Atomically replaces the baseline with `model`.
    pub fn save<M: Model>(&self, model: &M) -> GateResult<()> {
        save_model(&self.path, model)
    }

    /// Copies a saved model artifact into the baseline slot.
    ///
    /// The artifact is decoded as `M` first so a corrupt file never becomes the baseline.
    pub fn promote_from<M: Model>(&self, artifact: &Path) -> GateResult<()> {
        let bytes = fs::read(artifact).map_err(|err| {
            GateError::Artifact(format!("cannot read {}: {err}", artifact.display()))
        })?;
        M::deserialize(&bytes)?;
        write_atomic(&self.path, &bytes)
    }
}

/// Result of comparing current and baseline accuracy on the same test rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    /// Accuracy of the freshly trained model.
    pub current_accuracy: f64,
    /// Accuracy of the baseline model.
    pub baseline_accuracy: f64,
    /// Retained fraction, always [`REGRESSION_TOLERANCE`].
    pub tolerance: f64,
    /// Lowest passing accuracy: `baseline_accuracy * tolerance`.
    pub floor: f64,
}

impl BaselineComparison {
    /// Comparison figures for a pair of accuracies, whatever the verdict.
    #[must_use]
    pub fn of(current: f64, baseline: f64) -> Self {
        Self {
            current_accuracy: current,
            baseline_accuracy: baseline,
            tolerance: REGRESSION_TOLERANCE,
            floor: baseline * REGRESSION_TOLERANCE,
        }
    }
}

/// Accuracy regression rule: fails iff `current < baseline * 0.95`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegressionGate;

impl RegressionGate {
    /// Compares accuracies.
    pub fn compare(current: f64, baseline: f64) -> GateResult<BaselineComparison> {
        let comparison = BaselineComparison::of(current, baseline);
        if current < comparison.floor {
            return Err(GateError::Regression { current, baseline });
        }
        Ok(comparison)
    }
}

/// Verdict of the baseline stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineVerdict {
    /// No baseline existed; the current model was saved as the baseline.
    Established,
    /// Current accuracy is within tolerance of the baseline.
    Passed(BaselineComparison),
    /// Current accuracy fell below the floor. The baseline is left untouched.
    Regressed(BaselineComparison),
}

impl BaselineVerdict {
    /// Comparison figures, absent when the baseline was just established.
    #[must_use]
    pub const fn comparison(&self) -> Option<BaselineComparison> {
        match self {
            Self::Established => None,
            Self::Passed(comparison) | Self::Regressed(comparison) => Some(*comparison),
        }
    }
}

/// Runs the baseline stage for `current`, scored on the same `test` rows as the baseline.
///
/// An absent baseline is established from `current`; a present one is only read.
pub fn evaluate_against_baseline<M: Model>(
    store: &BaselineStore,
    current: &M,
    current_accuracy: f64,
    test: &Dataset,
) -> GateResult<BaselineVerdict> {
    let Some(baseline) = store.load::<M>()? else {
        store.save(current)?;
        return Ok(BaselineVerdict::Established);
    };
    let baseline_accuracy = MetricReport::measure(&baseline, test)?.accuracy;
    match RegressionGate::compare(current_accuracy, baseline_accuracy) {
        Ok(comparison) => Ok(BaselineVerdict::Passed(comparison)),
        Err(GateError::Regression { current, baseline }) => Ok(BaselineVerdict::Regressed(
            BaselineComparison::of(current, baseline),
        )),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::{synthetic_dataset, FixedModel};
    use tempfile::tempdir;

    fn store(dir: &Path) -> BaselineStore {
        BaselineStore::new(&BaselineConfig {
            path: dir.join("models/baseline.json"),
            tolerance: REGRESSION_TOLERANCE,
        })
    }

    #[test]
    fn five_percent_tolerance_boundary() {
        let ok = RegressionGate::compare(0.76, 0.80).unwrap();
        assert!((ok.floor - 0.76).abs() < 1e-12);
        assert!(RegressionGate::compare(0.90, 0.80).is_ok());
        let err = RegressionGate::compare(0.759, 0.80).unwrap_err();
        assert!(matches!(err, GateError::Regression { current, baseline }
            if (current - 0.759).abs() < f64::EPSILON && (baseline - 0.8).abs() < f64::EPSILON));
    }

    #[test]
    fn absent_baseline_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(!store.exists());
        assert!(store.load::<FixedModel>().unwrap().is_none());
    }

    #[test]
    fn save_then_load_and_promote() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.save(&FixedModel::Oracle).unwrap();
        assert_eq!(store.load::<FixedModel>().unwrap(), Some(FixedModel::Oracle));

        let candidate = dir.path().join("candidate.json");
        crate::artifact::save_model(&candidate, &FixedModel::Constant(1)).unwrap();
        store.promote_from::<FixedModel>(&candidate).unwrap();
        assert_eq!(
            store.load::<FixedModel>().unwrap(),
            Some(FixedModel::Constant(1))
        );
    }

    #[test]
    fn corrupt_artifact_is_not_promoted() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.save(&FixedModel::Oracle).unwrap();
        let junk = dir.path().join("junk.json");
        fs::write(&junk, b"not a model").unwrap();
        assert!(store.promote_from::<FixedModel>(&junk).is_err());
        assert_eq!(store.load::<FixedModel>().unwrap(), Some(FixedModel::Oracle));
    }

    #[test]
    fn first_evaluation_establishes_then_compares() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let test = synthetic_dataset(80, 5);
        let verdict = evaluate_against_baseline(&store, &FixedModel::Oracle, 1.0, &test).unwrap();
        assert_eq!(verdict, BaselineVerdict::Established);
        assert!(store.exists());
        assert_eq!(fs::read_dir(store.path().parent().unwrap()).unwrap().count(), 1);

        let verdict = evaluate_against_baseline(&store, &FixedModel::Oracle, 1.0, &test).unwrap();
        let comparison = verdict.comparison().unwrap();
        assert!(matches!(verdict, BaselineVerdict::Passed(_)));
        assert!((comparison.baseline_accuracy - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn regression_keeps_the_old_baseline() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.save(&FixedModel::Oracle).unwrap();
        let before = fs::read(store.path()).unwrap();

        let test = synthetic_dataset(80, 5);
        let weak = FixedModel::Constant(0);
        let accuracy = MetricReport::measure(&weak, &test).unwrap().accuracy;
        assert!(accuracy < 0.95);
        let verdict = evaluate_against_baseline(&store, &weak, accuracy, &test).unwrap();
        match verdict {
            BaselineVerdict::Regressed(comparison) => {
                assert!((comparison.floor - 0.95).abs() < 1e-12);
                assert!(comparison.current_accuracy < comparison.floor);
            }
            other => panic!("expected regression, got {other:?}"),
        }
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }
}
