use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// Accuracy fraction of the baseline that a new model must retain. Not configurable.
pub const REGRESSION_TOLERANCE: f64 = 0.95;

/// Default public copy of the Titanic passenger list (891 rows, Kaggle column names).
pub const DEFAULT_DATASET_URL: &str =
    "https://raw.githubusercontent.com/datasciencedojo/datasets/master/titanic.csv";

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Dataset cache and remote fallback.
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Split, forest and threshold settings.
    #[serde(default)]
    pub train: TrainConfig,
    /// Baseline artifact location.
    #[serde(default)]
    pub baseline: BaselineConfig,
    /// Current model artifact location.
    #[serde(default)]
    pub model: ModelConfig,
}

impl HarnessConfig {
    /// Loads configuration from a TOML file, resolving relative paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let config = config.rooted_at(&base);
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with every path placed under `dir`.
    #[must_use]
    pub fn rooted(dir: impl AsRef<Path>) -> Self {
        Self::default().rooted_at(dir.as_ref())
    }

    fn rooted_at(mut self, base: &Path) -> Self {
        for path in [
            &mut self.dataset.path,
            &mut self.baseline.path,
            &mut self.model.path,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// Checks value ranges. The regression tolerance is not configurable.
    pub fn validate(&self) -> GateResult<()> {
        let train = &self.train;
        if !(train.test_ratio > 0.0 && train.test_ratio < 1.0) {
            return Err(GateError::Config(format!(
                "test_ratio must be in (0, 1), got {}",
                train.test_ratio
            )));
        }
        if train.n_estimators == 0 {
            return Err(GateError::Config("n_estimators must be at least 1".into()));
        }
        let t = &train.thresholds;
        for (name, value) in [
            ("accuracy", t.accuracy),
            ("f1", t.f1),
            ("precision", t.precision),
            ("recall", t.recall),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GateError::Config(format!(
                    "{name} threshold must be in [0, 1], got {value}"
                )));
            }
        }
        if !(t.max_latency_secs.is_finite() && t.max_latency_secs > 0.0) {
            return Err(GateError::Config(format!(
                "max_latency_secs must be positive, got {}",
                t.max_latency_secs
            )));
        }
        if (self.baseline.tolerance - REGRESSION_TOLERANCE).abs() > f64::EPSILON {
            return Err(GateError::Config(format!(
                "baseline tolerance is fixed at {REGRESSION_TOLERANCE}, got {}",
                self.baseline.tolerance
            )));
        }
        if let Some(remote) = &self.dataset.remote {
            if remote.url.trim().is_empty() {
                return Err(GateError::Config("dataset.remote.url is empty".into()));
            }
        }
        Ok(())
    }
}

/// Where the dataset lives and how to obtain it when the cache is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// CSV cache path.
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,
    /// Remote fallback; `None` makes a missing cache fatal.
    #[serde(default = "default_remote")]
    pub remote: Option<RemoteConfig>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            remote: default_remote(),
        }
    }
}

/// HTTP location of the canonical dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// CSV download URL.
    pub url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Split, forest and gate parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Seed for the split and the forest.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Fraction of rows held out for testing.
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    /// Number of trees.
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Quality gate thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            test_ratio: default_test_ratio(),
            n_estimators: default_n_estimators(),
            thresholds: Thresholds::default(),
        }
    }
}

/// Hard pass/fail thresholds. Quality metrics pass when `>=`; latency passes when `<`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum accuracy.
    pub accuracy: f64,
    /// Minimum F1 score.
    pub f1: f64,
    /// Minimum precision.
    pub precision: f64,
    /// Minimum recall.
    pub recall: f64,
    /// Exclusive upper bound on one batched predict call, in seconds.
    pub max_latency_secs: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            accuracy: 0.75,
            f1: 0.70,
            precision: 0.70,
            recall: 0.60,
            max_latency_secs: 1.0,
        }
    }
}

/// Baseline artifact settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Baseline artifact path.
    #[serde(default = "default_baseline_path")]
    pub path: PathBuf,
    /// Always [`REGRESSION_TOLERANCE`]; present so reports can echo it.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            path: default_baseline_path(),
            tolerance: REGRESSION_TOLERANCE,
        }
    }
}

/// Current model artifact settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path the freshly trained model is written to.
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/Titanic.csv")
}

#[allow(clippy::unnecessary_wraps)]
fn default_remote() -> Option<RemoteConfig> {
    Some(RemoteConfig {
        url: DEFAULT_DATASET_URL.into(),
        timeout_ms: default_timeout_ms(),
    })
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_seed() -> u64 {
    42
}

const fn default_test_ratio() -> f64 {
    0.2
}

const fn default_n_estimators() -> usize {
    100
}

const fn default_tolerance() -> f64 {
    REGRESSION_TOLERANCE
}

fn default_baseline_path() -> PathBuf {
    PathBuf::from("models/titanic_model_baseline.json")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/titanic_model.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_settings() {
        let config = HarnessConfig::default();
        assert_eq!(config.train.seed, 42);
        assert!((config.train.test_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.train.n_estimators, 100);
        assert!((config.train.thresholds.recall - 0.60).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_toml_and_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        fs::write(
            &path,
            r#"
[dataset]
path = "cache/titanic.csv"

[dataset.remote]
url = "https://example.invalid/titanic.csv"

[train]
seed = 7

[train.thresholds]
accuracy = 0.8
"#,
        )
        .unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.dataset.path, dir.path().join("cache/titanic.csv"));
        assert_eq!(
            config.baseline.path,
            dir.path().join("models/titanic_model_baseline.json")
        );
        assert_eq!(config.train.seed, 7);
        assert!((config.train.thresholds.accuracy - 0.8).abs() < f64::EPSILON);
        assert!((config.train.thresholds.f1 - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.dataset.remote.unwrap().timeout_ms, 30_000);
    }

    #[test]
    fn rejects_custom_tolerance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        fs::write(&path, "[baseline]\ntolerance = 0.9\n").unwrap();
        let err = HarnessConfig::load(&path).unwrap_err();
        assert!(matches!(err, GateError::Config(msg) if msg.contains("fixed")));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = HarnessConfig::default();
        config.train.test_ratio = 1.0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.train.thresholds.max_latency_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.train.thresholds.precision = 1.5;
        assert!(config.validate().is_err());
    }
}
