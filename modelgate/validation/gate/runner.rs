use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use gate_logging::LogLevel;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{
    baseline::{evaluate_against_baseline, BaselineComparison, BaselineStore, BaselineVerdict},
    checks::{CheckName, CheckOutcome},
    thresholds::{ThresholdBreach, ThresholdGate},
};
use crate::{
    artifact::{load_model, save_model},
    config::HarnessConfig,
    dataset::{
        provider::{DatasetProvider, LoadOrigin, RemoteSource},
        split::Split,
        table::Dataset,
    },
    error::{GateError, GateResult},
    forest::ForestParams,
    metrics::{Metric, MetricReport},
    model::{train_with, ForestPipeline, Model},
    preprocess::build_preprocessor,
    telemetry::{self, ValidationTelemetry},
};

/// States visited by a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Run created.
    Start,
    /// Dataset loaded from cache or remote.
    DatasetReady,
    /// Train/test partition built.
    Split,
    /// Pipeline fitted and saved.
    ModelTrained,
    /// Metrics measured on the test rows.
    MetricsComputed,
    /// Thresholds applied.
    ThresholdGate,
    /// Baseline consulted.
    BaselineGate,
    /// Terminal: a threshold was missed.
    Failed,
    /// Terminal: first baseline written.
    Established,
    /// Terminal: within tolerance of the baseline.
    Passed,
    /// Terminal: accuracy regressed against the baseline.
    Regressed,
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// At least one metric missed its threshold.
    Failed,
    /// Thresholds met and no baseline existed; the model became the baseline.
    Established,
    /// Thresholds met and accuracy held against the baseline.
    Passed,
    /// Thresholds met but accuracy fell below `baseline * 0.95`.
    Regressed,
}

impl Outcome {
    /// Upper-case name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "FAILED",
            Self::Established => "ESTABLISHED",
            Self::Passed => "PASSED",
            Self::Regressed => "REGRESSED",
        }
    }

    /// True for outcomes that should fail a pipeline.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Regressed)
    }

    /// Terminal state recorded in the trace.
    #[must_use]
    pub const fn state(self) -> RunState {
        match self {
            Self::Failed => RunState::Failed,
            Self::Established => RunState::Established,
            Self::Passed => RunState::Passed,
            Self::Regressed => RunState::Regressed,
        }
    }

    fn event_type(self) -> &'static str {
        match self {
            Self::Failed => "validation.failed",
            Self::Established => "validation.established",
            Self::Passed => "validation.passed",
            Self::Regressed => "validation.regressed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Unique run id.
    pub run_id: Uuid,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub finished_at: DateTime<Utc>,
    /// Terminal outcome.
    pub outcome: Outcome,
    /// Metrics of the current model on the test rows.
    pub metrics: MetricReport,
    /// Missed thresholds; empty unless the outcome is `Failed`.
    pub breaches: Vec<ThresholdBreach>,
    /// Baseline comparison, when one took place.
    pub comparison: Option<BaselineComparison>,
    /// Visited states.
    pub trace: Vec<RunState>,
    /// Whether the dataset came from the cache or the remote.
    pub dataset_origin: LoadOrigin,
    /// Where the current model was saved.
    pub model_path: PathBuf,
}

/// Output of the shared preparation stages.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Dataset origin.
    pub dataset_origin: LoadOrigin,
    /// Partition used for training and scoring.
    pub split: Split,
    /// Trained pipeline (already saved to the model path).
    pub model: ForestPipeline,
    /// Metrics of `model` on `split.test`.
    pub metrics: MetricReport,
}

/// Orchestrates dataset loading, training, gating and baseline handling.
#[derive(Debug)]
pub struct ValidationHarness {
    config: HarnessConfig,
    provider: DatasetProvider,
    telemetry: Option<ValidationTelemetry>,
}

impl ValidationHarness {
    /// Harness using the configured HTTP fallback.
    pub fn new(config: HarnessConfig) -> GateResult<Self> {
        config.validate()?;
        let provider = DatasetProvider::from_config(config.dataset.clone())?;
        Ok(Self {
            config,
            provider,
            telemetry: None,
        })
    }

    /// Harness with an explicit fallback source.
    pub fn with_source(
        config: HarnessConfig,
        source: Option<Box<dyn RemoteSource>>,
    ) -> GateResult<Self> {
        config.validate()?;
        let provider = DatasetProvider::with_source(config.dataset.clone(), source);
        Ok(Self {
            config,
            provider,
            telemetry: None,
        })
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ValidationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Baseline store for the configured path.
    #[must_use]
    pub fn baseline_store(&self) -> BaselineStore {
        BaselineStore::new(&self.config.baseline)
    }

    /// Loads the dataset, fetching and caching it when absent.
    pub fn fetch(&self) -> GateResult<(Dataset, LoadOrigin)> {
        self.provider.load_with_origin(self.telemetry.as_ref())
    }

    /// Runs the stages shared by every check: load, split, train, save, measure.
    pub fn prepare(&self) -> GateResult<RunContext> {
        self.prepare_traced(&mut Vec::new())
    }

    fn prepare_traced(&self, trace: &mut Vec<RunState>) -> GateResult<RunContext> {
        let tel = self.telemetry.as_ref();
        let train = &self.config.train;
        trace.push(RunState::Start);

        let (dataset, dataset_origin) = self.fetch()?;
        trace.push(RunState::DatasetReady);

        let split = Split::new(&dataset, train.test_ratio, train.seed)?;
        telemetry::log(
            tel,
            LogLevel::Info,
            "split.ready",
            json!({ "train": split.train.len(), "test": split.test.len(), "seed": train.seed }),
        );
        trace.push(RunState::Split);

        let model = train_with(&split, &build_preprocessor(), self.forest_params(), tel)?;
        save_model(&self.config.model.path, &model)?;
        telemetry::log(
            tel,
            LogLevel::Info,
            "model.saved",
            json!({ "path": self.config.model.path }),
        );
        trace.push(RunState::ModelTrained);

        let metrics = MetricReport::measure(&model, &split.test)?;
        telemetry::log(tel, LogLevel::Info, "metrics.computed", json!(metrics.to_map()));
        trace.push(RunState::MetricsComputed);

        Ok(RunContext {
            dataset_origin,
            split,
            model,
            metrics,
        })
    }

    /// Executes a full run and reports its terminal outcome.
    ///
    /// Quality outcomes (`Failed`, `Regressed`) are reported, not returned as errors.
    /// Data unavailability and I/O failures are errors.
    pub fn run(&self) -> GateResult<ValidationReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let tel = self.telemetry.as_ref();
        telemetry::log(tel, LogLevel::Info, "run.start", json!({ "run_id": run_id }));

        let mut trace = Vec::new();
        let ctx = match self.prepare_traced(&mut trace) {
            Ok(ctx) => ctx,
            Err(err) => {
                telemetry::log(
                    tel,
                    LogLevel::Error,
                    "run.error",
                    json!({ "run_id": run_id, "error": err.to_string() }),
                );
                return Err(err);
            }
        };

        let breaches = ThresholdGate::new(self.config.train.thresholds).evaluate(&ctx.metrics);
        trace.push(RunState::ThresholdGate);
        let (outcome, comparison) = if breaches.is_empty() {
            trace.push(RunState::BaselineGate);
            let verdict = evaluate_against_baseline(
                &self.baseline_store(),
                &ctx.model,
                ctx.metrics.accuracy,
                &ctx.split.test,
            )?;
            let outcome = match verdict {
                BaselineVerdict::Established => Outcome::Established,
                BaselineVerdict::Passed(_) => Outcome::Passed,
                BaselineVerdict::Regressed(_) => Outcome::Regressed,
            };
            (outcome, verdict.comparison())
        } else {
            for breach in &breaches {
                telemetry::log(
                    tel,
                    LogLevel::Warn,
                    "threshold.breach",
                    json!(breach),
                );
            }
            (Outcome::Failed, None)
        };
        trace.push(outcome.state());

        let report = ValidationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcome,
            metrics: ctx.metrics,
            breaches,
            comparison,
            trace,
            dataset_origin: ctx.dataset_origin,
            model_path: self.config.model.path.clone(),
        };
        let level = if outcome.is_failure() {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        let summary = json!({
            "run_id": run_id,
            "outcome": outcome,
            "metrics": report.metrics.to_map(),
            "comparison": report.comparison,
        });
        telemetry::log(tel, level, "run.complete", summary.clone());
        telemetry::event(tel, outcome.event_type(), summary);
        Ok(report)
    }

    /// Runs one check. Quality failures come back as [`CheckStatus::Failed`](super::checks::CheckStatus::Failed).
    pub fn check(&self, name: CheckName) -> GateResult<CheckOutcome> {
        self.check_in(name, &mut None)
    }

    /// Runs every check in [`CheckName::ALL`] order, training once for the checks that need a model.
    pub fn check_all(&self) -> GateResult<Vec<CheckOutcome>> {
        let mut ctx = None;
        CheckName::ALL
            .into_iter()
            .map(|name| self.check_in(name, &mut ctx))
            .collect()
    }

    fn check_in(&self, name: CheckName, ctx: &mut Option<RunContext>) -> GateResult<CheckOutcome> {
        let outcome = if name.uses_run_context() {
            if ctx.is_none() {
                *ctx = Some(self.prepare()?);
            }
            let Some(ctx) = ctx.as_ref() else {
                return Err(GateError::Training("run context unavailable".into()));
            };
            self.check_trained(name, ctx)?
        } else {
            match name {
                CheckName::DatasetExists => self.check_dataset(),
                CheckName::ModelExists => self.check_model_artifact()?,
                _ => self.check_reproducibility()?,
            }
        };
        telemetry::log(
            self.telemetry.as_ref(),
            if outcome.is_failure() {
                LogLevel::Warn
            } else {
                LogLevel::Info
            },
            "check.complete",
            json!(outcome),
        );
        Ok(outcome)
    }

    fn check_dataset(&self) -> CheckOutcome {
        let name = CheckName::DatasetExists;
        match self.fetch() {
            Ok((dataset, origin)) => CheckOutcome::passed(
                name,
                format!(
                    "{} rows loaded from {} ({:?})",
                    dataset.len(),
                    self.config.dataset.path.display(),
                    origin
                ),
            ),
            Err(err) => CheckOutcome::failed(name, err.to_string()),
        }
    }

    fn check_model_artifact(&self) -> GateResult<CheckOutcome> {
        let name = CheckName::ModelExists;
        let path = &self.config.model.path;
        Ok(match load_model::<ForestPipeline>(path) {
            Ok(Some(_)) => CheckOutcome::passed(name, format!("model artifact at {}", path.display())),
            Ok(None) => CheckOutcome::skipped(
                name,
                format!("no model artifact at {}", path.display()),
            ),
            Err(GateError::Io(err)) => return Err(GateError::Io(err)),
            Err(err) => CheckOutcome::failed(name, err.to_string()),
        })
    }

    fn check_reproducibility(&self) -> GateResult<CheckOutcome> {
        let name = CheckName::Reproducibility;
        let train = &self.config.train;
        let (dataset, _) = self.fetch()?;
        let split = Split::new(&dataset, train.test_ratio, train.seed)?;
        let tel = self.telemetry.as_ref();
        let first = train_with(&split, &build_preprocessor(), self.forest_params(), tel)?;
        let second = train_with(&split, &build_preprocessor(), self.forest_params(), tel)?;
        let a = first.predict(&split.test.records)?;
        let b = second.predict(&split.test.records)?;
        let differing = a.iter().zip(&b).filter(|(x, y)| x != y).count();
        Ok(if differing == 0 && a.len() == b.len() {
            CheckOutcome::passed(name, format!("{} predictions identical", a.len()))
        } else {
            CheckOutcome::failed(
                name,
                format!("{differing} of {} predictions differ between identical pipelines", a.len()),
            )
        })
    }

    fn check_trained(&self, name: CheckName, ctx: &RunContext) -> GateResult<CheckOutcome> {
        let gate = ThresholdGate::new(self.config.train.thresholds);
        let metrics: &[Metric] = match name {
            CheckName::Accuracy => &[Metric::Accuracy],
            CheckName::InferenceLatency => &[Metric::InferenceLatency],
            CheckName::F1 => &[Metric::F1],
            CheckName::PrecisionRecall => &[Metric::Precision, Metric::Recall],
            CheckName::BaselineComparison => return self.check_baseline(ctx),
            CheckName::DatasetExists | CheckName::ModelExists | CheckName::Reproducibility => {
                return Err(GateError::Config(format!("{name} does not use a trained model")));
            }
        };
        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for metric in metrics {
            match gate.check(*metric, &ctx.metrics) {
                Ok(()) => passed.push(describe_pass(&gate, *metric, &ctx.metrics)),
                Err(err) if err.is_quality_failure() => failed.push(err.to_string()),
                Err(err) => return Err(err),
            }
        }
        Ok(if failed.is_empty() {
            CheckOutcome::passed(name, passed.join("; "))
        } else {
            CheckOutcome::failed(name, failed.join("; "))
        })
    }

    fn check_baseline(&self, ctx: &RunContext) -> GateResult<CheckOutcome> {
        let name = CheckName::BaselineComparison;
        let store = self.baseline_store();
        let verdict =
            evaluate_against_baseline(&store, &ctx.model, ctx.metrics.accuracy, &ctx.split.test)?;
        Ok(match verdict {
            BaselineVerdict::Established => CheckOutcome::established(
                name,
                format!(
                    "no baseline found; saved current model ({:.4} accuracy) to {}",
                    ctx.metrics.accuracy,
                    store.path().display()
                ),
            ),
            BaselineVerdict::Passed(c) => CheckOutcome::passed(
                name,
                format!(
                    "current accuracy {:.4} >= baseline {:.4} x {} = {:.4}",
                    c.current_accuracy, c.baseline_accuracy, c.tolerance, c.floor
                ),
            ),
            BaselineVerdict::Regressed(c) => CheckOutcome::failed(
                name,
                GateError::Regression {
                    current: c.current_accuracy,
                    baseline: c.baseline_accuracy,
                }
                .to_string(),
            ),
        })
    }

    /// Copies the saved current model into the baseline slot.
    pub fn promote(&self) -> GateResult<PathBuf> {
        let store = self.baseline_store();
        store.promote_from::<ForestPipeline>(&self.config.model.path)?;
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "baseline.promoted",
            json!({ "from": self.config.model.path, "to": store.path() }),
        );
        Ok(store.path().to_path_buf())
    }

    const fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.config.train.n_estimators,
            seed: self.config.train.seed,
        }
    }
}

fn describe_pass(gate: &ThresholdGate, metric: Metric, report: &MetricReport) -> String {
    let op = if metric.is_upper_bound() { "<" } else { ">=" };
    format!(
        "{metric} {:.4} {op} {:.4}",
        report.value(metric),
        gate.threshold(metric)
    )
}
