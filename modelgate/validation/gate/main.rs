//! Quality gates and the run state machine.
//!
//! A run moves through `Start -> DatasetReady -> Split -> ModelTrained ->
//! MetricsComputed -> ThresholdGate` and ends in `Failed`, or continues through
//! `BaselineGate` to one of `Established`, `Passed` or `Regressed`.

/// Metric thresholds.
pub mod thresholds;
/// Baseline persistence and the regression comparison.
pub mod baseline;
/// Independently invocable checks.
pub mod checks;
/// Full validation runs.
pub mod runner;
