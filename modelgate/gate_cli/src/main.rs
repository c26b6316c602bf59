use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use gate_events::FileEventPublisher;
use gate_logging::{read_records, LogLevel};
use modelgate_validation::{
    CheckName, CheckOutcome, HarnessConfig, Outcome, ValidationHarness, ValidationReport,
    ValidationTelemetry,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "gate", version, about = "Titanic model validation gate")]
struct Cli {
    /// Harness configuration (TOML). Defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JSON-lines log file.
    #[arg(long, global = true, default_value = "logs/validation.log.jsonl")]
    log: PathBuf,
    /// Minimum level written to the log.
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,
    /// Optional JSON-lines event log for run outcomes.
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,
    /// Run history manifest.
    #[arg(long, global = true, default_value = "logs/runs.jsonl")]
    history: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the full validation state machine.
    Run,
    /// Runs a single check.
    Check {
        /// Check name, e.g. `accuracy` or `baseline-comparison`.
        name: CheckName,
    },
    /// Lists check names, or runs all of them with `--run`.
    Checks {
        #[arg(long)]
        run: bool,
    },
    /// Materialises the dataset cache.
    Fetch,
    /// Promotes the saved current model to baseline.
    Promote,
    /// Prints the most recent log records.
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Lists recent runs.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Shows one run from the history.
    Status { run_id: Uuid },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct RunManifestEntry {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    outcome: Outcome,
    accuracy: f64,
    config: Option<PathBuf>,
}

impl RunManifestEntry {
    fn new(report: &ValidationReport, config: Option<PathBuf>) -> Self {
        Self {
            run_id: report.run_id,
            started_at: report.started_at,
            finished_at: report.finished_at,
            outcome: report.outcome,
            accuracy: report.metrics.accuracy,
            config,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = dispatch(cli);
    if let Err(err) = &result {
        eprintln!("{}", json!({ "error": format!("{err:#}") }));
    }
    ExitCode::from(exit_status(&result))
}

/// 0 for passed/established/skipped, 1 for failed/regressed, 2 for infrastructure errors.
fn exit_status(result: &Result<bool>) -> u8 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(_) => 2,
    }
}

/// Returns `Ok(false)` for quality failures so they map to exit code 1.
fn dispatch(cli: Cli) -> Result<bool> {
    match &cli.command {
        Commands::Checks { run: false } => {
            for check in CheckName::ALL {
                println!("{check}");
            }
            Ok(true)
        }
        Commands::Log { limit } => {
            let records = read_records(&cli.log)
                .with_context(|| format!("reading log {}", cli.log.display()))?;
            let skip = records.len().saturating_sub(*limit);
            for record in records.into_iter().skip(skip) {
                println!("{}", serde_json::to_string(&record)?);
            }
            Ok(true)
        }
        Commands::History { limit } => {
            let entries = read_history(&cli.history)?;
            for entry in entries.into_iter().rev().take(*limit) {
                println!(
                    "{} | {} | {:.4} | {}",
                    entry.run_id, entry.outcome, entry.accuracy, entry.finished_at
                );
            }
            Ok(true)
        }
        Commands::Status { run_id } => {
            let entries = read_history(&cli.history)?;
            if let Some(entry) = entries.into_iter().find(|e| e.run_id == *run_id) {
                println!("{}", serde_json::to_string_pretty(&entry)?);
                Ok(true)
            } else {
                anyhow::bail!("run {run_id} not found in {}", cli.history.display())
            }
        }
        Commands::Run => {
            let harness = build_harness(&cli)?;
            let report = harness.run()?;
            append_history(&cli.history, &RunManifestEntry::new(&report, cli.config.clone()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(!report.outcome.is_failure())
        }
        Commands::Check { name } => {
            let harness = build_harness(&cli)?;
            let outcome = harness.check(*name)?;
            print_outcomes(std::slice::from_ref(&outcome))
        }
        Commands::Checks { run: true } => {
            let harness = build_harness(&cli)?;
            let outcomes = harness.check_all()?;
            print_outcomes(&outcomes)
        }
        Commands::Fetch => {
            let harness = build_harness(&cli)?;
            let (dataset, origin) = harness.fetch()?;
            println!(
                "{}",
                json!({
                    "path": harness.config().dataset.path,
                    "rows": dataset.len(),
                    "positive_rate": dataset.positive_rate(),
                    "origin": origin,
                })
            );
            Ok(true)
        }
        Commands::Promote => {
            let harness = build_harness(&cli)?;
            let path = harness.promote()?;
            println!("{}", json!({ "baseline": path }));
            Ok(true)
        }
    }
}

fn build_harness(cli: &Cli) -> Result<ValidationHarness> {
    let config = match &cli.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    let mut telemetry = ValidationTelemetry::builder("gate")
        .log_path(&cli.log)
        .min_level(cli.log_level);
    if let Some(path) = &cli.event_log {
        let publisher = FileEventPublisher::new(path)
            .with_context(|| format!("opening event log {}", path.display()))?;
        telemetry = telemetry.event_publisher(Arc::new(publisher));
    }
    Ok(ValidationHarness::new(config)?.with_telemetry(telemetry.build()?))
}

fn print_outcomes(outcomes: &[CheckOutcome]) -> Result<bool> {
    for outcome in outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }
    Ok(!outcomes.iter().any(CheckOutcome::is_failure))
}

fn append_history(path: &Path, entry: &RunManifestEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening run history {}", path.display()))?;
    serde_json::to_writer(&mut file, entry)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn read_history(path: &Path) -> Result<Vec<RunManifestEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "gate",
            "check",
            "precision-recall",
            "--log-level",
            "warn",
            "--history",
            "h.jsonl",
        ]);
        assert!(matches!(
            cli.command,
            Commands::Check {
                name: CheckName::PrecisionRecall
            }
        ));
        assert_eq!(cli.log_level, LogLevel::Warn);
        assert_eq!(cli.history, PathBuf::from("h.jsonl"));
    }

    #[test]
    fn rejects_unknown_check() {
        assert!(Cli::try_parse_from(["gate", "check", "roc-auc"]).is_err());
    }

    /// Kaggle-format rows. Informative rows survive iff female; otherwise every row
    /// carries identical features and labels alternate.
    fn titanic_csv(rows: usize, informative: bool) -> String {
        let mut csv = String::from(
            "PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked\n",
        );
        for i in 0..rows {
            let survived = u8::from(i % 2 == 0);
            let (pclass, sex, age, fare) = if informative {
                let sex = if i % 2 == 0 { "female" } else { "male" };
                (1 + i % 3, sex, 20 + i % 40, 10 + i % 50)
            } else {
                (3, "male", 30, 8)
            };
            csv.push_str(&format!(
                "{},{survived},{pclass},P{i},{sex},{age},0,0,T{i},{fare},,S\n",
                i + 1
            ));
        }
        csv
    }

    /// Writes a config under `dir` with the given cached dataset and returns the CLI flags.
    fn workspace(dir: &Path, cached: Option<String>) -> Vec<String> {
        let config = dir.join("gate.toml");
        std::fs::write(
            &config,
            "[dataset]\npath = \"data/titanic.csv\"\n\n\
             [dataset.remote]\nurl = \"http://127.0.0.1:9/titanic.csv\"\ntimeout_ms = 500\n\n\
             [train]\nn_estimators = 25\n",
        )
        .unwrap();
        if let Some(csv) = cached {
            std::fs::create_dir_all(dir.join("data")).unwrap();
            std::fs::write(dir.join("data/titanic.csv"), csv).unwrap();
        }
        vec![
            "--config".into(),
            config.display().to_string(),
            "--log".into(),
            dir.join("logs/validation.log.jsonl").display().to_string(),
            "--history".into(),
            dir.join("logs/runs.jsonl").display().to_string(),
        ]
    }

    fn run_with(flags: &[String]) -> Result<bool> {
        let mut args = vec!["gate".to_string(), "run".to_string()];
        args.extend_from_slice(flags);
        dispatch(Cli::parse_from(args))
    }

    #[test]
    fn exit_status_follows_outcome() {
        for outcome in [Outcome::Passed, Outcome::Established] {
            assert_eq!(exit_status(&Ok(!outcome.is_failure())), 0);
        }
        for outcome in [Outcome::Failed, Outcome::Regressed] {
            assert_eq!(exit_status(&Ok(!outcome.is_failure())), 1);
        }
        assert_eq!(exit_status(&Err(anyhow::anyhow!("dataset unavailable"))), 2);

        let skipped = CheckOutcome::skipped(CheckName::ModelExists, "no model artifact");
        let established = CheckOutcome::established(CheckName::BaselineComparison, "saved");
        assert_eq!(exit_status(&print_outcomes(&[skipped.clone(), established])), 0);
        let failed = CheckOutcome::failed(CheckName::Accuracy, "accuracy 0.5 below 0.75");
        assert_eq!(exit_status(&print_outcomes(&[skipped, failed])), 1);
    }

    #[test]
    fn learnable_run_establishes_and_is_recorded() {
        let dir = tempdir().unwrap();
        let flags = workspace(dir.path(), Some(titanic_csv(200, true)));
        let result = run_with(&flags);
        assert_eq!(exit_status(&result), 0, "{result:?}");
        let history = read_history(&dir.path().join("logs/runs.jsonl")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, Outcome::Established);
    }

    #[test]
    fn uninformative_run_fails_with_quality_status() {
        let dir = tempdir().unwrap();
        let csv = titanic_csv(200, false);
        let flags = workspace(dir.path(), Some(csv));
        let result = run_with(&flags);
        assert_eq!(exit_status(&result), 1, "{result:?}");
        let history = read_history(&dir.path().join("logs/runs.jsonl")).unwrap();
        assert_eq!(history[0].outcome, Outcome::Failed);
    }

    #[test]
    fn unreachable_dataset_is_an_infrastructure_error() {
        let dir = tempdir().unwrap();
        let flags = workspace(dir.path(), None);
        let result = run_with(&flags);
        assert_eq!(exit_status(&result), 2);
        assert!(read_history(&dir.path().join("logs/runs.jsonl"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn history_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/runs.jsonl");
        assert!(read_history(&path).unwrap().is_empty());
        let entry = RunManifestEntry {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcome: Outcome::Established,
            accuracy: 0.81,
            config: None,
        };
        append_history(&path, &entry).unwrap();
        append_history(&path, &entry).unwrap();
        let entries = read_history(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].run_id, entry.run_id);
        assert_eq!(entries[1].outcome, Outcome::Established);
    }
}
