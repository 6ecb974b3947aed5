//! Simulation runner binary for the workforce simulation.
//!
//! Wires configuration, logging, the baseline census, the file checkpoint
//! store, the orchestrator and the optional `PostgreSQL` sink, then runs
//! the configured years.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$WORKFORCE_CONFIG` or `workforce-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Load the census, or synthesize one from the seed
//! 4. Build the orchestrator over the file checkpoint store
//! 5. Resume from stored checkpoints
//! 6. Connect the `PostgreSQL` sink when enabled and backfill resumed years
//! 7. Run years until done, failed or interrupted (Ctrl-C stops at the next
//!    year boundary)
//! 8. Log the result

mod error;
mod sink;

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use workforce_core::baseline;
use workforce_core::checkpoint::FileCheckpointStore;
use workforce_core::config::{LoggingConfig, SimulationConfig};
use workforce_core::control::RunControl;
use workforce_core::orchestrator::{Orchestrator, RunEndReason, YearResult};
use workforce_types::{Employee, EventKind};

use crate::error::EngineError;
use crate::sink::PostgresSink;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "workforce-config.yaml";

/// Environment variable overriding the configuration path.
const CONFIG_PATH_ENV: &str = "WORKFORCE_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (mut config, loaded_from) = load_config(&config_path)?;
    config.infrastructure.apply_env_overrides();

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        path = %loaded_from.as_deref().unwrap_or_else(|| Path::new("<defaults>")).display(),
        scenario = %config.simulation.name,
        start_year = config.simulation.start_year,
        end_year = config.simulation.end_year,
        seed = config.simulation.seed,
        "Configuration loaded"
    );

    // 3. Baseline census.
    let census = load_baseline(&config)?;

    // 4. Orchestrator over the file checkpoint store.
    let store = FileCheckpointStore::open(&config.checkpoint.directory)?;
    info!(directory = %store.directory().display(), "Checkpoint store opened");
    let control = RunControl::new();
    let infrastructure = config.infrastructure.clone();
    let mut orchestrator = Orchestrator::new(config, &census, Box::new(store), control.clone())?;

    // 5. Resume.
    match orchestrator.resume()? {
        Some(year) => info!(year, "Resumed from checkpoints"),
        None => info!("No usable checkpoints, starting from the baseline"),
    }

    // 6. PostgreSQL sink.
    let sink = if infrastructure.persist_to_postgres {
        let sink = PostgresSink::connect(&infrastructure).await?;
        sink.backfill(&orchestrator).await?;
        Some(sink)
    } else {
        None
    };

    // 7. Year loop.
    spawn_stop_handler(control.clone());
    let mut end_reason = RunEndReason::Completed;
    let mut failure = None;
    while let Some(year) = orchestrator.next_year() {
        if control.is_stop_requested() {
            info!(next_year = year, "Stop requested, ending run at year boundary");
            end_reason = RunEndReason::StopRequested;
            break;
        }

        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = orchestrator.run_year_with_retry(year);
            (orchestrator, result)
        })
        .await
        .map_err(|e| EngineError::Task {
            message: e.to_string(),
        })?;
        orchestrator = returned;
        log_year(&result);

        if !result.success {
            end_reason = RunEndReason::Failed;
            failure = Some(EngineError::YearFailed {
                year,
                message: result
                    .error
                    .as_ref()
                    .map_or_else(|| "unknown failure".to_owned(), ToString::to_string),
            });
            break;
        }

        if let Some(sink) = &sink {
            let checkpoint = orchestrator.load_checkpoint(year)?;
            match checkpoint {
                Some(checkpoint) => {
                    sink.persist(&checkpoint).await?;
                }
                None => warn!(year, "Committed year has no checkpoint to persist"),
            }
        }
    }

    if end_reason == RunEndReason::Completed {
        orchestrator.finish()?;
    }

    // 8. Result.
    let digest = orchestrator
        .event_log()
        .digest()
        .unwrap_or_else(|e| format!("<unavailable: {e}>"));
    info!(
        end_reason = ?end_reason,
        last_completed_year = ?control.last_completed_year(),
        events = orchestrator.event_log().len(),
        active_headcount = orchestrator.snapshot().active_count(),
        event_log_digest = %digest,
        "workforce-engine shutdown complete"
    );

    if let Some(sink) = &sink {
        sink.close().await;
    }
    if let Some(failure) = failure {
        error!(%failure, "Run failed");
        return Err(failure.into());
    }
    Ok(())
}

/// Load the configuration file, falling back to defaults when it does not
/// exist. Returns the path actually read.
fn load_config(path: &Path) -> Result<(SimulationConfig, Option<PathBuf>), EngineError> {
    let (config, source) = if path.exists() {
        (SimulationConfig::from_file(path)?, Some(path.to_path_buf()))
    } else {
        (SimulationConfig::default(), None)
    };
    config.validate()?;
    Ok((config, source))
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_baseline(config: &SimulationConfig) -> Result<Vec<Employee>, EngineError> {
    if let Some(path) = &config.census.path {
        let census = baseline::load_census(Path::new(path))?;
        info!(path = %path, employees = census.len(), "Census loaded");
        Ok(census)
    } else {
        let census = baseline::synthesize(config.census.synthetic_size, config);
        info!(employees = census.len(), "Synthetic census generated");
        Ok(census)
    }
}

fn spawn_stop_handler(control: RunControl) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping after the current year");
                control.request_stop();
            }
            Err(e) => warn!(error = %e, "Cannot listen for interrupts"),
        }
    });
}

fn log_year(result: &YearResult) {
    let count = |kind: EventKind| result.event_counts.get(&kind).copied().unwrap_or(0);
    if result.success {
        let (active, participation) = result
            .snapshot_summary
            .as_ref()
            .map_or((0, None), |s| (s.active_headcount, Some(s.participation_rate)));
        info!(
            year = result.year,
            hires = count(EventKind::Hire),
            terminations = count(EventKind::Termination),
            new_hire_terminations = count(EventKind::NewHireTermination),
            promotions = count(EventKind::Promotion),
            enrollments = count(EventKind::Enrollment),
            escalations = count(EventKind::Escalation),
            active_headcount = active,
            participation_rate = ?participation,
            violations = result.validation.as_ref().map_or(0, |v| v.violations.len()),
            "Year completed"
        );
    } else if let Some(error) = &result.error {
        error!(
            year = result.year,
            category = ?error.category(),
            %error,
            "Year failed"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, source) = load_config(&dir.path().join("absent.yaml")).unwrap();
        assert!(source.is_none());
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn config_file_is_read_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workforce-config.yaml");
        std::fs::write(&path, "simulation:\n  seed: 7\n  end_year: 2026\n").unwrap();
        let (config, source) = load_config(&path).unwrap();
        assert_eq!(source.as_deref(), Some(path.as_path()));
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.end_year, 2026);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workforce-config.yaml");
        std::fs::write(&path, "simulation:\n  start_year: 2030\n  end_year: 2025\n").unwrap();
        assert!(matches!(load_config(&path), Err(EngineError::Config { .. })));
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../workforce-config.yaml");
        let (config, _) = load_config(&path).unwrap();
        let defaults = SimulationConfig::default();
        assert_eq!(config.simulation, defaults.simulation);
        assert_eq!(config.workforce, defaults.workforce);
        assert_eq!(config.hazard, defaults.hazard);
        assert_eq!(config.compensation, defaults.compensation);
        assert_eq!(config.new_hire, defaults.new_hire);
        assert_eq!(config.plan, defaults.plan);
        assert_eq!(config.escalation, defaults.escalation);
        assert_eq!(config.infrastructure.max_connections, defaults.infrastructure.max_connections);
    }

    #[test]
    fn synthetic_baseline_uses_configured_size() {
        let mut config = SimulationConfig::default();
        config.census.synthetic_size = 25;
        assert_eq!(load_baseline(&config).unwrap().len(), 25);
    }
}
