//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup and the year
//! loop so `main` can propagate with `?`.

use workforce_core::baseline::BaselineError;
use workforce_core::checkpoint::CheckpointError;
use workforce_core::config::ConfigError;
use workforce_core::error::SimulationError;
use workforce_db::DbError;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The census could not be loaded.
    #[error("baseline error: {source}")]
    Baseline {
        /// The underlying baseline error.
        #[from]
        source: BaselineError,
    },

    /// The checkpoint directory could not be opened.
    #[error("checkpoint error: {source}")]
    Checkpoint {
        /// The underlying checkpoint error.
        #[from]
        source: CheckpointError,
    },

    /// The orchestrator rejected the run.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: SimulationError,
    },

    /// The `PostgreSQL` sink failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: DbError,
    },

    /// A simulation year failed and the run stopped.
    #[error("year {year} failed: {message}")]
    YearFailed {
        /// The failed year.
        year: i32,
        /// Description of the failure.
        message: String,
    },

    /// The blocking year task panicked or was cancelled.
    #[error("year task error: {message}")]
    Task {
        /// Description of the task failure.
        message: String,
    },
}
