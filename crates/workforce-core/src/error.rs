//! Top-level error type for the simulation.
//!
//! [`SimulationError`] wraps every subsystem error with the year it occurred
//! in. [`ErrorCategory`] groups variants by how the run should react.

use workforce_events::{EventLogError, SnapshotError};

use crate::accumulator::AccumulatorError;
use crate::baseline::BaselineError;
use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::generators::GeneratorError;
use crate::hazard::HazardError;
use crate::invariants::InvariantViolation;
use crate::orchestrator::OrchestratorPhase;
use crate::quality::DataQualityError;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid configuration or census. Fatal before any year runs.
    Configuration,
    /// A prerequisite is missing. Fatal for the run.
    Dependency,
    /// Malformed or inconsistent data. Fails the year.
    DataQuality,
    /// A numeric invariant did not hold. Fails the year.
    NumericInvariant,
    /// Checkpoint storage or integrity trouble.
    Checkpoint,
    /// Event log, snapshot or accumulator rejected a change.
    Integrity,
    /// The orchestrator was driven out of order.
    State,
}

/// Errors raised while building or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Configuration is invalid.
    #[error("configuration error: {source}")]
    Configuration {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The hazard table could not be built.
    #[error("hazard table error: {source}")]
    Hazard {
        /// The underlying hazard error.
        #[from]
        source: HazardError,
    },

    /// The baseline census is invalid.
    #[error("baseline error: {source}")]
    Baseline {
        /// The underlying baseline error.
        #[from]
        source: BaselineError,
    },

    /// A prerequisite for the year is missing.
    #[error("year {year}: dependency error: {reason}")]
    Dependency {
        /// Year that could not run.
        year: i32,
        /// What is missing.
        reason: String,
    },

    /// A generator failed.
    #[error("year {year}: generator error: {source}")]
    Generator {
        /// Year being generated.
        year: i32,
        /// The underlying generator error.
        source: GeneratorError,
    },

    /// A data quality check failed.
    #[error("year {year}: data quality error in {stage}: {source}")]
    DataQuality {
        /// Year being checked.
        year: i32,
        /// Which check failed.
        stage: &'static str,
        /// The violation.
        source: DataQualityError,
    },

    /// A numeric invariant failed.
    #[error("year {year}: numeric invariant error: {violation}")]
    NumericInvariant {
        /// Year being validated.
        year: i32,
        /// The violation.
        violation: InvariantViolation,
    },

    /// The event log rejected the year's partition.
    #[error("year {year}: event log error: {source}")]
    EventLog {
        /// Year being appended.
        year: i32,
        /// The underlying log error.
        source: EventLogError,
    },

    /// Snapshot reconstruction failed.
    #[error("year {year}: snapshot error: {source}")]
    Snapshot {
        /// Year being reconstructed.
        year: i32,
        /// The underlying snapshot error.
        source: SnapshotError,
    },

    /// State accumulation failed.
    #[error("year {year}: accumulator error: {source}")]
    Accumulator {
        /// Year being accumulated.
        year: i32,
        /// The underlying accumulator error.
        source: AccumulatorError,
    },

    /// Checkpoint storage or verification failed.
    #[error("year {year}: checkpoint error: {source}")]
    Checkpoint {
        /// Year being checkpointed.
        year: i32,
        /// The underlying checkpoint error.
        source: CheckpointError,
    },

    /// An illegal orchestrator phase transition was attempted.
    #[error("illegal transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase.
        from: OrchestratorPhase,
        /// Requested phase.
        to: OrchestratorPhase,
    },
}

impl SimulationError {
    /// Category of the failure.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } | Self::Hazard { .. } | Self::Baseline { .. } => {
                ErrorCategory::Configuration
            }
            Self::Dependency { .. } => ErrorCategory::Dependency,
            Self::Generator { .. } | Self::DataQuality { .. } => ErrorCategory::DataQuality,
            Self::NumericInvariant { .. } => ErrorCategory::NumericInvariant,
            Self::Checkpoint { .. } => ErrorCategory::Checkpoint,
            Self::EventLog { .. } | Self::Snapshot { .. } | Self::Accumulator { .. } => {
                ErrorCategory::Integrity
            }
            Self::InvalidTransition { .. } => ErrorCategory::State,
        }
    }

    /// Whether rerunning the year may succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Checkpoint { source, .. } => source.is_io(),
            _ => false,
        }
    }

    /// Year the failure belongs to, if any.
    pub const fn year(&self) -> Option<i32> {
        match self {
            Self::Dependency { year, .. }
            | Self::Generator { year, .. }
            | Self::DataQuality { year, .. }
            | Self::NumericInvariant { year, .. }
            | Self::EventLog { year, .. }
            | Self::Snapshot { year, .. }
            | Self::Accumulator { year, .. }
            | Self::Checkpoint { year, .. } => Some(*year),
            Self::Configuration { .. }
            | Self::Hazard { .. }
            | Self::Baseline { .. }
            | Self::InvalidTransition { .. } => None,
        }
    }
}
