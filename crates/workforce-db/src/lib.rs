//! `PostgreSQL` persistence for the workforce simulation.
//!
//! The event table is the source of truth. Accumulator and snapshot tables
//! hold derived per-year state for reporting and can be rebuilt from the
//! events plus the baseline seed.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool, configuration and migrations
//! - [`event_store`] -- Batch event insertion and querying
//! - [`accumulator_store`] -- Versioned accumulator rows
//! - [`snapshot_store`] -- Derived snapshot rows
//! - [`year_persist`] -- Single-transaction persistence of a committed year
//! - [`error`] -- Shared error types

pub mod accumulator_store;
pub mod error;
pub mod event_store;
pub mod postgres;
pub mod snapshot_store;
pub mod year_persist;

pub use accumulator_store::{AccumulatorRow, AccumulatorStore};
pub use error::DbError;
pub use event_store::{EventRow, EventStore};
pub use postgres::{PostgresConfig, PostgresPool};
pub use snapshot_store::{SnapshotStore, StatusTotalRow};
pub use year_persist::{
    CheckpointMarkerRow, PersistOutcome, YearRecord, checkpoint_marker, latest_persisted_year,
    persist_year,
};

/// The `snake_case` serde tag of a unit enum variant, as stored in text
/// columns.
pub(crate) fn tag<T: serde::Serialize>(value: &T) -> Result<String, DbError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(tag) => Ok(tag),
        other => Err(DbError::Serialization(<serde_json::Error as serde::ser::Error>::custom(
            format!("expected a string tag, got {other}"),
        ))),
    }
}
