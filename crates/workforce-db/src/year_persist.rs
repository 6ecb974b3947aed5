//! End-of-year persistence.
//!
//! A committed year is written in a single transaction: its events, its
//! accumulator records, its snapshot rows and finally the checkpoint marker
//! row. Readers treat a year as present only once its marker exists, so a
//! failed write leaves nothing behind.
//!
//! ```text
//! persist_year()
//!   |
//!   +-- year_checkpoints lookup      (skip identical, reject different)
//!   +-- EventStore::insert_events      --> workforce_events
//!   +-- AccumulatorStore::insert_records --> accumulator_state
//!   +-- SnapshotStore::insert_rows     --> workforce_snapshots
//!   +-- checkpoint marker            --> year_checkpoints
//! ```

use sqlx::PgPool;

use workforce_types::{AccumulatorRecord, Event, SnapshotRow};

use crate::accumulator_store::AccumulatorStore;
use crate::error::DbError;
use crate::event_store::EventStore;
use crate::snapshot_store::SnapshotStore;

/// Everything one committed year persists.
#[derive(Debug, Clone, Copy)]
pub struct YearRecord<'a> {
    /// The simulation year.
    pub year: i32,
    /// Fingerprint of the configuration that produced the year.
    pub config_fingerprint: &'a str,
    /// The year's event partition, in sequence order.
    pub events: &'a [Event],
    /// Accumulator records valid for the year.
    pub records: &'a [AccumulatorRecord],
    /// Snapshot rows for the year.
    pub rows: &'a [SnapshotRow],
    /// Digest of the event partition.
    pub events_digest: &'a str,
    /// Digest of the accumulator records.
    pub accumulator_digest: &'a str,
    /// Digest of the snapshot.
    pub snapshot_digest: &'a str,
    /// Employees active at year end.
    pub active_headcount: u32,
}

/// Result of [`persist_year`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The year was written.
    Written {
        /// Event rows inserted.
        events: u64,
        /// Accumulator rows inserted.
        records: u64,
        /// Snapshot rows inserted.
        rows: u64,
    },
    /// An identical copy of the year was already stored.
    AlreadyPersisted,
}

/// Write a committed year atomically.
///
/// Writing a year that is already stored with the same events digest is a
/// no-op, so a resumed run can replay its persistence step.
///
/// # Errors
///
/// Returns [`DbError::YearConflict`] if the year is stored with different
/// events. Returns [`DbError::Postgres`] or [`DbError::Serialization`] if a
/// write fails, in which case nothing for the year is committed.
pub async fn persist_year(
    pool: &PgPool,
    record: &YearRecord<'_>,
) -> Result<PersistOutcome, DbError> {
    let mut tx = pool.begin().await?;

    let stored: Option<String> = sqlx::query_scalar(
        r"SELECT events_digest FROM year_checkpoints WHERE simulation_year = $1 FOR UPDATE",
    )
    .bind(record.year)
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(stored) = stored {
        tx.rollback().await?;
        if stored == record.events_digest {
            tracing::debug!(year = record.year, "Year already persisted");
            return Ok(PersistOutcome::AlreadyPersisted);
        }
        return Err(DbError::YearConflict {
            year: record.year,
            stored,
            offered: record.events_digest.to_owned(),
        });
    }

    let events = EventStore::insert_events(&mut *tx, record.events).await?;
    let records = AccumulatorStore::insert_records(&mut *tx, record.records).await?;
    let rows = SnapshotStore::insert_rows(&mut *tx, record.rows).await?;

    sqlx::query(
        r"INSERT INTO year_checkpoints
            (simulation_year, config_fingerprint, events_digest, accumulator_digest,
             snapshot_digest, event_count, active_headcount)
          VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(record.year)
    .bind(record.config_fingerprint)
    .bind(record.events_digest)
    .bind(record.accumulator_digest)
    .bind(record.snapshot_digest)
    .bind(i64::try_from(events).unwrap_or(i64::MAX))
    .bind(i64::from(record.active_headcount))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        year = record.year,
        events,
        records,
        rows,
        "Persisted year to PostgreSQL"
    );
    Ok(PersistOutcome::Written {
        events,
        records,
        rows,
    })
}

/// Most recent year with a checkpoint marker.
///
/// # Errors
///
/// Returns [`DbError::Postgres`] if the query fails.
pub async fn latest_persisted_year(pool: &PgPool) -> Result<Option<i32>, DbError> {
    let year: Option<i32> = sqlx::query_scalar(r"SELECT MAX(simulation_year) FROM year_checkpoints")
        .fetch_one(pool)
        .await?;
    Ok(year)
}

/// The checkpoint marker for `year`, if the year is persisted.
///
/// # Errors
///
/// Returns [`DbError::Postgres`] if the query fails.
pub async fn checkpoint_marker(
    pool: &PgPool,
    year: i32,
) -> Result<Option<CheckpointMarkerRow>, DbError> {
    let row = sqlx::query_as::<_, CheckpointMarkerRow>(
        r"SELECT simulation_year, config_fingerprint, events_digest, accumulator_digest,
                 snapshot_digest, event_count, active_headcount, persisted_at
          FROM year_checkpoints
          WHERE simulation_year = $1",
    )
    .bind(year)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// A row from the `year_checkpoints` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CheckpointMarkerRow {
    /// The simulation year.
    pub simulation_year: i32,
    /// Configuration fingerprint.
    pub config_fingerprint: String,
    /// Digest of the event partition.
    pub events_digest: String,
    /// Digest of the accumulator records.
    pub accumulator_digest: String,
    /// Digest of the snapshot.
    pub snapshot_digest: String,
    /// Number of events in the partition.
    pub event_count: i64,
    /// Active headcount at year end.
    pub active_headcount: i64,
    /// When the year was written.
    pub persisted_at: chrono::DateTime<chrono::Utc>,
}
