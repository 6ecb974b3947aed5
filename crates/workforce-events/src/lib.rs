//! Event sourcing and snapshot reconstruction for the workforce simulation.
//!
//! Every state change produces an immutable [`Event`] appended to the
//! [`EventLog`]. Events are the source of truth: the end-of-year state of
//! every entity is reconstructed by folding the baseline through the log.
//!
//! # Architecture
//!
//! - [`log`] -- The [`EventLog`]: append-only, partitioned by simulation year.
//! - [`snapshot`] -- The [`Snapshot`] reconstructor and its [`SnapshotPolicy`].
//! - [`digest`] -- Canonical SHA-256 digests used for reproducibility checks.
//!
//! # Partition sealing
//!
//! A year partition is appended exactly once, as a whole. Once year N is
//! sealed, no events for year N or any earlier year are accepted:
//!
//! ```text
//! append_year(2025, events)  -> Ok
//! append_year(2025, events)  -> Err(PartitionSealed)
//! append_year(2024, events)  -> Err(PartitionSealed)
//! ```
//!
//! Corrections are expressed as compensating events in a later year.
//!
//! [`Event`]: workforce_types::Event

pub mod digest;
pub mod log;
pub mod snapshot;

pub use log::{EventLog, assign_sequence, event_id_for};
pub use snapshot::{Snapshot, SnapshotPolicy};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use workforce_types::{EmployeeId, EventId, EventKind};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised when appending to or reading from the event log.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// The year (or a later one) has already been sealed.
    #[error("partition {year} rejected: log is sealed through {sealed_through}")]
    PartitionSealed {
        /// Year that was being appended.
        year: i32,
        /// Latest sealed year.
        sealed_through: i32,
    },

    /// An event carries a different simulation year than its partition.
    #[error("event {sequence} belongs to year {event_year}, not partition {year}")]
    WrongPartition {
        /// Partition year.
        year: i32,
        /// Year carried by the event.
        event_year: i32,
        /// Sequence number of the offending event.
        sequence: u64,
    },

    /// An event's effective date lies outside its simulation year.
    #[error("event for {employee_id} in year {year} has effective date {effective_date}")]
    OutOfYear {
        /// Partition year.
        year: i32,
        /// Entity of the offending event.
        employee_id: EmployeeId,
        /// The out-of-range date.
        effective_date: NaiveDate,
    },

    /// Sequence numbers must run 1, 2, 3, ... without gaps.
    #[error("partition {year}: expected sequence {expected}, found {found}")]
    NonContiguousSequence {
        /// Partition year.
        year: i32,
        /// The sequence number that should have appeared.
        expected: u64,
        /// The sequence number that did appear.
        found: u64,
    },

    /// An event identifier is already present in the log or the batch.
    #[error("duplicate event id {event_id} in partition {year}")]
    DuplicateEventId {
        /// Partition year.
        year: i32,
        /// The repeated identifier.
        event_id: EventId,
    },

    /// Canonical serialization failed while computing a digest.
    #[error("event log serialization failed: {message}")]
    Serialization {
        /// Underlying serializer message.
        message: String,
    },
}

/// Errors raised while reconstructing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The log has no sealed partition for a year between the baseline and
    /// the target.
    #[error("no sealed event partition for year {year}")]
    MissingPartition {
        /// Missing year.
        year: i32,
    },

    /// Snapshots can only advance one year at a time.
    #[error("cannot apply year {found} on top of a snapshot for {expected_prior}")]
    YearMismatch {
        /// Year the prior snapshot should have.
        expected_prior: i32,
        /// Year that was requested.
        found: i32,
    },

    /// The baseline lists the same entity twice.
    #[error("baseline contains duplicate employee {employee_id}")]
    DuplicateEntity {
        /// The repeated identifier.
        employee_id: EmployeeId,
    },

    /// Events inside a partition are not in ascending sequence order.
    #[error("year {year}: event sequence {found} follows {previous}")]
    OutOfOrder {
        /// Partition year.
        year: i32,
        /// Previous sequence number.
        previous: u64,
        /// Offending sequence number.
        found: u64,
    },

    /// An event targets an entity unknown to the snapshot.
    #[error("year {year}: {kind} event for unknown employee {employee_id}")]
    UnknownEntity {
        /// Partition year.
        year: i32,
        /// Entity of the offending event.
        employee_id: EmployeeId,
        /// Kind of the offending event.
        kind: EventKind,
    },

    /// An event cannot be applied to the entity's current state.
    #[error("year {year}: cannot apply {kind} to {employee_id}: {reason}")]
    InvalidEvent {
        /// Partition year.
        year: i32,
        /// Entity of the offending event.
        employee_id: EmployeeId,
        /// Kind of the offending event.
        kind: EventKind,
        /// What was wrong.
        reason: String,
    },

    /// A before-value recorded in an event disagrees with replayed state.
    #[error("year {year}: {kind} for {employee_id} before-value {recorded}, replay has {replayed}")]
    BeforeValueMismatch {
        /// Partition year.
        year: i32,
        /// Entity of the offending event.
        employee_id: EmployeeId,
        /// Kind of the offending event.
        kind: EventKind,
        /// Value stored in the event.
        recorded: Decimal,
        /// Value found by replay.
        replayed: Decimal,
    },

    /// Decimal arithmetic overflowed while deriving a field.
    #[error("decimal overflow computing {field} for year {year}")]
    Arithmetic {
        /// Snapshot year.
        year: i32,
        /// Field being computed.
        field: &'static str,
    },

    /// Canonical serialization failed while computing a digest.
    #[error("snapshot serialization failed: {message}")]
    Serialization {
        /// Underlying serializer message.
        message: String,
    },
}
