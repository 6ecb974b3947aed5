//! Shared type definitions for the workforce simulation engine.
//!
//! This crate is the single source of truth for the records that flow
//! between the generators, the event log, the temporal state accumulator,
//! and the snapshot reconstructor.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes for employees and events
//! - [`enums`] -- Closed enumerations (event kinds, demographic bands, statuses)
//! - [`structs`] -- Core records (employees, events, accumulator rows, snapshots)

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    AgeBand, DetailedStatus, EnrollmentSource, EventKind, Provenance, TenureBand,
};
pub use ids::{EmployeeId, EventId};
pub use structs::{
    AccumulatorRecord, Employee, Event, EventDraft, EventPayload, SnapshotRow, SnapshotSummary,
    year_end, year_start,
};
