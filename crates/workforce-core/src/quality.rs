//! Data quality checks for one simulated year.
//!
//! Two passes run before anything is committed:
//!
//! 1. [`check_events`] -- every sequenced event is well formed: a non-empty
//!    identifier, non-negative compensation, rates within `[0, 1]`, an
//!    effective date inside the year, at most one terminal event and at
//!    most one hire per entity.
//! 2. [`check_agreement`] -- the reconstructed snapshot and the accumulator
//!    agree on who is active, who participates and at what rate.
//!
//! Either failure fails the year.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use workforce_events::Snapshot;
use workforce_types::{AccumulatorRecord, EmployeeId, Event, EventKind, EventPayload};

/// A data quality violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataQualityError {
    /// An event has an empty employee identifier.
    #[error("{kind} event {sequence} has an empty employee id")]
    BlankId {
        /// Kind of the event.
        kind: EventKind,
        /// Sequence number of the event.
        sequence: u64,
    },

    /// A compensation amount is negative.
    #[error("{kind} event for {employee_id} carries negative compensation {amount}")]
    NegativeCompensation {
        /// Entity of the event.
        employee_id: EmployeeId,
        /// Kind of the event.
        kind: EventKind,
        /// The negative amount.
        amount: Decimal,
    },

    /// A deferral rate lies outside `[0, 1]`.
    #[error("{kind} event for {employee_id} carries rate {rate} outside [0, 1]")]
    RateOutOfRange {
        /// Entity of the event.
        employee_id: EmployeeId,
        /// Kind of the event.
        kind: EventKind,
        /// The offending rate.
        rate: Decimal,
    },

    /// An effective date falls outside the simulation year.
    #[error("{kind} event for {employee_id} is dated {effective_date}, outside {year}")]
    OutsideYear {
        /// Simulation year.
        year: i32,
        /// Entity of the event.
        employee_id: EmployeeId,
        /// Kind of the event.
        kind: EventKind,
        /// The offending date.
        effective_date: NaiveDate,
    },

    /// An event belongs to another simulation year.
    #[error("{kind} event for {employee_id} is stamped {found}, expected {year}")]
    WrongYear {
        /// Expected simulation year.
        year: i32,
        /// Year on the event.
        found: i32,
        /// Entity of the event.
        employee_id: EmployeeId,
        /// Kind of the event.
        kind: EventKind,
    },

    /// An entity is terminated more than once.
    #[error("{employee_id} has more than one terminal event")]
    DuplicateTerminal {
        /// The entity.
        employee_id: EmployeeId,
    },

    /// An entity is hired more than once.
    #[error("{employee_id} is hired more than once")]
    DuplicateHire {
        /// The entity.
        employee_id: EmployeeId,
    },

    /// Active headcount differs between snapshot and accumulator.
    #[error("snapshot has {snapshot} active employees, accumulator has {accumulator}")]
    HeadcountMismatch {
        /// Active rows in the snapshot.
        snapshot: usize,
        /// Records in the accumulator.
        accumulator: usize,
    },

    /// An active snapshot row has no accumulator record.
    #[error("{employee_id} is active in the snapshot but has no accumulator record")]
    MissingRecord {
        /// The entity.
        employee_id: EmployeeId,
    },

    /// Enrollment flags disagree.
    #[error("{employee_id} enrollment disagrees: snapshot {snapshot}, accumulator {accumulator}")]
    EnrollmentMismatch {
        /// The entity.
        employee_id: EmployeeId,
        /// Flag in the snapshot.
        snapshot: bool,
        /// Flag in the accumulator.
        accumulator: bool,
    },

    /// Deferral rates disagree for a participant.
    #[error("{employee_id} rate disagrees: snapshot {snapshot}, accumulator {accumulator}")]
    RateMismatch {
        /// The entity.
        employee_id: EmployeeId,
        /// Rate in the snapshot.
        snapshot: Decimal,
        /// Rate in the accumulator.
        accumulator: Decimal,
    },
}

fn is_rate(rate: Decimal) -> bool {
    (Decimal::ZERO..=Decimal::ONE).contains(&rate)
}

/// Amounts and rates carried by a payload, for range checks.
fn payload_values(payload: &EventPayload) -> (Vec<Decimal>, Vec<Decimal>) {
    match payload {
        EventPayload::Termination { compensation }
        | EventPayload::NewHireTermination { compensation }
        | EventPayload::Hire { compensation, .. } => (vec![*compensation], Vec::new()),
        EventPayload::Promotion {
            previous_compensation,
            new_compensation,
            ..
        } => (vec![*previous_compensation, *new_compensation], Vec::new()),
        EventPayload::Merit {
            previous_compensation,
            new_compensation,
            ..
        } => (vec![*previous_compensation, *new_compensation], Vec::new()),
        EventPayload::Enrollment { deferral_rate, .. } => (Vec::new(), vec![*deferral_rate]),
        EventPayload::Escalation {
            previous_rate,
            new_rate,
        } => (Vec::new(), vec![*previous_rate, *new_rate]),
    }
}

/// Check every event of `year` before it is accumulated or logged.
pub fn check_events(year: i32, events: &[Event]) -> Result<(), DataQualityError> {
    let mut terminated: BTreeSet<&EmployeeId> = BTreeSet::new();
    let mut hired: BTreeSet<&EmployeeId> = BTreeSet::new();

    for event in events {
        let id = &event.employee_id;
        if id.is_blank() {
            return Err(DataQualityError::BlankId {
                kind: event.kind,
                sequence: event.sequence,
            });
        }
        if event.simulation_year != year {
            return Err(DataQualityError::WrongYear {
                year,
                found: event.simulation_year,
                employee_id: id.clone(),
                kind: event.kind,
            });
        }
        if !event.is_within_year() {
            return Err(DataQualityError::OutsideYear {
                year,
                employee_id: id.clone(),
                kind: event.kind,
                effective_date: event.effective_date,
            });
        }

        let (amounts, rates) = payload_values(&event.payload);
        if let Some(amount) = amounts.into_iter().find(|a| *a < Decimal::ZERO) {
            return Err(DataQualityError::NegativeCompensation {
                employee_id: id.clone(),
                kind: event.kind,
                amount,
            });
        }
        if let Some(rate) = rates.into_iter().find(|r| !is_rate(*r)) {
            return Err(DataQualityError::RateOutOfRange {
                employee_id: id.clone(),
                kind: event.kind,
                rate,
            });
        }

        if event.kind.is_terminal() && !terminated.insert(id) {
            return Err(DataQualityError::DuplicateTerminal {
                employee_id: id.clone(),
            });
        }
        if event.kind == EventKind::Hire && !hired.insert(id) {
            return Err(DataQualityError::DuplicateHire {
                employee_id: id.clone(),
            });
        }
    }
    Ok(())
}

/// Check that a snapshot and the accumulator records for the same year
/// describe the same participants.
pub fn check_agreement(
    snapshot: &Snapshot,
    records: &BTreeMap<EmployeeId, AccumulatorRecord>,
) -> Result<(), DataQualityError> {
    let active = snapshot.active_count();
    if active != records.len() {
        return Err(DataQualityError::HeadcountMismatch {
            snapshot: active,
            accumulator: records.len(),
        });
    }
    for row in snapshot.rows().filter(|row| row.is_active()) {
        let record = records
            .get(&row.employee_id)
            .ok_or_else(|| DataQualityError::MissingRecord {
                employee_id: row.employee_id.clone(),
            })?;
        if record.enrolled != row.enrolled {
            return Err(DataQualityError::EnrollmentMismatch {
                employee_id: row.employee_id.clone(),
                snapshot: row.enrolled,
                accumulator: record.enrolled,
            });
        }
        if row.enrolled && record.contribution_rate != row.contribution_rate {
            return Err(DataQualityError::RateMismatch {
                employee_id: row.employee_id.clone(),
                snapshot: row.contribution_rate,
                accumulator: record.contribution_rate,
            });
        }
    }
    Ok(())
}
