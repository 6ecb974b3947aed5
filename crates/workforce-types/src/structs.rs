//! Core records exchanged between the simulation components.
//!
//! Money and contribution rates use [`Decimal`] so that replaying the event
//! log reproduces compensation to the cent. Probabilities never appear in
//! these records.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{AgeBand, DetailedStatus, EnrollmentSource, EventKind, Provenance, TenureBand};
use crate::ids::{EmployeeId, EventId};

/// January 1st of `year`.
///
/// Years outside chrono's representable range collapse to
/// [`NaiveDate::MIN`]; configuration validation rejects such years long
/// before any date arithmetic happens.
pub fn year_start(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// December 31st of `year`.
///
/// Years outside chrono's representable range collapse to
/// [`NaiveDate::MAX`].
pub fn year_end(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX)
}

// ---------------------------------------------------------------------------
// Employee
// ---------------------------------------------------------------------------

/// A workforce member as known at the start of a simulation year.
///
/// Age and tenure are derived from the stored dates so that aging an
/// entity never requires a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// Stable identifier.
    pub id: EmployeeId,
    /// Date of birth.
    pub birth_date: NaiveDate,
    /// Most recent hire date.
    pub hire_date: NaiveDate,
    /// Job level (1 is the entry level).
    pub level: u8,
    /// Annual base compensation.
    pub compensation: Decimal,
    /// Whether the employee currently defers into the plan.
    pub enrolled: bool,
    /// Current deferral rate as a fraction of compensation (0.06 = 6%).
    pub contribution_rate: Decimal,
}

impl Employee {
    /// Age in whole years on `date`.
    pub fn age_at(&self, date: NaiveDate) -> u32 {
        date.years_since(self.birth_date).unwrap_or(0)
    }

    /// Completed years of service on `date`.
    pub fn tenure_at(&self, date: NaiveDate) -> u32 {
        date.years_since(self.hire_date).unwrap_or(0)
    }

    /// Days of service on `date` (zero before the hire date).
    pub fn service_days_at(&self, date: NaiveDate) -> i64 {
        date.signed_duration_since(self.hire_date).num_days().max(0)
    }

    /// Age band on `date`.
    pub fn age_band_at(&self, date: NaiveDate) -> AgeBand {
        AgeBand::from_age(self.age_at(date))
    }

    /// Tenure band on `date`.
    pub fn tenure_band_at(&self, date: NaiveDate) -> TenureBand {
        TenureBand::from_years(self.tenure_at(date))
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Kind-specific content of an event, including before/after values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// An experienced employee leaves.
    Termination {
        /// Compensation at the time of termination.
        compensation: Decimal,
    },
    /// A promotion to the next level.
    Promotion {
        /// Level before the promotion.
        previous_level: u8,
        /// Level after the promotion.
        new_level: u8,
        /// Compensation before the promotion.
        previous_compensation: Decimal,
        /// Compensation after the promotion.
        new_compensation: Decimal,
    },
    /// A merit and cost-of-living raise.
    Merit {
        /// Compensation before the raise.
        previous_compensation: Decimal,
        /// Compensation after the raise.
        new_compensation: Decimal,
        /// Merit portion of the raise as a fraction.
        merit_rate: Decimal,
        /// Cost-of-living portion of the raise as a fraction.
        cola_rate: Decimal,
    },
    /// A new employee joins.
    Hire {
        /// Sampled date of birth.
        birth_date: NaiveDate,
        /// Starting level.
        level: u8,
        /// Starting compensation.
        compensation: Decimal,
    },
    /// A current-year hire leaves in the same year.
    NewHireTermination {
        /// Compensation at the time of termination.
        compensation: Decimal,
    },
    /// The employee starts deferring.
    Enrollment {
        /// Initial deferral rate.
        deferral_rate: Decimal,
        /// How the enrollment happened.
        source: EnrollmentSource,
    },
    /// Automatic deferral-rate increase.
    Escalation {
        /// Deferral rate before the increase.
        previous_rate: Decimal,
        /// Deferral rate after the increase.
        new_rate: Decimal,
    },
}

impl EventPayload {
    /// The event kind this payload belongs to.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Termination { .. } => EventKind::Termination,
            Self::Promotion { .. } => EventKind::Promotion,
            Self::Merit { .. } => EventKind::Merit,
            Self::Hire { .. } => EventKind::Hire,
            Self::NewHireTermination { .. } => EventKind::NewHireTermination,
            Self::Enrollment { .. } => EventKind::Enrollment,
            Self::Escalation { .. } => EventKind::Escalation,
        }
    }

    /// The monetary or rate value before the event, where one exists.
    pub const fn before_value(&self) -> Option<Decimal> {
        match self {
            Self::Termination { compensation } | Self::NewHireTermination { compensation } => {
                Some(*compensation)
            }
            Self::Promotion {
                previous_compensation,
                ..
            }
            | Self::Merit {
                previous_compensation,
                ..
            } => Some(*previous_compensation),
            Self::Escalation { previous_rate, .. } => Some(*previous_rate),
            Self::Hire { .. } | Self::Enrollment { .. } => None,
        }
    }

    /// The monetary or rate value after the event, where one exists.
    pub const fn after_value(&self) -> Option<Decimal> {
        match self {
            Self::Promotion {
                new_compensation, ..
            }
            | Self::Merit {
                new_compensation, ..
            } => Some(*new_compensation),
            Self::Hire { compensation, .. } => Some(*compensation),
            Self::Enrollment { deferral_rate, .. } => Some(*deferral_rate),
            Self::Escalation { new_rate, .. } => Some(*new_rate),
            Self::Termination { .. } | Self::NewHireTermination { .. } => None,
        }
    }
}

/// An event produced by a generator, before the log assigns its
/// identifier and causal sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// The entity the event applies to.
    pub employee_id: EmployeeId,
    /// Date the change takes effect (always inside the simulation year).
    pub effective_date: NaiveDate,
    /// Kind-specific content.
    pub payload: EventPayload,
}

impl EventDraft {
    /// The kind of event this draft will become.
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// An immutable fact in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique identifier (content-derived, reproducible).
    pub event_id: EventId,
    /// The entity the event applies to.
    pub employee_id: EmployeeId,
    /// The kind of event.
    pub kind: EventKind,
    /// Simulation year the event belongs to.
    pub simulation_year: i32,
    /// Date the change takes effect.
    pub effective_date: NaiveDate,
    /// Causal sequence number within the year (1-based, contiguous).
    pub sequence: u64,
    /// Kind-specific content.
    pub payload: EventPayload,
}

impl Event {
    /// Promote a draft into an event with an identifier and sequence number.
    pub fn from_draft(
        draft: EventDraft,
        simulation_year: i32,
        sequence: u64,
        event_id: EventId,
    ) -> Self {
        Self {
            event_id,
            employee_id: draft.employee_id,
            kind: draft.payload.kind(),
            simulation_year,
            effective_date: draft.effective_date,
            sequence,
            payload: draft.payload,
        }
    }

    /// The value before the event (persisted `before_value` column).
    pub const fn before_value(&self) -> Option<Decimal> {
        self.payload.before_value()
    }

    /// The value after the event (persisted `after_value` column).
    pub const fn after_value(&self) -> Option<Decimal> {
        self.payload.after_value()
    }

    /// Whether the effective date falls inside the simulation year.
    pub fn is_within_year(&self) -> bool {
        self.effective_date.year() == self.simulation_year
    }
}

// ---------------------------------------------------------------------------
// Temporal state accumulator
// ---------------------------------------------------------------------------

/// Versioned per-(employee, year) deferral state.
///
/// A new record is written for every active employee every year; records
/// are never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorRecord {
    /// The entity the record describes.
    pub employee_id: EmployeeId,
    /// Year the record is valid for (state as of December 31st).
    pub simulation_year: i32,
    /// Whether the employee is enrolled.
    pub enrolled: bool,
    /// Date of the most recent enrollment, if known.
    pub enrollment_date: Option<NaiveDate>,
    /// Current deferral rate.
    pub contribution_rate: Decimal,
    /// Number of automatic escalations applied so far.
    pub escalation_count: u32,
    /// Date of the most recent escalation.
    pub last_escalation_date: Option<NaiveDate>,
    /// Where this record's values came from.
    pub provenance: Provenance,
}

impl AccumulatorRecord {
    /// Copy this record forward into `year` without changes.
    #[must_use]
    pub fn carried_forward(&self, year: i32) -> Self {
        Self {
            simulation_year: year,
            provenance: Provenance::CarriedForward,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Derived end-of-year state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// The entity the row describes.
    pub employee_id: EmployeeId,
    /// Snapshot year.
    pub simulation_year: i32,
    /// Employment status at year end.
    pub status: DetailedStatus,
    /// Date of birth.
    pub birth_date: NaiveDate,
    /// Hire date.
    pub hire_date: NaiveDate,
    /// Termination date, for rows terminated during the year.
    pub termination_date: Option<NaiveDate>,
    /// Level at year end.
    pub level: u8,
    /// Compensation at year end.
    pub compensation: Decimal,
    /// Whether the employee is enrolled at year end.
    pub enrolled: bool,
    /// Deferral rate at year end.
    pub contribution_rate: Decimal,
    /// Age on December 31st.
    pub age: u32,
    /// Completed years of service on December 31st (or termination date).
    pub tenure_years: u32,
    /// Employer matching contribution earned for the year.
    pub employer_match: Decimal,
}

impl SnapshotRow {
    /// Whether the entity is employed at year end.
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// The entity as the next year's baseline sees it.
    pub fn to_employee(&self) -> Employee {
        Employee {
            id: self.employee_id.clone(),
            birth_date: self.birth_date,
            hire_date: self.hire_date,
            level: self.level,
            compensation: self.compensation,
            enrolled: self.enrolled,
            contribution_rate: self.contribution_rate,
        }
    }
}

/// Aggregate figures for one snapshot year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Snapshot year.
    pub simulation_year: i32,
    /// Active headcount at the start of the year.
    pub starting_headcount: u32,
    /// Active headcount at year end.
    pub active_headcount: u32,
    /// Hires during the year.
    pub hires: u32,
    /// Experienced terminations during the year.
    pub experienced_terminations: u32,
    /// New-hire terminations during the year.
    pub new_hire_terminations: u32,
    /// Total year-end compensation of active employees.
    pub total_compensation: Decimal,
    /// Share of active employees that are enrolled.
    pub participation_rate: Decimal,
    /// Mean deferral rate of enrolled active employees.
    pub average_deferral_rate: Decimal,
    /// Total employer match earned by active employees.
    pub total_employer_match: Decimal,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_employee() -> Employee {
        Employee {
            id: EmployeeId::new("EMP_000001"),
            birth_date: date(1990, 6, 15),
            hire_date: date(2020, 3, 1),
            level: 2,
            compensation: Decimal::new(72_500, 0),
            enrolled: true,
            contribution_rate: Decimal::new(6, 2),
        }
    }

    #[test]
    fn age_counts_completed_years() {
        let e = sample_employee();
        assert_eq!(e.age_at(date(2025, 6, 14)), 34);
        assert_eq!(e.age_at(date(2025, 6, 15)), 35);
        assert_eq!(e.age_band_at(date(2025, 12, 31)), AgeBand::From35To44);
    }

    #[test]
    fn tenure_counts_completed_years() {
        let e = sample_employee();
        assert_eq!(e.tenure_at(date(2025, 2, 28)), 4);
        assert_eq!(e.tenure_at(date(2025, 3, 1)), 5);
        assert_eq!(e.tenure_band_at(date(2025, 12, 31)), TenureBand::From5To9);
        assert_eq!(e.tenure_at(date(2019, 1, 1)), 0);
    }

    #[test]
    fn service_days_never_negative() {
        let e = sample_employee();
        assert_eq!(e.service_days_at(date(2020, 1, 1)), 0);
        assert_eq!(e.service_days_at(date(2020, 3, 31)), 30);
    }

    #[test]
    fn payload_kind_and_values() {
        let payload = EventPayload::Escalation {
            previous_rate: Decimal::new(3, 2),
            new_rate: Decimal::new(4, 2),
        };
        assert_eq!(payload.kind(), EventKind::Escalation);
        assert_eq!(payload.before_value(), Some(Decimal::new(3, 2)));
        assert_eq!(payload.after_value(), Some(Decimal::new(4, 2)));

        let hire = EventPayload::Hire {
            birth_date: date(2000, 1, 1),
            level: 1,
            compensation: Decimal::new(50_000, 0),
        };
        assert_eq!(hire.before_value(), None);
        assert_eq!(hire.after_value(), Some(Decimal::new(50_000, 0)));
    }

    #[test]
    fn event_from_draft_copies_kind() {
        let draft = EventDraft {
            employee_id: EmployeeId::new("EMP_000001"),
            effective_date: date(2025, 4, 1),
            payload: EventPayload::Termination {
                compensation: Decimal::new(72_500, 0),
            },
        };
        let event = Event::from_draft(draft, 2025, 1, EventId::from_hash_prefix([0u8; 16]));
        assert_eq!(event.kind, EventKind::Termination);
        assert_eq!(event.sequence, 1);
        assert!(event.is_within_year());
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = EventPayload::Termination {
            compensation: Decimal::new(1, 0),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "termination");
    }

    #[test]
    fn carried_forward_changes_year_and_provenance() {
        let record = AccumulatorRecord {
            employee_id: EmployeeId::new("EMP_000001"),
            simulation_year: 2025,
            enrolled: true,
            enrollment_date: Some(date(2021, 1, 1)),
            contribution_rate: Decimal::new(5, 2),
            escalation_count: 2,
            last_escalation_date: Some(date(2025, 1, 1)),
            provenance: Provenance::Escalated,
        };
        let next = record.carried_forward(2026);
        assert_eq!(next.simulation_year, 2026);
        assert_eq!(next.provenance, Provenance::CarriedForward);
        assert_eq!(next.escalation_count, 2);
        assert_eq!(next.contribution_rate, record.contribution_rate);
    }

    #[test]
    fn year_bounds() {
        assert_eq!(year_start(2025), date(2025, 1, 1));
        assert_eq!(year_end(2024), date(2024, 12, 31));
    }
}
