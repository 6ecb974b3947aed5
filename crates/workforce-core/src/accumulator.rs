//! Temporal state accumulator for plan participation.
//!
//! Carries each employee's enrollment state and deferral rate forward one
//! year at a time. Year N is a pure function of the year N−1 records and
//! the year N events; it never reads the consolidated event log or any
//! snapshot, so there is no circular dependency between this year's state
//! and this year's outputs.
//!
//! ```text
//! records(N) = fold(events(N), carry_forward(records(N − 1)))
//! ```
//!
//! Records are stored by (year, employee) and every read names its year.
//! Committed years are never overwritten.

use std::collections::BTreeMap;

use workforce_events::EventLog;
use workforce_events::digest::canonical_digest;
use workforce_types::{
    AccumulatorRecord, Employee, EmployeeId, Event, EventKind, EventPayload, Provenance,
    year_end,
};

use crate::config::PlanConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while computing or committing accumulator state.
#[derive(Debug, thiserror::Error)]
pub enum AccumulatorError {
    /// The prior year has not been computed.
    #[error("accumulator has no records for {year}, the year before {requested}")]
    MissingPriorYear {
        /// The absent year.
        year: i32,
        /// The year being computed or committed.
        requested: i32,
    },

    /// A year is already committed.
    #[error("accumulator year {year} is already committed")]
    AlreadyCommitted {
        /// The committed year.
        year: i32,
    },

    /// An event refers to an employee with no live record.
    #[error("{kind} event in {year} refers to {employee_id}, who has no record")]
    UnknownEntity {
        /// Year of the event.
        year: i32,
        /// The employee referenced.
        employee_id: EmployeeId,
        /// Kind of the event.
        kind: EventKind,
    },

    /// A hire for an employee that already has a record.
    #[error("hire in {year} for {employee_id}, who already has a record")]
    DuplicateEntity {
        /// Year of the hire.
        year: i32,
        /// The employee hired twice.
        employee_id: EmployeeId,
    },

    /// An event does not apply to the employee's current state.
    #[error("{kind} event in {year} for {employee_id} is invalid: {reason}")]
    InvalidTransition {
        /// Year of the event.
        year: i32,
        /// The employee referenced.
        employee_id: EmployeeId,
        /// Kind of the event.
        kind: EventKind,
        /// Why the event does not apply.
        reason: &'static str,
    },

    /// An escalation's previous rate disagrees with the carried rate.
    #[error(
        "escalation in {year} for {employee_id} expects rate {recorded}, accumulator has {carried}"
    )]
    RateMismatch {
        /// Year of the escalation.
        year: i32,
        /// The employee escalated.
        employee_id: EmployeeId,
        /// Previous rate recorded on the event.
        recorded: rust_decimal::Decimal,
        /// Rate carried in the accumulator.
        carried: rust_decimal::Decimal,
    },

    /// A counter or year computation overflowed.
    #[error("accumulator overflowed computing {field} for {year}")]
    Arithmetic {
        /// Year being computed.
        year: i32,
        /// Value being computed.
        field: &'static str,
    },

    /// Digest serialization failed.
    #[error("accumulator serialization failed: {message}")]
    Serialization {
        /// Underlying serializer message.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Pure computation
// ---------------------------------------------------------------------------

/// Records for the baseline year, seeded from the census.
///
/// Participants keep their census rate (or the age-band default when the
/// census rate is zero); non-participants start at zero.
pub fn baseline_records(
    year: i32,
    employees: &[Employee],
    plan: &PlanConfig,
) -> BTreeMap<EmployeeId, AccumulatorRecord> {
    let as_of = year_end(year);
    employees
        .iter()
        .map(|employee| {
            let from_census =
                employee.enrolled && employee.contribution_rate > rust_decimal::Decimal::ZERO;
            let provenance = if from_census {
                Provenance::BaselineCensus
            } else {
                Provenance::BaselineDefault
            };
            let record = AccumulatorRecord {
                employee_id: employee.id.clone(),
                simulation_year: year,
                enrolled: employee.enrolled,
                enrollment_date: None,
                contribution_rate: plan.seed_rate(
                    employee.enrolled,
                    employee.contribution_rate,
                    employee.age_band_at(as_of),
                ),
                escalation_count: 0,
                last_escalation_date: None,
                provenance,
            };
            (employee.id.clone(), record)
        })
        .collect()
}

/// Fold one year's events into the prior year's records.
///
/// `events` must be in sequence order. Compensation events do not touch
/// plan state and pass through.
pub fn accumulate(
    year: i32,
    prior: &BTreeMap<EmployeeId, AccumulatorRecord>,
    events: &[Event],
) -> Result<BTreeMap<EmployeeId, AccumulatorRecord>, AccumulatorError> {
    let mut records: BTreeMap<EmployeeId, AccumulatorRecord> = prior
        .iter()
        .map(|(id, record)| (id.clone(), record.carried_forward(year)))
        .collect();

    for event in events {
        let unknown = || AccumulatorError::UnknownEntity {
            year,
            employee_id: event.employee_id.clone(),
            kind: event.kind,
        };
        match &event.payload {
            EventPayload::Termination { .. } | EventPayload::NewHireTermination { .. } => {
                records.remove(&event.employee_id).ok_or_else(unknown)?;
            }
            EventPayload::Promotion { .. } | EventPayload::Merit { .. } => {
                if !records.contains_key(&event.employee_id) {
                    return Err(unknown());
                }
            }
            EventPayload::Hire { .. } => {
                if records.contains_key(&event.employee_id) {
                    return Err(AccumulatorError::DuplicateEntity {
                        year,
                        employee_id: event.employee_id.clone(),
                    });
                }
                records.insert(
                    event.employee_id.clone(),
                    AccumulatorRecord {
                        employee_id: event.employee_id.clone(),
                        simulation_year: year,
                        enrolled: false,
                        enrollment_date: None,
                        contribution_rate: rust_decimal::Decimal::ZERO,
                        escalation_count: 0,
                        last_escalation_date: None,
                        provenance: Provenance::NewHire,
                    },
                );
            }
            EventPayload::Enrollment { deferral_rate, .. } => {
                let record = records.get_mut(&event.employee_id).ok_or_else(unknown)?;
                if record.enrolled {
                    return Err(AccumulatorError::InvalidTransition {
                        year,
                        employee_id: event.employee_id.clone(),
                        kind: event.kind,
                        reason: "already enrolled",
                    });
                }
                record.enrolled = true;
                record.enrollment_date = Some(event.effective_date);
                record.contribution_rate = *deferral_rate;
                record.provenance = Provenance::Enrolled;
            }
            EventPayload::Escalation {
                previous_rate,
                new_rate,
            } => {
                let record = records.get_mut(&event.employee_id).ok_or_else(unknown)?;
                if !record.enrolled {
                    return Err(AccumulatorError::InvalidTransition {
                        year,
                        employee_id: event.employee_id.clone(),
                        kind: event.kind,
                        reason: "not enrolled",
                    });
                }
                if record.contribution_rate != *previous_rate {
                    return Err(AccumulatorError::RateMismatch {
                        year,
                        employee_id: event.employee_id.clone(),
                        recorded: *previous_rate,
                        carried: record.contribution_rate,
                    });
                }
                record.escalation_count = record.escalation_count.checked_add(1).ok_or(
                    AccumulatorError::Arithmetic {
                        year,
                        field: "escalation count",
                    },
                )?;
                record.contribution_rate = *new_rate;
                record.last_escalation_date = Some(event.effective_date);
                record.provenance = Provenance::Escalated;
            }
        }
    }

    Ok(records)
}

/// Digest of one year's records in identifier order.
pub fn records_digest(
    records: &BTreeMap<EmployeeId, AccumulatorRecord>,
) -> Result<String, AccumulatorError> {
    let rows: Vec<&AccumulatorRecord> = records.values().collect();
    canonical_digest(&rows).map_err(|e| AccumulatorError::Serialization {
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Committed accumulator state, one map of records per year.
#[derive(Debug, Clone, Default)]
pub struct TemporalStateAccumulator {
    years: BTreeMap<i32, BTreeMap<EmployeeId, AccumulatorRecord>>,
}

impl TemporalStateAccumulator {
    /// Seed the accumulator with the baseline year.
    pub fn from_baseline(year: i32, employees: &[Employee], plan: &PlanConfig) -> Self {
        Self::from_records(year, baseline_records(year, employees, plan))
    }

    /// An accumulator holding exactly one committed year, as restored from
    /// a checkpoint.
    pub fn from_records(year: i32, records: BTreeMap<EmployeeId, AccumulatorRecord>) -> Self {
        Self {
            years: BTreeMap::from([(year, records)]),
        }
    }

    /// Rebuild from scratch by replaying every partition of `log` up to and
    /// including `through`.
    pub fn rebuild(
        baseline_year: i32,
        employees: &[Employee],
        plan: &PlanConfig,
        log: &EventLog,
        through: i32,
    ) -> Result<Self, AccumulatorError> {
        let mut accumulator = Self::from_baseline(baseline_year, employees, plan);
        for year in log.sealed_years().filter(|y| *y > baseline_year && *y <= through) {
            let records = accumulator.compute_year(year, log.events_for_year(year))?;
            accumulator.commit_year(year, records)?;
        }
        Ok(accumulator)
    }

    /// Most recent committed year.
    pub fn latest_year(&self) -> Option<i32> {
        self.years.keys().next_back().copied()
    }

    /// Records for `year`, if committed.
    pub fn records_for_year(&self, year: i32) -> Option<&BTreeMap<EmployeeId, AccumulatorRecord>> {
        self.years.get(&year)
    }

    /// One employee's record for `year`.
    pub fn record(&self, year: i32, employee_id: &EmployeeId) -> Option<&AccumulatorRecord> {
        self.years.get(&year).and_then(|records| records.get(employee_id))
    }

    /// Compute `year` from the committed year before it. Does not commit.
    pub fn compute_year(
        &self,
        year: i32,
        events: &[Event],
    ) -> Result<BTreeMap<EmployeeId, AccumulatorRecord>, AccumulatorError> {
        let prior_year = year.checked_sub(1).ok_or(AccumulatorError::Arithmetic {
            year,
            field: "prior year",
        })?;
        let prior = self
            .years
            .get(&prior_year)
            .ok_or(AccumulatorError::MissingPriorYear {
                year: prior_year,
                requested: year,
            })?;
        accumulate(year, prior, events)
    }

    /// Commit computed records for `year`.
    pub fn commit_year(
        &mut self,
        year: i32,
        records: BTreeMap<EmployeeId, AccumulatorRecord>,
    ) -> Result<(), AccumulatorError> {
        if self.years.contains_key(&year) {
            return Err(AccumulatorError::AlreadyCommitted { year });
        }
        let prior_year = year.checked_sub(1).ok_or(AccumulatorError::Arithmetic {
            year,
            field: "prior year",
        })?;
        if !self.years.contains_key(&prior_year) {
            return Err(AccumulatorError::MissingPriorYear {
                year: prior_year,
                requested: year,
            });
        }
        tracing::debug!(year, records = records.len(), "accumulator year committed");
        self.years.insert(year, records);
        Ok(())
    }

    /// Digest of the records for `year`, if committed.
    pub fn digest(&self, year: i32) -> Result<Option<String>, AccumulatorError> {
        self.years.get(&year).map(records_digest).transpose()
    }
}
