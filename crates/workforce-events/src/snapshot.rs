//! Snapshot reconstruction.
//!
//! A [`Snapshot`] is the end-of-year state of every entity that was active
//! at some point during the year. It is never edited directly: the next
//! year's snapshot is produced by [`Snapshot::apply_year`], which folds that
//! year's events over the entities still active at the end of this one.
//! Entities terminated in an earlier year are dropped, so a snapshot's size
//! tracks the active population rather than the whole history.
//!
//! Replaying the same events over the same baseline always yields the same
//! rows, and therefore the same [`Snapshot::digest`].

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use workforce_types::{
    DetailedStatus, Employee, EmployeeId, Event, EventPayload, SnapshotRow, SnapshotSummary,
    year_end,
};

use crate::SnapshotError;
use crate::digest::canonical_digest;
use crate::log::EventLog;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Plan parameters needed to derive snapshot-only fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    /// Employer match per unit of matched deferral (0.5 = 50 cents on the dollar).
    pub match_rate: Decimal,
    /// Deferral rate above which the employer no longer matches.
    pub match_cap: Decimal,
    /// Minimum completed years of service before the match applies.
    pub match_min_tenure_years: u32,
}

impl SnapshotPolicy {
    /// Employer match earned by `row`, rounded to the cent.
    fn employer_match(&self, row: &SnapshotRow) -> Option<Decimal> {
        if !row.is_active() || !row.enrolled || row.tenure_years < self.match_min_tenure_years {
            return Some(Decimal::ZERO);
        }
        let matched_rate = row.contribution_rate.min(self.match_cap);
        self.match_rate
            .checked_mul(matched_rate)?
            .checked_mul(row.compensation)
            .map(|amount| amount.round_dp(2))
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// End-of-year state of the workforce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot year.
    pub year: i32,
    /// One row per entity, keyed by identifier.
    rows: BTreeMap<EmployeeId, SnapshotRow>,
}

impl Snapshot {
    /// Snapshot of the baseline population as of December 31st of `year`
    /// (the year before the first simulated year).
    pub fn from_baseline(
        year: i32,
        employees: &[Employee],
        policy: &SnapshotPolicy,
    ) -> Result<Self, SnapshotError> {
        let mut rows = BTreeMap::new();
        for employee in employees {
            let row = SnapshotRow {
                employee_id: employee.id.clone(),
                simulation_year: year,
                status: DetailedStatus::ContinuousActive,
                birth_date: employee.birth_date,
                hire_date: employee.hire_date,
                termination_date: None,
                level: employee.level,
                compensation: employee.compensation,
                enrolled: employee.enrolled,
                contribution_rate: employee.contribution_rate,
                age: 0,
                tenure_years: 0,
                employer_match: Decimal::ZERO,
            };
            if rows.insert(employee.id.clone(), row).is_some() {
                return Err(SnapshotError::DuplicateEntity {
                    employee_id: employee.id.clone(),
                });
            }
        }
        let mut snapshot = Self { year, rows };
        snapshot.derive_fields(policy)?;
        Ok(snapshot)
    }

    /// Produce the snapshot for `year` by applying that year's events, in
    /// sequence order, on top of this one.
    pub fn apply_year(
        &self,
        year: i32,
        events: &[Event],
        policy: &SnapshotPolicy,
    ) -> Result<Self, SnapshotError> {
        if self.year.checked_add(1) != Some(year) {
            return Err(SnapshotError::YearMismatch {
                expected_prior: year.saturating_sub(1),
                found: year,
            });
        }

        let mut rows: BTreeMap<EmployeeId, SnapshotRow> = self
            .rows
            .iter()
            .filter(|(_, row)| row.is_active())
            .map(|(id, row)| {
                let carried = SnapshotRow {
                    simulation_year: year,
                    status: DetailedStatus::ContinuousActive,
                    termination_date: None,
                    ..row.clone()
                };
                (id.clone(), carried)
            })
            .collect();

        let mut previous = 0_u64;
        for event in events {
            if event.sequence <= previous {
                return Err(SnapshotError::OutOfOrder {
                    year,
                    previous,
                    found: event.sequence,
                });
            }
            previous = event.sequence;
            apply_event(&mut rows, year, event)?;
        }

        let mut snapshot = Self { year, rows };
        snapshot.derive_fields(policy)?;
        Ok(snapshot)
    }

    /// Replay `log` from `baseline` through `target_year`.
    ///
    /// Every year between the baseline and the target must be sealed.
    pub fn reconstruct(
        baseline: &Self,
        log: &EventLog,
        target_year: i32,
        policy: &SnapshotPolicy,
    ) -> Result<Self, SnapshotError> {
        let mut current = baseline.clone();
        while current.year < target_year {
            let year = current.year.checked_add(1).ok_or(SnapshotError::Arithmetic {
                year: current.year,
                field: "year",
            })?;
            if !log.is_sealed(year) {
                return Err(SnapshotError::MissingPartition { year });
            }
            current = current.apply_year(year, log.events_for_year(year), policy)?;
        }
        Ok(current)
    }

    /// Row for one entity.
    pub fn row(&self, employee_id: &EmployeeId) -> Option<&SnapshotRow> {
        self.rows.get(employee_id)
    }

    /// All rows in identifier order.
    pub fn rows(&self) -> impl Iterator<Item = &SnapshotRow> {
        self.rows.values()
    }

    /// Number of rows (active and terminated-this-year).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the snapshot has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of entities active at year end.
    pub fn active_count(&self) -> usize {
        self.rows.values().filter(|row| row.is_active()).count()
    }

    /// Entities active at year end, in identifier order. This is the next
    /// year's starting population.
    pub fn active_employees(&self) -> Vec<Employee> {
        self.rows
            .values()
            .filter(|row| row.is_active())
            .map(SnapshotRow::to_employee)
            .collect()
    }

    /// Whether every row belongs to this snapshot's year.
    pub fn is_consistent(&self) -> bool {
        self.rows
            .iter()
            .all(|(id, row)| row.simulation_year == self.year && &row.employee_id == id)
    }

    /// SHA-256 of the canonical serialization.
    pub fn digest(&self) -> Result<String, SnapshotError> {
        canonical_digest(self).map_err(|e| SnapshotError::Serialization {
            message: e.to_string(),
        })
    }

    /// Aggregate figures for the year.
    pub fn summary(&self) -> Result<SnapshotSummary, SnapshotError> {
        let overflow = |field| SnapshotError::Arithmetic {
            year: self.year,
            field,
        };

        let mut starting_headcount = 0_u32;
        let mut active_headcount = 0_u32;
        let mut hires = 0_u32;
        let mut experienced_terminations = 0_u32;
        let mut new_hire_terminations = 0_u32;
        let mut enrolled_active = 0_u32;
        let mut total_compensation = Decimal::ZERO;
        let mut total_deferral = Decimal::ZERO;
        let mut total_employer_match = Decimal::ZERO;

        for row in self.rows.values() {
            match row.status {
                DetailedStatus::ContinuousActive => {
                    starting_headcount = starting_headcount.saturating_add(1);
                }
                DetailedStatus::ExperiencedTermination => {
                    starting_headcount = starting_headcount.saturating_add(1);
                    experienced_terminations = experienced_terminations.saturating_add(1);
                }
                DetailedStatus::NewHireActive => hires = hires.saturating_add(1),
                DetailedStatus::NewHireTermination => {
                    hires = hires.saturating_add(1);
                    new_hire_terminations = new_hire_terminations.saturating_add(1);
                }
            }
            if !row.is_active() {
                continue;
            }
            active_headcount = active_headcount.saturating_add(1);
            total_compensation = total_compensation
                .checked_add(row.compensation)
                .ok_or_else(|| overflow("total_compensation"))?;
            total_employer_match = total_employer_match
                .checked_add(row.employer_match)
                .ok_or_else(|| overflow("total_employer_match"))?;
            if row.enrolled {
                enrolled_active = enrolled_active.saturating_add(1);
                total_deferral = total_deferral
                    .checked_add(row.contribution_rate)
                    .ok_or_else(|| overflow("average_deferral_rate"))?;
            }
        }

        let participation_rate = ratio(Decimal::from(enrolled_active), active_headcount);
        let average_deferral_rate = ratio(total_deferral, enrolled_active);

        Ok(SnapshotSummary {
            simulation_year: self.year,
            starting_headcount,
            active_headcount,
            hires,
            experienced_terminations,
            new_hire_terminations,
            total_compensation,
            participation_rate,
            average_deferral_rate,
            total_employer_match,
        })
    }

    /// Fill in age, tenure and employer match for every row.
    fn derive_fields(&mut self, policy: &SnapshotPolicy) -> Result<(), SnapshotError> {
        let year_end = year_end(self.year);
        for row in self.rows.values_mut() {
            let as_of = row.termination_date.unwrap_or(year_end);
            row.age = years_between(row.birth_date, as_of);
            row.tenure_years = years_between(row.hire_date, as_of);
            row.employer_match =
                policy
                    .employer_match(row)
                    .ok_or(SnapshotError::Arithmetic {
                        year: self.year,
                        field: "employer_match",
                    })?;
        }
        Ok(())
    }
}

/// `numerator / denominator` to four decimal places, zero for an empty
/// denominator.
fn ratio(numerator: Decimal, denominator: u32) -> Decimal {
    numerator
        .checked_div(Decimal::from(denominator))
        .map_or(Decimal::ZERO, |value| value.round_dp(4))
}

fn years_between(from: NaiveDate, to: NaiveDate) -> u32 {
    to.years_since(from).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Event application
// ---------------------------------------------------------------------------

fn invalid(year: i32, event: &Event, reason: &str) -> SnapshotError {
    SnapshotError::InvalidEvent {
        year,
        employee_id: event.employee_id.clone(),
        kind: event.kind,
        reason: reason.to_owned(),
    }
}

fn check_before(
    year: i32,
    event: &Event,
    recorded: Decimal,
    replayed: Decimal,
) -> Result<(), SnapshotError> {
    if recorded == replayed {
        Ok(())
    } else {
        Err(SnapshotError::BeforeValueMismatch {
            year,
            employee_id: event.employee_id.clone(),
            kind: event.kind,
            recorded,
            replayed,
        })
    }
}

/// Apply one event to the working rows of `year`.
fn apply_event(
    rows: &mut BTreeMap<EmployeeId, SnapshotRow>,
    year: i32,
    event: &Event,
) -> Result<(), SnapshotError> {
    if let EventPayload::Hire {
        birth_date,
        level,
        compensation,
    } = &event.payload
    {
        if rows.contains_key(&event.employee_id) {
            return Err(invalid(year, event, "entity already exists"));
        }
        rows.insert(
            event.employee_id.clone(),
            SnapshotRow {
                employee_id: event.employee_id.clone(),
                simulation_year: year,
                status: DetailedStatus::NewHireActive,
                birth_date: *birth_date,
                hire_date: event.effective_date,
                termination_date: None,
                level: *level,
                compensation: *compensation,
                enrolled: false,
                contribution_rate: Decimal::ZERO,
                age: 0,
                tenure_years: 0,
                employer_match: Decimal::ZERO,
            },
        );
        return Ok(());
    }

    let row = rows
        .get_mut(&event.employee_id)
        .ok_or_else(|| SnapshotError::UnknownEntity {
            year,
            employee_id: event.employee_id.clone(),
            kind: event.kind,
        })?;
    if !row.is_active() {
        return Err(invalid(year, event, "entity already terminated"));
    }

    match &event.payload {
        EventPayload::Termination { compensation } => {
            if row.status != DetailedStatus::ContinuousActive {
                return Err(invalid(year, event, "not an experienced employee"));
            }
            check_before(year, event, *compensation, row.compensation)?;
            row.status = DetailedStatus::ExperiencedTermination;
            row.termination_date = Some(event.effective_date);
        }
        EventPayload::NewHireTermination { compensation } => {
            if row.status != DetailedStatus::NewHireActive {
                return Err(invalid(year, event, "not hired this year"));
            }
            check_before(year, event, *compensation, row.compensation)?;
            row.status = DetailedStatus::NewHireTermination;
            row.termination_date = Some(event.effective_date);
        }
        EventPayload::Promotion {
            previous_level,
            new_level,
            previous_compensation,
            new_compensation,
        } => {
            if *previous_level != row.level {
                return Err(invalid(year, event, "previous level does not match"));
            }
            check_before(year, event, *previous_compensation, row.compensation)?;
            row.level = *new_level;
            row.compensation = *new_compensation;
        }
        EventPayload::Merit {
            previous_compensation,
            new_compensation,
            ..
        } => {
            check_before(year, event, *previous_compensation, row.compensation)?;
            row.compensation = *new_compensation;
        }
        EventPayload::Enrollment { deferral_rate, .. } => {
            if row.enrolled {
                return Err(invalid(year, event, "already enrolled"));
            }
            row.enrolled = true;
            row.contribution_rate = *deferral_rate;
        }
        EventPayload::Escalation {
            previous_rate,
            new_rate,
        } => {
            if !row.enrolled {
                return Err(invalid(year, event, "not enrolled"));
            }
            check_before(year, event, *previous_rate, row.contribution_rate)?;
            row.contribution_rate = *new_rate;
        }
        EventPayload::Hire { .. } => return Err(invalid(year, event, "hire handled above")),
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use workforce_types::{EnrollmentSource, EventDraft};

    use super::*;
    use crate::log::assign_sequence;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn employee(id: &str, comp: i64, enrolled: bool) -> Employee {
        Employee {
            id: EmployeeId::new(id),
            birth_date: date(1985, 3, 10),
            hire_date: date(2015, 7, 1),
            level: 2,
            compensation: Decimal::new(comp, 0),
            enrolled,
            contribution_rate: if enrolled {
                Decimal::new(6, 2)
            } else {
                Decimal::ZERO
            },
        }
    }

    fn policy() -> SnapshotPolicy {
        SnapshotPolicy {
            match_rate: Decimal::new(5, 1),
            match_cap: Decimal::new(4, 2),
            match_min_tenure_years: 1,
        }
    }

    fn baseline() -> Snapshot {
        Snapshot::from_baseline(
            2024,
            &[
                employee("A", 50_000, true),
                employee("B", 60_000, false),
                employee("C", 70_000, false),
            ],
            &policy(),
        )
        .unwrap()
    }

    fn draft(id: &str, month: u32, payload: EventPayload) -> EventDraft {
        EventDraft {
            employee_id: EmployeeId::new(id),
            effective_date: date(2025, month, 1),
            payload,
        }
    }

    fn year_2025_events() -> Vec<Event> {
        assign_sequence(
            2025,
            vec![
                draft(
                    "C",
                    4,
                    EventPayload::Termination {
                        compensation: Decimal::new(70_000, 0),
                    },
                ),
                draft(
                    "B",
                    1,
                    EventPayload::Merit {
                        previous_compensation: Decimal::new(60_000, 0),
                        new_compensation: Decimal::new(62_400, 0),
                        merit_rate: Decimal::new(2, 2),
                        cola_rate: Decimal::new(2, 2),
                    },
                ),
                draft(
                    "NH_2025_000001",
                    3,
                    EventPayload::Hire {
                        birth_date: date(2000, 1, 1),
                        level: 1,
                        compensation: Decimal::new(45_000, 0),
                    },
                ),
                draft(
                    "NH_2025_000002",
                    2,
                    EventPayload::Hire {
                        birth_date: date(1998, 1, 1),
                        level: 1,
                        compensation: Decimal::new(46_000, 0),
                    },
                ),
                draft(
                    "NH_2025_000002",
                    9,
                    EventPayload::NewHireTermination {
                        compensation: Decimal::new(46_000, 0),
                    },
                ),
                draft(
                    "B",
                    1,
                    EventPayload::Enrollment {
                        deferral_rate: Decimal::new(3, 2),
                        source: EnrollmentSource::AutoEnrollment,
                    },
                ),
                draft(
                    "A",
                    1,
                    EventPayload::Escalation {
                        previous_rate: Decimal::new(6, 2),
                        new_rate: Decimal::new(7, 2),
                    },
                ),
            ],
        )
    }

    #[test]
    fn baseline_rows_are_continuous_active_with_derived_fields() {
        let snapshot = baseline();
        let a = snapshot.row(&EmployeeId::new("A")).unwrap();
        assert_eq!(a.status, DetailedStatus::ContinuousActive);
        assert_eq!(a.age, 39);
        assert_eq!(a.tenure_years, 9);
        // 0.5 * min(0.06, 0.04) * 50000
        assert_eq!(a.employer_match, Decimal::new(1_000, 0));
        assert_eq!(snapshot.active_count(), 3);
    }

    #[test]
    fn duplicate_baseline_ids_are_rejected() {
        let result = Snapshot::from_baseline(
            2024,
            &[employee("A", 1, false), employee("A", 2, false)],
            &policy(),
        );
        assert!(matches!(result, Err(SnapshotError::DuplicateEntity { .. })));
    }

    #[test]
    fn apply_year_derives_statuses() {
        let next = baseline()
            .apply_year(2025, &year_2025_events(), &policy())
            .unwrap();

        let status = |id: &str| next.row(&EmployeeId::new(id)).unwrap().status;
        assert_eq!(status("A"), DetailedStatus::ContinuousActive);
        assert_eq!(status("C"), DetailedStatus::ExperiencedTermination);
        assert_eq!(status("NH_2025_000001"), DetailedStatus::NewHireActive);
        assert_eq!(status("NH_2025_000002"), DetailedStatus::NewHireTermination);

        let b = next.row(&EmployeeId::new("B")).unwrap();
        assert_eq!(b.compensation, Decimal::new(62_400, 0));
        assert!(b.enrolled);
        assert_eq!(b.contribution_rate, Decimal::new(3, 2));

        let summary = next.summary().unwrap();
        assert_eq!(summary.starting_headcount, 3);
        assert_eq!(summary.hires, 2);
        assert_eq!(summary.experienced_terminations, 1);
        assert_eq!(summary.new_hire_terminations, 1);
        assert_eq!(summary.active_headcount, 3);
        // Mass balance: 3 + 2 - 1 - 1.
        assert_eq!(next.active_count(), 3);
    }

    #[test]
    fn terminated_rows_drop_out_the_following_year() {
        let y2025 = baseline()
            .apply_year(2025, &year_2025_events(), &policy())
            .unwrap();
        let y2026 = y2025.apply_year(2026, &[], &policy()).unwrap();
        assert!(y2026.row(&EmployeeId::new("C")).is_none());
        assert_eq!(y2026.len(), 3);
        let nh = y2026.row(&EmployeeId::new("NH_2025_000001")).unwrap();
        assert_eq!(nh.status, DetailedStatus::ContinuousActive);
    }

    #[test]
    fn before_value_mismatch_is_rejected() {
        let events = assign_sequence(
            2025,
            vec![draft(
                "A",
                2,
                EventPayload::Merit {
                    previous_compensation: Decimal::new(1, 0),
                    new_compensation: Decimal::new(2, 0),
                    merit_rate: Decimal::ZERO,
                    cola_rate: Decimal::ZERO,
                },
            )],
        );
        let result = baseline().apply_year(2025, &events, &policy());
        assert!(matches!(result, Err(SnapshotError::BeforeValueMismatch { .. })));
    }

    #[test]
    fn events_after_termination_are_rejected() {
        let events = assign_sequence(
            2025,
            vec![
                draft(
                    "C",
                    2,
                    EventPayload::Termination {
                        compensation: Decimal::new(70_000, 0),
                    },
                ),
                draft(
                    "C",
                    3,
                    EventPayload::Termination {
                        compensation: Decimal::new(70_000, 0),
                    },
                ),
            ],
        );
        let result = baseline().apply_year(2025, &events, &policy());
        assert!(matches!(result, Err(SnapshotError::InvalidEvent { .. })));
    }

    #[test]
    fn unknown_entity_is_rejected() {
        let events = assign_sequence(
            2025,
            vec![draft(
                "ZZZ",
                2,
                EventPayload::Termination {
                    compensation: Decimal::ZERO,
                },
            )],
        );
        let result = baseline().apply_year(2025, &events, &policy());
        assert!(matches!(result, Err(SnapshotError::UnknownEntity { .. })));
    }

    #[test]
    fn years_must_be_consecutive() {
        let result = baseline().apply_year(2026, &[], &policy());
        assert!(matches!(result, Err(SnapshotError::YearMismatch { .. })));
    }

    #[test]
    fn reconstruct_requires_every_partition() {
        let mut log = EventLog::new();
        log.append_year(2025, year_2025_events()).unwrap();

        let replayed = Snapshot::reconstruct(&baseline(), &log, 2025, &policy()).unwrap();
        let direct = baseline()
            .apply_year(2025, &year_2025_events(), &policy())
            .unwrap();
        assert_eq!(replayed.digest().unwrap(), direct.digest().unwrap());

        let missing = Snapshot::reconstruct(&baseline(), &log, 2026, &policy());
        assert!(matches!(
            missing,
            Err(SnapshotError::MissingPartition { year: 2026 })
        ));
    }

    #[test]
    fn reconstruction_is_idempotent() {
        let mut log = EventLog::new();
        log.append_year(2025, year_2025_events()).unwrap();
        let first = Snapshot::reconstruct(&baseline(), &log, 2025, &policy()).unwrap();
        let second = Snapshot::reconstruct(&baseline(), &log, 2025, &policy()).unwrap();
        assert_eq!(first, second);
        assert!(first.is_consistent());
    }
}
