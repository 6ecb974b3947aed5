//! Baseline census: loading, validation, synthesis and normalization.
//!
//! The baseline is the workforce as of December 31st of the year before the
//! first simulated year. It is either read from a JSON census file or
//! synthesized deterministically from the run seed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{Days, Months, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use workforce_types::{Employee, EmployeeId, year_end};

use crate::config::{PlanConfig, SimulationConfig};
use crate::draw::derive_seed;

/// Errors raised while loading or validating a census.
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    /// The census file could not be read.
    #[error("cannot read census {path}: {source}")]
    Io {
        /// Census file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The census file is not a JSON array of employees.
    #[error("census {path} is malformed: {source}")]
    Json {
        /// Census file.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A row has an empty identifier.
    #[error("census row {row} has an empty employee id")]
    BlankId {
        /// Zero-based row index.
        row: usize,
    },

    /// An identifier falls in the synthetic new-hire namespace of a
    /// simulated year.
    #[error("{employee_id} is reserved for hires in simulated year {year}")]
    ReservedId {
        /// The reserved identifier.
        employee_id: EmployeeId,
        /// Simulated year that owns the namespace.
        year: i32,
    },

    /// An identifier appears twice.
    #[error("census contains {employee_id} more than once")]
    DuplicateId {
        /// The repeated identifier.
        employee_id: EmployeeId,
    },

    /// A row's level is outside `1..=max_level`.
    #[error("{employee_id} has level {level}, expected 1..={max_level}")]
    LevelOutOfRange {
        /// The employee.
        employee_id: EmployeeId,
        /// Level on the row.
        level: u8,
        /// Highest configured level.
        max_level: u8,
    },

    /// A row has negative compensation.
    #[error("{employee_id} has negative compensation {compensation}")]
    NegativeCompensation {
        /// The employee.
        employee_id: EmployeeId,
        /// Compensation on the row.
        compensation: Decimal,
    },

    /// A row's deferral rate is outside `[0, 1]`, or non-zero without
    /// enrollment.
    #[error("{employee_id} has invalid deferral rate {rate} (enrolled: {enrolled})")]
    InvalidRate {
        /// The employee.
        employee_id: EmployeeId,
        /// Rate on the row.
        rate: Decimal,
        /// Enrollment flag on the row.
        enrolled: bool,
    },

    /// A row's dates are out of order or after the baseline date.
    #[error("{employee_id} has inconsistent dates (born {birth_date}, hired {hire_date})")]
    InvalidDates {
        /// The employee.
        employee_id: EmployeeId,
        /// Birth date on the row.
        birth_date: NaiveDate,
        /// Hire date on the row.
        hire_date: NaiveDate,
    },
}

/// Read a census from a JSON file containing an array of employees.
pub fn load_census(path: &Path) -> Result<Vec<Employee>, BaselineError> {
    let contents = std::fs::read_to_string(path).map_err(|source| BaselineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| BaselineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Check a census against the configuration before any year runs.
pub fn validate(employees: &[Employee], config: &SimulationConfig) -> Result<(), BaselineError> {
    let max_level = config.promotion.max_level;
    let as_of = year_end(config.baseline_year());
    let years = config.years();
    let mut seen: BTreeSet<&EmployeeId> = BTreeSet::new();

    for (row, employee) in employees.iter().enumerate() {
        let id = &employee.id;
        if id.is_blank() {
            return Err(BaselineError::BlankId { row });
        }
        if let Some(year) = id.new_hire_year().filter(|year| years.contains(year)) {
            return Err(BaselineError::ReservedId {
                employee_id: id.clone(),
                year,
            });
        }
        if !seen.insert(id) {
            return Err(BaselineError::DuplicateId {
                employee_id: id.clone(),
            });
        }
        if employee.level == 0 || employee.level > max_level {
            return Err(BaselineError::LevelOutOfRange {
                employee_id: id.clone(),
                level: employee.level,
                max_level,
            });
        }
        if employee.compensation < Decimal::ZERO {
            return Err(BaselineError::NegativeCompensation {
                employee_id: id.clone(),
                compensation: employee.compensation,
            });
        }
        let rate = employee.contribution_rate;
        let in_range = rate >= Decimal::ZERO && rate <= Decimal::ONE;
        if !in_range || (!employee.enrolled && rate > Decimal::ZERO) {
            return Err(BaselineError::InvalidRate {
                employee_id: id.clone(),
                rate,
                enrolled: employee.enrolled,
            });
        }
        if employee.birth_date > employee.hire_date || employee.hire_date > as_of {
            return Err(BaselineError::InvalidDates {
                employee_id: id.clone(),
                birth_date: employee.birth_date,
                hire_date: employee.hire_date,
            });
        }
    }
    Ok(())
}

/// Apply baseline deferral seeding so the baseline snapshot and the seeded
/// accumulator start from the same rates. Output is in identifier order.
pub fn normalize(employees: &[Employee], baseline_year: i32, plan: &PlanConfig) -> Vec<Employee> {
    let as_of = year_end(baseline_year);
    let mut normalized: Vec<Employee> = employees
        .iter()
        .map(|employee| Employee {
            contribution_rate: plan.seed_rate(
                employee.enrolled,
                employee.contribution_rate,
                employee.age_band_at(as_of),
            ),
            ..employee.clone()
        })
        .collect();
    normalized.sort_by(|a, b| a.id.cmp(&b.id));
    normalized
}

/// Generate a deterministic census of `size` employees.
///
/// Ages run 22 to 64, tenure is capped by age, level rises with tenure and
/// compensation is uniform within the level's band. About two thirds of the
/// workforce participates, at rates between 1% and 10%.
pub fn synthesize(size: u32, config: &SimulationConfig) -> Vec<Employee> {
    let year = config.baseline_year();
    let as_of = year_end(year);
    let max_level = config.promotion.max_level.max(1);
    let mut rng = ChaCha8Rng::from_seed(derive_seed(config.simulation.seed, year, "baseline"));

    (1..=size)
        .map(|ordinal| {
            let age: u32 = rng.random_range(22..=64);
            let tenure: u32 = rng.random_range(0..=age.saturating_sub(21).min(35));
            let birth_date = years_before(as_of, age, rng.random_range(0..365));
            let hire_date = years_before(as_of, tenure, rng.random_range(0..365)).max(birth_date);

            let by_tenure = u8::try_from(tenure.checked_div(6).unwrap_or(0)).unwrap_or(u8::MAX);
            let bump: u8 = rng.random_range(0..=1);
            let level = by_tenure
                .saturating_add(bump)
                .saturating_add(1)
                .min(max_level);
            let compensation = config.compensation.band(level).map_or(Decimal::ZERO, |band| {
                let span = band
                    .max
                    .checked_sub(band.min)
                    .and_then(|s| s.floor().to_i64())
                    .unwrap_or(0)
                    .max(0);
                band.min
                    .checked_add(Decimal::from(rng.random_range(0..=span)))
                    .unwrap_or(band.min)
            });

            let enrolled = rng.random_bool(2.0 / 3.0);
            let contribution_rate = if enrolled {
                Decimal::new(rng.random_range(1..=10), 2)
            } else {
                Decimal::ZERO
            };

            Employee {
                id: EmployeeId::new(format!("EMP_{ordinal:06}")),
                birth_date,
                hire_date,
                level,
                compensation,
                enrolled,
                contribution_rate,
            }
        })
        .collect()
}

fn years_before(date: NaiveDate, years: u32, extra_days: u64) -> NaiveDate {
    years
        .checked_mul(12)
        .and_then(|months| date.checked_sub_months(Months::new(months)))
        .and_then(|d| d.checked_sub_days(Days::new(extra_days)))
        .unwrap_or(date)
}
