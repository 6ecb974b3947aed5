//! Numeric invariants checked at the end of every year.
//!
//! Mass balance is exact and always fatal:
//!
//! ```text
//! ending == starting + hires − experienced_terminations − new_hire_terminations
//! ```
//!
//! The realized experienced-termination rate and growth rate are compared
//! with their targets. A deviation beyond `rate_tolerance` is recorded in
//! the [`ValidationReport`] for review and fails the year only when
//! `strict_rate_validation` is set.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use workforce_types::EventKind;

use crate::config::WorkforceConfig;

/// A numeric invariant that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// Ending headcount does not equal starting headcount plus hires minus
    /// terminations.
    #[error("mass balance violated: expected {expected} active employees, found {actual}")]
    MassBalance {
        /// Headcount implied by the event counts.
        expected: i64,
        /// Headcount in the snapshot.
        actual: i64,
    },

    /// The experienced-termination rate is outside tolerance.
    #[error("termination rate {actual} deviates from {target} by more than {tolerance}")]
    TerminationRate {
        /// Realized rate.
        actual: Decimal,
        /// Configured rate.
        target: Decimal,
        /// Allowed absolute deviation.
        tolerance: Decimal,
    },

    /// The growth rate is outside tolerance.
    #[error("growth rate {actual} deviates from {target} by more than {tolerance}")]
    GrowthRate {
        /// Realized rate.
        actual: Decimal,
        /// Configured rate.
        target: Decimal,
        /// Allowed absolute deviation.
        tolerance: Decimal,
    },
}

impl InvariantViolation {
    /// Whether the violation fails the year.
    pub const fn is_fatal(&self, strict: bool) -> bool {
        match self {
            Self::MassBalance { .. } => true,
            Self::TerminationRate { .. } | Self::GrowthRate { .. } => strict,
        }
    }
}

/// Headcount flows and invariant outcomes for one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Simulation year.
    pub year: i32,
    /// Active at the end of the prior year.
    pub starting_headcount: u32,
    /// Active at the end of this year.
    pub ending_headcount: u32,
    /// Hires this year.
    pub hires: u32,
    /// Terminations of pre-existing employees.
    pub experienced_terminations: u32,
    /// Terminations of this year's hires.
    pub new_hire_terminations: u32,
    /// `experienced_terminations / starting_headcount`.
    pub termination_rate: Decimal,
    /// `(ending − starting) / starting`.
    pub growth_rate: Decimal,
    /// Invariants that did not hold.
    pub violations: Vec<InvariantViolation>,
}

impl ValidationReport {
    /// Whether every invariant held.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// The first violation that fails the year, if any.
    pub fn first_fatal(&self, strict: bool) -> Option<&InvariantViolation> {
        self.violations.iter().find(|v| v.is_fatal(strict))
    }
}

fn ratio(numerator: i64, denominator: u32) -> Decimal {
    if denominator == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(numerator)
        .checked_div(Decimal::from(denominator))
        .map_or(Decimal::ZERO, |r| r.round_dp(6))
}

fn outside(actual: Decimal, target: Decimal, tolerance: Decimal) -> bool {
    actual
        .checked_sub(target)
        .is_none_or(|deviation| deviation.abs() > tolerance)
}

/// Check the year's invariants from the starting headcount, the event
/// counts by kind and the ending headcount.
pub fn validate_year(
    year: i32,
    starting_headcount: u32,
    ending_headcount: u32,
    counts: &BTreeMap<EventKind, u32>,
    workforce: &WorkforceConfig,
) -> ValidationReport {
    let count = |kind| counts.get(&kind).copied().unwrap_or(0);
    let hires = count(EventKind::Hire);
    let experienced_terminations = count(EventKind::Termination);
    let new_hire_terminations = count(EventKind::NewHireTermination);

    let mut violations = Vec::new();

    let expected = i64::from(starting_headcount)
        .saturating_add(i64::from(hires))
        .saturating_sub(i64::from(experienced_terminations))
        .saturating_sub(i64::from(new_hire_terminations));
    let actual = i64::from(ending_headcount);
    if expected != actual {
        violations.push(InvariantViolation::MassBalance { expected, actual });
    }

    let termination_rate = ratio(i64::from(experienced_terminations), starting_headcount);
    let growth_rate = ratio(
        actual.saturating_sub(i64::from(starting_headcount)),
        starting_headcount,
    );
    let tolerance = workforce.rate_tolerance;

    if starting_headcount > 0 {
        if outside(termination_rate, workforce.termination_rate, tolerance) {
            violations.push(InvariantViolation::TerminationRate {
                actual: termination_rate,
                target: workforce.termination_rate,
                tolerance,
            });
        }
        if outside(growth_rate, workforce.target_growth_rate, tolerance) {
            violations.push(InvariantViolation::GrowthRate {
                actual: growth_rate,
                target: workforce.target_growth_rate,
                tolerance,
            });
        }
    }

    for violation in &violations {
        tracing::warn!(year, %violation, "invariant violation");
    }

    ValidationReport {
        year,
        starting_headcount,
        ending_headcount,
        hires,
        experienced_terminations,
        new_hire_terminations,
        termination_rate,
        growth_rate,
        violations,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn counts(terminations: u32, hires: u32, nh_terminations: u32) -> BTreeMap<EventKind, u32> {
        BTreeMap::from([
            (EventKind::Termination, terminations),
            (EventKind::Hire, hires),
            (EventKind::NewHireTermination, nh_terminations),
            (EventKind::Merit, 800),
        ])
    }

    #[test]
    fn reference_year_is_clean() {
        let report =
            validate_year(2025, 1000, 1030, &counts(120, 200, 50), &WorkforceConfig::default());
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.termination_rate, Decimal::new(12, 2));
        assert_eq!(report.growth_rate, Decimal::new(3, 2));
    }

    #[test]
    fn mass_balance_is_always_fatal() {
        let report =
            validate_year(2025, 1000, 1031, &counts(120, 200, 50), &WorkforceConfig::default());
        let violation = report.first_fatal(false).unwrap();
        assert_eq!(
            *violation,
            InvariantViolation::MassBalance {
                expected: 1030,
                actual: 1031
            }
        );
    }

    #[test]
    fn rate_deviation_is_fatal_only_when_strict() {
        // 140 / 1000 = 14% against a 12% target.
        let report =
            validate_year(2025, 1000, 1010, &counts(140, 200, 50), &WorkforceConfig::default());
        assert!(!report.is_clean());
        assert!(report.first_fatal(false).is_none());
        assert!(matches!(
            report.first_fatal(true),
            Some(InvariantViolation::TerminationRate { .. })
        ));
    }

    #[test]
    fn empty_population_has_no_rate_checks() {
        let report = validate_year(2025, 0, 0, &BTreeMap::new(), &WorkforceConfig::default());
        assert!(report.is_clean());
    }
}
