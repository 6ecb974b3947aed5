//! The hazard table.
//!
//! Built once per run from [`HazardConfig`] and shared read-only by every
//! generator. The table is materialised for every
//! (kind, age band, tenure band, level) combination at build time, so a
//! missing multiplier is reported before any year runs instead of being
//! silently treated as 1.0 halfway through a simulation.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use workforce_types::{AgeBand, Employee, EventKind, TenureBand};

use crate::config::HazardConfig;

/// Errors raised while building or querying the hazard table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HazardError {
    /// No base rate for an event kind.
    #[error("hazard table has no base rate for {kind}")]
    MissingBaseRate {
        /// Event kind without a base rate.
        kind: EventKind,
    },

    /// A multiplier dimension has no entry for a key.
    #[error("hazard table has no {dimension} multiplier for {kind} at {key}")]
    MissingMultiplier {
        /// Event kind being materialised.
        kind: EventKind,
        /// Which table ("age", "tenure" or "level").
        dimension: &'static str,
        /// The missing key.
        key: String,
    },

    /// A base rate or multiplier is negative or not finite.
    #[error("hazard {dimension} value for {kind} at {key} must be finite and non-negative")]
    InvalidValue {
        /// Event kind being materialised.
        kind: EventKind,
        /// Which table the value came from.
        dimension: &'static str,
        /// Key of the offending value.
        key: String,
    },

    /// A lookup for a combination the table was not built for.
    #[error("no hazard entry for {kind} ({age_band:?}, {tenure_band:?}, level {level})")]
    MissingEntry {
        /// Event kind.
        kind: EventKind,
        /// Age band.
        age_band: AgeBand,
        /// Tenure band.
        tenure_band: TenureBand,
        /// Level.
        level: u8,
    },
}

type HazardKey = (EventKind, AgeBand, TenureBand, u8);

/// Immutable, fully materialised lookup of event probabilities.
#[derive(Debug, Clone)]
pub struct HazardTable {
    base_rates: BTreeMap<EventKind, f64>,
    multipliers: BTreeMap<HazardKey, f64>,
    max_level: u8,
}

impl HazardTable {
    /// Materialise the table for levels `1..=max_level`.
    pub fn build(config: &HazardConfig, max_level: u8) -> Result<Self, HazardError> {
        let mut base_rates = BTreeMap::new();
        let mut multipliers = BTreeMap::new();

        for kind in EventKind::HAZARD_KINDS {
            let base = *config
                .base_rates
                .get(&kind)
                .ok_or(HazardError::MissingBaseRate { kind })?;
            check_value(kind, "base", "rate", base)?;
            base_rates.insert(kind, base);

            let ages = config.age_multipliers.get(&kind);
            let tenures = config.tenure_multipliers.get(&kind);
            let levels = config.level_multipliers.get(&kind);

            for age_band in AgeBand::ALL {
                let age = lookup(
                    kind,
                    "age",
                    format!("{age_band:?}"),
                    ages.and_then(|t| t.get(&age_band)),
                )?;
                for tenure_band in TenureBand::ALL {
                    let tenure = lookup(
                        kind,
                        "tenure",
                        format!("{tenure_band:?}"),
                        tenures.and_then(|t| t.get(&tenure_band)),
                    )?;
                    for level in 1..=max_level {
                        let dampening = lookup(
                            kind,
                            "level",
                            format!("level {level}"),
                            levels.and_then(|t| t.get(&level)),
                        )?;
                        let key = (kind, age_band, tenure_band, level);
                        multipliers.insert(key, age * tenure * dampening);
                    }
                }
            }
        }

        tracing::debug!(entries = multipliers.len(), max_level, "hazard table materialised");
        Ok(Self {
            base_rates,
            multipliers,
            max_level,
        })
    }

    /// Highest level the table covers.
    pub const fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Number of materialised (kind, age, tenure, level) entries.
    pub fn len(&self) -> usize {
        self.multipliers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.multipliers.is_empty()
    }

    /// Combined age × tenure × level factor.
    pub fn multiplier(
        &self,
        kind: EventKind,
        age_band: AgeBand,
        tenure_band: TenureBand,
        level: u8,
    ) -> Result<f64, HazardError> {
        self.multipliers
            .get(&(kind, age_band, tenure_band, level))
            .copied()
            .ok_or(HazardError::MissingEntry {
                kind,
                age_band,
                tenure_band,
                level,
            })
    }

    /// Probability of `kind` for `employee` given their age and tenure on
    /// `as_of`, clamped to `[0, 1]`.
    pub fn probability(
        &self,
        kind: EventKind,
        employee: &Employee,
        as_of: NaiveDate,
    ) -> Result<f64, HazardError> {
        let base = self
            .base_rates
            .get(&kind)
            .copied()
            .ok_or(HazardError::MissingBaseRate { kind })?;
        let factor = self.multiplier(
            kind,
            employee.age_band_at(as_of),
            employee.tenure_band_at(as_of),
            employee.level,
        )?;
        Ok((base * factor).clamp(0.0, 1.0))
    }
}

fn check_value(
    kind: EventKind,
    dimension: &'static str,
    key: &str,
    value: f64,
) -> Result<(), HazardError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(HazardError::InvalidValue {
            kind,
            dimension,
            key: key.to_owned(),
        })
    }
}

fn lookup(
    kind: EventKind,
    dimension: &'static str,
    key: String,
    value: Option<&f64>,
) -> Result<f64, HazardError> {
    let value = *value.ok_or_else(|| HazardError::MissingMultiplier {
        kind,
        dimension,
        key: key.clone(),
    })?;
    check_value(kind, dimension, &key, value)?;
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use rust_decimal::Decimal;
    use workforce_types::EmployeeId;

    use super::*;

    fn employee(level: u8) -> Employee {
        Employee {
            id: EmployeeId::new("EMP_000001"),
            birth_date: NaiveDate::from_ymd_opt(1995, 1, 1).unwrap(),
            hire_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            level,
            compensation: Decimal::new(50_000, 0),
            enrolled: false,
            contribution_rate: Decimal::ZERO,
        }
    }

    #[test]
    fn default_table_is_complete() {
        let table = HazardTable::build(&HazardConfig::default(), 5).unwrap();
        assert_eq!(table.len(), 6 * 6 * 5 * 5);
        assert_eq!(table.max_level(), 5);
    }

    #[test]
    fn probability_multiplies_factors() {
        let table = HazardTable::build(&HazardConfig::default(), 5).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        // Age 30 (25_34: 1.2), tenure 0 (under_2: 1.6), level 1 (1.1).
        let p = table
            .probability(EventKind::Termination, &employee(1), as_of)
            .unwrap();
        let expected = 0.12 * 1.2 * 1.6 * 1.1;
        assert!((p - expected).abs() < 1e-12);
    }

    #[test]
    fn probability_is_clamped() {
        let mut config = HazardConfig::default();
        config.base_rates.insert(EventKind::Promotion, 5.0);
        let table = HazardTable::build(&config, 5).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let p = table
            .probability(EventKind::Promotion, &employee(1), as_of)
            .unwrap();
        assert_eq!(p, 1.0);
    }

    #[test]
    fn missing_multiplier_fails_at_build_time() {
        let mut config = HazardConfig::default();
        config
            .age_multipliers
            .get_mut(&EventKind::Merit)
            .unwrap()
            .remove(&AgeBand::From45To54);
        let err = HazardTable::build(&config, 5).unwrap_err();
        assert!(matches!(
            err,
            HazardError::MissingMultiplier {
                kind: EventKind::Merit,
                dimension: "age",
                ..
            }
        ));
    }

    #[test]
    fn missing_level_fails_when_max_level_grows() {
        let err = HazardTable::build(&HazardConfig::default(), 6).unwrap_err();
        assert!(matches!(err, HazardError::MissingMultiplier { dimension: "level", .. }));
    }

    #[test]
    fn missing_base_rate_is_an_error() {
        let mut config = HazardConfig::default();
        config.base_rates.remove(&EventKind::Escalation);
        assert!(matches!(
            HazardTable::build(&config, 5),
            Err(HazardError::MissingBaseRate {
                kind: EventKind::Escalation
            })
        ));
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        let mut config = HazardConfig::default();
        config
            .tenure_multipliers
            .get_mut(&EventKind::Termination)
            .unwrap()
            .insert(TenureBand::From5To9, -0.5);
        assert!(matches!(
            HazardTable::build(&config, 5),
            Err(HazardError::InvalidValue { .. })
        ));
    }

    #[test]
    fn lookup_beyond_max_level_is_an_error() {
        let table = HazardTable::build(&HazardConfig::default(), 5).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(
            table.probability(EventKind::Merit, &employee(9), as_of),
            Err(HazardError::MissingEntry { level: 9, .. })
        ));
    }
}
