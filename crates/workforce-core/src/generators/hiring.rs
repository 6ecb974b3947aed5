//! Hiring.
//!
//! The hire count replaces this year's terminations, adds the growth target
//! and grosses the total up for expected new-hire attrition:
//!
//! ```text
//! hires = ceil((terminations + growth × starting_headcount) / (1 − new_hire_attrition))
//! ```
//!
//! The arithmetic is done in [`Decimal`] so that it never undershoots
//! because of binary rounding. Demographics are sampled from a `ChaCha8`
//! stream seeded from `SHA-256(seed, year, "hire")`.

use chrono::{Days, Months, NaiveDate};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use workforce_types::{EmployeeId, EventDraft, EventKind, EventPayload};

use super::{EventGenerator, GenerationContext, GeneratorError, StageOutputs, count_u32};
use crate::config::{CompensationConfig, WorkforceConfig};
use crate::draw::derive_seed;

/// Generates [`EventKind::Hire`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiringGenerator;

/// Number of hires needed for the year.
pub fn hire_count(
    workforce: &WorkforceConfig,
    terminations: u32,
    starting_headcount: u32,
) -> Option<u32> {
    let growth = workforce
        .target_growth_rate
        .checked_mul(Decimal::from(starting_headcount))?;
    let needed = Decimal::from(terminations).checked_add(growth)?;
    let retained_share = Decimal::ONE.checked_sub(workforce.new_hire_termination_rate)?;
    let gross = needed.checked_div(retained_share)?.ceil();
    if gross <= Decimal::ZERO {
        Some(0)
    } else {
        gross.to_u32()
    }
}

/// Uniform compensation within the band for `level`, to the cent.
fn sample_compensation(
    rng: &mut ChaCha8Rng,
    compensation: &CompensationConfig,
    level: u8,
) -> Option<Decimal> {
    let band = compensation.band(level)?;
    let span_cents = band
        .max
        .checked_sub(band.min)?
        .checked_mul(Decimal::ONE_HUNDRED)?
        .floor()
        .to_i64()?;
    let offset = rng.random_range(0..=span_cents.max(0));
    band.min.checked_add(Decimal::new(offset, 2))
}

impl EventGenerator for HiringGenerator {
    fn kind(&self) -> EventKind {
        EventKind::Hire
    }

    fn dependencies(&self) -> &'static [EventKind] {
        &[EventKind::Termination]
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        upstream: &StageOutputs,
    ) -> Result<Vec<EventDraft>, GeneratorError> {
        let stage = EventKind::Hire;
        let terminations = count_u32(upstream.require(stage, EventKind::Termination)?.len());
        let headcount = count_u32(ctx.population.len());
        let hires = hire_count(&ctx.config.workforce, terminations, headcount).ok_or(
            GeneratorError::Arithmetic {
                stage,
                field: "hire count",
            },
        )?;

        let new_hire = &ctx.config.new_hire;
        let ages: Vec<u32> = new_hire.age_weights.keys().copied().collect();
        let age_dist = WeightedIndex::new(new_hire.age_weights.values().copied()).map_err(|e| {
            GeneratorError::Sampling {
                stage,
                what: "new_hire.age_weights",
                reason: e.to_string(),
            }
        })?;
        let levels: Vec<u8> = new_hire.level_weights.keys().copied().collect();
        let level_dist =
            WeightedIndex::new(new_hire.level_weights.values().copied()).map_err(|e| {
                GeneratorError::Sampling {
                    stage,
                    what: "new_hire.level_weights",
                    reason: e.to_string(),
                }
            })?;

        let mut rng = ChaCha8Rng::from_seed(derive_seed(ctx.draws.seed(), ctx.year, "hire"));
        let days = ctx.days_in_year();
        let mut drafts = Vec::with_capacity(usize::try_from(hires).unwrap_or(0));

        for ordinal in 1..=hires {
            let age = ages.get(age_dist.sample(&mut rng)).copied().unwrap_or(25);
            let level = levels.get(level_dist.sample(&mut rng)).copied().unwrap_or(1);
            let compensation = sample_compensation(&mut rng, &ctx.config.compensation, level)
                .ok_or_else(|| GeneratorError::MissingPolicy {
                    stage,
                    what: format!("compensation.level_bands.{level}"),
                })?;
            let hire_date = ctx.day_of_year(rng.random_range(0..days));
            let birth_date = birth_date_for(hire_date, age, rng.random_range(0..365_u64)).ok_or(
                GeneratorError::Arithmetic {
                    stage,
                    field: "birth date",
                },
            )?;

            drafts.push(EventDraft {
                employee_id: EmployeeId::new_hire(ctx.year, ordinal),
                effective_date: hire_date,
                payload: EventPayload::Hire {
                    birth_date,
                    level,
                    compensation,
                },
            });
        }

        tracing::debug!(
            year = ctx.year,
            terminations,
            headcount,
            hires,
            "hires generated"
        );
        Ok(drafts)
    }
}

/// A birth date that makes the hire exactly `age` years old (plus up to
/// `extra_days`) on `hire_date`.
fn birth_date_for(hire_date: NaiveDate, age: u32, extra_days: u64) -> Option<NaiveDate> {
    hire_date
        .checked_sub_months(Months::new(age.checked_mul(12)?))?
        .checked_sub_days(Days::new(extra_days))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Datelike;

    use super::super::fixtures::{hazard, population, prior_state};
    use super::*;
    use crate::config::SimulationConfig;
    use crate::draw::DrawFunction;

    #[test]
    fn hire_count_matches_reference_scenario() {
        let workforce = WorkforceConfig::default();
        // (120 + 0.03 × 1000) / 0.75 = 200
        assert_eq!(hire_count(&workforce, 120, 1000), Some(200));
        // (118 + 30) / 0.75 = 197.33 -> 198, never undershoots
        assert_eq!(hire_count(&workforce, 118, 1000), Some(198));
        assert_eq!(hire_count(&workforce, 0, 0), Some(0));
    }

    #[test]
    fn shrinking_workforce_hires_nobody() {
        let workforce = WorkforceConfig {
            target_growth_rate: Decimal::new(-20, 2),
            ..WorkforceConfig::default()
        };
        assert_eq!(hire_count(&workforce, 50, 1000), Some(0));
    }

    fn generate(seed: u64) -> Vec<EventDraft> {
        let config = SimulationConfig::default();
        let table = hazard(&config);
        let people = population(1000);
        let prior = prior_state(&people, 2024);
        let ctx = GenerationContext {
            year: 2025,
            config: &config,
            hazard: &table,
            draws: DrawFunction::new(seed),
            population: &people,
            prior_state: &prior,
        };
        let mut upstream = StageOutputs::new();
        let terminations: Vec<EventDraft> = people
            .iter()
            .take(120)
            .map(|e| EventDraft {
                employee_id: e.id.clone(),
                effective_date: ctx.year_start(),
                payload: EventPayload::Termination {
                    compensation: e.compensation,
                },
            })
            .collect();
        upstream.insert(EventKind::Termination, terminations).unwrap();
        HiringGenerator.generate(&ctx, &upstream).unwrap()
    }

    #[test]
    fn hires_are_well_formed() {
        let config = SimulationConfig::default();
        let drafts = generate(42);
        assert_eq!(drafts.len(), 200);

        let ids: BTreeSet<_> = drafts.iter().map(|d| d.employee_id.clone()).collect();
        assert_eq!(ids.len(), 200);
        assert_eq!(drafts.first().unwrap().employee_id.as_str(), "NH_2025_000001");

        for draft in &drafts {
            assert_eq!(draft.effective_date.year(), 2025);
            let EventPayload::Hire {
                birth_date,
                level,
                compensation,
            } = draft.payload
            else {
                panic!("expected hire payload");
            };
            assert!(config.new_hire.level_weights.contains_key(&level));
            let band = config.compensation.band(level).unwrap();
            assert!(compensation >= band.min && compensation <= band.max);
            let age = draft.effective_date.years_since(birth_date).unwrap();
            assert!(config.new_hire.age_weights.contains_key(&age));
        }
    }

    #[test]
    fn hires_are_reproducible_per_seed() {
        assert_eq!(generate(42), generate(42));
        assert_ne!(generate(42), generate(7));
    }
}
