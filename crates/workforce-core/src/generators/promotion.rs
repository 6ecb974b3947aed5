//! Promotions.
//!
//! Eligible: survived termination, completed the minimum tenure, below the
//! maximum level and younger than the age ceiling. Selected entities move
//! up one level with a raise of `promotion_increase`, floored at the new
//! level's band minimum.

use rayon::prelude::*;
use rust_decimal::Decimal;

use workforce_types::{Employee, EventDraft, EventKind, EventPayload};

use super::selection::{Candidate, select_independent};
use super::{EventGenerator, GenerationContext, GeneratorError, StageOutputs, raise, terminated_ids};
use crate::draw::DrawStream;

/// Generates [`EventKind::Promotion`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromotionGenerator;

impl EventGenerator for PromotionGenerator {
    fn kind(&self) -> EventKind {
        EventKind::Promotion
    }

    fn dependencies(&self) -> &'static [EventKind] {
        &[EventKind::Termination]
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        upstream: &StageOutputs,
    ) -> Result<Vec<EventDraft>, GeneratorError> {
        let stage = EventKind::Promotion;
        let terminated = terminated_ids(upstream.require(stage, EventKind::Termination)?);
        let policy = &ctx.config.promotion;
        let as_of = ctx.year_start();

        let eligible: Vec<&Employee> = ctx
            .population
            .iter()
            .filter(|e| !terminated.contains(&e.id))
            .filter(|e| e.tenure_at(as_of) >= policy.min_tenure_years)
            .filter(|e| e.level < policy.max_level)
            .filter(|e| e.age_at(as_of) < policy.age_ceiling)
            .collect();

        let candidates = eligible
            .par_iter()
            .map(|employee| {
                let probability = ctx
                    .hazard
                    .probability(stage, employee, as_of)
                    .map_err(|source| GeneratorError::Hazard { stage, source })?;
                let draw = ctx
                    .draws
                    .draw(&employee.id, ctx.year, DrawStream::Select(stage));
                Ok(Candidate { probability, draw })
            })
            .collect::<Result<Vec<_>, GeneratorError>>()?;

        let effective_date =
            policy
                .effective
                .in_year(ctx.year)
                .ok_or_else(|| GeneratorError::MissingPolicy {
                    stage,
                    what: "promotion.effective".to_owned(),
                })?;

        select_independent(&candidates)
            .into_iter()
            .filter_map(|index| eligible.get(index).copied())
            .map(|employee| {
                let new_level = employee.level.saturating_add(1);
                let band_min = ctx
                    .config
                    .compensation
                    .band(new_level)
                    .map(|band| band.min)
                    .ok_or_else(|| GeneratorError::MissingPolicy {
                        stage,
                        what: format!("compensation.level_bands.{new_level}"),
                    })?;
                let increase = ctx.config.compensation.promotion_increase;
                let raised = raise(employee.compensation, increase)
                    .ok_or(GeneratorError::Arithmetic {
                        stage,
                        field: "promotion compensation",
                    })?;
                Ok(EventDraft {
                    employee_id: employee.id.clone(),
                    effective_date,
                    payload: EventPayload::Promotion {
                        previous_level: employee.level,
                        new_level,
                        previous_compensation: employee.compensation,
                        new_compensation: raised.max(band_min).max(Decimal::ZERO),
                    },
                })
            })
            .collect()
    }
}
