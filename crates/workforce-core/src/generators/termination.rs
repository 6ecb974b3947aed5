//! Experienced terminations.
//!
//! Every entity active at the start of the year carries a hazard weight.
//! The weights are calibrated so that the expected count equals
//! `termination_rate × starting headcount`, and selection is then
//! rebalanced into the tolerance band (see [`super::selection`]).

use rayon::prelude::*;

use workforce_types::{EventDraft, EventKind, EventPayload};

use super::selection::{Candidate, SelectionTarget, select_calibrated};
use super::{
    EventGenerator, GenerationContext, GeneratorError, StageOutputs, count_u32,
};
use crate::draw::DrawStream;

/// Generates [`EventKind::Termination`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminationGenerator;

impl EventGenerator for TerminationGenerator {
    fn kind(&self) -> EventKind {
        EventKind::Termination
    }

    fn dependencies(&self) -> &'static [EventKind] {
        &[]
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        _upstream: &StageOutputs,
    ) -> Result<Vec<EventDraft>, GeneratorError> {
        let stage = EventKind::Termination;
        let as_of = ctx.year_start();
        let candidates = ctx
            .population
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

        let headcount = count_u32(ctx.population.len());
        let workforce = &ctx.config.workforce;
        let target = SelectionTarget::for_rate(
            workforce.termination_rate,
            workforce.rate_tolerance,
            headcount,
        )
        .ok_or(GeneratorError::Arithmetic {
            stage,
            field: "termination target",
        })?;

        let days = ctx.days_in_year();
        let drafts: Vec<EventDraft> = select_calibrated(&candidates, target)
            .into_iter()
            .filter_map(|index| ctx.population.get(index))
            .map(|employee| {
                let offset = ctx
                    .draws
                    .offset(&employee.id, ctx.year, DrawStream::TerminationDate, days);
                EventDraft {
                    employee_id: employee.id.clone(),
                    effective_date: ctx.day_of_year(offset),
                    payload: EventPayload::Termination {
                        compensation: employee.compensation,
                    },
                }
            })
            .collect();

        tracing::debug!(
            year = ctx.year,
            headcount,
            target = target.target,
            lower = target.lower,
            upper = target.upper,
            selected = drafts.len(),
            "terminations selected"
        );
        Ok(drafts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Datelike;

    use super::super::fixtures::{hazard, population, prior_state};
    use super::*;
    use crate::config::SimulationConfig;
    use crate::draw::DrawFunction;

    fn run(seed: u64, n: u32) -> Vec<EventDraft> {
        let config = SimulationConfig::default();
        let table = hazard(&config);
        let people = population(n);
        let prior = prior_state(&people, 2024);
        let ctx = GenerationContext {
            year: 2025,
            config: &config,
            hazard: &table,
            draws: DrawFunction::new(seed),
            population: &people,
            prior_state: &prior,
        };
        TerminationGenerator
            .generate(&ctx, &StageOutputs::new())
            .unwrap()
    }

    #[test]
    fn count_is_within_tolerance_of_target() {
        let drafts = run(42, 1000);
        assert!((115..=125).contains(&drafts.len()), "got {}", drafts.len());
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(run(42, 500), run(42, 500));
        assert_ne!(run(42, 500), run(43, 500));
    }

    #[test]
    fn dates_fall_inside_the_year() {
        for draft in run(42, 1000) {
            assert_eq!(draft.effective_date.year(), 2025);
            assert_eq!(draft.kind(), EventKind::Termination);
        }
    }

    #[test]
    fn empty_population_terminates_nobody() {
        assert!(run(42, 0).is_empty());
    }
}
