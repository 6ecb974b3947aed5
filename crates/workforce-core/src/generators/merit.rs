//! Merit and cost-of-living raises.
//!
//! Runs after promotion so that a promoted employee's raise uses the new
//! level's merit rate and compounds on the promoted salary.

use std::collections::BTreeMap;

use rayon::prelude::*;
use rust_decimal::Decimal;

use workforce_types::{Employee, EmployeeId, EventDraft, EventKind, EventPayload};

use super::selection::{Candidate, select_independent};
use super::{EventGenerator, GenerationContext, GeneratorError, StageOutputs, raise, terminated_ids};
use crate::draw::DrawStream;

/// Generates [`EventKind::Merit`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeritGenerator;

impl EventGenerator for MeritGenerator {
    fn kind(&self) -> EventKind {
        EventKind::Merit
    }

    fn dependencies(&self) -> &'static [EventKind] {
        &[EventKind::Termination, EventKind::Promotion]
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        upstream: &StageOutputs,
    ) -> Result<Vec<EventDraft>, GeneratorError> {
        let stage = EventKind::Merit;
        let terminated = terminated_ids(upstream.require(stage, EventKind::Termination)?);
        let promoted: BTreeMap<&EmployeeId, (u8, Decimal)> = upstream
            .require(stage, EventKind::Promotion)?
            .iter()
            .filter_map(|draft| match draft.payload {
                EventPayload::Promotion {
                    new_level,
                    new_compensation,
                    ..
                } => Some((&draft.employee_id, (new_level, new_compensation))),
                _ => None,
            })
            .collect();

        // Post-promotion view of every survivor.
        let survivors: Vec<Employee> = ctx
            .population
            .iter()
            .filter(|e| !terminated.contains(&e.id))
            .map(|e| match promoted.get(&e.id) {
                Some((level, compensation)) => Employee {
                    level: *level,
                    compensation: *compensation,
                    ..e.clone()
                },
                None => e.clone(),
            })
            .collect();

        let as_of = ctx.year_start();
        let candidates = survivors
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

        let compensation = &ctx.config.compensation;
        let effective_date = compensation.merit_effective.in_year(ctx.year).ok_or_else(|| {
            GeneratorError::MissingPolicy {
                stage,
                what: "compensation.merit_effective".to_owned(),
            }
        })?;

        select_independent(&candidates)
            .into_iter()
            .filter_map(|index| survivors.get(index))
            .map(|employee| {
                let merit_rate = compensation
                    .merit_rates
                    .get(&employee.level)
                    .copied()
                    .ok_or_else(|| GeneratorError::MissingPolicy {
                        stage,
                        what: format!("compensation.merit_rates.{}", employee.level),
                    })?;
                let total_rate = merit_rate
                    .checked_add(compensation.cola_rate)
                    .ok_or(GeneratorError::Arithmetic {
                        stage,
                        field: "merit rate",
                    })?;
                let new_compensation =
                    raise(employee.compensation, total_rate).ok_or(GeneratorError::Arithmetic {
                        stage,
                        field: "merit compensation",
                    })?;
                Ok(EventDraft {
                    employee_id: employee.id.clone(),
                    effective_date,
                    payload: EventPayload::Merit {
                        previous_compensation: employee.compensation,
                        new_compensation,
                        merit_rate,
                        cola_rate: compensation.cola_rate,
                    },
                })
            })
            .collect()
    }
}
