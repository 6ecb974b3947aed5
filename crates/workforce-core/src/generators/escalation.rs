//! Automatic deferral escalation.
//!
//! Eligible: survived termination, enrolled as of the prior-year record,
//! below the rate cap and the escalation limit, and past the delay since
//! enrollment. Employees enrolled before the simulation began have no
//! enrollment date and are treated as past the delay. Anyone enrolling
//! this year is skipped. Escalation never pushes a rate above the cap.

use std::collections::BTreeSet;

use rayon::prelude::*;

use workforce_types::{AccumulatorRecord, Employee, EventDraft, EventKind, EventPayload};

use super::selection::{Candidate, select_independent};
use super::{EventGenerator, GenerationContext, GeneratorError, StageOutputs, terminated_ids};
use crate::draw::DrawStream;

/// Generates [`EventKind::Escalation`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationGenerator;

impl EventGenerator for EscalationGenerator {
    fn kind(&self) -> EventKind {
        EventKind::Escalation
    }

    fn dependencies(&self) -> &'static [EventKind] {
        &[EventKind::Termination, EventKind::Enrollment]
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        upstream: &StageOutputs,
    ) -> Result<Vec<EventDraft>, GeneratorError> {
        let stage = EventKind::Escalation;
        let terminated = terminated_ids(upstream.require(stage, EventKind::Termination)?);
        let enrolling: BTreeSet<_> = upstream
            .require(stage, EventKind::Enrollment)?
            .iter()
            .map(|d| &d.employee_id)
            .collect();
        let policy = &ctx.config.escalation;
        if !policy.enabled {
            return Ok(Vec::new());
        }

        let effective_date =
            policy
                .effective
                .in_year(ctx.year)
                .ok_or_else(|| GeneratorError::MissingPolicy {
                    stage,
                    what: "escalation.effective".to_owned(),
                })?;
        let year_end = ctx.year_end();

        let mut eligible: Vec<(&Employee, &AccumulatorRecord)> = Vec::new();
        for employee in ctx.population.iter().filter(|e| !terminated.contains(&e.id)) {
            let prior = ctx.prior_state.get(&employee.id).ok_or_else(|| {
                GeneratorError::MissingPriorState {
                    stage,
                    employee_id: employee.id.clone(),
                }
            })?;
            let past_delay = prior.enrollment_date.is_none_or(|enrolled_on| {
                effective_date
                    .years_since(enrolled_on)
                    .is_some_and(|years| years >= policy.delay_years)
            });
            if prior.enrolled
                && past_delay
                && prior.contribution_rate < policy.cap
                && prior.escalation_count < policy.max_escalations
                && employee.tenure_at(year_end) >= policy.min_tenure_years
                && !enrolling.contains(&employee.id)
            {
                eligible.push((employee, prior));
            }
        }

        let candidates = eligible
            .par_iter()
            .map(|(employee, _)| {
                let probability = ctx
                    .hazard
                    .probability(stage, employee, year_end)
                    .map_err(|source| GeneratorError::Hazard { stage, source })?;
                let draw = ctx
                    .draws
                    .draw(&employee.id, ctx.year, DrawStream::Select(stage));
                Ok(Candidate { probability, draw })
            })
            .collect::<Result<Vec<_>, GeneratorError>>()?;

        select_independent(&candidates)
            .into_iter()
            .filter_map(|index| eligible.get(index))
            .map(|(employee, prior)| {
                let raised = prior.contribution_rate.checked_add(policy.increment).ok_or(
                    GeneratorError::Arithmetic {
                        stage,
                        field: "escalated rate",
                    },
                )?;
                Ok(EventDraft {
                    employee_id: employee.id.clone(),
                    effective_date,
                    payload: EventPayload::Escalation {
                        previous_rate: prior.contribution_rate,
                        new_rate: raised.min(policy.cap),
                    },
                })
            })
            .collect()
    }
}
