//! New-hire terminations.
//!
//! Only entities hired this year are considered. Selection uses its own
//! stream tag and the same calibration and band rebalancing as experienced
//! terminations, with target `round(hires × new_hire_termination_rate)`.
//! The effective date falls between the hire date and December 31st.

use rayon::prelude::*;

use workforce_types::{Employee, EventDraft, EventKind, EventPayload};

use super::selection::{Candidate, SelectionTarget, select_calibrated};
use super::{
    EventGenerator, GenerationContext, GeneratorError, StageOutputs, count_u32,
    hired_employee,
};
use crate::draw::DrawStream;

/// Generates [`EventKind::NewHireTermination`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewHireTerminationGenerator;

impl EventGenerator for NewHireTerminationGenerator {
    fn kind(&self) -> EventKind {
        EventKind::NewHireTermination
    }

    fn dependencies(&self) -> &'static [EventKind] {
        &[EventKind::Hire]
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        upstream: &StageOutputs,
    ) -> Result<Vec<EventDraft>, GeneratorError> {
        let stage = EventKind::NewHireTermination;
        let hires: Vec<Employee> = upstream
            .require(stage, EventKind::Hire)?
            .iter()
            .filter_map(hired_employee)
            .collect();

        let candidates = hires
            .par_iter()
            .map(|employee| {
                let probability = ctx
                    .hazard
                    .probability(stage, employee, employee.hire_date)
                    .map_err(|source| GeneratorError::Hazard { stage, source })?;
                let draw = ctx
                    .draws
                    .draw(&employee.id, ctx.year, DrawStream::Select(stage));
                Ok(Candidate { probability, draw })
            })
            .collect::<Result<Vec<_>, GeneratorError>>()?;

        let hired = count_u32(hires.len());
        let workforce = &ctx.config.workforce;
        let target = SelectionTarget::for_rate(
            workforce.new_hire_termination_rate,
            workforce.rate_tolerance,
            hired,
        )
        .ok_or(GeneratorError::Arithmetic {
            stage,
            field: "new-hire termination target",
        })?;

        let year_end = ctx.year_end();
        let drafts: Vec<EventDraft> = select_calibrated(&candidates, target)
            .into_iter()
            .filter_map(|index| hires.get(index))
            .map(|employee| {
                let remaining = year_end
                    .signed_duration_since(employee.hire_date)
                    .num_days()
                    .max(0);
                let span = u64::try_from(remaining).unwrap_or(0).saturating_add(1);
                let offset = ctx.draws.offset(
                    &employee.id,
                    ctx.year,
                    DrawStream::NewHireTerminationDate,
                    span,
                );
                let effective_date = employee
                    .hire_date
                    .checked_add_days(chrono::Days::new(offset))
                    .map_or(year_end, |date| date.min(year_end));
                EventDraft {
                    employee_id: employee.id.clone(),
                    effective_date,
                    payload: EventPayload::NewHireTermination {
                        compensation: employee.compensation,
                    },
                }
            })
            .collect();

        tracing::debug!(
            year = ctx.year,
            hired,
            target = target.target,
            selected = drafts.len(),
            "new-hire terminations selected"
        );
        Ok(drafts)
    }
}
