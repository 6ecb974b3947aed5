//! Plan enrollment.
//!
//! Eligible: active at year end, not enrolled according to the prior-year
//! accumulator record, and at least `eligibility_waiting_days` of service
//! by December 31st. The deferral rate is the automatic-enrollment default
//! when automatic enrollment is on, otherwise the voluntary default for the
//! employee's age band. The effective date is the later of January 1st and
//! the end of the waiting period.

use rayon::prelude::*;
use rust_decimal::Decimal;

use workforce_types::{Employee, EnrollmentSource, EventDraft, EventKind, EventPayload};

use super::selection::{Candidate, select_independent};
use super::{
    EventGenerator, GenerationContext, GeneratorError, StageOutputs, hired_employee, terminated_ids,
};
use crate::draw::DrawStream;

/// Generates [`EventKind::Enrollment`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrollmentGenerator;

impl EventGenerator for EnrollmentGenerator {
    fn kind(&self) -> EventKind {
        EventKind::Enrollment
    }

    fn dependencies(&self) -> &'static [EventKind] {
        &[
            EventKind::Termination,
            EventKind::Hire,
            EventKind::NewHireTermination,
        ]
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        upstream: &StageOutputs,
    ) -> Result<Vec<EventDraft>, GeneratorError> {
        let stage = EventKind::Enrollment;
        let terminated = terminated_ids(upstream.require(stage, EventKind::Termination)?);
        let hire_drafts = upstream.require(stage, EventKind::Hire)?;
        let left_early = terminated_ids(upstream.require(stage, EventKind::NewHireTermination)?);
        let plan = &ctx.config.plan;
        let year_end = ctx.year_end();
        let waiting = i64::from(plan.eligibility_waiting_days);

        // Existing employees who are not yet participants.
        let mut eligible: Vec<Employee> = Vec::new();
        for employee in ctx.population.iter().filter(|e| !terminated.contains(&e.id)) {
            let prior = ctx.prior_state.get(&employee.id).ok_or_else(|| {
                GeneratorError::MissingPriorState {
                    stage,
                    employee_id: employee.id.clone(),
                }
            })?;
            if !prior.enrolled && employee.service_days_at(year_end) >= waiting {
                eligible.push(employee.clone());
            }
        }
        // This year's hires who are still employed.
        eligible.extend(
            hire_drafts
                .iter()
                .filter(|d| !left_early.contains(&d.employee_id))
                .filter_map(hired_employee)
                .filter(|e| e.service_days_at(year_end) >= waiting),
        );

        let candidates = eligible
            .par_iter()
            .map(|employee| {
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

        let year_start = ctx.year_start();
        let drafts: Vec<EventDraft> = select_independent(&candidates)
            .into_iter()
            .filter_map(|index| eligible.get(index))
            .map(|employee| {
                let (deferral_rate, source): (Decimal, EnrollmentSource) = if plan.auto_enrollment {
                    (plan.auto_enrollment_rate, EnrollmentSource::AutoEnrollment)
                } else {
                    (
                        plan.default_rate(employee.age_band_at(year_end)),
                        EnrollmentSource::Voluntary,
                    )
                };
                let eligible_on = employee
                    .hire_date
                    .checked_add_days(chrono::Days::new(u64::from(plan.eligibility_waiting_days)))
                    .unwrap_or(year_end);
                EventDraft {
                    employee_id: employee.id.clone(),
                    effective_date: eligible_on.clamp(year_start, year_end),
                    payload: EventPayload::Enrollment {
                        deferral_rate,
                        source,
                    },
                }
            })
            .collect();

        tracing::debug!(
            year = ctx.year,
            eligible = eligible.len(),
            enrolled = drafts.len(),
            "enrollments selected"
        );
        Ok(drafts)
    }
}
