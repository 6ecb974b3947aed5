//! Event generators.
//!
//! One generator per event kind, each a pure function of the prior-year
//! population, the hazard table, the draw function, the configuration and
//! the output of the generators that ran before it in the same year.
//!
//! # Causal order
//!
//! | Stage | Reads |
//! |-------|-------|
//! | termination | population |
//! | promotion | termination |
//! | merit | termination, promotion |
//! | hire | termination |
//! | new-hire termination | hire |
//! | enrollment | termination, hire, new-hire termination |
//! | escalation | termination, enrollment |
//!
//! A generator whose upstream output is absent fails with
//! [`GeneratorError::DependencyOrdering`] instead of reading an empty list.

pub mod enrollment;
pub mod escalation;
pub mod hiring;
pub mod merit;
pub mod new_hire_termination;
pub mod promotion;
pub mod selection;
pub mod termination;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;

use workforce_types::{AccumulatorRecord, Employee, EmployeeId, EventDraft, EventKind, EventPayload};

use crate::config::SimulationConfig;
use crate::draw::DrawFunction;
use crate::hazard::{HazardError, HazardTable};

pub use enrollment::EnrollmentGenerator;
pub use escalation::EscalationGenerator;
pub use hiring::HiringGenerator;
pub use merit::MeritGenerator;
pub use new_hire_termination::NewHireTerminationGenerator;
pub use promotion::PromotionGenerator;
pub use termination::TerminationGenerator;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a generator.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// A generator ran before one of its upstream stages.
    #[error("{stage} generator requires {missing} output, which has not been produced")]
    DependencyOrdering {
        /// The generator that was about to run.
        stage: EventKind,
        /// The upstream stage whose output is missing.
        missing: EventKind,
    },

    /// Two generators in one pipeline produce the same kind.
    #[error("{stage} generator appears twice in the pipeline")]
    DuplicateStage {
        /// The repeated stage.
        stage: EventKind,
    },

    /// A hazard lookup failed.
    #[error("{stage} hazard lookup failed: {source}")]
    Hazard {
        /// The generator that failed.
        stage: EventKind,
        /// The underlying lookup error.
        source: HazardError,
    },

    /// An existing employee has no accumulator record for the prior year.
    #[error("{stage} generator found no prior-year state for {employee_id}")]
    MissingPriorState {
        /// The generator that failed.
        stage: EventKind,
        /// The employee without a record.
        employee_id: EmployeeId,
    },

    /// A policy value needed at run time is absent.
    #[error("{stage} generator is missing policy value {what}")]
    MissingPolicy {
        /// The generator that failed.
        stage: EventKind,
        /// Description of the missing value.
        what: String,
    },

    /// Decimal arithmetic overflowed.
    #[error("{stage} generator overflowed computing {field}")]
    Arithmetic {
        /// The generator that failed.
        stage: EventKind,
        /// Value being computed.
        field: &'static str,
    },

    /// A weighted distribution could not be sampled.
    #[error("{stage} generator cannot sample {what}: {reason}")]
    Sampling {
        /// The generator that failed.
        stage: EventKind,
        /// Distribution being sampled.
        what: &'static str,
        /// Underlying reason.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Context and stage outputs
// ---------------------------------------------------------------------------

/// Everything a generator may read for one simulation year.
///
/// `population` is the set of entities active at the end of the prior year
/// (identifier order) and `prior_state` is the accumulator output for the
/// prior year. Nothing from the current year's log or snapshot is visible.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    /// Year being generated.
    pub year: i32,
    /// Run configuration.
    pub config: &'a SimulationConfig,
    /// Shared hazard table.
    pub hazard: &'a HazardTable,
    /// Deterministic draw function.
    pub draws: DrawFunction,
    /// Entities active at the start of the year.
    pub population: &'a [Employee],
    /// Accumulator records for the prior year.
    pub prior_state: &'a BTreeMap<EmployeeId, AccumulatorRecord>,
}

impl GenerationContext<'_> {
    /// January 1st of the generated year; hazard lookups use ages and
    /// tenures as of this date.
    pub fn year_start(&self) -> NaiveDate {
        workforce_types::year_start(self.year)
    }

    /// December 31st of the generated year.
    pub fn year_end(&self) -> NaiveDate {
        workforce_types::year_end(self.year)
    }

    /// Number of days in the generated year.
    pub fn days_in_year(&self) -> u64 {
        let days = self
            .year_end()
            .signed_duration_since(self.year_start())
            .num_days()
            .saturating_add(1);
        u64::try_from(days).unwrap_or(365)
    }

    /// `year_start + offset` days, clamped to the year.
    pub fn day_of_year(&self, offset: u64) -> NaiveDate {
        self.year_start()
            .checked_add_days(Days::new(offset))
            .map_or(self.year_end(), |date| date.min(self.year_end()))
    }
}

/// Output of the generators that have run so far this year.
#[derive(Debug, Default, Clone)]
pub struct StageOutputs {
    stages: BTreeMap<EventKind, Vec<EventDraft>>,
}

impl StageOutputs {
    /// No stage has run yet.
    pub const fn new() -> Self {
        Self {
            stages: BTreeMap::new(),
        }
    }

    /// Output of `dependency`, or a dependency-ordering error naming `stage`.
    pub fn require(
        &self,
        stage: EventKind,
        dependency: EventKind,
    ) -> Result<&[EventDraft], GeneratorError> {
        self.stages
            .get(&dependency)
            .map(Vec::as_slice)
            .ok_or(GeneratorError::DependencyOrdering {
                stage,
                missing: dependency,
            })
    }

    /// Whether `stage` has produced output (possibly empty).
    pub fn contains(&self, stage: EventKind) -> bool {
        self.stages.contains_key(&stage)
    }

    /// Record a stage's output.
    pub fn insert(
        &mut self,
        stage: EventKind,
        drafts: Vec<EventDraft>,
    ) -> Result<(), GeneratorError> {
        if self.stages.contains_key(&stage) {
            return Err(GeneratorError::DuplicateStage { stage });
        }
        self.stages.insert(stage, drafts);
        Ok(())
    }

    /// Draft count per stage.
    pub fn counts(&self) -> BTreeMap<EventKind, u32> {
        self.stages
            .iter()
            .map(|(kind, drafts)| (*kind, u32::try_from(drafts.len()).unwrap_or(u32::MAX)))
            .collect()
    }

    /// All drafts, concatenated in causal order.
    pub fn into_drafts(self) -> Vec<EventDraft> {
        self.stages.into_values().flatten().collect()
    }

    /// All drafts in causal order, borrowed.
    pub fn drafts(&self) -> impl Iterator<Item = &EventDraft> {
        self.stages.values().flatten()
    }
}

// ---------------------------------------------------------------------------
// Generator trait and pipeline
// ---------------------------------------------------------------------------

/// A per-kind event generator.
pub trait EventGenerator: Send + Sync {
    /// The kind of events produced.
    fn kind(&self) -> EventKind;

    /// Stages whose output must exist before this one runs.
    fn dependencies(&self) -> &'static [EventKind];

    /// Produce this year's drafts for the kind, in a deterministic order.
    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        upstream: &StageOutputs,
    ) -> Result<Vec<EventDraft>, GeneratorError>;
}

/// The seven generators in causal order.
pub fn standard_pipeline() -> Vec<Box<dyn EventGenerator>> {
    vec![
        Box::new(TerminationGenerator),
        Box::new(PromotionGenerator),
        Box::new(MeritGenerator),
        Box::new(HiringGenerator),
        Box::new(NewHireTerminationGenerator),
        Box::new(EnrollmentGenerator),
        Box::new(EscalationGenerator),
    ]
}

/// Run `pipeline` in order, failing fast on a missing dependency.
pub fn run_pipeline(
    pipeline: &[Box<dyn EventGenerator>],
    ctx: &GenerationContext<'_>,
) -> Result<StageOutputs, GeneratorError> {
    let mut outputs = StageOutputs::new();
    for generator in pipeline {
        let stage = generator.kind();
        for dependency in generator.dependencies() {
            outputs.require(stage, *dependency)?;
        }
        let drafts = generator.generate(ctx, &outputs)?;
        tracing::debug!(year = ctx.year, stage = %stage, events = drafts.len(), "stage generated");
        outputs.insert(stage, drafts)?;
    }
    Ok(outputs)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Identifiers of every entity terminated by the given drafts.
pub(crate) fn terminated_ids(drafts: &[EventDraft]) -> BTreeSet<&EmployeeId> {
    drafts
        .iter()
        .filter(|d| d.kind().is_terminal())
        .map(|d| &d.employee_id)
        .collect()
}

/// The entity a hire draft creates, as of its hire date.
pub(crate) fn hired_employee(draft: &EventDraft) -> Option<Employee> {
    match &draft.payload {
        EventPayload::Hire {
            birth_date,
            level,
            compensation,
        } => Some(Employee {
            id: draft.employee_id.clone(),
            birth_date: *birth_date,
            hire_date: draft.effective_date,
            level: *level,
            compensation: *compensation,
            enrolled: false,
            contribution_rate: Decimal::ZERO,
        }),
        _ => None,
    }
}

/// `amount × (1 + rate)` rounded to the cent.
pub(crate) fn raise(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    let factor = Decimal::ONE.checked_add(rate)?;
    amount.checked_mul(factor).map(|value| value.round_dp(2))
}

pub(crate) fn count_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::fixtures::{hazard, population, prior_state};
    use super::*;

    #[test]
    fn pipeline_runs_in_causal_order() {
        let kinds: Vec<EventKind> = standard_pipeline().iter().map(|g| g.kind()).collect();
        assert_eq!(kinds, EventKind::CAUSAL_ORDER.to_vec());
    }

    #[test]
    fn out_of_order_pipeline_fails_fast() {
        let config = SimulationConfig::default();
        let table = hazard(&config);
        let people = population(50);
        let prior = prior_state(&people, 2024);
        let ctx = GenerationContext {
            year: 2025,
            config: &config,
            hazard: &table,
            draws: DrawFunction::new(42),
            population: &people,
            prior_state: &prior,
        };
        let pipeline: Vec<Box<dyn EventGenerator>> =
            vec![Box::new(TerminationGenerator), Box::new(MeritGenerator)];
        let err = run_pipeline(&pipeline, &ctx).unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::DependencyOrdering {
                stage: EventKind::Merit,
                missing: EventKind::Promotion
            }
        ));
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let mut outputs = StageOutputs::new();
        outputs.insert(EventKind::Hire, Vec::new()).unwrap();
        assert!(matches!(
            outputs.insert(EventKind::Hire, Vec::new()),
            Err(GeneratorError::DuplicateStage { .. })
        ));
    }

    #[test]
    fn raise_rounds_to_the_cent() {
        assert_eq!(
            raise(Decimal::new(50_000, 0), Decimal::new(5, 2)),
            Some(Decimal::new(52_500, 0))
        );
    }

    #[test]
    fn day_of_year_is_clamped() {
        let config = SimulationConfig::default();
        let table = hazard(&config);
        let prior = BTreeMap::new();
        let ctx = GenerationContext {
            year: 2024,
            config: &config,
            hazard: &table,
            draws: DrawFunction::new(1),
            population: &[],
            prior_state: &prior,
        };
        assert_eq!(ctx.days_in_year(), 366);
        assert_eq!(ctx.day_of_year(0), fixtures::date(2024, 1, 1));
        assert_eq!(ctx.day_of_year(365), fixtures::date(2024, 12, 31));
        assert_eq!(ctx.day_of_year(900), fixtures::date(2024, 12, 31));
    }
}
