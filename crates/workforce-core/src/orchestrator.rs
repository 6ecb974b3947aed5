//! Multi-year orchestration.
//!
//! The [`Orchestrator`] drives one year at a time through a fixed sequence
//! of phases:
//!
//! ```text
//! Initialized ─▶ ValidatingPriorYear ─▶ GeneratingEvents ─▶ AccumulatingState
//!                      ▲                                          │
//!                      │                                          ▼
//!                 Checkpointed ◀──────────────────── ReconstructingSnapshot
//!                      │
//!                      ▼
//!                  Completed          (Failed is reachable from any phase)
//! ```
//!
//! Everything a year produces is staged first: events, accumulator records,
//! snapshot, validation report and checkpoint. Only after the checkpoint is
//! stored are the event log, accumulator and current snapshot updated, so a
//! failed year leaves the last committed year untouched and can be rerun
//! from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use workforce_events::{EventLog, Snapshot, SnapshotPolicy, assign_sequence};
use workforce_types::{Employee, EventKind, SnapshotSummary};

use crate::accumulator::TemporalStateAccumulator;
use crate::baseline;
use crate::checkpoint::{CheckpointStore, YearCheckpoint};
use crate::config::SimulationConfig;
use crate::control::RunControl;
use crate::draw::DrawFunction;
use crate::error::SimulationError;
use crate::generators::{
    EventGenerator, GenerationContext, GeneratorError, run_pipeline, standard_pipeline,
};
use crate::hazard::HazardTable;
use crate::invariants::{ValidationReport, validate_year};
use crate::quality;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorPhase {
    /// Built, no year started.
    Initialized,
    /// Checking that the prior year is complete.
    ValidatingPriorYear,
    /// Running the generator pipeline.
    GeneratingEvents,
    /// Folding events into accumulator state.
    AccumulatingState,
    /// Applying events to the prior snapshot.
    ReconstructingSnapshot,
    /// The year is committed and checkpointed.
    Checkpointed,
    /// Every configured year is committed.
    Completed,
    /// The last year failed; nothing from it was committed.
    Failed,
}

impl OrchestratorPhase {
    /// Whether `next` may follow `self`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Failed)
                | (
                    Self::Initialized | Self::Checkpointed | Self::Failed,
                    Self::ValidatingPriorYear
                )
                | (Self::Initialized, Self::Checkpointed)
                | (Self::ValidatingPriorYear, Self::GeneratingEvents)
                | (Self::GeneratingEvents, Self::AccumulatingState)
                | (Self::AccumulatingState, Self::ReconstructingSnapshot)
                | (Self::ReconstructingSnapshot, Self::Checkpointed)
                | (Self::Checkpointed, Self::Completed)
        )
    }
}

impl core::fmt::Display for OrchestratorPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::ValidatingPriorYear => "validating_prior_year",
            Self::GeneratingEvents => "generating_events",
            Self::AccumulatingState => "accumulating_state",
            Self::ReconstructingSnapshot => "reconstructing_snapshot",
            Self::Checkpointed => "checkpointed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one year.
#[derive(Debug)]
pub struct YearResult {
    /// Simulation year.
    pub year: i32,
    /// Whether the year was committed.
    pub success: bool,
    /// Events produced, by kind.
    pub event_counts: BTreeMap<EventKind, u32>,
    /// End-of-year aggregates, when the snapshot was built.
    pub snapshot_summary: Option<SnapshotSummary>,
    /// Invariant report, when it was computed.
    pub validation: Option<ValidationReport>,
    /// Why the year failed.
    pub error: Option<SimulationError>,
}

impl YearResult {
    fn failed(year: i32, error: SimulationError) -> Self {
        Self {
            year,
            success: false,
            event_counts: BTreeMap::new(),
            snapshot_summary: None,
            validation: None,
            error: Some(error),
        }
    }
}

/// Why a multi-year run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEndReason {
    /// Every configured year is committed.
    Completed,
    /// A stop was requested.
    StopRequested,
    /// A year failed and could not be retried.
    Failed,
}

/// Outcome of [`Orchestrator::run_all`].
#[derive(Debug)]
pub struct RunSummary {
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// Result of every year attempted in this run (final attempt only).
    pub years: Vec<YearResult>,
    /// Most recent committed year.
    pub last_completed_year: Option<i32>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the simulation year by year.
pub struct Orchestrator {
    config: SimulationConfig,
    fingerprint: String,
    policy: SnapshotPolicy,
    hazard: HazardTable,
    draws: DrawFunction,
    pipeline: Vec<Box<dyn EventGenerator>>,
    baseline: Vec<Employee>,
    baseline_snapshot: Snapshot,
    log: EventLog,
    accumulator: TemporalStateAccumulator,
    snapshot: Snapshot,
    store: Box<dyn CheckpointStore>,
    control: RunControl,
    phase: OrchestratorPhase,
}

impl Orchestrator {
    /// Validate the configuration and baseline and seed year-zero state.
    pub fn new(
        config: SimulationConfig,
        employees: &[Employee],
        store: Box<dyn CheckpointStore>,
        control: RunControl,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let fingerprint = config.fingerprint()?;
        let hazard = HazardTable::build(&config.hazard, config.promotion.max_level)?;
        baseline::validate(employees, &config)?;

        let baseline_year = config.baseline_year();
        let policy = config.snapshot_policy();
        let normalized = baseline::normalize(employees, baseline_year, &config.plan);
        let baseline_snapshot = Snapshot::from_baseline(baseline_year, &normalized, &policy)
            .map_err(|source| SimulationError::Snapshot {
                year: baseline_year,
                source,
            })?;
        let accumulator =
            TemporalStateAccumulator::from_baseline(baseline_year, &normalized, &config.plan);

        info!(
            scenario = %config.simulation.name,
            baseline_year,
            headcount = normalized.len(),
            seed = config.simulation.seed,
            "orchestrator initialized"
        );

        Ok(Self {
            draws: DrawFunction::new(config.simulation.seed),
            fingerprint,
            policy,
            hazard,
            pipeline: standard_pipeline(),
            snapshot: baseline_snapshot.clone(),
            baseline: normalized,
            baseline_snapshot,
            log: EventLog::new(),
            accumulator,
            store,
            control,
            phase: OrchestratorPhase::Initialized,
            config,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Run configuration.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current phase.
    pub const fn phase(&self) -> OrchestratorPhase {
        self.phase
    }

    /// Committed events.
    pub const fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Snapshot of the most recent committed year (the baseline before any
    /// year is committed).
    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Baseline snapshot.
    pub const fn baseline_snapshot(&self) -> &Snapshot {
        &self.baseline_snapshot
    }

    /// Normalized baseline population in identifier order.
    pub fn baseline(&self) -> &[Employee] {
        &self.baseline
    }

    /// Committed accumulator state.
    pub const fn accumulator(&self) -> &TemporalStateAccumulator {
        &self.accumulator
    }

    /// Run control handle.
    pub const fn control(&self) -> &RunControl {
        &self.control
    }

    /// Fingerprint of the running configuration.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Next year to run, or `None` when the configured range is done.
    pub fn next_year(&self) -> Option<i32> {
        self.snapshot
            .year
            .checked_add(1)
            .filter(|year| self.config.years().contains(year))
    }

    fn transition(&mut self, next: OrchestratorPhase) -> Result<(), SimulationError> {
        if !self.phase.can_transition_to(next) {
            return Err(SimulationError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Prior-year validation
    // -----------------------------------------------------------------------

    /// Whether the year before `year` is fully committed: its snapshot is
    /// current and internally consistent, its accumulator records exist
    /// and agree with the snapshot headcount, and its event partition is
    /// sealed (unless it is the baseline year).
    pub fn validate_prior_year(&self, year: i32) -> bool {
        self.prior_year_problem(year).is_none()
    }

    fn prior_year_problem(&self, year: i32) -> Option<String> {
        let Some(prior) = year.checked_sub(1) else {
            return Some(format!("year {year} has no prior year"));
        };
        if self.snapshot.year != prior {
            return Some(format!(
                "snapshot for {prior} is missing (latest committed snapshot is {})",
                self.snapshot.year
            ));
        }
        if !self.snapshot.is_consistent() {
            return Some(format!("snapshot for {prior} is incomplete"));
        }
        if prior != self.config.baseline_year() && !self.log.is_sealed(prior) {
            return Some(format!("event partition for {prior} is not sealed"));
        }
        let Some(records) = self.accumulator.records_for_year(prior) else {
            return Some(format!("accumulator state for {prior} is missing"));
        };
        if records.len() != self.snapshot.active_count() {
            return Some(format!(
                "accumulator for {prior} has {} records, snapshot has {} active employees",
                records.len(),
                self.snapshot.active_count()
            ));
        }
        if self.accumulator.records_for_year(year).is_some() || self.log.is_sealed(year) {
            return Some(format!("year {year} is already committed"));
        }
        None
    }

    // -----------------------------------------------------------------------
    // Year execution
    // -----------------------------------------------------------------------

    /// Run one year. The year is committed only if every phase succeeds.
    pub fn run_year(&mut self, year: i32) -> YearResult {
        match self.execute_year(year) {
            Ok(result) => result,
            Err(error) => {
                warn!(year, phase = %self.phase, %error, "year failed");
                self.phase = OrchestratorPhase::Failed;
                YearResult::failed(year, error)
            }
        }
    }

    /// Run one year, rerunning it after retryable failures up to the
    /// configured limit.
    pub fn run_year_with_retry(&mut self, year: i32) -> YearResult {
        let max_retries = self.config.checkpoint.max_retries;
        let mut attempt = 0_u32;
        loop {
            let result = self.run_year(year);
            let retryable = result
                .error
                .as_ref()
                .is_some_and(SimulationError::is_retryable);
            if result.success || !retryable || attempt >= max_retries {
                return result;
            }
            attempt = attempt.saturating_add(1);
            warn!(year, attempt, max_retries, "retrying year from last checkpoint");
        }
    }

    fn execute_year(&mut self, year: i32) -> Result<YearResult, SimulationError> {
        self.transition(OrchestratorPhase::ValidatingPriorYear)?;
        if let Some(reason) = self.prior_year_problem(year) {
            return Err(SimulationError::Dependency { year, reason });
        }
        let prior_year = self.snapshot.year;

        // Generate.
        self.transition(OrchestratorPhase::GeneratingEvents)?;
        let population = self.snapshot.active_employees();
        let prior_state = self
            .accumulator
            .records_for_year(prior_year)
            .ok_or_else(|| SimulationError::Dependency {
                year,
                reason: format!("accumulator state for {prior_year} is missing"),
            })?;
        let ctx = GenerationContext {
            year,
            config: &self.config,
            hazard: &self.hazard,
            draws: self.draws,
            population: &population,
            prior_state,
        };
        let outputs = run_pipeline(&self.pipeline, &ctx).map_err(|source| match source {
            GeneratorError::DependencyOrdering { .. } => SimulationError::Dependency {
                year,
                reason: source.to_string(),
            },
            other => SimulationError::Generator {
                year,
                source: other,
            },
        })?;
        let event_counts = outputs.counts();
        let events = assign_sequence(year, outputs.into_drafts());
        quality::check_events(year, &events).map_err(|source| SimulationError::DataQuality {
            year,
            stage: "events",
            source,
        })?;

        // Accumulate.
        self.transition(OrchestratorPhase::AccumulatingState)?;
        let records = self
            .accumulator
            .compute_year(year, &events)
            .map_err(|source| SimulationError::Accumulator { year, source })?;

        // Reconstruct and validate.
        self.transition(OrchestratorPhase::ReconstructingSnapshot)?;
        let snapshot = self
            .snapshot
            .apply_year(year, &events, &self.policy)
            .map_err(|source| SimulationError::Snapshot { year, source })?;
        quality::check_agreement(&snapshot, &records).map_err(|source| {
            SimulationError::DataQuality {
                year,
                stage: "snapshot agreement",
                source,
            }
        })?;
        let starting = u32::try_from(population.len()).unwrap_or(u32::MAX);
        let ending = u32::try_from(snapshot.active_count()).unwrap_or(u32::MAX);
        let report = validate_year(year, starting, ending, &event_counts, &self.config.workforce);
        if let Some(violation) = report.first_fatal(self.config.workforce.strict_rate_validation) {
            return Err(SimulationError::NumericInvariant {
                year,
                violation: violation.clone(),
            });
        }
        let summary = snapshot
            .summary()
            .map_err(|source| SimulationError::Snapshot { year, source })?;
        self.log
            .validate_append(year, &events)
            .map_err(|source| SimulationError::EventLog { year, source })?;

        // Checkpoint, then commit.
        let checkpoint = YearCheckpoint::capture(
            year,
            self.fingerprint.clone(),
            events.clone(),
            &records,
            snapshot.clone(),
        )
        .map_err(|source| SimulationError::Checkpoint { year, source })?;
        self.store
            .save(&checkpoint)
            .map_err(|source| SimulationError::Checkpoint { year, source })?;

        self.log
            .append_year(year, events)
            .map_err(|source| SimulationError::EventLog { year, source })?;
        self.accumulator
            .commit_year(year, records)
            .map_err(|source| SimulationError::Accumulator { year, source })?;
        self.snapshot = snapshot;
        self.transition(OrchestratorPhase::Checkpointed)?;
        self.control.mark_completed(year);

        info!(
            year,
            starting_headcount = starting,
            ending_headcount = ending,
            hires = report.hires,
            terminations = report.experienced_terminations,
            new_hire_terminations = report.new_hire_terminations,
            violations = report.violations.len(),
            "year committed"
        );

        Ok(YearResult {
            year,
            success: true,
            event_counts,
            snapshot_summary: Some(summary),
            validation: Some(report),
            error: None,
        })
    }

    /// Run every remaining configured year, honouring stop requests at year
    /// boundaries.
    pub fn run_all(&mut self) -> RunSummary {
        let mut years = Vec::new();
        while let Some(year) = self.next_year() {
            if self.control.is_stop_requested() {
                info!(next_year = year, "stop requested, ending run at year boundary");
                return self.summary(RunEndReason::StopRequested, years);
            }
            let result = self.run_year_with_retry(year);
            let success = result.success;
            years.push(result);
            if !success {
                return self.summary(RunEndReason::Failed, years);
            }
        }
        if let Err(error) = self.finish() {
            warn!(%error, "could not mark run completed");
        }
        self.summary(RunEndReason::Completed, years)
    }

    /// Mark the run completed once the last configured year is committed.
    pub fn finish(&mut self) -> Result<(), SimulationError> {
        self.transition(OrchestratorPhase::Completed)?;
        info!(
            final_year = self.snapshot.year,
            events = self.log.len(),
            "simulation completed"
        );
        Ok(())
    }

    fn summary(&self, end_reason: RunEndReason, years: Vec<YearResult>) -> RunSummary {
        RunSummary {
            end_reason,
            years,
            last_completed_year: self.control.last_completed_year(),
        }
    }

    // -----------------------------------------------------------------------
    // Checkpoints and replay
    // -----------------------------------------------------------------------

    /// Load and verify the stored checkpoint for `year`.
    pub fn load_checkpoint(&self, year: i32) -> Result<Option<YearCheckpoint>, SimulationError> {
        let checkpoint = self
            .store
            .load(year)
            .map_err(|source| SimulationError::Checkpoint { year, source })?;
        if let Some(checkpoint) = &checkpoint {
            checkpoint
                .verify(&self.fingerprint)
                .map_err(|source| SimulationError::Checkpoint { year, source })?;
        }
        Ok(checkpoint)
    }

    /// Restore committed state from stored checkpoints.
    ///
    /// Years are restored in order from the first configured year. Each
    /// checkpoint must verify and must replay exactly from the state before
    /// it; the first missing or untrustworthy checkpoint ends the restore
    /// and later years will be rerun. Returns the last restored year.
    pub fn resume(&mut self) -> Result<Option<i32>, SimulationError> {
        if self.phase != OrchestratorPhase::Initialized {
            return Err(SimulationError::InvalidTransition {
                from: self.phase,
                to: OrchestratorPhase::Checkpointed,
            });
        }
        let mut restored = None;
        for year in self.config.years() {
            let checkpoint = match self.load_checkpoint(year) {
                Ok(Some(checkpoint)) => checkpoint,
                Ok(None) => break,
                Err(error) => {
                    warn!(year, %error, "checkpoint rejected, resuming from the year before");
                    break;
                }
            };
            if let Err(error) = self.restore_year(checkpoint) {
                warn!(year, %error, "checkpoint does not replay, resuming from the year before");
                break;
            }
            restored = Some(year);
        }
        if let Some(year) = restored {
            self.transition(OrchestratorPhase::Checkpointed)?;
            self.control.mark_completed(year);
            info!(year, "resumed from checkpoint");
        }
        Ok(restored)
    }

    fn restore_year(&mut self, checkpoint: YearCheckpoint) -> Result<(), SimulationError> {
        let year = checkpoint.year;
        let snapshot = self
            .snapshot
            .apply_year(year, &checkpoint.events, &self.policy)
            .map_err(|source| SimulationError::Snapshot { year, source })?;
        let replayed = snapshot
            .digest()
            .map_err(|source| SimulationError::Snapshot { year, source })?;
        if replayed != checkpoint.snapshot_digest {
            return Err(SimulationError::Dependency {
                year,
                reason: "replayed snapshot differs from checkpoint".to_owned(),
            });
        }
        let records = self
            .accumulator
            .compute_year(year, &checkpoint.events)
            .map_err(|source| SimulationError::Accumulator { year, source })?;
        if records != checkpoint.records() {
            return Err(SimulationError::Dependency {
                year,
                reason: "replayed accumulator differs from checkpoint".to_owned(),
            });
        }
        self.log
            .validate_append(year, &checkpoint.events)
            .map_err(|source| SimulationError::EventLog { year, source })?;

        self.log
            .append_year(year, checkpoint.events)
            .map_err(|source| SimulationError::EventLog { year, source })?;
        self.accumulator
            .commit_year(year, records)
            .map_err(|source| SimulationError::Accumulator { year, source })?;
        self.snapshot = snapshot;
        Ok(())
    }

    /// Rebuild the snapshot for `year` from the baseline and the event log
    /// alone.
    pub fn reconstruct_snapshot(&self, year: i32) -> Result<Snapshot, SimulationError> {
        Snapshot::reconstruct(&self.baseline_snapshot, &self.log, year, &self.policy)
            .map_err(|source| SimulationError::Snapshot { year, source })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use workforce_types::EmployeeId;

    use crate::baseline::BaselineError;
    use crate::checkpoint::MemoryCheckpointStore;

    fn orchestrator(size: u32) -> Orchestrator {
        let mut config = SimulationConfig::default();
        config.simulation.end_year = 2026;
        let census = baseline::synthesize(size, &config);
        Orchestrator::new(
            config,
            &census,
            Box::new(MemoryCheckpointStore::new()),
            RunControl::new(),
        )
        .unwrap()
    }

    #[test]
    fn census_ids_colliding_with_synthetic_hires_are_rejected_up_front() {
        let mut config = SimulationConfig::default();
        config.simulation.end_year = 2026;
        let mut census = baseline::synthesize(20, &config);
        if let Some(first) = census.first_mut() {
            first.id = EmployeeId::new_hire(2025, 1);
        }
        let result = Orchestrator::new(
            config,
            &census,
            Box::new(MemoryCheckpointStore::new()),
            RunControl::new(),
        );
        assert!(matches!(
            result,
            Err(SimulationError::Baseline {
                source: BaselineError::ReservedId { year: 2025, .. },
                ..
            })
        ));
    }

    #[test]
    fn phase_table() {
        use OrchestratorPhase::*;
        assert!(Initialized.can_transition_to(ValidatingPriorYear));
        assert!(Checkpointed.can_transition_to(ValidatingPriorYear));
        assert!(Checkpointed.can_transition_to(Completed));
        assert!(Failed.can_transition_to(ValidatingPriorYear));
        assert!(GeneratingEvents.can_transition_to(Failed));
        assert!(!Initialized.can_transition_to(GeneratingEvents));
        assert!(!Completed.can_transition_to(ValidatingPriorYear));
        assert!(!ReconstructingSnapshot.can_transition_to(Completed));
    }

    #[test]
    fn year_commits_and_checkpoints() {
        let mut orchestrator = orchestrator(300);
        assert!(orchestrator.validate_prior_year(2025));
        assert!(!orchestrator.validate_prior_year(2026));

        let result = orchestrator.run_year(2025);
        assert!(result.success, "{:?}", result.error);
        assert_eq!(orchestrator.phase(), OrchestratorPhase::Checkpointed);
        assert!(orchestrator.event_log().is_sealed(2025));
        assert!(orchestrator.accumulator().records_for_year(2025).is_some());
        assert!(orchestrator.load_checkpoint(2025).unwrap().is_some());
        assert_eq!(orchestrator.next_year(), Some(2026));
        assert!(result.validation.unwrap().first_fatal(false).is_none());
    }

    #[test]
    fn skipping_a_year_is_a_dependency_error() {
        let mut orchestrator = orchestrator(50);
        let result = orchestrator.run_year(2026);
        assert!(!result.success);
        assert!(matches!(result.error, Some(SimulationError::Dependency { year: 2026, .. })));
        assert_eq!(orchestrator.phase(), OrchestratorPhase::Failed);
        assert!(orchestrator.event_log().is_empty());

        // Failed is recoverable: the correct year still runs.
        assert!(orchestrator.run_year(2025).success);
    }

    #[test]
    fn rerunning_a_committed_year_is_rejected() {
        let mut orchestrator = orchestrator(50);
        assert!(orchestrator.run_year(2025).success);
        let again = orchestrator.run_year(2025);
        assert!(!again.success);
        assert!(matches!(again.error, Some(SimulationError::Dependency { .. })));
    }

    #[test]
    fn run_all_completes_every_year() {
        let mut orchestrator = orchestrator(200);
        let summary = orchestrator.run_all();
        assert_eq!(summary.end_reason, RunEndReason::Completed);
        assert_eq!(summary.years.len(), 2);
        assert_eq!(summary.last_completed_year, Some(2026));
        assert_eq!(orchestrator.phase(), OrchestratorPhase::Completed);
        assert_eq!(orchestrator.next_year(), None);
    }
}
