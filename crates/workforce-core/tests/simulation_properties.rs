//! Whole-run properties of the simulation: reproducibility, the reference
//! scenario, rate tolerances, replay, checkpoint resume and failure
//! handling.

#![allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::indexing_slicing
)]

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use workforce_core::accumulator::TemporalStateAccumulator;
use workforce_core::baseline;
use workforce_core::checkpoint::{
    CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, YearCheckpoint,
};
use workforce_core::config::SimulationConfig;
use workforce_core::control::RunControl;
use workforce_core::error::SimulationError;
use workforce_core::orchestrator::{Orchestrator, OrchestratorPhase, RunEndReason};
use workforce_events::EventLog;
use workforce_types::EventKind;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(seed: u64, end_year: i32) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.simulation.seed = seed;
    config.simulation.start_year = 2025;
    config.simulation.end_year = end_year;
    config
}

fn orchestrator_with(
    config: SimulationConfig,
    size: u32,
    store: Box<dyn CheckpointStore>,
) -> Orchestrator {
    let census = baseline::synthesize(size, &config);
    Orchestrator::new(config, &census, store, RunControl::new()).unwrap()
}

fn orchestrator(seed: u64, size: u32, end_year: i32) -> Orchestrator {
    orchestrator_with(config(seed, end_year), size, Box::new(MemoryCheckpointStore::new()))
}

fn count(counts: &BTreeMap<EventKind, u32>, kind: EventKind) -> u32 {
    counts.get(&kind).copied().unwrap_or(0)
}

/// Store whose first `failures` saves fail with an I/O error.
struct FlakyStore {
    inner: MemoryCheckpointStore,
    failures: u32,
}

impl CheckpointStore for FlakyStore {
    fn save(&mut self, checkpoint: &YearCheckpoint) -> Result<(), CheckpointError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(CheckpointError::Io {
                path: "flaky".into(),
                source: std::io::Error::other("disk unavailable"),
            });
        }
        self.inner.save(checkpoint)
    }

    fn load(&self, year: i32) -> Result<Option<YearCheckpoint>, CheckpointError> {
        self.inner.load(year)
    }

    fn years(&self) -> Result<Vec<i32>, CheckpointError> {
        self.inner.years()
    }
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn identical_inputs_produce_identical_runs() {
    let mut first = orchestrator(42, 400, 2027);
    let mut second = orchestrator(42, 400, 2027);
    assert_eq!(first.run_all().end_reason, RunEndReason::Completed);
    assert_eq!(second.run_all().end_reason, RunEndReason::Completed);

    assert_eq!(
        first.event_log().digest().unwrap(),
        second.event_log().digest().unwrap()
    );
    assert_eq!(
        first.snapshot().digest().unwrap(),
        second.snapshot().digest().unwrap()
    );
    assert_eq!(
        first.accumulator().digest(2027).unwrap(),
        second.accumulator().digest(2027).unwrap()
    );

    let mut other = orchestrator(7, 400, 2027);
    other.run_all();
    assert_ne!(
        first.event_log().digest().unwrap(),
        other.event_log().digest().unwrap()
    );
}

// ---------------------------------------------------------------------------
// Reference scenario
// ---------------------------------------------------------------------------

#[test]
fn reference_scenario_first_year() {
    // 1000 employees, seed 42, 3% growth, 12% termination, 25% new-hire
    // termination, 0.5pp tolerance.
    let mut orchestrator = orchestrator(42, 1000, 2025);
    let result = orchestrator.run_year(2025);
    assert!(result.success, "{:?}", result.error);

    let counts = &result.event_counts;
    let terminations = count(counts, EventKind::Termination);
    let hires = count(counts, EventKind::Hire);
    let nh_terminations = count(counts, EventKind::NewHireTermination);

    assert!((115..=125).contains(&terminations), "terminations {terminations}");
    // ceil((T + 0.03 × 1000) / 0.75)
    assert_eq!(hires, (4 * (terminations + 30)).div_ceil(3));
    let expected_nh = (f64::from(hires) * 0.25).round() as u32;
    assert!(nh_terminations.abs_diff(expected_nh) <= 1, "new-hire terminations {nh_terminations}");

    let ending = orchestrator.snapshot().active_count();
    assert!((1025..=1035).contains(&ending), "ending headcount {ending}");
    assert_eq!(
        ending,
        (1000 + hires - terminations - nh_terminations) as usize
    );
}

#[test]
fn every_year_stays_within_rate_tolerance() {
    let mut orchestrator = orchestrator(42, 1000, 2029);
    let summary = orchestrator.run_all();
    assert_eq!(summary.end_reason, RunEndReason::Completed);
    assert_eq!(summary.years.len(), 5);

    let tolerance = Decimal::new(5, 3);
    for year in &summary.years {
        let report = year.validation.as_ref().unwrap();
        assert!(report.is_clean(), "{}: {:?}", year.year, report.violations);
        assert!((report.termination_rate - Decimal::new(12, 2)).abs() <= tolerance);
        assert!((report.growth_rate - Decimal::new(3, 2)).abs() <= tolerance);

        let balance = i64::from(report.starting_headcount) + i64::from(report.hires)
            - i64::from(report.experienced_terminations)
            - i64::from(report.new_hire_terminations);
        assert_eq!(balance, i64::from(report.ending_headcount));
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[test]
fn replaying_the_log_reproduces_the_snapshot() {
    let mut orchestrator = orchestrator(42, 300, 2027);
    orchestrator.run_all();

    let rebuilt = orchestrator.reconstruct_snapshot(2027).unwrap();
    assert_eq!(
        rebuilt.digest().unwrap(),
        orchestrator.snapshot().digest().unwrap()
    );
    let again = orchestrator.reconstruct_snapshot(2027).unwrap();
    assert_eq!(rebuilt.digest().unwrap(), again.digest().unwrap());

    let middle = orchestrator.reconstruct_snapshot(2026).unwrap();
    assert_eq!(middle.year, 2026);
}

#[test]
fn changing_a_later_year_leaves_earlier_state_untouched() {
    let mut orchestrator = orchestrator(42, 300, 2026);
    orchestrator.run_all();
    let baseline_year = orchestrator.config().baseline_year();
    let plan = orchestrator.config().plan.clone();

    let mut perturbed = EventLog::new();
    perturbed
        .append_year(2025, orchestrator.event_log().events_for_year(2025).to_vec())
        .unwrap();
    let mut later = orchestrator.event_log().events_for_year(2026).to_vec();
    later.pop();
    perturbed.append_year(2026, later).unwrap();

    let rebuilt = TemporalStateAccumulator::rebuild(
        baseline_year,
        orchestrator.baseline(),
        &plan,
        &perturbed,
        2026,
    )
    .unwrap();
    assert_eq!(
        rebuilt.digest(2025).unwrap(),
        orchestrator.accumulator().digest(2025).unwrap()
    );

    let faithful = TemporalStateAccumulator::rebuild(
        baseline_year,
        orchestrator.baseline(),
        &plan,
        orchestrator.event_log(),
        2026,
    )
    .unwrap();
    assert_eq!(
        faithful.digest(2026).unwrap(),
        orchestrator.accumulator().digest(2026).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Checkpoints and resume
// ---------------------------------------------------------------------------

#[test]
fn resume_restores_every_intact_year() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(42, 2027);

    let mut original = orchestrator_with(
        config.clone(),
        300,
        Box::new(FileCheckpointStore::open(dir.path()).unwrap()),
    );
    assert_eq!(original.run_all().end_reason, RunEndReason::Completed);

    let mut resumed = orchestrator_with(
        config,
        300,
        Box::new(FileCheckpointStore::open(dir.path()).unwrap()),
    );
    assert_eq!(resumed.resume().unwrap(), Some(2027));
    assert_eq!(resumed.phase(), OrchestratorPhase::Checkpointed);
    assert_eq!(resumed.next_year(), None);
    assert_eq!(
        resumed.event_log().digest().unwrap(),
        original.event_log().digest().unwrap()
    );
    assert_eq!(
        resumed.snapshot().digest().unwrap(),
        original.snapshot().digest().unwrap()
    );
}

#[test]
fn corrupt_checkpoint_resumes_from_the_year_before() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(42, 2027);

    let mut original = orchestrator_with(
        config.clone(),
        300,
        Box::new(FileCheckpointStore::open(dir.path()).unwrap()),
    );
    original.run_all();
    let expected = original.event_log().digest().unwrap();

    let store = FileCheckpointStore::open(dir.path()).unwrap();
    std::fs::write(store.path_for(2026), "{ not a checkpoint").unwrap();

    let mut resumed = orchestrator_with(config, 300, Box::new(store));
    assert_eq!(resumed.resume().unwrap(), Some(2025));
    assert_eq!(resumed.next_year(), Some(2026));

    let summary = resumed.run_all();
    assert_eq!(summary.end_reason, RunEndReason::Completed);
    assert_eq!(summary.years.len(), 2);
    assert_eq!(resumed.event_log().digest().unwrap(), expected);
}

#[test]
fn extending_the_year_range_keeps_committed_years() {
    let dir = tempfile::tempdir().unwrap();
    let mut original = orchestrator_with(
        config(42, 2026),
        200,
        Box::new(FileCheckpointStore::open(dir.path()).unwrap()),
    );
    assert_eq!(original.run_all().end_reason, RunEndReason::Completed);

    let mut extended = orchestrator_with(
        config(42, 2028),
        200,
        Box::new(FileCheckpointStore::open(dir.path()).unwrap()),
    );
    assert_eq!(extended.resume().unwrap(), Some(2026));
    assert_eq!(extended.next_year(), Some(2027));

    let summary = extended.run_all();
    assert_eq!(summary.end_reason, RunEndReason::Completed);
    assert_eq!(summary.years.len(), 2);

    let mut fresh = orchestrator(42, 200, 2028);
    fresh.run_all();
    assert_eq!(
        extended.event_log().digest().unwrap(),
        fresh.event_log().digest().unwrap()
    );
}

#[test]
fn checkpoints_from_another_configuration_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut original = orchestrator_with(
        config(42, 2026),
        200,
        Box::new(FileCheckpointStore::open(dir.path()).unwrap()),
    );
    original.run_all();

    let mut other = orchestrator_with(
        config(43, 2026),
        200,
        Box::new(FileCheckpointStore::open(dir.path()).unwrap()),
    );
    assert_eq!(other.resume().unwrap(), None);
    assert_eq!(other.phase(), OrchestratorPhase::Initialized);
    assert!(other.event_log().is_empty());
}

// ---------------------------------------------------------------------------
// Control and failure handling
// ---------------------------------------------------------------------------

#[test]
fn stop_request_ends_the_run_at_a_year_boundary() {
    let mut orchestrator = orchestrator(42, 200, 2029);
    assert!(orchestrator.run_year(2025).success);
    orchestrator.control().request_stop();

    let summary = orchestrator.run_all();
    assert_eq!(summary.end_reason, RunEndReason::StopRequested);
    assert!(summary.years.is_empty());
    assert_eq!(summary.last_completed_year, Some(2025));
    assert_eq!(orchestrator.event_log().latest_year(), Some(2025));
}

#[test]
fn transient_checkpoint_failure_is_retried() {
    let store = FlakyStore {
        inner: MemoryCheckpointStore::new(),
        failures: 1,
    };
    let mut orchestrator = orchestrator_with(config(42, 2025), 200, Box::new(store));
    let result = orchestrator.run_year_with_retry(2025);
    assert!(result.success, "{:?}", result.error);
    assert!(orchestrator.load_checkpoint(2025).unwrap().is_some());
}

#[test]
fn persistent_checkpoint_failure_fails_the_run() {
    let store = FlakyStore {
        inner: MemoryCheckpointStore::new(),
        failures: u32::MAX,
    };
    let mut orchestrator = orchestrator_with(config(42, 2026), 200, Box::new(store));
    let summary = orchestrator.run_all();
    assert_eq!(summary.end_reason, RunEndReason::Failed);
    assert_eq!(summary.last_completed_year, None);
    let error = summary.years[0].error.as_ref().unwrap();
    assert!(error.is_retryable());
    assert!(orchestrator.event_log().is_empty());
    assert!(orchestrator.accumulator().records_for_year(2025).is_none());
}

#[test]
fn running_years_out_of_order_is_rejected() {
    let mut orchestrator = orchestrator(42, 100, 2027);
    let result = orchestrator.run_year(2027);
    assert!(matches!(
        result.error,
        Some(SimulationError::Dependency { year: 2027, .. })
    ));
    assert!(!orchestrator.validate_prior_year(2027));
    assert!(orchestrator.validate_prior_year(2025));
}
