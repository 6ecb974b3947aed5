//! Hazard models, event generators, state accumulation and multi-year
//! orchestration for the workforce simulation.
//!
//! Each simulated year runs the same sequence:
//!
//! 1. Confirm the prior year is fully committed.
//! 2. Run the seven event generators in causal order against the prior
//!    year's active population and accumulator state.
//! 3. Sequence the drafts into the year's event partition.
//! 4. Fold the events into the temporal state accumulator.
//! 5. Apply the events to the prior snapshot and check the invariants.
//! 6. Write a checkpoint, then commit log, accumulator and snapshot.
//!
//! # Modules
//!
//! - [`config`] -- Typed YAML configuration with named defaults.
//! - [`hazard`] -- Materialised hazard table.
//! - [`draw`] -- Identifier-derived deterministic random draws.
//! - [`generators`] -- The [`EventGenerator`] trait and the seven generators.
//! - [`accumulator`] -- [`TemporalStateAccumulator`] for plan participation.
//! - [`quality`] -- Event and cross-view data quality checks.
//! - [`invariants`] -- Mass balance and rate tolerances.
//! - [`checkpoint`] -- [`YearCheckpoint`] and the [`CheckpointStore`] trait.
//! - [`control`] -- [`RunControl`] stop flag.
//! - [`baseline`] -- Census loading, validation and synthesis.
//! - [`orchestrator`] -- The [`Orchestrator`] state machine.
//! - [`error`] -- [`SimulationError`].
//!
//! [`EventGenerator`]: generators::EventGenerator
//! [`TemporalStateAccumulator`]: accumulator::TemporalStateAccumulator
//! [`YearCheckpoint`]: checkpoint::YearCheckpoint
//! [`CheckpointStore`]: checkpoint::CheckpointStore
//! [`RunControl`]: control::RunControl
//! [`Orchestrator`]: orchestrator::Orchestrator
//! [`SimulationError`]: error::SimulationError

pub mod accumulator;
pub mod baseline;
pub mod checkpoint;
pub mod config;
pub mod control;
pub mod draw;
pub mod error;
pub mod generators;
pub mod hazard;
pub mod invariants;
pub mod orchestrator;
pub mod quality;
