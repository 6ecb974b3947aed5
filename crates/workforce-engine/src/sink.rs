//! Optional `PostgreSQL` sink for committed years.
//!
//! The file checkpoint store stays authoritative for resume. The sink copies
//! each committed year's checkpoint into the database in one transaction,
//! and on startup backfills years restored from checkpoints.

use std::time::Duration;

use workforce_core::checkpoint::YearCheckpoint;
use workforce_core::config::InfrastructureConfig;
use workforce_core::orchestrator::Orchestrator;
use workforce_db::{DbError, PersistOutcome, PostgresConfig, PostgresPool, YearRecord, persist_year};
use workforce_types::SnapshotRow;

use crate::error::EngineError;

/// Writes committed years to `PostgreSQL`.
pub struct PostgresSink {
    pool: PostgresPool,
}

impl PostgresSink {
    /// Connect with the configured pool bounds and bring the schema up to
    /// date.
    pub async fn connect(infrastructure: &InfrastructureConfig) -> Result<Self, DbError> {
        let pool = PostgresPool::connect(&pool_config(infrastructure)).await?;
        pool.run_migrations().await?;
        Ok(Self { pool })
    }

    /// Persist one checkpoint.
    pub async fn persist(&self, checkpoint: &YearCheckpoint) -> Result<PersistOutcome, DbError> {
        let rows = snapshot_rows(checkpoint);
        persist_year(self.pool.pool(), &year_record(checkpoint, &rows)).await
    }

    /// Persist every year the orchestrator already holds, typically after
    /// a resume. Years already stored are skipped. Returns how many years
    /// were written.
    pub async fn backfill(&self, orchestrator: &Orchestrator) -> Result<usize, EngineError> {
        let years: Vec<i32> = orchestrator.event_log().sealed_years().collect();
        let mut written = 0_usize;
        for year in years {
            let Some(checkpoint) = orchestrator.load_checkpoint(year)? else {
                tracing::warn!(year, "no checkpoint to backfill");
                continue;
            };
            if matches!(self.persist(&checkpoint).await?, PersistOutcome::Written { .. }) {
                written = written.saturating_add(1);
            }
        }
        if written > 0 {
            tracing::info!(years = written, "Backfilled resumed years to PostgreSQL");
        }
        Ok(written)
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn pool_config(infrastructure: &InfrastructureConfig) -> PostgresConfig {
    PostgresConfig::new(&infrastructure.postgres_url)
        .with_max_connections(infrastructure.max_connections)
        .with_acquire_timeout(Duration::from_secs(infrastructure.connect_timeout_secs))
}

fn snapshot_rows(checkpoint: &YearCheckpoint) -> Vec<SnapshotRow> {
    checkpoint.snapshot.rows().cloned().collect()
}

fn year_record<'a>(checkpoint: &'a YearCheckpoint, rows: &'a [SnapshotRow]) -> YearRecord<'a> {
    YearRecord {
        year: checkpoint.year,
        config_fingerprint: &checkpoint.config_fingerprint,
        events: &checkpoint.events,
        records: &checkpoint.accumulator,
        rows,
        events_digest: &checkpoint.events_digest,
        accumulator_digest: &checkpoint.accumulator_digest,
        snapshot_digest: &checkpoint.snapshot_digest,
        active_headcount: u32::try_from(checkpoint.snapshot.active_count()).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use workforce_core::baseline;
    use workforce_core::checkpoint::MemoryCheckpointStore;
    use workforce_core::config::SimulationConfig;
    use workforce_core::control::RunControl;

    use super::*;

    #[test]
    fn record_mirrors_the_checkpoint() {
        let mut config = SimulationConfig::default();
        config.simulation.end_year = config.simulation.start_year;
        let census = baseline::synthesize(120, &config);
        let mut orchestrator = Orchestrator::new(
            config,
            &census,
            Box::new(MemoryCheckpointStore::new()),
            RunControl::new(),
        )
        .unwrap();
        let year = orchestrator.next_year().unwrap();
        assert!(orchestrator.run_year(year).success);

        let checkpoint = orchestrator.load_checkpoint(year).unwrap().unwrap();
        let rows = snapshot_rows(&checkpoint);
        let record = year_record(&checkpoint, &rows);

        assert_eq!(record.year, year);
        assert_eq!(record.events.len(), orchestrator.event_log().len());
        assert_eq!(record.rows.len(), orchestrator.snapshot().len());
        assert_eq!(
            usize::try_from(record.active_headcount).unwrap(),
            orchestrator.snapshot().active_count()
        );
        assert_eq!(record.events_digest, checkpoint.events_digest);
    }

    #[test]
    fn pool_is_sized_from_infrastructure_settings() {
        let mut infrastructure = SimulationConfig::default().infrastructure;
        infrastructure.postgres_url = "postgres://reporting:5432/workforce".to_owned();
        infrastructure.max_connections = 9;
        infrastructure.connect_timeout_secs = 20;

        let pool = pool_config(&infrastructure);
        assert_eq!(pool.url, infrastructure.postgres_url);
        assert_eq!(pool.max_connections, 9);
        assert_eq!(pool.acquire_timeout, Duration::from_secs(20));
    }
}
