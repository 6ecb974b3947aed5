//! Event store operations for the append-only `workforce_events` table.
//!
//! A year's partition is written with one `UNNEST` insert per batch inside
//! the caller's transaction. Reads return [`EventRow`]s, which convert back
//! into [`Event`]s.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use workforce_types::{EmployeeId, Event, EventId, EventKind, EventPayload};

use crate::error::DbError;

/// Default batch size for event inserts.
const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Operations on the `workforce_events` table.
pub struct EventStore<'a> {
    pool: &'a PgPool,
}

impl<'a> EventStore<'a> {
    /// Create a new event store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append one year's events on an open connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails, including when an
    /// event id or `(year, sequence)` pair already exists.
    pub async fn insert_events(conn: &mut PgConnection, events: &[Event]) -> Result<u64, DbError> {
        let mut inserted = 0_u64;
        for chunk in events.chunks(DEFAULT_BATCH_SIZE) {
            let len = chunk.len();
            let mut event_ids = Vec::with_capacity(len);
            let mut employee_ids = Vec::with_capacity(len);
            let mut kinds = Vec::with_capacity(len);
            let mut years = Vec::with_capacity(len);
            let mut dates = Vec::with_capacity(len);
            let mut sequences = Vec::with_capacity(len);
            let mut before: Vec<Option<Decimal>> = Vec::with_capacity(len);
            let mut after: Vec<Option<Decimal>> = Vec::with_capacity(len);
            let mut payloads = Vec::with_capacity(len);

            for event in chunk {
                event_ids.push(event.event_id.into_inner());
                employee_ids.push(event.employee_id.as_str().to_owned());
                kinds.push(event.kind.tag().to_owned());
                years.push(event.simulation_year);
                dates.push(event.effective_date);
                sequences.push(i64::try_from(event.sequence).unwrap_or(i64::MAX));
                before.push(event.before_value());
                after.push(event.after_value());
                payloads.push(serde_json::to_value(&event.payload)?);
            }

            let result = sqlx::query(
                r"INSERT INTO workforce_events
                    (event_id, employee_id, event_kind, simulation_year, effective_date,
                     sequence_number, before_value, after_value, payload)
                  SELECT * FROM UNNEST($1::UUID[], $2::TEXT[], $3::TEXT[], $4::INTEGER[],
                                       $5::DATE[], $6::BIGINT[], $7::NUMERIC[], $8::NUMERIC[],
                                       $9::JSONB[])",
            )
            .bind(&event_ids)
            .bind(&employee_ids)
            .bind(&kinds)
            .bind(&years)
            .bind(&dates)
            .bind(&sequences)
            .bind(&before)
            .bind(&after)
            .bind(&payloads)
            .execute(&mut *conn)
            .await?;
            inserted = inserted.saturating_add(result.rows_affected());
        }

        tracing::debug!(count = inserted, "Inserted workforce events (batch UNNEST)");
        Ok(inserted)
    }

    /// Events of one year in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn events_for_year(&self, year: i32) -> Result<Vec<EventRow>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT event_id, employee_id, event_kind, simulation_year, effective_date,
                     sequence_number, before_value, after_value, payload
              FROM workforce_events
              WHERE simulation_year = $1
              ORDER BY sequence_number",
        )
        .bind(year)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Every event of one employee, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn events_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<EventRow>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT event_id, employee_id, event_kind, simulation_year, effective_date,
                     sequence_number, before_value, after_value, payload
              FROM workforce_events
              WHERE employee_id = $1
              ORDER BY simulation_year, sequence_number",
        )
        .bind(employee_id.as_str())
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Number of stored events per year.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn count_by_year(&self) -> Result<Vec<(i32, i64)>, DbError> {
        let rows = sqlx::query_as::<_, (i32, i64)>(
            r"SELECT simulation_year, COUNT(*)
              FROM workforce_events
              GROUP BY simulation_year
              ORDER BY simulation_year",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

/// A row from the `workforce_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Event identifier.
    pub event_id: Uuid,
    /// Employee the event applies to.
    pub employee_id: String,
    /// Event kind tag.
    pub event_kind: String,
    /// Simulation year.
    pub simulation_year: i32,
    /// Effective date.
    pub effective_date: NaiveDate,
    /// Causal sequence number within the year.
    pub sequence_number: i64,
    /// Value before the event.
    pub before_value: Option<Decimal>,
    /// Value after the event.
    pub after_value: Option<Decimal>,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
}

impl EventRow {
    /// Convert the row back into a domain event.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CorruptRow`] if the kind tag is unknown, disagrees
    /// with the payload, or the sequence number is negative.
    /// Returns [`DbError::Serialization`] if the payload does not parse.
    pub fn into_event(self) -> Result<Event, DbError> {
        let corrupt = |reason: String| DbError::CorruptRow {
            table: "workforce_events",
            reason,
        };
        let kind = EventKind::from_tag(&self.event_kind)
            .ok_or_else(|| corrupt(format!("unknown event kind {:?}", self.event_kind)))?;
        let payload: EventPayload = serde_json::from_value(self.payload)?;
        if payload.kind() != kind {
            return Err(corrupt(format!(
                "event {} is tagged {} but carries a {} payload",
                self.event_id,
                kind.tag(),
                payload.kind().tag()
            )));
        }
        let sequence = u64::try_from(self.sequence_number)
            .map_err(|e| corrupt(format!("sequence {}: {e}", self.sequence_number)))?;
        Ok(Event {
            event_id: EventId(self.event_id),
            employee_id: EmployeeId::new(self.employee_id),
            kind,
            simulation_year: self.simulation_year,
            effective_date: self.effective_date,
            sequence,
            payload,
        })
    }
}
