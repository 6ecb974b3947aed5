//! Versioned accumulator rows in `accumulator_state`, one per
//! `(employee_id, simulation_year)`. Rows are inserted once and never
//! updated.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use workforce_types::{AccumulatorRecord, EmployeeId, Provenance};

use crate::error::DbError;
use crate::tag;

/// Operations on the `accumulator_state` table.
pub struct AccumulatorStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AccumulatorStore<'a> {
    /// Create a new accumulator store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert one year's records on an open connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails, including when a
    /// record for the same employee and year already exists.
    pub async fn insert_records(
        conn: &mut PgConnection,
        records: &[AccumulatorRecord],
    ) -> Result<u64, DbError> {
        if records.is_empty() {
            return Ok(0);
        }
        let len = records.len();
        let mut employee_ids = Vec::with_capacity(len);
        let mut years = Vec::with_capacity(len);
        let mut enrolled = Vec::with_capacity(len);
        let mut enrollment_dates: Vec<Option<NaiveDate>> = Vec::with_capacity(len);
        let mut rates = Vec::with_capacity(len);
        let mut escalations = Vec::with_capacity(len);
        let mut escalation_dates: Vec<Option<NaiveDate>> = Vec::with_capacity(len);
        let mut provenances = Vec::with_capacity(len);

        for record in records {
            employee_ids.push(record.employee_id.as_str().to_owned());
            years.push(record.simulation_year);
            enrolled.push(record.enrolled);
            enrollment_dates.push(record.enrollment_date);
            rates.push(record.contribution_rate);
            escalations.push(i32::try_from(record.escalation_count).unwrap_or(i32::MAX));
            escalation_dates.push(record.last_escalation_date);
            provenances.push(tag(&record.provenance)?);
        }

        let result = sqlx::query(
            r"INSERT INTO accumulator_state
                (employee_id, simulation_year, enrolled, enrollment_date, contribution_rate,
                 escalation_count, last_escalation_date, provenance)
              SELECT * FROM UNNEST($1::TEXT[], $2::INTEGER[], $3::BOOLEAN[], $4::DATE[],
                                   $5::NUMERIC[], $6::INTEGER[], $7::DATE[], $8::TEXT[])",
        )
        .bind(&employee_ids)
        .bind(&years)
        .bind(&enrolled)
        .bind(&enrollment_dates)
        .bind(&rates)
        .bind(&escalations)
        .bind(&escalation_dates)
        .bind(&provenances)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(count = result.rows_affected(), "Inserted accumulator rows");
        Ok(result.rows_affected())
    }

    /// All records valid for `year`, in employee order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn records_for_year(&self, year: i32) -> Result<Vec<AccumulatorRow>, DbError> {
        let rows = sqlx::query_as::<_, AccumulatorRow>(
            r"SELECT employee_id, simulation_year, enrolled, enrollment_date, contribution_rate,
                     escalation_count, last_escalation_date, provenance
              FROM accumulator_state
              WHERE simulation_year = $1
              ORDER BY employee_id",
        )
        .bind(year)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

/// A row from the `accumulator_state` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccumulatorRow {
    /// Employee identifier.
    pub employee_id: String,
    /// Year the record is valid for.
    pub simulation_year: i32,
    /// Whether the employee is enrolled.
    pub enrolled: bool,
    /// Most recent enrollment date.
    pub enrollment_date: Option<NaiveDate>,
    /// Deferral rate.
    pub contribution_rate: Decimal,
    /// Escalations applied so far.
    pub escalation_count: i32,
    /// Most recent escalation date.
    pub last_escalation_date: Option<NaiveDate>,
    /// Provenance tag.
    pub provenance: String,
}

impl AccumulatorRow {
    /// Convert the row back into an accumulator record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CorruptRow`] for an unknown provenance tag or a
    /// negative escalation count.
    pub fn into_record(self) -> Result<AccumulatorRecord, DbError> {
        let provenance: Provenance =
            serde_json::from_value(serde_json::Value::String(self.provenance.clone())).map_err(
                |e| DbError::CorruptRow {
                    table: "accumulator_state",
                    reason: format!("provenance {:?}: {e}", self.provenance),
                },
            )?;
        let escalation_count =
            u32::try_from(self.escalation_count).map_err(|e| DbError::CorruptRow {
                table: "accumulator_state",
                reason: format!("escalation count {}: {e}", self.escalation_count),
            })?;
        Ok(AccumulatorRecord {
            employee_id: EmployeeId::new(self.employee_id),
            simulation_year: self.simulation_year,
            enrolled: self.enrolled,
            enrollment_date: self.enrollment_date,
            contribution_rate: self.contribution_rate,
            escalation_count,
            last_escalation_date: self.last_escalation_date,
            provenance,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(provenance: &str) -> AccumulatorRow {
        AccumulatorRow {
            employee_id: "EMP_000007".to_owned(),
            simulation_year: 2026,
            enrolled: true,
            enrollment_date: None,
            contribution_rate: Decimal::new(6, 2),
            escalation_count: 2,
            last_escalation_date: NaiveDate::from_ymd_opt(2026, 1, 1),
            provenance: provenance.to_owned(),
        }
    }

    #[test]
    fn provenance_tags_parse() {
        let record = row("escalated").into_record().unwrap();
        assert_eq!(record.provenance, Provenance::Escalated);
        assert_eq!(record.escalation_count, 2);
        assert_eq!(tag(&record.provenance).unwrap(), "escalated");
    }

    #[test]
    fn unknown_provenance_is_corrupt() {
        assert!(matches!(
            row("imported").into_record(),
            Err(DbError::CorruptRow { .. })
        ));
    }
}
