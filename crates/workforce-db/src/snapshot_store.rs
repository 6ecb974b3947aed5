//! Derived snapshot rows in `workforce_snapshots`.
//!
//! Snapshots are rebuildable from the event table, so they are stored for
//! reporting only and written once per year.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use workforce_types::SnapshotRow;

use crate::error::DbError;
use crate::tag;

/// Operations on the `workforce_snapshots` table.
pub struct SnapshotStore<'a> {
    pool: &'a PgPool,
}

impl<'a> SnapshotStore<'a> {
    /// Create a new snapshot store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert one year's snapshot rows on an open connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_rows(
        conn: &mut PgConnection,
        rows: &[SnapshotRow],
    ) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let len = rows.len();
        let mut employee_ids = Vec::with_capacity(len);
        let mut years = Vec::with_capacity(len);
        let mut statuses = Vec::with_capacity(len);
        let mut birth_dates = Vec::with_capacity(len);
        let mut hire_dates = Vec::with_capacity(len);
        let mut termination_dates: Vec<Option<NaiveDate>> = Vec::with_capacity(len);
        let mut levels = Vec::with_capacity(len);
        let mut compensation = Vec::with_capacity(len);
        let mut enrolled = Vec::with_capacity(len);
        let mut rates = Vec::with_capacity(len);
        let mut ages = Vec::with_capacity(len);
        let mut tenures = Vec::with_capacity(len);
        let mut matches = Vec::with_capacity(len);

        for row in rows {
            employee_ids.push(row.employee_id.as_str().to_owned());
            years.push(row.simulation_year);
            statuses.push(tag(&row.status)?);
            birth_dates.push(row.birth_date);
            hire_dates.push(row.hire_date);
            termination_dates.push(row.termination_date);
            levels.push(i16::from(row.level));
            compensation.push(row.compensation);
            enrolled.push(row.enrolled);
            rates.push(row.contribution_rate);
            ages.push(i32::try_from(row.age).unwrap_or(i32::MAX));
            tenures.push(i32::try_from(row.tenure_years).unwrap_or(i32::MAX));
            matches.push(row.employer_match);
        }

        let result = sqlx::query(
            r"INSERT INTO workforce_snapshots
                (employee_id, simulation_year, status, birth_date, hire_date, termination_date,
                 level, compensation, enrolled, contribution_rate, age, tenure_years,
                 employer_match)
              SELECT * FROM UNNEST($1::TEXT[], $2::INTEGER[], $3::TEXT[], $4::DATE[], $5::DATE[],
                                   $6::DATE[], $7::SMALLINT[], $8::NUMERIC[], $9::BOOLEAN[],
                                   $10::NUMERIC[], $11::INTEGER[], $12::INTEGER[], $13::NUMERIC[])",
        )
        .bind(&employee_ids)
        .bind(&years)
        .bind(&statuses)
        .bind(&birth_dates)
        .bind(&hire_dates)
        .bind(&termination_dates)
        .bind(&levels)
        .bind(&compensation)
        .bind(&enrolled)
        .bind(&rates)
        .bind(&ages)
        .bind(&tenures)
        .bind(&matches)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(count = result.rows_affected(), "Inserted snapshot rows");
        Ok(result.rows_affected())
    }

    /// Headcount and total compensation by status for one year.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn status_totals(&self, year: i32) -> Result<Vec<StatusTotalRow>, DbError> {
        let rows = sqlx::query_as::<_, StatusTotalRow>(
            r"SELECT status, COUNT(*) AS headcount, COALESCE(SUM(compensation), 0) AS compensation
              FROM workforce_snapshots
              WHERE simulation_year = $1
              GROUP BY status
              ORDER BY status",
        )
        .bind(year)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Number of employees active at the end of `year`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn active_headcount(&self, year: i32) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            r"SELECT COUNT(*) FROM workforce_snapshots
              WHERE simulation_year = $1
                AND status IN ('continuous_active', 'new_hire_active')",
        )
        .bind(year)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}

/// Aggregate of one status within a snapshot year.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusTotalRow {
    /// Status tag.
    pub status: String,
    /// Number of rows with the status.
    pub headcount: i64,
    /// Total year-end compensation of those rows.
    pub compensation: Decimal,
}
