//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`serde_json`] errors with additional context about which
//! operation failed.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored row cannot be turned back into a domain value.
    #[error("Corrupt {table} row: {reason}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A year is already persisted with different contents.
    #[error("Year {year} is already persisted with events digest {stored}, refusing {offered}")]
    YearConflict {
        /// The simulation year.
        year: i32,
        /// Digest already in the database.
        stored: String,
        /// Digest of the rejected write.
        offered: String,
    },
}
