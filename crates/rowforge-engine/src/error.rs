//! Error types for the persistence engine.

use thiserror::Error;

/// Engine-specific errors.
///
/// Everything except [`Database`](EngineError::Database) is raised at
/// schedule or build time, before any store round trip. Lost-update
/// conflicts are never an error: they surface as an affected-row count lower
/// than the submitted-row count in a [`FlushReport`](crate::FlushReport).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Metadata or classification error.
    #[error(transparent)]
    Meta(#[from] rowforge_sql::MetaError),

    /// Update or delete attempted on a record that was never persisted.
    #[error("record of {0} was never persisted")]
    NoPersistentRecord(String),

    /// Optimistic update or delete attempted without a captured snapshot.
    #[error("no original record found for {0}")]
    NoOriginalRecord(String),

    /// Optimistic delete attempted on a record without a rowid.
    #[error("record of {0} has no rowid")]
    MissingRowId(String),

    /// A group operation received records of mixed kinds or wrong shape.
    #[error("invalid group: {0}")]
    InvalidGroup(String),

    /// A column name not declared by the record's metadata.
    #[error("unknown column {column} of {table}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// The undeclared column name.
        column: String,
    },

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
