//! Store collaborator contracts.
//!
//! The engine never talks to a database directly; it goes through these
//! narrow traits. [`Store`] covers the query capabilities the write path and
//! the sequence cache need, [`TransactionControl`] covers the raw
//! transaction primitives the listener bus wraps.

use std::collections::BTreeMap;

use rowforge_sql::{BindKind, BindRow, BindValue};

use crate::error::Result;

/// A raw row returned by ad-hoc selects: column name to value.
pub type RawRow = BTreeMap<String, BindValue>;

/// Query capabilities of the underlying store.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// Executes one statement against every row in a single round trip and
    /// returns the total affected-row count.
    ///
    /// `kinds` is ordered parallel to each row's values and drives how the
    /// driver coerces each bind slot. Every row must have exactly
    /// `kinds.len()` values.
    async fn execute_batch(&self, sql: &str, kinds: &[BindKind], rows: &[BindRow]) -> Result<u64>;

    /// Runs an ad-hoc select and returns raw row mappings.
    async fn find_by_sql(&self, sql: &str) -> Result<Vec<RawRow>>;

    /// Fetches the next raw value of a store-side sequence.
    async fn next_sequence_value(&self, sequence: &str) -> Result<i64>;

    /// Whether a sequence of the given name exists.
    async fn sequence_exists(&self, sequence: &str) -> Result<bool>;

    /// Tables that `table` references through foreign keys. Introspection
    /// only; not part of the write path.
    async fn foreign_master_tables(&self, table: &str) -> Result<Vec<String>>;

    /// Tables that reference `table` through foreign keys. Introspection
    /// only; not part of the write path.
    async fn foreign_detail_tables(&self, table: &str) -> Result<Vec<String>>;
}

/// Raw transaction primitives of one store connection.
#[allow(async_fn_in_trait)]
pub trait TransactionControl {
    /// Commits the current transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Rolls back to a named savepoint.
    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;

    /// Creates a named savepoint.
    async fn create_savepoint(&mut self, name: &str) -> Result<()>;
}
