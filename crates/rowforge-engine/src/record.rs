//! In-memory records and their original snapshots.
//!
//! A [`Record`] holds the current attribute values of one row, positionally
//! aligned with its table's column metadata. The optional [`Snapshot`] is
//! the last known committed state, captured once and never mutated; it is
//! the comparison baseline for the optimistic predicate.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rowforge_sql::{BindValue, TableMeta, ToBindValue};

use crate::error::{EngineError, Result};

/// Immutable copy of a record's attributes at select time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    values: Vec<BindValue>,
    rowid: Option<String>,
}

impl Snapshot {
    /// The captured attribute values, in column order.
    #[must_use]
    pub fn values(&self) -> &[BindValue] {
        &self.values
    }

    /// The captured row locator, if the select carried one.
    #[must_use]
    pub fn rowid(&self) -> Option<&str> {
        self.rowid.as_deref()
    }
}

/// An instance of a record kind with dirty-tracking state.
#[derive(Debug, Clone)]
pub struct Record {
    meta: Arc<TableMeta>,
    values: Vec<BindValue>,
    rowid: Option<String>,
    is_new: bool,
    original: Option<Snapshot>,
}

impl Record {
    /// Creates a new, not-yet-persisted record with all attributes NULL.
    #[must_use]
    pub fn new(meta: Arc<TableMeta>) -> Self {
        let values = vec![BindValue::Null; meta.columns().len()];
        Self {
            meta,
            values,
            rowid: None,
            is_new: true,
            original: None,
        }
    }

    /// Creates a record representing a row selected from the store.
    ///
    /// `values` must carry one entry per column, in declaration order.
    pub fn selected(
        meta: Arc<TableMeta>,
        values: Vec<BindValue>,
        rowid: Option<String>,
    ) -> Result<Self> {
        if values.len() != meta.columns().len() {
            return Err(EngineError::Validation(format!(
                "expected {} values for {}, got {}",
                meta.columns().len(),
                meta.table(),
                values.len()
            )));
        }
        Ok(Self {
            meta,
            values,
            rowid,
            is_new: false,
            original: None,
        })
    }

    /// The table metadata this record belongs to.
    #[must_use]
    pub fn meta(&self) -> &Arc<TableMeta> {
        &self.meta
    }

    /// Whether this record has not been inserted yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn unset_new(&mut self) {
        self.is_new = false;
    }

    /// The store-assigned row locator.
    #[must_use]
    pub fn rowid(&self) -> Option<&str> {
        self.rowid.as_deref()
    }

    /// Sets the row locator.
    pub fn set_rowid(&mut self, rowid: impl Into<String>) {
        self.rowid = Some(rowid.into());
    }

    /// All attribute values, in column order.
    #[must_use]
    pub fn values(&self) -> &[BindValue] {
        &self.values
    }

    /// Reads an attribute by column name.
    pub fn get(&self, column: &str) -> Result<&BindValue> {
        let index = self
            .meta
            .column_index(column)
            .ok_or_else(|| self.unknown_column(column))?;
        Ok(&self.values[index])
    }

    /// Writes an attribute by column name.
    pub fn set(&mut self, column: &str, value: impl ToBindValue) -> Result<()> {
        let index = self
            .meta
            .column_index(column)
            .ok_or_else(|| self.unknown_column(column))?;
        self.values[index] = value.to_bind_value();
        Ok(())
    }

    /// Captures the original snapshot, once.
    ///
    /// The first call wins; later calls keep the existing snapshot so the
    /// comparison baseline stays at the last known committed state.
    pub fn save_original(&mut self) {
        if self.original.is_none() {
            self.original = Some(Snapshot {
                values: self.values.clone(),
                rowid: self.rowid.clone(),
            });
        }
    }

    /// The original snapshot, if one was captured.
    #[must_use]
    pub fn original(&self) -> Option<&Snapshot> {
        self.original.as_ref()
    }

    /// Whether any attribute differs from the original snapshot.
    ///
    /// A record without a snapshot counts as changed.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        match &self.original {
            Some(snapshot) => self.values != snapshot.values,
            None => true,
        }
    }

    /// The surrogate id, when the kind declares an `id` column holding an
    /// integer.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        let index = self.meta.column_index("id")?;
        match self.values[index] {
            BindValue::Int(id) => Some(id),
            _ => None,
        }
    }

    /// Fills a missing surrogate id. An already-assigned id is never
    /// reassigned; returns whether the id was written.
    pub(crate) fn set_id_if_missing(&mut self, id: i64) -> bool {
        let Some(index) = self.meta.column_index("id") else {
            return false;
        };
        if self.values[index].is_null() {
            self.values[index] = BindValue::Int(id);
            true
        } else {
            false
        }
    }

    fn unknown_column(&self, column: &str) -> EngineError {
        EngineError::UnknownColumn {
            table: self.meta.table().to_string(),
            column: column.to_string(),
        }
    }
}

/// A record shared between application code and the flush registry.
///
/// Queue identity is pointer identity: scheduling the same instance twice
/// enqueues exactly one operation.
pub type SharedRecord = Arc<RwLock<Record>>;

/// Wraps a record for scheduling.
#[must_use]
pub fn shared(record: Record) -> SharedRecord {
    Arc::new(RwLock::new(record))
}

/// Read-locks a shared record, recovering from poisoning.
pub(crate) fn read(record: &SharedRecord) -> RwLockReadGuard<'_, Record> {
    record.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-locks a shared record, recovering from poisoning.
pub(crate) fn write(record: &SharedRecord) -> RwLockWriteGuard<'_, Record> {
    record.write().unwrap_or_else(PoisonError::into_inner)
}
