//! Batch group operations.
//!
//! Each operation compiles a group of same-kind records into one statement
//! plus one bind row per record, then hands the whole batch to the store in
//! a single round trip. Shape and configuration errors are raised before any
//! store call.

use std::ops::AddAssign;
use std::sync::Arc;

use rowforge_sql::{builder, BindRow, BindValue, TableMeta};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::record::{read, write, SharedRecord, Snapshot};
use crate::store::Store;

/// Options controlling how update and delete batches guard their rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOptions {
    /// Guard updates and deletes with the full-row optimistic predicate
    /// (default). When `false` the primary-key predicate is used instead,
    /// trading concurrency safety for not needing an original snapshot.
    pub optimistic: bool,
}

impl Default for FlushOptions {
    fn default() -> Self {
        Self { optimistic: true }
    }
}

/// Outcome of one or more batches: rows submitted vs rows the store reports
/// affected.
///
/// A shortfall is how lost updates surface. A concurrent writer that changed
/// a row first makes that row's optimistic predicate miss, lowering the
/// affected count without raising an error; callers decide whether to retry
/// with a fresh snapshot or report a conflict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Rows submitted across all executed batches.
    pub submitted: u64,
    /// Rows the store reported affected.
    pub affected: u64,
}

impl FlushReport {
    /// Rows whose predicate missed, i.e. detected lost updates.
    #[must_use]
    pub fn conflicts(&self) -> u64 {
        self.submitted.saturating_sub(self.affected)
    }
}

impl AddAssign for FlushReport {
    fn add_assign(&mut self, other: Self) {
        self.submitted += other.submitted;
        self.affected += other.affected;
    }
}

/// Validates that all records belong to one kind and returns its metadata.
///
/// Records of one kind must share one `TableMeta` instance. Returns `None`
/// for an empty group.
fn group_meta(group: &[SharedRecord]) -> Result<Option<Arc<TableMeta>>> {
    let Some(first) = group.first() else {
        return Ok(None);
    };
    let meta = read(first).meta().clone();
    for record in &group[1..] {
        let other = read(record).meta().clone();
        if !Arc::ptr_eq(&meta, &other) {
            return Err(EngineError::InvalidGroup(format!(
                "only records of {} expected, found {}",
                meta.table(),
                other.table()
            )));
        }
    }
    Ok(Some(meta))
}

/// Inserts a group of new records in one batch.
///
/// Clears every record's `is_new` flag after the batch succeeds.
pub async fn insert_group<S: Store>(store: &S, group: &[SharedRecord]) -> Result<FlushReport> {
    let Some(meta) = group_meta(group)? else {
        return Ok(FlushReport::default());
    };

    let statement = builder::insert(&meta);
    let rows: Vec<BindRow> = group.iter().map(|r| read(r).values().to_vec()).collect();

    debug!(table = %meta.table(), rows = rows.len(), sql = %statement.sql, "insert batch");
    let affected = store
        .execute_batch(&statement.sql, &statement.kinds, &rows)
        .await?;

    for record in group {
        write(record).unset_new();
    }

    Ok(FlushReport {
        submitted: rows.len() as u64,
        affected,
    })
}

/// Updates a group of persisted records in one batch.
///
/// In optimistic mode every record must carry an original snapshot; its
/// values form the WHERE side of each bind row, with nullable columns bound
/// twice for the NULL-matching disjunct.
pub async fn update_group<S: Store>(
    store: &S,
    group: &[SharedRecord],
    options: FlushOptions,
) -> Result<FlushReport> {
    let Some(meta) = group_meta(group)? else {
        return Ok(FlushReport::default());
    };

    let statement = if options.optimistic {
        builder::optimistic_update(&meta)
    } else {
        builder::primary_key_update(&meta)
    };

    let mut rows = Vec::with_capacity(group.len());
    for record in group {
        let record = read(record);
        if record.is_new() {
            return Err(EngineError::NoPersistentRecord(meta.table().to_string()));
        }

        let mut row = record.values().to_vec();
        if options.optimistic {
            let Some(snapshot) = record.original() else {
                return Err(EngineError::NoOriginalRecord(meta.table().to_string()));
            };
            push_original_values(&meta, snapshot, &mut row);
        } else {
            for &index in meta.primary_key_indices() {
                row.push(record.values()[index].clone());
            }
        }
        rows.push(row);
    }

    debug!(table = %meta.table(), rows = rows.len(), optimistic = options.optimistic, sql = %statement.sql, "update batch");
    let affected = store
        .execute_batch(&statement.sql, &statement.kinds, &rows)
        .await?;

    Ok(FlushReport {
        submitted: rows.len() as u64,
        affected,
    })
}

/// Deletes a group of persisted records in one batch.
///
/// In optimistic mode each bind row holds the snapshot values plus the
/// snapshot rowid as tiebreaker.
pub async fn delete_group<S: Store>(
    store: &S,
    group: &[SharedRecord],
    options: FlushOptions,
) -> Result<FlushReport> {
    let Some(meta) = group_meta(group)? else {
        return Ok(FlushReport::default());
    };

    let statement = if options.optimistic {
        builder::optimistic_delete(&meta)
    } else {
        builder::primary_key_delete(&meta)
    };

    let mut rows = Vec::with_capacity(group.len());
    for record in group {
        let record = read(record);
        if record.is_new() {
            return Err(EngineError::NoPersistentRecord(meta.table().to_string()));
        }

        let mut row = BindRow::new();
        if options.optimistic {
            let Some(snapshot) = record.original() else {
                return Err(EngineError::NoOriginalRecord(meta.table().to_string()));
            };
            let Some(rowid) = snapshot.rowid() else {
                return Err(EngineError::MissingRowId(meta.table().to_string()));
            };
            push_original_values(&meta, snapshot, &mut row);
            row.push(BindValue::Text(rowid.to_string()));
        } else {
            for &index in meta.primary_key_indices() {
                row.push(record.values()[index].clone());
            }
        }
        rows.push(row);
    }

    debug!(table = %meta.table(), rows = rows.len(), optimistic = options.optimistic, sql = %statement.sql, "delete batch");
    let affected = store
        .execute_batch(&statement.sql, &statement.kinds, &rows)
        .await?;

    Ok(FlushReport {
        submitted: rows.len() as u64,
        affected,
    })
}

/// Inserts or updates a group in at most two batches.
///
/// Records still marked new are inserted; the rest are updated.
pub async fn merge_group<S: Store>(
    store: &S,
    group: &[SharedRecord],
    options: FlushOptions,
) -> Result<FlushReport> {
    if group_meta(group)?.is_none() {
        return Ok(FlushReport::default());
    }

    let (to_insert, to_update): (Vec<_>, Vec<_>) =
        group.iter().cloned().partition(|r| read(r).is_new());

    let mut report = FlushReport::default();
    if !to_insert.is_empty() {
        report += insert_group(store, &to_insert).await?;
    }
    if !to_update.is_empty() {
        report += update_group(store, &to_update, options).await?;
    }
    Ok(report)
}

/// Appends a snapshot's values in column order, binding nullable columns
/// twice so the slot layout matches the optimistic predicate.
fn push_original_values(meta: &TableMeta, snapshot: &Snapshot, row: &mut BindRow) {
    for (column, value) in meta.columns().iter().zip(snapshot.values()) {
        row.push(value.clone());
        if column.nullable {
            row.push(value.clone());
        }
    }
}
