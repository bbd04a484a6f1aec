//! The flush registry: per-connection dirty queue and sequence caches.
//!
//! One registry serves one store connection. It is constructed explicitly
//! and passed by reference to every scheduling call site; there is no
//! process-wide ambient instance.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::group::{self, FlushOptions, FlushReport};
use crate::record::{read, write, SharedRecord};
use crate::sequence::{resolve_sequence_name, SequenceCache};
use crate::store::Store;

/// A pending write, consumed when its partition is flushed.
#[derive(Debug, Clone)]
pub enum ScheduledOp {
    /// Insert-or-update the record.
    Merge(SharedRecord),
    /// Delete the record.
    Delete(SharedRecord),
}

impl ScheduledOp {
    fn record(&self) -> &SharedRecord {
        match self {
            Self::Merge(record) | Self::Delete(record) => record,
        }
    }

    fn is_merge(&self) -> bool {
        matches!(self, Self::Merge(_))
    }
}

#[derive(Default)]
struct RegistryState {
    /// Pending operations per table, in schedule order.
    queues: HashMap<String, Vec<ScheduledOp>>,
    /// Sequence caches per table, created on first surrogate-key request.
    sequences: HashMap<String, SequenceCache>,
}

/// Registry of pending merge and delete operations, grouped by record kind.
///
/// Scheduling is atomic per call; flushing drains one table's queue and
/// executes at most three batches (inserts, updates, deletes). Queue state
/// lives in memory only.
pub struct FlushRegistry<S: Store> {
    store: S,
    state: Mutex<RegistryState>,
}

impl<S: Store> FlushRegistry<S> {
    /// Creates a registry for one store connection.
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Tears the registry down, discarding pending operations and returning
    /// the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Schedules a record for merge, assigning a surrogate id first when the
    /// kind declares an `id` column and the record has none.
    ///
    /// Scheduling the same instance twice enqueues one operation.
    pub async fn schedule_merge(&self, record: &SharedRecord) -> Result<()> {
        self.assign_id(record).await?;

        let table = read(record).meta().table().to_string();
        let mut state = self.state.lock().await;
        let queue = state.queues.entry(table).or_default();
        let already_queued = queue
            .iter()
            .any(|op| op.is_merge() && Arc::ptr_eq(op.record(), record));
        if !already_queued {
            queue.push(ScheduledOp::Merge(record.clone()));
        }
        Ok(())
    }

    /// Schedules a record for merge only when it actually changed.
    ///
    /// A record that is new, has no snapshot, or differs from its snapshot
    /// is scheduled; an unchanged record is a no-op. Returns whether the
    /// record was considered changed. Skipping unchanged records avoids
    /// wasted round trips and false contention under concurrent writers.
    pub async fn schedule_merge_if_changed(&self, record: &SharedRecord) -> Result<bool> {
        let changed = {
            let record = read(record);
            record.is_new() || record.is_changed()
        };
        if changed {
            self.schedule_merge(record).await?;
        }
        Ok(changed)
    }

    /// Schedules a record for delete, unconditionally.
    pub async fn schedule_delete(&self, record: &SharedRecord) {
        let table = read(record).meta().table().to_string();
        let mut state = self.state.lock().await;
        let queue = state.queues.entry(table).or_default();
        let already_queued = queue
            .iter()
            .any(|op| !op.is_merge() && Arc::ptr_eq(op.record(), record));
        if !already_queued {
            queue.push(ScheduledOp::Delete(record.clone()));
        }
    }

    /// Number of operations pending for a table.
    pub async fn pending(&self, table: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(table)
            .map_or(0, Vec::len)
    }

    /// Discards all pending operations for a table, returning how many were
    /// dropped. Useful from a rollback listener.
    pub async fn clear(&self, table: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .remove(table)
            .map_or(0, |ops| ops.len())
    }

    /// Flushes all pending operations for one table.
    ///
    /// Operations are partitioned into inserts (merges of new records),
    /// updates (merges of persisted records), and deletes, executed in that
    /// order as one batch each. Flush is not atomic across partitions: on a
    /// partition failure the failed partition and every partition not yet
    /// attempted are re-enqueued, while already-executed partitions stay
    /// flushed.
    pub async fn flush(&self, table: &str, options: FlushOptions) -> Result<FlushReport> {
        let ops = {
            let mut state = self.state.lock().await;
            state.queues.remove(table).unwrap_or_default()
        };
        if ops.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut to_insert = Vec::new();
        let mut to_update = Vec::new();
        let mut to_delete = Vec::new();
        for op in ops {
            match op {
                ScheduledOp::Merge(record) if read(&record).is_new() => to_insert.push(record),
                ScheduledOp::Merge(record) => to_update.push(record),
                ScheduledOp::Delete(record) => to_delete.push(record),
            }
        }
        debug!(
            table,
            inserts = to_insert.len(),
            updates = to_update.len(),
            deletes = to_delete.len(),
            "flushing"
        );

        let mut report = FlushReport::default();

        if !to_insert.is_empty() {
            match group::insert_group(&self.store, &to_insert).await {
                Ok(partial) => report += partial,
                Err(error) => {
                    let mut merges = to_insert;
                    merges.extend(to_update);
                    self.requeue(table, merges, to_delete).await;
                    return Err(error);
                }
            }
        }

        if !to_update.is_empty() {
            match group::update_group(&self.store, &to_update, options).await {
                Ok(partial) => report += partial,
                Err(error) => {
                    self.requeue(table, to_update, to_delete).await;
                    return Err(error);
                }
            }
        }

        if !to_delete.is_empty() {
            match group::delete_group(&self.store, &to_delete, options).await {
                Ok(partial) => report += partial,
                Err(error) => {
                    self.requeue(table, Vec::new(), to_delete).await;
                    return Err(error);
                }
            }
        }

        if report.conflicts() > 0 {
            warn!(
                table,
                submitted = report.submitted,
                affected = report.affected,
                "flush detected stale rows"
            );
        }
        info!(
            table,
            submitted = report.submitted,
            affected = report.affected,
            "flushed"
        );
        Ok(report)
    }

    /// Flushes every table with pending operations.
    pub async fn flush_all(&self, options: FlushOptions) -> Result<FlushReport> {
        let tables: Vec<String> = {
            let state = self.state.lock().await;
            state.queues.keys().cloned().collect()
        };

        let mut total = FlushReport::default();
        for table in tables {
            total += self.flush(&table, options).await?;
        }
        Ok(total)
    }

    /// Puts unflushed operations back at the front of the table's queue,
    /// ahead of anything scheduled while the flush ran.
    async fn requeue(&self, table: &str, merges: Vec<SharedRecord>, deletes: Vec<SharedRecord>) {
        let ops: Vec<ScheduledOp> = merges
            .into_iter()
            .map(ScheduledOp::Merge)
            .chain(deletes.into_iter().map(ScheduledOp::Delete))
            .collect();
        let mut state = self.state.lock().await;
        let queue = state.queues.entry(table.to_string()).or_default();
        queue.splice(0..0, ops);
    }

    /// Assigns a surrogate id from the kind's sequence when needed.
    async fn assign_id(&self, record: &SharedRecord) -> Result<()> {
        let meta = read(record).meta().clone();
        if !meta.has_id_column() || read(record).id().is_some() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let cache = match state.sequences.entry(meta.table().to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let name = resolve_sequence_name(&self.store, &meta).await?;
                entry.insert(SequenceCache::new(name))
            }
        };
        let id = cache.next_value(&self.store).await?;
        write(record).set_id_if_missing(id);
        Ok(())
    }
}
