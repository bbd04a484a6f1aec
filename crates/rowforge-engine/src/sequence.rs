//! Surrogate-key issuance backed by store-side sequences.

use rowforge_sql::TableMeta;
use tracing::debug;

use crate::error::Result;
use crate::store::Store;

/// A reserved block of sequence values.
#[derive(Debug, Clone, Copy)]
struct SequenceBlock {
    next_value: i64,
    remaining: u32,
}

/// Caches blocks of values from one store-side sequence.
///
/// Values are issued strictly monotonically and never repeated within a
/// process; a block fetched from the store is consumed locally before the
/// next round trip.
#[derive(Debug)]
pub struct SequenceCache {
    name: String,
    block: SequenceBlock,
}

impl SequenceCache {
    /// Creates an empty cache for the named sequence.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            block: SequenceBlock {
                next_value: 0,
                remaining: 0,
            },
        }
    }

    /// The sequence this cache draws from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issues the next value, fetching a fresh block on exhaustion.
    ///
    /// The baseline block size is one raw sequence value per round trip.
    pub async fn next_value<S: Store>(&mut self, store: &S) -> Result<i64> {
        if self.block.remaining == 0 {
            let raw = store.next_sequence_value(&self.name).await?;
            debug!(sequence = %self.name, value = raw, "fetched sequence block");
            self.block = SequenceBlock {
                next_value: raw,
                remaining: 1,
            };
        }
        let value = self.block.next_value;
        self.block.next_value += 1;
        self.block.remaining -= 1;
        Ok(value)
    }
}

/// Resolves which sequence feeds a table's surrogate keys.
///
/// Prefers `<table>_seq` when the store has it, falling back to the name
/// configured in the metadata. Callers cache the result per table.
pub(crate) async fn resolve_sequence_name<S: Store>(store: &S, meta: &TableMeta) -> Result<String> {
    let preferred = format!("{}_seq", meta.table());
    if store.sequence_exists(&preferred).await? {
        Ok(preferred)
    } else {
        Ok(meta.sequence_name().to_string())
    }
}
