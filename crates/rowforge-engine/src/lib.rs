//! # rowforge-engine
//!
//! A deferred-write persistence engine with batched optimistic concurrency.
//!
//! Application code mutates in-memory [`Record`]s and schedules them on a
//! [`FlushRegistry`]; a later flush compiles the accumulated operations into
//! a minimal number of batched SQL statements, each executed once for a
//! whole partition of same-shape rows. Updates and deletes are guarded by an
//! optimistic predicate over every original column value, so a concurrent
//! writer that got there first simply lowers the affected-row count instead
//! of being silently overwritten.
//!
//! ## Scheduling and flushing
//!
//! ```ignore
//! use std::sync::Arc;
//! use rowforge_engine::{record, FlushOptions, FlushRegistry, Record, SqliteStore, TableMeta};
//!
//! let meta = Arc::new(
//!     TableMeta::builder("people")
//!         .column("id", "NUMBER(10)", false)
//!         .column("name", "VARCHAR2(40)", true)
//!         .primary_key("id")
//!         .build()?,
//! );
//!
//! let registry = FlushRegistry::new(SqliteStore::new(pool));
//!
//! let person = record::shared(Record::new(meta.clone()));
//! person.write().unwrap().set("name", "alice")?;
//! registry.schedule_merge_if_changed(&person).await?;
//!
//! let report = registry.flush("people", FlushOptions::default()).await?;
//! if report.conflicts() > 0 {
//!     // another writer changed some rows first; retry with fresh snapshots
//! }
//! ```
//!
//! ## Lost updates are a count, not an error
//!
//! The engine never locks rows. It re-checks every original column value
//! (plus ROWID for deletes) inside the statement's WHERE clause; a stale row
//! fails its predicate and drops out of the affected count. Compare
//! [`FlushReport::submitted`] with [`FlushReport::affected`] to detect
//! conflicts.

mod error;
pub mod group;
pub mod listener;
pub mod record;
pub mod registry;
pub mod sequence;
pub mod sqlite;
pub mod store;

pub use error::{EngineError, Result};
pub use group::{FlushOptions, FlushReport};
pub use listener::{ListenerBus, TransactionListener};
pub use record::{shared, Record, SharedRecord, Snapshot};
pub use registry::{FlushRegistry, ScheduledOp};
pub use sequence::SequenceCache;
pub use sqlite::SqliteStore;
pub use store::{RawRow, Store, TransactionControl};

// Re-export the statement and metadata layer.
pub use rowforge_sql::{
    builder, BatchStatement, BindKind, BindRow, BindValue, ColumnMeta, MetaError, TableMeta,
    TableMetaBuilder, ToBindValue,
};
