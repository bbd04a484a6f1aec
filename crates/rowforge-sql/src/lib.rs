//! # rowforge-sql
//!
//! Statement generation for batched, optimistically locked writes.
//!
//! This crate is the pure half of rowforge: given per-table column metadata
//! it produces parameterized DML with positional `:N` placeholders, plus the
//! ordered list of bind kinds a driver needs to coerce each placeholder
//! slot. It performs no I/O.
//!
//! ## Building a statement
//!
//! ```rust
//! use rowforge_sql::{builder, TableMeta};
//!
//! let meta = TableMeta::builder("people")
//!     .column("id", "NUMBER(10)", false)
//!     .column("name", "VARCHAR2(40)", true)
//!     .primary_key("id")
//!     .build()
//!     .unwrap();
//!
//! let statement = builder::optimistic_update(&meta);
//! assert_eq!(
//!     statement.sql,
//!     "UPDATE people SET id = :1, name = :2 \
//!      WHERE id = :3 AND ( name = :4 OR ( name IS NULL AND :5 IS NULL ) )"
//! );
//! ```
//!
//! The nullable column `name` consumes two WHERE placeholders: `NULL` is
//! never equal to `NULL` under ordinary SQL comparison, so a stored NULL can
//! only be matched through the explicit `IS NULL` disjunct.

pub mod builder;
pub mod schema;
pub mod value;

pub use builder::BatchStatement;
pub use schema::{sanitize_identifier, BindKind, ColumnMeta, MetaError, TableMeta, TableMetaBuilder};
pub use value::{BindRow, BindValue, ToBindValue};
