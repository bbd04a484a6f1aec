//! Table and column metadata with the bind-kind classifier.
//!
//! Metadata is supplied by the mapping layer and classified once at
//! construction time; statement builders read the cached classification and
//! never inspect a live value.

use thiserror::Error;

/// Errors raised while classifying or assembling table metadata.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// The native type description has no bind-kind mapping.
    #[error("type {sql_type} of {column} is unsupported")]
    UnsupportedColumnType {
        /// Column name.
        column: String,
        /// The native type description that failed to classify.
        sql_type: String,
    },

    /// A declared primary-key column is not part of the column list.
    #[error("primary key column {0} is not in the column list")]
    UnknownPrimaryKey(String),

    /// A table has no columns.
    #[error("table {0} has no columns")]
    NoColumns(String),

    /// An identifier contains characters that cannot be spliced into SQL.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, MetaError>;

/// The bind kind of one placeholder slot.
///
/// Drivers use the kind, not the value, to pick the coercion for a slot;
/// classification therefore happens before any row is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindKind {
    /// Character data.
    Str,
    /// Date or timestamp data.
    Date,
    /// Integral numeric data.
    Int,
    /// Decimal numeric data.
    Float,
}

impl BindKind {
    /// Classifies a native column type description.
    ///
    /// Rules, in order: "CHAR" anywhere means character data; "DATE" or
    /// "TIMESTAMP" means date data; "NUMBER" without a decimal separator is
    /// integral, with exactly one separator it is decimal. Anything else has
    /// no mapping and returns `None`.
    #[must_use]
    pub fn from_sql_type(sql_type: &str) -> Option<Self> {
        if sql_type.contains("CHAR") {
            return Some(Self::Str);
        }
        if sql_type.contains("DATE") || sql_type.contains("TIMESTAMP") {
            return Some(Self::Date);
        }
        if sql_type.contains("NUMBER") {
            return match sql_type.matches(',').count() {
                0 => Some(Self::Int),
                1 => Some(Self::Float),
                _ => None,
            };
        }
        None
    }
}

/// Metadata for a single column, as supplied by the mapping layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Native type description, e.g. `NUMBER(10,2)` or `VARCHAR2(40)`.
    pub sql_type: String,
    /// Whether the column admits NULL.
    pub nullable: bool,
}

impl ColumnMeta {
    /// Creates column metadata.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable,
        }
    }

    /// Classifies this column's native type.
    ///
    /// An unrecognized type is a configuration error, never a silent
    /// default.
    pub fn bind_kind(&self) -> Result<BindKind> {
        BindKind::from_sql_type(&self.sql_type).ok_or_else(|| MetaError::UnsupportedColumnType {
            column: self.name.clone(),
            sql_type: self.sql_type.clone(),
        })
    }
}

/// Validated per-table metadata: ordered columns, their cached bind kinds,
/// and the primary-key subset.
#[derive(Debug, Clone)]
pub struct TableMeta {
    table: String,
    columns: Vec<ColumnMeta>,
    kinds: Vec<BindKind>,
    primary_key: Vec<usize>,
    sequence_name: String,
}

impl TableMeta {
    /// Starts building metadata for `table`.
    #[must_use]
    pub fn builder(table: impl Into<String>) -> TableMetaBuilder {
        TableMetaBuilder {
            table: table.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            sequence_name: None,
        }
    }

    /// The table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Cached bind kinds, parallel to [`columns`](Self::columns).
    #[must_use]
    pub fn kinds(&self) -> &[BindKind] {
        &self.kinds
    }

    /// Indices of the primary-key columns within the column list.
    #[must_use]
    pub fn primary_key_indices(&self) -> &[usize] {
        &self.primary_key
    }

    /// The primary-key columns with their bind kinds.
    pub fn primary_key(&self) -> impl Iterator<Item = (&ColumnMeta, BindKind)> {
        self.primary_key
            .iter()
            .map(move |&i| (&self.columns[i], self.kinds[i]))
    }

    /// The index of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Whether the table declares an `id` column eligible for surrogate keys.
    #[must_use]
    pub fn has_id_column(&self) -> bool {
        self.column_index("id").is_some()
    }

    /// The configured fallback sequence name.
    ///
    /// Callers prefer `<table>_seq` when the store has it; this name is the
    /// fallback when it does not.
    #[must_use]
    pub fn sequence_name(&self) -> &str {
        &self.sequence_name
    }
}

/// Builder for [`TableMeta`].
#[derive(Debug)]
pub struct TableMetaBuilder {
    table: String,
    columns: Vec<ColumnMeta>,
    primary_key: Vec<String>,
    sequence_name: Option<String>,
}

impl TableMetaBuilder {
    /// Adds a column in declaration order.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, sql_type: impl Into<String>, nullable: bool) -> Self {
        self.columns.push(ColumnMeta::new(name, sql_type, nullable));
        self
    }

    /// Declares a column as part of the primary key.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key.push(name.into());
        self
    }

    /// Overrides the fallback sequence name (default `<table>_seq`).
    #[must_use]
    pub fn sequence_name(mut self, name: impl Into<String>) -> Self {
        self.sequence_name = Some(name.into());
        self
    }

    /// Validates and classifies every column, producing the metadata.
    pub fn build(self) -> Result<TableMeta> {
        if self.columns.is_empty() {
            return Err(MetaError::NoColumns(self.table));
        }

        let kinds = self
            .columns
            .iter()
            .map(ColumnMeta::bind_kind)
            .collect::<Result<Vec<_>>>()?;

        let primary_key = self
            .primary_key
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| MetaError::UnknownPrimaryKey(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let sequence_name = self
            .sequence_name
            .unwrap_or_else(|| format!("{}_seq", self.table));

        Ok(TableMeta {
            table: self.table,
            columns: self.columns,
            kinds,
            primary_key,
            sequence_name,
        })
    }
}

/// Validates an identifier for direct splicing into SQL text.
///
/// Accepts `[A-Za-z_]` followed by `[A-Za-z0-9_$#]`, the portable subset of
/// unquoted identifiers. Anything else must go through a bind parameter
/// instead.
pub fn sanitize_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#')) {
        Ok(name)
    } else {
        Err(MetaError::InvalidIdentifier(name.to_string()))
    }
}
