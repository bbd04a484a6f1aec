//! SQLite adapter for the store collaborator traits.
//!
//! Generated statements use Oracle-style positional `:N` placeholders and
//! `cast(... as date)` comparisons; this adapter rewrites both to their
//! SQLite forms before handing them to sqlx. Store-side
//! sequences are emulated in a single `rowforge_sequences` table, and
//! foreign-key introspection goes through `pragma_foreign_key_list`.

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, SqliteConnection, TypeInfo, ValueRef};
use tracing::debug;

use rowforge_sql::{sanitize_identifier, BindKind, BindRow, BindValue};

use crate::error::{EngineError, Result};
use crate::store::{RawRow, Store, TransactionControl};

/// The table backing emulated sequences.
const SEQUENCE_TABLE: &str = "rowforge_sequences";

/// A [`Store`] backed by a sqlx SQLite pool.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wraps a pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates an emulated sequence whose first issued value is `start`.
    /// Creating an existing sequence is a no-op.
    pub async fn create_sequence(&self, name: &str, start: i64) -> Result<()> {
        self.ensure_sequence_table().await?;
        sqlx::query(&format!(
            "INSERT INTO {SEQUENCE_TABLE} (name, value) VALUES (?, ?) \
             ON CONFLICT(name) DO NOTHING"
        ))
        .bind(name)
        .bind(start - 1)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_sequence_table(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {SEQUENCE_TABLE} \
             (name TEXT PRIMARY KEY, value INTEGER NOT NULL)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl Store for SqliteStore {
    async fn execute_batch(&self, sql: &str, kinds: &[BindKind], rows: &[BindRow]) -> Result<u64> {
        for row in rows {
            if row.len() != kinds.len() {
                return Err(EngineError::Validation(format!(
                    "bind row arity {} does not match statement arity {}",
                    row.len(),
                    kinds.len()
                )));
            }
        }

        let rewritten = rewrite_placeholders(&rewrite_date_casts(sql));
        debug!(sql = %rewritten, rows = rows.len(), "executing batch");

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for row in rows {
            let mut query = sqlx::query(&rewritten);
            for value in row {
                query = bind_value(query, value);
            }
            affected += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn find_by_sql(&self, sql: &str) -> Result<Vec<RawRow>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn next_sequence_value(&self, sequence: &str) -> Result<i64> {
        self.ensure_sequence_table().await?;
        let row = sqlx::query(&format!(
            "UPDATE {SEQUENCE_TABLE} SET value = value + 1 WHERE name = ? RETURNING value"
        ))
        .bind(sequence)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.try_get(0)?),
            None => Err(EngineError::Validation(format!(
                "sequence {sequence} does not exist"
            ))),
        }
    }

    async fn sequence_exists(&self, sequence: &str) -> Result<bool> {
        self.ensure_sequence_table().await?;
        let row = sqlx::query(&format!("SELECT 1 FROM {SEQUENCE_TABLE} WHERE name = ?"))
            .bind(sequence)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn foreign_master_tables(&self, table: &str) -> Result<Vec<String>> {
        let table = sanitize_identifier(table)?;
        let sql = format!(
            "SELECT DISTINCT \"table\" AS master FROM pragma_foreign_key_list('{table}') \
             ORDER BY master"
        );
        let rows = self.find_by_sql(&sql).await?;
        Ok(collect_text(&rows, "master"))
    }

    async fn foreign_detail_tables(&self, table: &str) -> Result<Vec<String>> {
        let table = sanitize_identifier(table)?;
        let sql = format!(
            "SELECT DISTINCT m.name AS detail \
             FROM sqlite_master AS m, pragma_foreign_key_list(m.name) AS fk \
             WHERE m.type = 'table' AND fk.\"table\" = '{table}' \
             ORDER BY detail"
        );
        let rows = self.find_by_sql(&sql).await?;
        Ok(collect_text(&rows, "detail"))
    }
}

impl TransactionControl for SqliteConnection {
    async fn commit(&mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut *self).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(&mut *self).await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let name = sanitize_identifier(name)?;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .execute(&mut *self)
            .await?;
        Ok(())
    }

    async fn create_savepoint(&mut self, name: &str) -> Result<()> {
        let name = sanitize_identifier(name)?;
        sqlx::query(&format!("SAVEPOINT {name}"))
            .execute(&mut *self)
            .await?;
        Ok(())
    }
}

/// Rewrites `:N` placeholders to `?`.
///
/// Generated statements reference placeholders strictly left to right and
/// never inside string literals, so positional `?` binding preserves slot
/// order.
fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ':' && chars.peek().is_some_and(char::is_ascii_digit) {
            while chars.peek().is_some_and(char::is_ascii_digit) {
                chars.next();
            }
            out.push('?');
        } else {
            out.push(c);
        }
    }
    out
}

/// Rewrites `col = cast(:N as date)` comparisons to
/// `datetime(col) = datetime(:N)`.
///
/// SQLite's `CAST(x AS date)` has numeric affinity and truncates a
/// timestamp string to its leading digits, so the generated date equality
/// would never match a stored text value. Normalizing both sides through
/// `datetime()` keeps date predicates exact; a NULL column stays NULL and
/// falls through to the IS NULL disjunct.
fn rewrite_date_casts(sql: &str) -> String {
    const INFIX: &str = " = cast(";
    const SUFFIX: &str = " as date)";

    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(pos) = rest.find(INFIX) {
        let (before, after) = rest.split_at(pos);
        let tail = &after[INFIX.len()..];
        let end = tail
            .find(SUFFIX)
            .filter(|&end| is_numbered_placeholder(&tail[..end]));
        let Some(end) = end else {
            out.push_str(before);
            out.push_str(INFIX);
            rest = tail;
            continue;
        };

        let column_start = before
            .rfind(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#')))
            .map_or(0, |i| i + 1);
        out.push_str(&before[..column_start]);
        out.push_str("datetime(");
        out.push_str(&before[column_start..]);
        out.push_str(") = datetime(");
        out.push_str(&tail[..end]);
        out.push(')');
        rest = &tail[end + SUFFIX.len()..];
    }
    out.push_str(rest);
    out
}

fn is_numbered_placeholder(s: &str) -> bool {
    s.strip_prefix(':')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &BindValue) -> SqliteQuery<'q> {
    match value {
        BindValue::Null => query.bind(Option::<i64>::None),
        BindValue::Int(i) => query.bind(*i),
        BindValue::Float(f) => query.bind(*f),
        BindValue::Text(s) => query.bind(s.clone()),
        BindValue::Date(d) => query.bind(*d),
    }
}

fn collect_text(rows: &[RawRow], column: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| match row.get(column) {
            Some(BindValue::Text(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn decode_row(row: &SqliteRow) -> Result<RawRow> {
    let mut out = RawRow::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_column(row, index)?);
    }
    Ok(out)
}

fn decode_column(row: &SqliteRow, index: usize) -> Result<BindValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(BindValue::Null);
    }
    match raw.type_info().name() {
        "INTEGER" => Ok(BindValue::Int(row.try_get(index)?)),
        "REAL" => Ok(BindValue::Float(row.try_get(index)?)),
        "BLOB" => Err(EngineError::Validation(
            "blob columns are not supported in raw selects".to_string(),
        )),
        _ => Ok(BindValue::Text(row.try_get(index)?)),
    }
}
