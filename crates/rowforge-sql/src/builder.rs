//! Batched DML statement builders.
//!
//! Each builder is a pure function of [`TableMeta`]: it produces statement
//! text with positional `:N` placeholders and the parallel list of bind
//! kinds. Placeholder indices are assigned strictly left to right with an
//! explicit running counter; the counter also fixes which slot of a bind row
//! each column occupies, so builders and row assembly must agree exactly.

use crate::schema::{BindKind, ColumnMeta, TableMeta};

/// A generated statement: SQL text plus the bind kind of every placeholder,
/// in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatement {
    /// The statement text with `:1`, `:2`, ... placeholders.
    pub sql: String,
    /// Bind kinds, one per placeholder.
    pub kinds: Vec<BindKind>,
}

impl BatchStatement {
    /// The number of placeholders every bind row must fill.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.kinds.len()
    }
}

/// Builds a plain multi-row insert.
///
/// One placeholder per column, in declaration order.
#[must_use]
pub fn insert(meta: &TableMeta) -> BatchStatement {
    let columns: Vec<&str> = meta.columns().iter().map(|c| c.name.as_str()).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!(":{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        meta.table(),
        columns.join(", "),
        placeholders.join(", ")
    );
    BatchStatement {
        sql,
        kinds: meta.kinds().to_vec(),
    }
}

/// Builds an update guarded by the optimistic full-row predicate.
///
/// SET placeholders come first (one per column, the new value); the WHERE
/// placeholders follow (one per column for its original value, plus one
/// extra per nullable column).
#[must_use]
pub fn optimistic_update(meta: &TableMeta) -> BatchStatement {
    let mut index = 1;
    let mut kinds = meta.kinds().to_vec();
    let set = set_clause(meta, &mut index);
    let predicate = optimistic_predicate(meta, &mut index, &mut kinds);
    BatchStatement {
        sql: format!("UPDATE {} SET {set} WHERE {predicate}", meta.table()),
        kinds,
    }
}

/// Builds an update keyed by primary-key equality only.
///
/// Trades concurrency safety for not needing an original snapshot. Primary
/// keys are never null, so plain equality suffices.
#[must_use]
pub fn primary_key_update(meta: &TableMeta) -> BatchStatement {
    let mut index = 1;
    let mut kinds = meta.kinds().to_vec();
    let set = set_clause(meta, &mut index);
    let predicate = primary_key_predicate(meta, &mut index, &mut kinds);
    BatchStatement {
        sql: format!("UPDATE {} SET {set} WHERE {predicate}", meta.table()),
        kinds,
    }
}

/// Builds a delete guarded by the optimistic predicate plus a ROWID
/// tiebreaker.
///
/// The trailing ROWID comparison disambiguates rows that compare equal on
/// every column.
#[must_use]
pub fn optimistic_delete(meta: &TableMeta) -> BatchStatement {
    let mut index = 1;
    let mut kinds = Vec::new();
    let predicate = optimistic_predicate(meta, &mut index, &mut kinds);
    kinds.push(BindKind::Str);
    BatchStatement {
        sql: format!(
            "DELETE FROM {} WHERE {predicate} AND ROWID = :{index}",
            meta.table()
        ),
        kinds,
    }
}

/// Builds a delete keyed by primary-key equality only.
#[must_use]
pub fn primary_key_delete(meta: &TableMeta) -> BatchStatement {
    let mut index = 1;
    let mut kinds = Vec::new();
    let predicate = primary_key_predicate(meta, &mut index, &mut kinds);
    BatchStatement {
        sql: format!("DELETE FROM {} WHERE {predicate}", meta.table()),
        kinds,
    }
}

fn set_clause(meta: &TableMeta, index: &mut usize) -> String {
    let parts: Vec<String> = meta
        .columns()
        .iter()
        .map(|c| {
            let part = format!("{} = :{index}", c.name);
            *index += 1;
            part
        })
        .collect();
    parts.join(", ")
}

fn primary_key_predicate(meta: &TableMeta, index: &mut usize, kinds: &mut Vec<BindKind>) -> String {
    let parts: Vec<String> = meta
        .primary_key()
        .map(|(column, kind)| {
            let part = format!("{} = :{index}", column.name);
            *index += 1;
            kinds.push(kind);
            part
        })
        .collect();
    parts.join(" AND ")
}

fn optimistic_predicate(meta: &TableMeta, index: &mut usize, kinds: &mut Vec<BindKind>) -> String {
    let parts: Vec<String> = meta
        .columns()
        .iter()
        .zip(meta.kinds())
        .map(|(column, &kind)| optimistic_element(column, kind, index, kinds))
        .collect();
    parts.join(" AND ")
}

/// One optimistic comparison element.
///
/// Non-nullable columns compare by plain equality. Nullable columns consume
/// a second placeholder so a stored NULL can match a NULL original under
/// three-valued NULL semantics. Date columns compare through an explicit
/// date cast so a timestamp bind matches a stored date-only value.
fn optimistic_element(
    column: &ColumnMeta,
    kind: BindKind,
    index: &mut usize,
    kinds: &mut Vec<BindKind>,
) -> String {
    let equality = match kind {
        BindKind::Date => format!("{} = cast(:{index} as date)", column.name),
        _ => format!("{} = :{index}", column.name),
    };
    *index += 1;
    kinds.push(kind);

    if column.nullable {
        let element = format!("( {equality} OR ( {} IS NULL AND :{index} IS NULL ) )", column.name);
        *index += 1;
        kinds.push(kind);
        element
    } else {
        equality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people_meta() -> TableMeta {
        TableMeta::builder("people")
            .column("id", "NUMBER(10)", false)
            .column("name", "CHAR(40)", true)
            .primary_key("id")
            .build()
            .unwrap()
    }

    #[test]
    fn insert_statement() {
        let statement = insert(&people_meta());
        assert_eq!(statement.sql, "INSERT INTO people (id, name) VALUES (:1, :2)");
        assert_eq!(statement.kinds, vec![BindKind::Int, BindKind::Str]);
    }

    #[test]
    fn optimistic_update_statement() {
        let statement = optimistic_update(&people_meta());
        assert_eq!(
            statement.sql,
            "UPDATE people SET id = :1, name = :2 \
             WHERE id = :3 AND ( name = :4 OR ( name IS NULL AND :5 IS NULL ) )"
        );
        // New values, then originals with the nullable column doubled.
        assert_eq!(
            statement.kinds,
            vec![
                BindKind::Int,
                BindKind::Str,
                BindKind::Int,
                BindKind::Str,
                BindKind::Str,
            ]
        );
    }

    #[test]
    fn primary_key_update_statement() {
        let statement = primary_key_update(&people_meta());
        assert_eq!(
            statement.sql,
            "UPDATE people SET id = :1, name = :2 WHERE id = :3"
        );
        assert_eq!(
            statement.kinds,
            vec![BindKind::Int, BindKind::Str, BindKind::Int]
        );
    }

    #[test]
    fn optimistic_delete_statement() {
        let statement = optimistic_delete(&people_meta());
        assert_eq!(
            statement.sql,
            "DELETE FROM people \
             WHERE id = :1 AND ( name = :2 OR ( name IS NULL AND :3 IS NULL ) ) \
             AND ROWID = :4"
        );
        assert_eq!(
            statement.kinds,
            vec![BindKind::Int, BindKind::Str, BindKind::Str, BindKind::Str]
        );
    }

    #[test]
    fn primary_key_delete_statement() {
        let statement = primary_key_delete(&people_meta());
        assert_eq!(statement.sql, "DELETE FROM people WHERE id = :1");
        assert_eq!(statement.kinds, vec![BindKind::Int]);
    }

    #[test]
    fn date_columns_compare_through_cast() {
        let meta = TableMeta::builder("events")
            .column("id", "NUMBER(10)", false)
            .column("occurred_at", "DATE", true)
            .primary_key("id")
            .build()
            .unwrap();

        let statement = optimistic_update(&meta);
        assert_eq!(
            statement.sql,
            "UPDATE events SET id = :1, occurred_at = :2 \
             WHERE id = :3 AND \
             ( occurred_at = cast(:4 as date) OR ( occurred_at IS NULL AND :5 IS NULL ) )"
        );
    }

    #[test]
    fn composite_primary_key() {
        let meta = TableMeta::builder("order_lines")
            .column("order_id", "NUMBER(10)", false)
            .column("line_no", "NUMBER(5)", false)
            .column("qty", "NUMBER(10)", false)
            .primary_key("order_id")
            .primary_key("line_no")
            .build()
            .unwrap();

        let statement = primary_key_update(&meta);
        assert_eq!(
            statement.sql,
            "UPDATE order_lines SET order_id = :1, line_no = :2, qty = :3 \
             WHERE order_id = :4 AND line_no = :5"
        );
    }

    #[test]
    fn non_nullable_columns_consume_one_where_placeholder() {
        let meta = TableMeta::builder("flags")
            .column("id", "NUMBER(10)", false)
            .column("code", "CHAR(2)", false)
            .primary_key("id")
            .build()
            .unwrap();

        let statement = optimistic_delete(&meta);
        assert_eq!(
            statement.sql,
            "DELETE FROM flags WHERE id = :1 AND code = :2 AND ROWID = :3"
        );
        assert_eq!(statement.arity(), 3);
    }
}
