//! End-to-end flush tests driving a [`FlushRegistry`] against SQLite.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use rowforge_engine::{
    shared, BindValue, FlushOptions, FlushRegistry, RawRow, Record, SharedRecord, SqliteStore,
    Store, TableMeta,
};

async fn store() -> SqliteStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("failed to create in-memory SQLite pool");
    sqlx::query("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    SqliteStore::new(pool)
}

fn people_meta() -> Arc<TableMeta> {
    Arc::new(
        TableMeta::builder("people")
            .column("id", "NUMBER(10)", false)
            .column("name", "VARCHAR2(40)", true)
            .primary_key("id")
            .build()
            .unwrap(),
    )
}

async fn seed_person(store: &SqliteStore, id: i64, name: &str) {
    sqlx::query("INSERT INTO people (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(store.pool())
        .await
        .unwrap();
}

/// Rebuilds a record from a `SELECT rowid AS rid, id, name` row and takes
/// the before-image snapshot, as a finder would.
fn record_from_row(meta: &Arc<TableMeta>, row: &RawRow) -> SharedRecord {
    let rowid = match row.get("rid") {
        Some(BindValue::Int(r)) => Some(r.to_string()),
        _ => None,
    };
    let values = meta
        .columns()
        .iter()
        .map(|c| row.get(&c.name).cloned().unwrap_or(BindValue::Null))
        .collect();
    let mut record = Record::selected(meta.clone(), values, rowid).unwrap();
    record.save_original();
    shared(record)
}

async fn select_people(store: &SqliteStore, meta: &Arc<TableMeta>) -> Vec<SharedRecord> {
    store
        .find_by_sql("SELECT rowid AS rid, id, name FROM people ORDER BY id")
        .await
        .unwrap()
        .iter()
        .map(|row| record_from_row(meta, row))
        .collect()
}

#[tokio::test]
async fn inserted_records_get_sequence_ids_and_read_back() {
    let store = store().await;
    store.create_sequence("people_seq", 1).await.unwrap();
    let registry = FlushRegistry::new(store);
    let meta = people_meta();

    let mut records = Vec::new();
    for name in ["alice", "bob", "carol"] {
        let mut record = Record::new(meta.clone());
        record.set("name", name).unwrap();
        let record = shared(record);
        registry.schedule_merge(&record).await.unwrap();
        records.push(record);
    }
    assert_eq!(registry.pending("people").await, 3);

    let report = registry
        .flush("people", FlushOptions::default())
        .await
        .unwrap();
    assert_eq!(report.submitted, 3);
    assert_eq!(report.affected, 3);
    assert_eq!(report.conflicts(), 0);
    assert_eq!(registry.pending("people").await, 0);

    for (i, record) in records.iter().enumerate() {
        let record = record.read().unwrap();
        assert_eq!(record.id(), Some(i as i64 + 1));
        assert!(!record.is_new());
    }

    let rows = registry
        .store()
        .find_by_sql("SELECT id, name FROM people ORDER BY id")
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("id"), Some(&BindValue::Int(1)));
    assert_eq!(rows[0].get("name"), Some(&BindValue::Text("alice".into())));
    assert_eq!(rows[2].get("name"), Some(&BindValue::Text("carol".into())));
}

#[tokio::test]
async fn scheduling_the_same_record_twice_enqueues_once() {
    let store = store().await;
    store.create_sequence("people_seq", 1).await.unwrap();
    let registry = FlushRegistry::new(store);

    let mut record = Record::new(people_meta());
    record.set("name", "alice").unwrap();
    let record = shared(record);
    registry.schedule_merge(&record).await.unwrap();
    registry.schedule_merge(&record).await.unwrap();
    assert_eq!(registry.pending("people").await, 1);

    let report = registry
        .flush("people", FlushOptions::default())
        .await
        .unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(report.affected, 1);
}

#[tokio::test]
async fn stale_row_surfaces_as_conflict_count_not_error() {
    let store = store().await;
    seed_person(&store, 1, "alice").await;
    seed_person(&store, 2, "bob").await;
    let meta = people_meta();
    let records = select_people(&store, &meta).await;
    let registry = FlushRegistry::new(store);

    records[0].write().unwrap().set("name", "alice2").unwrap();
    records[1].write().unwrap().set("name", "bob2").unwrap();
    registry.schedule_merge(&records[0]).await.unwrap();
    registry.schedule_merge(&records[1]).await.unwrap();

    // A concurrent writer changes bob behind our back.
    sqlx::query("UPDATE people SET name = 'intruder' WHERE id = 2")
        .execute(registry.store().pool())
        .await
        .unwrap();

    let report = registry
        .flush("people", FlushOptions::default())
        .await
        .unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.affected, 1);
    assert_eq!(report.conflicts(), 1);

    let rows = registry
        .store()
        .find_by_sql("SELECT name FROM people ORDER BY id")
        .await
        .unwrap();
    assert_eq!(rows[0].get("name"), Some(&BindValue::Text("alice2".into())));
    assert_eq!(
        rows[1].get("name"),
        Some(&BindValue::Text("intruder".into()))
    );
}

#[tokio::test]
async fn primary_key_update_ignores_concurrent_changes() {
    let store = store().await;
    seed_person(&store, 1, "alice").await;
    let meta = people_meta();
    let records = select_people(&store, &meta).await;
    let registry = FlushRegistry::new(store);

    records[0].write().unwrap().set("name", "alice2").unwrap();
    registry.schedule_merge(&records[0]).await.unwrap();

    sqlx::query("UPDATE people SET name = 'intruder' WHERE id = 1")
        .execute(registry.store().pool())
        .await
        .unwrap();

    let report = registry
        .flush("people", FlushOptions { optimistic: false })
        .await
        .unwrap();
    assert_eq!(report.affected, 1);
    assert_eq!(report.conflicts(), 0);

    let rows = registry
        .store()
        .find_by_sql("SELECT name FROM people")
        .await
        .unwrap();
    assert_eq!(rows[0].get("name"), Some(&BindValue::Text("alice2".into())));
}

#[tokio::test]
async fn optimistic_delete_removes_only_unchanged_rows() {
    let store = store().await;
    seed_person(&store, 1, "alice").await;
    seed_person(&store, 2, "bob").await;
    let meta = people_meta();
    let records = select_people(&store, &meta).await;
    let registry = FlushRegistry::new(store);

    registry.schedule_delete(&records[0]).await;
    registry.schedule_delete(&records[1]).await;

    sqlx::query("UPDATE people SET name = 'intruder' WHERE id = 2")
        .execute(registry.store().pool())
        .await
        .unwrap();

    let report = registry
        .flush("people", FlushOptions::default())
        .await
        .unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.affected, 1);
    assert_eq!(report.conflicts(), 1);

    let rows = registry
        .store()
        .find_by_sql("SELECT id, name FROM people")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&BindValue::Int(2)));
}

#[tokio::test]
async fn merge_partitions_inserts_before_updates() {
    let store = store().await;
    store.create_sequence("people_seq", 10).await.unwrap();
    seed_person(&store, 1, "alice").await;
    let meta = people_meta();
    let existing = select_people(&store, &meta).await;
    let registry = FlushRegistry::new(store);

    existing[0].write().unwrap().set("name", "alice2").unwrap();
    assert!(registry
        .schedule_merge_if_changed(&existing[0])
        .await
        .unwrap());

    let mut fresh = Record::new(meta.clone());
    fresh.set("name", "dave").unwrap();
    let fresh = shared(fresh);
    registry.schedule_merge(&fresh).await.unwrap();

    let report = registry
        .flush("people", FlushOptions::default())
        .await
        .unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.affected, 2);
    assert_eq!(fresh.read().unwrap().id(), Some(10));

    let rows = registry
        .store()
        .find_by_sql("SELECT id, name FROM people ORDER BY id")
        .await
        .unwrap();
    assert_eq!(rows[0].get("name"), Some(&BindValue::Text("alice2".into())));
    assert_eq!(rows[1].get("id"), Some(&BindValue::Int(10)));
}

#[tokio::test]
async fn null_snapshot_values_match_stored_nulls() {
    let store = store().await;
    sqlx::query("INSERT INTO people (id, name) VALUES (1, NULL), (2, NULL)")
        .execute(store.pool())
        .await
        .unwrap();
    let meta = people_meta();
    let records = select_people(&store, &meta).await;
    let registry = FlushRegistry::new(store);

    records[0].write().unwrap().set("name", "alice").unwrap();
    records[1].write().unwrap().set("name", "bob").unwrap();
    registry.schedule_merge(&records[0]).await.unwrap();
    registry.schedule_merge(&records[1]).await.unwrap();

    // A concurrent writer fills in the second row's NULL.
    sqlx::query("UPDATE people SET name = 'intruder' WHERE id = 2")
        .execute(registry.store().pool())
        .await
        .unwrap();

    let report = registry
        .flush("people", FlushOptions::default())
        .await
        .unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.affected, 1, "stored NULL matches the NULL snapshot");
    assert_eq!(report.conflicts(), 1, "filled-in NULL misses the predicate");

    let rows = registry
        .store()
        .find_by_sql("SELECT name FROM people ORDER BY id")
        .await
        .unwrap();
    assert_eq!(rows[0].get("name"), Some(&BindValue::Text("alice".into())));
    assert_eq!(
        rows[1].get("name"),
        Some(&BindValue::Text("intruder".into()))
    );
}

#[tokio::test]
async fn unchanged_date_rows_are_not_false_conflicts() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("failed to create in-memory SQLite pool");
    sqlx::query("CREATE TABLE events (id INTEGER PRIMARY KEY, occurred_at TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO events (id, occurred_at) \
         VALUES (1, '2024-03-31 00:00:00'), (2, '2024-06-01 12:30:00')",
    )
    .execute(&pool)
    .await
    .unwrap();
    let store = SqliteStore::new(pool);

    let meta = Arc::new(
        TableMeta::builder("events")
            .column("id", "NUMBER(10)", false)
            .column("occurred_at", "DATE", true)
            .primary_key("id")
            .build()
            .unwrap(),
    );
    let records: Vec<SharedRecord> = store
        .find_by_sql("SELECT rowid AS rid, id, occurred_at FROM events ORDER BY id")
        .await
        .unwrap()
        .iter()
        .map(|row| record_from_row(&meta, row))
        .collect();
    let registry = FlushRegistry::new(store);

    registry.schedule_merge(&records[0]).await.unwrap();
    registry.schedule_merge(&records[1]).await.unwrap();

    sqlx::query("UPDATE events SET occurred_at = '2030-01-01 00:00:00' WHERE id = 2")
        .execute(registry.store().pool())
        .await
        .unwrap();

    let report = registry
        .flush("events", FlushOptions::default())
        .await
        .unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.affected, 1, "unchanged date row matches its predicate");
    assert_eq!(report.conflicts(), 1, "only the concurrently changed row misses");

    let rows = registry
        .store()
        .find_by_sql("SELECT occurred_at FROM events ORDER BY id")
        .await
        .unwrap();
    assert_eq!(
        rows[0].get("occurred_at"),
        Some(&BindValue::Text("2024-03-31 00:00:00".into()))
    );
    assert_eq!(
        rows[1].get("occurred_at"),
        Some(&BindValue::Text("2030-01-01 00:00:00".into()))
    );
}

#[tokio::test]
async fn unchanged_record_is_not_scheduled() {
    let store = store().await;
    seed_person(&store, 1, "alice").await;
    let meta = people_meta();
    let records = select_people(&store, &meta).await;
    let registry = FlushRegistry::new(store);

    assert!(!registry
        .schedule_merge_if_changed(&records[0])
        .await
        .unwrap());
    assert_eq!(registry.pending("people").await, 0);
}
