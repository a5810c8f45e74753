//! End-to-end scenarios exercising the full database stack.

use serde_json::{json, Map, Value};
use smoldb_core::{Config, Database, EngineError, GcEvent};
use std::path::Path;
use tempfile::tempdir;

fn open_db(path: &Path) -> Database {
    Database::open_with_config(path, Config::new().gc_enabled(false)).unwrap()
}

fn filter(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn crud_basics() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let users = db.collection("users").unwrap();

    users.insert("user_1", json!({"name": "Alice"})).unwrap();
    assert_eq!(
        users.get("user_1").unwrap().unwrap(),
        json!({"name": "Alice"})
    );

    let err = users.insert("user_1", json!({"name": "Mallory"})).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateId { .. }));

    users
        .update("user_1", json!({"name": "Alice", "role": "admin"}))
        .unwrap();
    assert_eq!(
        users.get("user_1").unwrap().unwrap(),
        json!({"name": "Alice", "role": "admin"})
    );

    assert!(users.delete("user_1").unwrap());
    assert!(!users.delete("user_1").unwrap());
    assert!(!users.has("user_1"));
}

#[test]
fn indexed_intersection() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let users = db.collection("users").unwrap();

    users.create_index("role").unwrap();
    users.create_index("active").unwrap();

    users
        .insert("user_1", json!({"role": "admin", "active": true}))
        .unwrap();
    users
        .insert("user_2", json!({"role": "admin", "active": false}))
        .unwrap();
    users
        .insert("user_3", json!({"role": "user", "active": true}))
        .unwrap();

    let found = users
        .find(&filter(json!({"role": "admin", "active": true})))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, "user_1");

    assert_eq!(
        users.count(Some(&filter(json!({"role": "admin"})))).unwrap(),
        2
    );

    let mut ids = users.find_ids(&filter(json!({"role": "admin"}))).unwrap();
    ids.sort();
    assert_eq!(ids, vec!["user_1", "user_2"]);
}

#[test]
fn nested_path_index() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let users = db.collection("users").unwrap();

    users.create_index("profile.country").unwrap();

    users
        .insert("us_1", json!({"profile": {"country": "US"}}))
        .unwrap();
    users
        .insert("us_2", json!({"profile": {"country": "US"}}))
        .unwrap();
    users
        .insert("de_1", json!({"profile": {"country": "DE"}}))
        .unwrap();
    users.insert("no_profile", json!({"name": "x"})).unwrap();

    let mut ids = users
        .find_ids(&filter(json!({"profile.country": "US"})))
        .unwrap();
    ids.sort();
    assert_eq!(ids, vec!["us_1", "us_2"]);
}

#[test]
fn compaction_reclaims_space() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let docs = db.collection("docs").unwrap();

    // ~128-byte documents land in the smallest (1 KiB) slab class.
    for i in 0..10 {
        docs.insert(&format!("doc_{i}"), json!({"i": i, "pad": "p".repeat(100)}))
            .unwrap();
    }
    for i in 0..5 {
        docs.delete(&format!("doc_{i}")).unwrap();
    }

    let before = docs.stats();
    let freed = docs.compact().unwrap();
    assert!(freed > 0);

    let after = docs.stats();
    assert!(after.file_size < before.file_size);
    // Data header (64 bytes) plus five packed 1 KiB slots.
    assert_eq!(after.file_size, 64 + 5 * 1024);

    for i in 5..10 {
        assert_eq!(
            docs.get(&format!("doc_{i}")).unwrap().unwrap(),
            json!({"i": i, "pad": "p".repeat(100)})
        );
    }
}

#[test]
fn blob_transitions() {
    let dir = tempdir().unwrap();
    let db = Database::open_with_config(
        dir.path(),
        Config::new().gc_enabled(false).blob_threshold(1024),
    )
    .unwrap();
    let docs = db.collection("docs").unwrap();
    let blob_path = dir.path().join("blobs/docs/big.blob");

    let v1 = json!({"content": "x".repeat(2000)});
    docs.insert("big", v1.clone()).unwrap();
    assert!(blob_path.exists());
    assert_eq!(docs.get("big").unwrap().unwrap(), v1);

    let v2 = json!({"content": "y".repeat(3000)});
    docs.update("big", v2.clone()).unwrap();
    assert!(blob_path.exists());
    assert_eq!(docs.get("big").unwrap().unwrap(), v2);

    let v3 = json!({"content": "z"});
    docs.update("big", v3.clone()).unwrap();
    assert!(!blob_path.exists());
    assert_eq!(docs.get("big").unwrap().unwrap(), v3);
}

#[test]
fn index_durability_across_reopen() {
    let dir = tempdir().unwrap();

    let admin_ids_before: Vec<String>;
    {
        let db = open_db(dir.path());
        let users = db.collection("users").unwrap();

        let items: Vec<(String, Value)> = (0..5000)
            .map(|i| {
                (
                    format!("user_{i}"),
                    json!({
                        "role": if i % 3 == 0 { "admin" } else { "member" },
                        "active": i % 2 == 0,
                    }),
                )
            })
            .collect();
        users.insert_many(items).unwrap();

        users.create_index("role").unwrap();
        users.create_index("active").unwrap();

        admin_ids_before = users.find_ids(&filter(json!({"role": "admin"}))).unwrap();
        assert_eq!(admin_ids_before.len(), 1667);

        db.persist_all_indexes().unwrap();
        db.close().unwrap();
    }

    let db = open_db(dir.path());
    assert_eq!(db.list_collections().unwrap(), vec!["users"]);

    let users = db.collection("users").unwrap();
    assert_eq!(users.count(None).unwrap(), 5000);
    assert_eq!(users.get_indexes(), vec!["role", "active"]);

    let mut before = admin_ids_before;
    let mut after = users.find_ids(&filter(json!({"role": "admin"}))).unwrap();
    before.sort();
    after.sort();
    assert_eq!(before, after);

    // Covered queries still need zero document reads after reopen.
    let reads_before = users.stats().counters.document_reads;
    users
        .count(Some(&filter(json!({"role": "admin", "active": true}))))
        .unwrap();
    assert_eq!(users.stats().counters.document_reads, reads_before);
}

#[test]
fn documents_survive_clean_reopen() {
    let dir = tempdir().unwrap();

    {
        let db = open_db(dir.path());
        let docs = db.collection("docs").unwrap();
        docs.insert("a", json!({"n": 1})).unwrap();
        docs.insert("b", json!({"nested": {"deep": [1, 2, 3]}}))
            .unwrap();
        db.close().unwrap();
    }

    let db = open_db(dir.path());
    let docs = db.collection("docs").unwrap();
    assert_eq!(docs.get("a").unwrap().unwrap(), json!({"n": 1}));
    assert_eq!(
        docs.get("b").unwrap().unwrap(),
        json!({"nested": {"deep": [1, 2, 3]}})
    );
    assert_eq!(docs.keys(), vec!["a", "b"]);
}

#[test]
fn background_gc_full_cycle() {
    let dir = tempdir().unwrap();
    let db = Database::open_with_config(
        dir.path(),
        // Keep the worker from racing the setup below.
        Config::new().gc_trigger_ratio(f64::INFINITY),
    )
    .unwrap();

    let docs = db.collection("docs").unwrap();
    for i in 0..20 {
        docs.insert(&format!("d{i}"), json!({"n": i})).unwrap();
    }
    for i in 0..15 {
        docs.delete(&format!("d{i}")).unwrap();
    }

    let rx = db.subscribe();
    db.trigger_gc().unwrap();

    assert_eq!(
        rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap(),
        GcEvent::Started
    );
    let completed = rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
    match completed {
        GcEvent::Completed { bytes_freed } => assert!(bytes_freed > 0),
        other => panic!("unexpected event: {other:?}"),
    }

    let status = db.gc_status();
    assert_eq!(status.progress, 100);
    assert!(status.bytes_freed > 0);

    for i in 15..20 {
        assert_eq!(docs.get(&format!("d{i}")).unwrap().unwrap(), json!({"n": i}));
    }
    db.close().unwrap();
}

#[test]
fn compaction_is_idempotent_end_to_end() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let docs = db.collection("docs").unwrap();

    for i in 0..8 {
        docs.insert(&format!("d{i}"), json!({"n": i})).unwrap();
    }
    for i in 0..4 {
        docs.delete(&format!("d{i}")).unwrap();
    }

    let first = docs.compact().unwrap();
    assert!(first > 0);
    let image_after_first = std::fs::read(dir.path().join("docs.data")).unwrap();

    let second = docs.compact().unwrap();
    assert_eq!(second, 0);
    let image_after_second = std::fs::read(dir.path().join("docs.data")).unwrap();
    assert_eq!(image_after_first, image_after_second);
}

#[test]
fn update_respects_value_canonicalization() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let docs = db.collection("docs").unwrap();

    docs.create_index("score").unwrap();
    docs.insert("a", json!({"score": 42})).unwrap();

    // Integer and float forms of the same number share a posting list.
    let ids = docs.find_ids(&filter(json!({"score": 42.0}))).unwrap();
    assert_eq!(ids, vec!["a"]);
}

#[test]
fn batched_mutations_and_cache() {
    let dir = tempdir().unwrap();
    let db = Database::open_with_config(
        dir.path(),
        Config::new().gc_enabled(false).cache_size(16),
    )
    .unwrap();
    let docs = db.collection("docs").unwrap();

    docs.batch(|ops| {
        for i in 0..10 {
            ops.insert(&format!("d{i}"), json!({"n": i}))?;
        }
        ops.delete("d0")?;
        ops.update("d1", json!({"n": 100}))
    })
    .unwrap();

    assert_eq!(docs.count(None).unwrap(), 9);
    assert_eq!(docs.get("d1").unwrap().unwrap(), json!({"n": 100}));
    assert!(docs.get("d0").unwrap().is_none());

    // Repeat reads come from the cache, not the data file.
    let reads = docs.stats().counters.document_reads;
    docs.get("d1").unwrap();
    docs.get("d1").unwrap();
    assert_eq!(docs.stats().counters.document_reads, reads);
}
