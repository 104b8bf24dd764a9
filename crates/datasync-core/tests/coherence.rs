//! Cache coherence and notifications across handles of one backend

use std::fs;
use std::sync::Arc;
use std::thread;

use datasync_core::storage::table_name;
use datasync_core::{Backend, Config, Document, LocalStore, ObjectKey, StoreEvent};
use serde_json::json;
use tempfile::TempDir;

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn backend(temp_dir: &TempDir) -> Arc<Backend> {
    let config = Config {
        data_dir: temp_dir.path().to_path_buf(),
        cache_size: 1024 * 1024,
    };
    Backend::open(&config).unwrap()
}

#[test]
fn foreign_save_updates_cached_entry_without_reread() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir);
    let mut h1 = LocalStore::new(backend.clone());
    let mut h2 = LocalStore::new(backend.clone());
    let key = ObjectKey::new("User", "alice");

    h1.save(&key, &doc(json!({"rev": 1}))).unwrap();
    assert_eq!(h2.load(&key).unwrap(), doc(json!({"rev": 1})));
    assert!(h2.is_cached(&key));

    h1.save(&key, &doc(json!({"rev": 2}))).unwrap();
    assert_eq!(h2.process_events(), 1);

    // Wipe the blobs; h2 can only answer from its cache now
    for entry in fs::read_dir(backend.store_dir().join(table_name(b"User"))).unwrap() {
        fs::remove_file(entry.unwrap().path()).unwrap();
    }
    assert_eq!(h2.load(&key).unwrap(), doc(json!({"rev": 2})));
}

#[test]
fn foreign_save_does_not_populate_other_caches() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir);
    let mut h1 = LocalStore::new(backend.clone());
    let mut h2 = LocalStore::new(backend);
    let key = ObjectKey::new("User", "alice");

    h1.save(&key, &doc(json!({"rev": 1}))).unwrap();
    h2.process_events();
    assert!(!h2.is_cached(&key));
    assert_eq!(h2.load(&key).unwrap(), doc(json!({"rev": 1})));
}

#[test]
fn foreign_remove_evicts_and_notifies() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir);
    let mut h1 = LocalStore::new(backend.clone());
    let mut h2 = LocalStore::new(backend);
    let key = ObjectKey::new("User", "alice");

    h1.save(&key, &doc(json!({"rev": 1}))).unwrap();
    h2.load(&key).unwrap();
    let mut events = h2.subscribe();

    assert!(h1.remove(&key).unwrap());
    assert!(h2.load(&key).unwrap_err().is_not_found());
    assert!(!h2.is_cached(&key));
    assert_eq!(
        events.try_recv().unwrap(),
        StoreEvent::Changed {
            key,
            deleted: true
        }
    );
}

#[test]
fn foreign_clear_and_reset_reach_every_handle() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir);
    let mut h1 = LocalStore::new(backend.clone());
    let mut h2 = LocalStore::new(backend.clone());
    let mut h3 = LocalStore::new(backend);
    let user = ObjectKey::new("User", "alice");
    let group = ObjectKey::new("Group", "admins");

    h1.save(&user, &doc(json!({}))).unwrap();
    h1.save(&group, &doc(json!({}))).unwrap();
    h2.load(&user).unwrap();
    h2.load(&group).unwrap();
    h3.process_events();
    let mut events2 = h2.subscribe();
    let mut events3 = h3.subscribe();

    h1.clear("User").unwrap();
    h2.process_events();
    assert!(!h2.is_cached(&user));
    assert!(h2.is_cached(&group));

    h1.reset().unwrap();
    h2.process_events();
    h3.process_events();
    assert!(!h2.is_cached(&group));
    assert_eq!(h2.count("Group").unwrap(), 0);

    // The type table is recreated after a foreign clear
    h2.save(&user, &doc(json!({"rev": 1}))).unwrap();
    assert_eq!(h3.load(&user).unwrap(), doc(json!({"rev": 1})));

    for events in [&mut events2, &mut events3] {
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::TypeCleared {
                type_name: b"User".to_vec()
            }
        );
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Reset);
    }
    // h2 saw its own save, h3 only the foreign one
    assert!(matches!(
        events2.try_recv().unwrap(),
        StoreEvent::Changed { deleted: false, .. }
    ));
    assert!(matches!(
        events3.try_recv().unwrap(),
        StoreEvent::Changed { deleted: false, .. }
    ));
}

#[test]
fn idle_handle_keeps_changes_until_drained() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir);
    let mut h1 = LocalStore::new(backend.clone());
    let mut h2 = LocalStore::new(backend);

    for rev in 0..5 {
        let key = ObjectKey::new("Counter", format!("c{rev}"));
        h1.save(&key, &doc(json!({ "rev": rev }))).unwrap();
    }

    assert_eq!(h2.process_events(), 5);
    assert_eq!(h2.process_events(), 0);
    assert_eq!(h1.process_events(), 0);
}

#[test]
fn origin_does_not_hear_its_own_changes_twice() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir);
    let mut h1 = LocalStore::new(backend.clone());
    let mut h2 = LocalStore::new(backend);
    let mut events1 = h1.subscribe();
    let mut events2 = h2.subscribe();

    h1.save(&ObjectKey::new("User", "alice"), &doc(json!({}))).unwrap();
    assert!(events1.try_recv().is_ok());
    assert_eq!(h1.process_events(), 0);
    assert!(events1.try_recv().is_err());

    assert!(events2.try_recv().is_err());
    assert_eq!(h2.process_events(), 1);
    assert!(events2.try_recv().is_ok());
}

#[test]
fn separate_backends_are_isolated() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let mut a = LocalStore::new(backend(&dir_a));
    let mut b = LocalStore::new(backend(&dir_b));

    a.save(&ObjectKey::new("User", "alice"), &doc(json!({}))).unwrap();
    assert_eq!(b.process_events(), 0);
    assert_eq!(b.count("User").unwrap(), 0);
}

#[test]
fn dropped_handles_leave_the_hub() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir);
    let h1 = LocalStore::new(backend.clone());
    let h2 = LocalStore::new(backend.clone());
    assert_eq!(backend.hub().subscriber_count(), 2);

    drop(h1);
    drop(h2);
    assert_eq!(backend.hub().subscriber_count(), 0);
}

#[test]
fn concurrent_writers_on_many_threads() {
    let temp_dir = TempDir::new().unwrap();
    let backend = backend(&temp_dir);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let backend = backend.clone();
            thread::spawn(move || {
                let mut store = LocalStore::new(backend);
                let key = ObjectKey::new("Counter", "shared");
                for i in 0..10 {
                    store
                        .save(&key, &doc(json!({"worker": worker, "i": i})))
                        .unwrap();
                    store
                        .save(
                            &ObjectKey::new("Counter", format!("w{}-{}", worker, i)),
                            &doc(json!({})),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut store = LocalStore::new(backend.clone());
    assert_eq!(store.count("Counter").unwrap(), 41);

    // 40 saves of the shared key: version 40, exactly one live blob for it
    let conn = rusqlite::Connection::open(temp_dir.path().join("datasync.db")).unwrap();
    let version: i64 = conn
        .query_row(
            &format!(
                "SELECT Version FROM {} WHERE Key = 'shared'",
                table_name(b"Counter")
            ),
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(version, 40);
    let blobs = fs::read_dir(backend.store_dir().join(table_name(b"Counter")))
        .unwrap()
        .count();
    assert_eq!(blobs, 41);
}

#[test]
fn store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let key = ObjectKey::new("User", "alice");
    {
        let mut store = LocalStore::new(backend(&temp_dir));
        store.save(&key, &doc(json!({"name": "Alice"}))).unwrap();
    }

    let mut store = LocalStore::new(backend(&temp_dir));
    assert_eq!(store.load(&key).unwrap(), doc(json!({"name": "Alice"})));
    assert_eq!(store.types().unwrap(), vec![b"User".to_vec()]);
}
