//! Persistence integration tests
//!
//! End-to-end behaviour of the public API:
//! - Buffered mutations and the undo buffer
//! - Flushing to the WAL and recovering from it
//! - Snapshots and reopening storage from the same root
//! - Crash leftovers: torn WAL tails and failed flushes

use coffer::{
    Action, Codec, Container, Entity, Error, Record, Result, Storage, StorageConfig, WalConfig,
    WalReader, WalWriter,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct User {
    name: String,
}

impl Entity for User {
    type Key = String;

    fn id(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Order {
    id: u64,
    customer: String,
    status: String,
}

impl Entity for Order {
    type Key = u64;

    fn id(&self) -> u64 {
        self.id
    }
}

fn user(name: &str) -> User {
    User {
        name: name.to_string(),
    }
}

fn order(id: u64, customer: &str, status: &str) -> Order {
    Order {
        id,
        customer: customer.to_string(),
        status: status.to_string(),
    }
}

fn read_wal(root: &Path, codec: Codec) -> Vec<Record<User>> {
    WalReader::<User>::open(root.join("User").join("wal"), codec)
        .unwrap()
        .read_all()
        .unwrap()
}

fn sorted(mut records: Vec<Record<User>>) -> Vec<Record<User>> {
    records.sort_by(|a, b| (a.key(), a.is_delete()).cmp(&(b.key(), b.is_delete())));
    records
}

#[test]
fn test_container_write_log() {
    let dir = TempDir::new().unwrap();
    let mut container = Container::<User>::open(dir.path(), Codec::Json, WalConfig::default());

    for name in ["user", "guest", "admin"] {
        container.insert(user(name)).unwrap();
    }
    assert_eq!(container.undo().len(), 3);
    for name in ["user", "guest", "admin"] {
        assert_eq!(container.undo().get(&name.to_string()), Some(&Action::Delete));
    }

    container.flush().unwrap();
    assert!(container.undo().is_empty());

    assert_eq!(container.remove(&"guest".to_string()), Some(user("guest")));
    assert_eq!(container.undo().len(), 1);
    container.flush().unwrap();

    let records = read_wal(dir.path(), Codec::Json);
    assert_eq!(
        sorted(records),
        sorted(vec![
            Record::Upsert(user("user")),
            Record::Upsert(user("guest")),
            Record::Upsert(user("admin")),
            Record::Delete("guest".to_string()),
        ])
    );
}

#[test]
fn test_container_recovery_from_log() {
    let dir = TempDir::new().unwrap();
    {
        let mut wal = WalWriter::<User>::open(
            dir.path().join("User").join("wal"),
            Codec::Binary,
            WalConfig::default(),
        )
        .unwrap();
        for record in [
            Record::Upsert(user("user")),
            Record::Upsert(user("guest")),
            Record::Upsert(user("admin")),
            Record::Delete("guest".to_string()),
        ] {
            wal.append(&record).unwrap();
        }
    }

    let storage = Storage::open(dir.path()).unwrap();
    storage.register::<User>().unwrap();
    storage.restore().unwrap();

    let users = storage.container::<User>().unwrap();
    assert_eq!(users.count().unwrap(), 2);
    assert!(users.get(&"guest".to_string()).unwrap().is_none());
    assert_eq!(users.get(&"user".to_string()).unwrap(), Some(user("user")));
}

#[test]
fn test_container_snapshot() {
    let dir = TempDir::new().unwrap();
    {
        let storage = Storage::open(dir.path()).unwrap();
        let users = storage.container::<User>().unwrap();
        for name in ["first", "second", "third"] {
            users.insert(user(name)).unwrap();
        }
        storage.make_snapshot().unwrap();
    }

    assert!(dir.path().join("User").join("snapshot").exists());

    let storage = Storage::open(dir.path()).unwrap();
    storage.register::<User>().unwrap();
    storage.restore().unwrap();

    let users = storage.container::<User>().unwrap();
    assert_eq!(users.count().unwrap(), 3);
    for name in ["first", "second", "third"] {
        assert_eq!(users.get(&name.to_string()).unwrap(), Some(user(name)));
    }
}

#[test]
fn test_insert_existing_key_never_mutates() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(dir.path()).unwrap();
    let orders = storage.container::<Order>().unwrap();

    orders.insert(order(1, "ann", "pending")).unwrap();
    orders.flush().unwrap();

    let result = orders.insert(order(1, "bob", "shipped"));
    assert!(matches!(result, Err(Error::AlreadyExists)));

    let container = orders.lock().unwrap();
    assert_eq!(container.count(), 1);
    assert_eq!(container.get(&1).map(|o| o.customer.as_str()), Some("ann"));
    assert!(!container.is_dirty());
}

#[test]
fn test_remove_absent_key_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut container = Container::<Order>::open(dir.path(), Codec::Binary, WalConfig::default());
    container.insert(order(1, "ann", "pending")).unwrap();

    let undo_before = container.undo().len();
    assert!(container.remove(&42).is_none());
    assert_eq!(container.count(), 1);
    assert_eq!(container.undo().len(), undo_before);
}

#[test]
fn test_idempotent_replay() {
    let dir = TempDir::new().unwrap();
    {
        let mut container = Container::<Order>::open(dir.path(), Codec::Binary, WalConfig::default());
        container.insert(order(1, "ann", "pending")).unwrap();
        container.insert(order(2, "bob", "pending")).unwrap();
        container.flush().unwrap();
        container.upsert(order(1, "ann", "shipped"));
        container.remove(&2);
        container.flush().unwrap();
    }

    let mut first = Container::<Order>::open(dir.path(), Codec::Binary, WalConfig::default());
    let mut second = Container::<Order>::open(dir.path(), Codec::Binary, WalConfig::default());
    first.restore().unwrap();
    second.restore().unwrap();

    let first_state: Vec<Order> = first.iter().cloned().collect();
    let second_state: Vec<Order> = second.iter().cloned().collect();
    assert_eq!(first_state, second_state);
    assert_eq!(first_state, vec![order(1, "ann", "shipped")]);
}

#[test]
fn test_full_scan_helpers_through_handle() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(dir.path()).unwrap();
    let orders = storage.container::<Order>().unwrap();

    orders.insert(order(1, "ann", "pending")).unwrap();
    orders.insert(order(2, "bob", "shipped")).unwrap();
    orders.insert(order(3, "ann", "shipped")).unwrap();

    let mut container = orders.lock().unwrap();
    assert_eq!(
        container.first_where(|o| o.status.as_str(), "shipped").map(|o| o.id),
        Some(2)
    );
    assert_eq!(container.select_where(|o| o.customer.as_str(), "ann").len(), 2);

    let removed = container.remove_where(|o| o.status.as_str(), "pending");
    assert_eq!(removed, vec![order(1, "ann", "pending")]);
    assert_eq!(container.count(), 2);
}

#[test]
fn test_snapshot_then_more_changes() {
    let dir = TempDir::new().unwrap();
    {
        let storage = Storage::open(dir.path()).unwrap();
        let orders = storage.container::<Order>().unwrap();
        for id in 0..10 {
            orders.insert(order(id, "ann", "pending")).unwrap();
        }
        storage.make_snapshot().unwrap();

        orders.remove(&0).unwrap();
        orders.upsert(order(5, "ann", "shipped")).unwrap();
        orders.insert(order(10, "cid", "pending")).unwrap();
        storage.flush().unwrap();
    }

    let storage = Storage::open(dir.path()).unwrap();
    let orders = storage.register::<Order>().unwrap();
    storage.restore().unwrap();

    assert_eq!(orders.count().unwrap(), 10);
    assert!(orders.get(&0).unwrap().is_none());
    assert_eq!(orders.get(&5).unwrap().map(|o| o.status), Some("shipped".to_string()));
    assert!(orders.get(&10).unwrap().is_some());
}

#[test]
fn test_unflushed_changes_are_lost_on_restore() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(dir.path()).unwrap();
    let users = storage.register::<User>().unwrap();

    users.insert(user("kept")).unwrap();
    storage.flush().unwrap();
    users.insert(user("lost")).unwrap();

    storage.restore().unwrap();
    assert_eq!(users.count().unwrap(), 1);
    assert!(users.get(&"lost".to_string()).unwrap().is_none());
}

#[test]
fn test_crash_during_append_is_tolerated() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let storage = Storage::open(dir.path())?;
        let users = storage.container::<User>()?;
        users.insert(user("a"))?;
        users.insert(user("b"))?;
        storage.flush()?;
    }

    // Half of a record, as left by a crash mid-append
    let wal_path = dir.path().join("User").join("wal");
    let mut file = std::fs::OpenOptions::new().append(true).open(&wal_path)?;
    file.write_all(&[64, 0, 0, 0, 7, 7, 7])?;
    drop(file);

    let storage = Storage::open(dir.path())?;
    let users = storage.register::<User>()?;
    storage.restore()?;
    assert_eq!(users.count()?, 2);

    users.insert(user("c"))?;
    storage.flush()?;

    let storage = Storage::open(dir.path())?;
    let users = storage.register::<User>()?;
    storage.restore()?;
    assert_eq!(users.count()?, 3);
    Ok(())
}

#[test]
fn test_corrupted_log_is_reported() {
    let dir = TempDir::new().unwrap();
    {
        let storage = Storage::open_with_config(
            dir.path(),
            StorageConfig {
                codec: Codec::Json,
                ..Default::default()
            },
        )
        .unwrap();
        storage.container::<User>().unwrap().insert(user("a")).unwrap();
        storage.flush().unwrap();
    }

    let wal_path = dir.path().join("User").join("wal");
    let mut file = std::fs::OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(b"{\"Upsert\":12}\n{\"Upsert\":{\"name\":\"b\"}}\n").unwrap();
    drop(file);

    let storage = Storage::open_with_config(
        dir.path(),
        StorageConfig {
            codec: Codec::Json,
            ..Default::default()
        },
    )
    .unwrap();
    let users = storage.register::<User>().unwrap();
    assert!(matches!(storage.restore(), Err(Error::Corruption(_))));
    assert_eq!(users.count().unwrap(), 0);
}

#[test]
fn test_every_codec_survives_reopen() {
    for codec in [Codec::Binary, Codec::Json, Codec::MessagePack] {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            codec,
            ..Default::default()
        };
        {
            let storage = Storage::open_with_config(dir.path(), config).unwrap();
            let orders = storage.container::<Order>().unwrap();
            orders.insert(order(1, "ann", "pending")).unwrap();
            orders.insert(order(2, "bob", "pending")).unwrap();
            storage.make_snapshot().unwrap();
            orders.upsert(order(2, "bob", "shipped")).unwrap();
            storage.flush().unwrap();
        }

        let storage = Storage::open_with_config(dir.path(), config).unwrap();
        let orders = storage.register::<Order>().unwrap();
        storage.restore().unwrap();

        assert_eq!(orders.count().unwrap(), 2, "{:?}", codec);
        assert_eq!(
            orders.get(&2).unwrap().map(|o| o.status),
            Some("shipped".to_string()),
            "{:?}",
            codec
        );
    }
}

#[test]
fn test_rollback_reverts_to_last_flush() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(dir.path()).unwrap();
    let users = storage.register::<User>().unwrap();

    users.insert(user("a")).unwrap();
    users.flush().unwrap();

    users.remove(&"a".to_string()).unwrap();
    users.insert(user("b")).unwrap();
    assert_eq!(users.rollback().unwrap(), 2);

    assert_eq!(users.count().unwrap(), 1);
    assert!(users.get(&"a".to_string()).unwrap().is_some());
    assert_eq!(users.flush().unwrap(), 0);
}
