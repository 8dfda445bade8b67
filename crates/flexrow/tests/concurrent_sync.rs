//! Concurrent writers introducing the same schema objects.

use std::sync::Arc;

use flexrow::{EntityStore, StoreOptions, Value, ALL_ROWS};
use flexrow_db::ConnectionConfig;
use tempfile::TempDir;

async fn file_store(tmp: &TempDir) -> Arc<EntityStore> {
    let config = ConnectionConfig::sqlite(tmp.path().join("shared.db"));
    Arc::new(
        EntityStore::connect(&config, StoreOptions::default())
            .await
            .unwrap(),
    )
}

async fn column_names(store: &EntityStore, table: &str) -> Vec<String> {
    let rows = store
        .collaborator()
        .query(&format!("PRAGMA table_info(\"{table}\")"))
        .await
        .unwrap();
    rows.iter()
        .map(|row| row.get_by_name::<String>("name").unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_new_column_from_two_stores() {
    let tmp = TempDir::new().unwrap();
    // Separate caches, so both writers see the column as missing.
    let left = file_store(&tmp).await;
    let right = file_store(&tmp).await;

    let mut seed = left.create("user");
    seed.set("name", "seed");
    left.store(&mut seed).await.unwrap();
    right.cache().columns(right.collaborator().as_ref(), "user").await.unwrap();
    left.cache().columns(left.collaborator().as_ref(), "user").await.unwrap();

    let spawn_store = |store: Arc<EntityStore>, nickname: &'static str| {
        tokio::spawn(async move {
            let mut user = store.create("user");
            user.set("nickname", nickname);
            store.store(&mut user).await
        })
    };
    let a = spawn_store(Arc::clone(&left), "a");
    let b = spawn_store(Arc::clone(&right), "b");

    let a = a.await.unwrap();
    let b = b.await.unwrap();
    assert!(a.is_ok(), "left store failed: {a:?}");
    assert!(b.is_ok(), "right store failed: {b:?}");

    let columns = column_names(&left, "user").await;
    assert_eq!(columns.iter().filter(|c| *c == "nickname").count(), 1);
    assert_eq!(left.count("user", ALL_ROWS, &[]).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_new_table_from_one_store() {
    let tmp = TempDir::new().unwrap();
    let store = file_store(&tmp).await;

    let mut first = store.create("event");
    first.set("label", "one");
    let mut second = store.create("event");
    second.set("label", "two");

    let (a, b) = tokio::join!(store.store(&mut first), store.store(&mut second));
    a.unwrap();
    b.unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(
        store
            .count("event", "label IN (?, ?)", &[Value::from("one"), Value::from("two")])
            .await
            .unwrap(),
        2
    );
    let columns = column_names(&store, "event").await;
    assert_eq!(columns, vec!["id".to_string(), "label".to_string()]);
}
