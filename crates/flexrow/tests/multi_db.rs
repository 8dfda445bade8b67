//! Several backends behind one registry.

use flexrow::{OrmError, Registry, Value, ALL_ROWS};
use flexrow_db::ConnectionConfig;
use tempfile::TempDir;

#[tokio::test]
async fn test_ambient_calls_follow_selection() {
    let tmp = TempDir::new().unwrap();
    let registry = Registry::new();
    registry
        .connect(&ConnectionConfig::sqlite(tmp.path().join("db1.db")))
        .await
        .unwrap();
    registry
        .connect(&ConnectionConfig::sqlite(tmp.path().join("db2.db")))
        .await
        .unwrap();
    assert_eq!(registry.keys(), vec!["db1".to_string(), "db2".to_string()]);

    registry.select("db1").unwrap();
    let store = registry.current().unwrap();
    let mut user = store.create("user");
    user.set("name", "in db1");
    store.store(&mut user).await.unwrap();

    registry.select("db2").unwrap();
    let store = registry.current().unwrap();
    let err = store.count("user", ALL_ROWS, &[]).await.unwrap_err();
    assert!(matches!(err, OrmError::Query(_)));

    let mut user = store.create("user");
    user.set("name", "in db2");
    user.set("extra", 5);
    store.store(&mut user).await.unwrap();

    registry.select("db1").unwrap();
    let db1 = registry.current().unwrap();
    let names: Vec<Value> = db1
        .find_all("user")
        .await
        .unwrap()
        .iter()
        .filter_map(|u| u.get("name").cloned())
        .collect();
    assert_eq!(names, vec![Value::from("in db1")]);
    assert!(db1.find("user", "extra = ?", &[Value::Int(5)]).await.is_err());
}

#[tokio::test]
async fn test_held_handle_ignores_later_selection() {
    let registry = Registry::new();
    let primary = registry
        .connect(&ConnectionConfig::sqlite_memory().with_alias("primary"))
        .await
        .unwrap();
    registry
        .connect(&ConnectionConfig::sqlite_memory().with_alias("replica"))
        .await
        .unwrap();
    assert_eq!(registry.current_key().as_deref(), Some("replica"));

    let mut item = primary.create("item");
    item.set("sku", "A-1");
    primary.store(&mut item).await.unwrap();

    assert_eq!(primary.count("item", ALL_ROWS, &[]).await.unwrap(), 1);
    assert!(registry
        .current()
        .unwrap()
        .count("item", ALL_ROWS, &[])
        .await
        .is_err());
}

#[tokio::test]
async fn test_registry_misuse_errors() {
    let registry = Registry::new();
    assert!(registry.select("nope").unwrap_err().is_registry_error());
    assert!(registry.current().unwrap_err().is_registry_error());

    let config = ConnectionConfig::sqlite_memory();
    registry.connect(&config).await.unwrap();
    let err = registry.connect(&config).await.unwrap_err();
    assert!(matches!(err, OrmError::DuplicateConnection(ref key) if key == "memory"));
}
