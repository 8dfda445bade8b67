//! Schema-on-write record store.
//!
//! Records are loosely typed field maps. Storing one infers a column type for
//! every new field, creates missing tables and columns, then issues an INSERT
//! or UPDATE depending on whether the record has been persisted before.
//!
//! # Usage
//!
//! ```rust,ignore
//! use flexrow::{EntityStore, StoreOptions};
//! use flexrow_db::ConnectionConfig;
//! use serde_json::json;
//!
//! let store = EntityStore::connect(&ConnectionConfig::sqlite_memory(), StoreOptions::default()).await?;
//!
//! let mut user = store.create("user");
//! user.set("name", "jon");
//! user.set("age", 30);
//! user.set("data", json!({"city": "NY", "height": 45}));
//! let id = store.store(&mut user).await?;
//!
//! let same = store.load("user", id).await?;
//! assert_eq!(same.get("name"), Some(&"jon".into()));
//!
//! let mut unnamed = store.find("user", "name IS NULL", &[]).await?;
//! for user in &mut unnamed {
//!     user.set("name", "new name");
//! }
//! store.store_all(&mut unnamed).await;
//! ```

pub mod cache;
pub mod entity;
pub mod error;
pub mod registry;
mod schema;
pub mod store;
pub mod types;

pub use cache::{CacheKey, ColumnMap, MetadataCache, TableSet};
pub use entity::{Entity, EntityState, ID_FIELD};
pub use error::{OrmError, Result};
pub use registry::Registry;
pub use store::{EntityStore, StoreOptions, ALL_ROWS, FREEZE_ENV};
pub use types::{classify, column_type_for, fits_column, TypeCode};

pub use flexrow_db::{ConnectionConfig, Dialect, StoreCollaborator, Value};
