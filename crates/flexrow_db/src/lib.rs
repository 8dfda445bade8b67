//! Store collaborators for flexrow.
//!
//! This crate is the only place that talks to a database driver. The core
//! (`flexrow`) sees a backend exclusively through [`StoreCollaborator`]:
//! parameterized statements, raw statements and a readiness probe, plus the
//! [`Dialect`] that renders introspection and DDL statements.
//!
//! # Usage
//!
//! ```rust,ignore
//! use flexrow_db::{connect, ConnectionConfig, Value};
//!
//! let store = connect(&ConnectionConfig::sqlite_memory()).await?;
//! store.query("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)").await?;
//! let outcome = store
//!     .execute("INSERT INTO t (name) VALUES (?)", &[Value::from("john")])
//!     .await?;
//! assert_eq!(outcome.last_insert_id(), Some(1));
//! ```

mod collaborator;
mod config;
mod dialect;
mod error;
mod value;

pub mod sql;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "mysql")]
mod mysql;

pub use collaborator::{ensure_ready, Outcome, StoreCollaborator};
pub use config::{connect, Backend, ConnectionConfig, DATABASE_URL_ENV, MAX_CONNECTIONS_ENV};
pub use dialect::Dialect;
pub use error::{DbError, Result};
pub use value::{DbRow, FromDbValue, Value};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "mysql")]
pub use mysql::MySqlStore;
