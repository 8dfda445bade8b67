//! The contract the core requires from a relational backend.

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::value::{DbRow, Value};

/// Result of executing one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Statement produced a row set.
    Rows(Vec<DbRow>),
    /// Statement modified data or schema.
    Command {
        rows_affected: u64,
        /// Key generated by the last INSERT on this connection, 0 if none.
        last_insert_id: u64,
    },
}

impl Outcome {
    /// Rows of a row-producing statement; empty for commands.
    pub fn into_rows(self) -> Vec<DbRow> {
        match self {
            Outcome::Rows(rows) => rows,
            Outcome::Command { .. } => Vec::new(),
        }
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        match self {
            Outcome::Command { last_insert_id, .. } if *last_insert_id > 0 => Some(*last_insert_id),
            _ => None,
        }
    }

    pub fn rows_affected(&self) -> u64 {
        match self {
            Outcome::Rows(rows) => rows.len() as u64,
            Outcome::Command { rows_affected, .. } => *rows_affected,
        }
    }
}

/// Executes statements against a relational backend.
///
/// Timeouts and cancellation belong to implementations; callers await each
/// statement and never retry.
#[async_trait]
pub trait StoreCollaborator: Send + Sync {
    /// Execute a parameterized statement with positional `?` bindings.
    async fn execute(&self, sql: &str, bindings: &[Value]) -> Result<Outcome>;

    /// Run a raw, unparameterized statement and return its rows.
    async fn query(&self, sql: &str) -> Result<Vec<DbRow>>;

    /// Whether the backend can currently accept statements.
    fn is_ready(&self) -> bool;

    /// SQL dialect spoken by this backend.
    fn dialect(&self) -> Dialect;
}

/// Fail with [`DbError::NotReady`] when the collaborator cannot accept work.
pub fn ensure_ready(collab: &dyn StoreCollaborator) -> Result<()> {
    if collab.is_ready() {
        Ok(())
    } else {
        Err(DbError::not_ready(format!(
            "{} store is not ready",
            collab.dialect()
        )))
    }
}
