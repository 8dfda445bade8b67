//! Error types for the record store.

use flexrow_db::DbError;
use thiserror::Error;

/// Record store result type.
pub type Result<T> = std::result::Result<T, OrmError>;

/// Record store errors.
#[derive(Error, Debug)]
pub enum OrmError {
    /// The collaborator cannot accept statements.
    #[error("Store not ready: {0}")]
    NotReady(String),

    /// Statement rejected by the backend, passed through unmodified.
    #[error(transparent)]
    Query(DbError),

    #[error("Connection '{0}' is already registered")]
    DuplicateConnection(String),

    #[error("Connection '{0}' is not registered")]
    UnknownConnection(String),

    #[error("No connection selected")]
    NoCurrentConnection,

    /// A pending value needs a wider column than the one that exists.
    #[error(
        "Column {table}.{column} is {current} but the value needs {required}; widening is not supported"
    )]
    WideningUnsupported {
        table: String,
        column: String,
        current: String,
        required: String,
    },

    /// The backend accepted an INSERT without reporting a generated key.
    #[error("INSERT into '{0}' returned no generated id")]
    MissingGeneratedId(String),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DbError> for OrmError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotReady(msg) => OrmError::NotReady(msg),
            other => OrmError::Query(other),
        }
    }
}

impl OrmError {
    /// True for caller misuse of the registry.
    pub fn is_registry_error(&self) -> bool {
        matches!(
            self,
            OrmError::DuplicateConnection(_)
                | OrmError::UnknownConnection(_)
                | OrmError::NoCurrentConnection
        )
    }
}
