//! Error types for the collaborator layer.

use thiserror::Error;

/// Collaborator operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Collaborator errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The backend reported it cannot accept statements (pool closed).
    #[error("Store not ready: {0}")]
    NotReady(String),

    /// Malformed connection URL
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// Backend requested but not compiled in
    #[error("Database type {0} not compiled in. Rebuild with the '{1}' feature.")]
    NotCompiled(String, String),

    /// A row value could not be converted to the requested Rust type
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// Caller passed something the collaborator cannot express
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DbError {
    /// Create a not ready error.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Create a type conversion error.
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True when the backend rejected DDL because the table or column it
    /// would create already exists.
    ///
    /// MySQL reports `Duplicate column name 'x'` (1060) and
    /// `Table 'x' already exists` (1050); SQLite reports
    /// `duplicate column name: x` and `table "x" already exists`.
    pub fn is_duplicate_definition(&self) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::Database(db_err)) => {
                let message = db_err.message().to_ascii_lowercase();
                message.contains("duplicate column") || message.contains("already exists")
            }
            _ => false,
        }
    }
}
