//! SQLite collaborator on `sqlx`.

use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug_span, Instrument};

use crate::collaborator::{ensure_ready, Outcome, StoreCollaborator};
use crate::config::{Backend, ConnectionConfig};
use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::sql::{hash_sql, returns_rows, sql_op_name};
use crate::value::{DbRow, Value};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Store collaborator backed by a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the pool described by `config`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let path = match &config.backend {
            Backend::Sqlite { path } => path.clone(),
            other => {
                return Err(DbError::invalid_input(format!(
                    "SQLite store cannot open {other:?}"
                )))
            }
        };

        let pool = match path {
            None => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
                // The database lives and dies with its single connection.
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await?
            }
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            DbError::invalid_input(format!(
                                "cannot create {}: {}",
                                parent.display(),
                                e
                            ))
                        })?;
                    }
                }
                let options = SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal);
                SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect_with(options)
                    .await?
            }
        };

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool (escape hatch for tests and tooling).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool; the store reports not-ready afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn bind_all<'q>(mut query: SqliteQuery<'q>, bindings: &[Value]) -> SqliteQuery<'q> {
        for value in bindings {
            query = match value {
                Value::Null => query.bind(None::<String>),
                Value::Bool(v) => query.bind(*v),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.clone()),
                Value::Bytes(v) => query.bind(v.clone()),
                Value::Json(v) => query.bind(v.to_string()),
            };
        }
        query
    }

    fn decode_row(row: &SqliteRow) -> Result<DbRow> {
        let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(Self::decode_value(row, index)?);
        }
        Ok(DbRow::new(columns, values))
    }

    fn decode_value(row: &SqliteRow, index: usize) -> Result<Value> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        // Storage class of this particular value, not the declared column type.
        let storage = raw.type_info().name().to_string();
        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => Value::Int(row.try_get_unchecked::<i64, _>(index)?),
            "REAL" | "NUMERIC" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
            "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
            _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
        };
        Ok(value)
    }
}

#[async_trait]
impl StoreCollaborator for SqliteStore {
    async fn execute(&self, sql: &str, bindings: &[Value]) -> Result<Outcome> {
        ensure_ready(self)?;
        let span = debug_span!(
            "db.exec",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            params = bindings.len(),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();
        let query = Self::bind_all(sqlx::query(sql), bindings);

        let outcome = if returns_rows(sql) {
            let rows = query.fetch_all(&self.pool).instrument(span.clone()).await?;
            let rows = rows.iter().map(Self::decode_row).collect::<Result<Vec<_>>>()?;
            Outcome::Rows(rows)
        } else {
            let result = query.execute(&self.pool).instrument(span.clone()).await?;
            Outcome::Command {
                rows_affected: result.rows_affected(),
                last_insert_id: u64::try_from(result.last_insert_rowid()).unwrap_or(0),
            }
        };

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(outcome)
    }

    async fn query(&self, sql: &str) -> Result<Vec<DbRow>> {
        ensure_ready(self)?;
        let span = debug_span!(
            "db.query",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();
        let rows = sqlx::raw_sql(sql)
            .fetch_all(&self.pool)
            .instrument(span.clone())
            .await?;
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        rows.iter().map(Self::decode_row).collect()
    }

    fn is_ready(&self) -> bool {
        !self.pool.is_closed()
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}
