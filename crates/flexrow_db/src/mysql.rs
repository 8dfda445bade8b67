//! MySQL collaborator on `sqlx`.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug_span, Instrument};

use crate::collaborator::{ensure_ready, Outcome, StoreCollaborator};
use crate::config::{Backend, ConnectionConfig};
use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::sql::{hash_sql, returns_rows, sql_op_name};
use crate::value::{DbRow, Value};

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// Store collaborator backed by a MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Open the pool described by `config`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let Backend::MySql {
            host,
            port,
            user,
            password,
            database,
        } = &config.backend
        else {
            return Err(DbError::invalid_input(format!(
                "MySQL store cannot open {:?}",
                config.backend
            )));
        };

        let mut options = MySqlConnectOptions::new()
            .host(host)
            .username(user)
            .password(password)
            .database(database);
        if let Some(port) = port {
            options = options.port(*port);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Close the pool; the store reports not-ready afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn bind_all<'q>(mut query: MySqlQuery<'q>, bindings: &[Value]) -> MySqlQuery<'q> {
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

    fn decode_row(row: &MySqlRow) -> Result<DbRow> {
        let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(Self::decode_value(row, index)?);
        }
        Ok(DbRow::new(columns, values))
    }

    fn decode_value(row: &MySqlRow, index: usize) -> Result<Value> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let type_name = raw.type_info().name().to_ascii_uppercase();

        let value = match type_name.as_str() {
            name if name.contains("INT") && name.contains("UNSIGNED") => {
                let v = row.try_get_unchecked::<u64, _>(index)?;
                match i64::try_from(v) {
                    Ok(v) => Value::Int(v),
                    Err(_) => Value::Float(v as f64),
                }
            }
            name if name.contains("INT") || name == "BOOLEAN" || name == "YEAR" => {
                Value::Int(row.try_get_unchecked::<i64, _>(index)?)
            }
            "FLOAT" => Value::Float(row.try_get_unchecked::<f32, _>(index)? as f64),
            "DOUBLE" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
            // DECIMAL travels as its exact decimal text on both protocols.
            "DECIMAL" => Value::Text(row.try_get_unchecked::<String, _>(index)?),
            "DATE" => {
                let date = row.try_get_unchecked::<chrono::NaiveDate, _>(index)?;
                Value::Text(date.format("%Y-%m-%d").to_string())
            }
            "DATETIME" | "TIMESTAMP" => {
                let dt = row.try_get_unchecked::<chrono::NaiveDateTime, _>(index)?;
                Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            "TIME" => {
                let time = row.try_get_unchecked::<chrono::NaiveTime, _>(index)?;
                Value::Text(time.format("%H:%M:%S").to_string())
            }
            "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "JSON"
            | "ENUM" | "SET" => Value::Text(row.try_get_unchecked::<String, _>(index)?),
            _ => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        };
        Ok(value)
    }
}

#[async_trait]
impl StoreCollaborator for MySqlStore {
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
                last_insert_id: result.last_insert_id(),
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
        Dialect::MySql
    }
}
