//! Schema synchronization: make a table fit a record before it is written.

use std::collections::BTreeMap;

use flexrow_db::{DbError, Value};
use tracing::{info, warn};

use crate::error::{OrmError, Result};
use crate::store::EntityStore;
use crate::types::{column_type_for, fits_column, TypeCode};

impl EntityStore {
    /// Ensure `kind` exists and has a column for every field in `changes`.
    ///
    /// Missing tables get the base shape (only the generated `id`), missing
    /// columns get the type inferred from their pending value. Existing
    /// columns are never altered: a value that needs a wider column fails
    /// with [`OrmError::WideningUnsupported`] before any DDL runs.
    pub async fn ensure_schema(&self, kind: &str, changes: &BTreeMap<String, Value>) -> Result<()> {
        let collab = self.collaborator().as_ref();
        let dialect = self.dialect();

        let tables = self.cache().tables(collab).await?;
        if !tables.contains(kind) {
            let result = collab.query(&dialect.create_table_sql(kind)).await;
            tolerate_duplicate(result, kind, None)?;
            self.cache().invalidate_tables();
            info!(table = kind, "Created table");
        }

        let columns = self.cache().columns(collab, kind).await?;

        for (field, value) in changes {
            let Some(current) = columns.get(field) else {
                continue;
            };
            // Types this crate never emits (e.g. SQLite's INTEGER id) are not checked.
            let Some(code) = TypeCode::from_column_type(current) else {
                continue;
            };
            if !fits_column(value, code) {
                return Err(OrmError::WideningUnsupported {
                    table: kind.to_string(),
                    column: field.clone(),
                    current: current.clone(),
                    required: column_type_for(value).to_string(),
                });
            }
        }

        for (field, value) in changes {
            if columns.contains_key(field) {
                continue;
            }
            let column_type = column_type_for(value);
            let result = collab
                .query(&dialect.add_column_sql(kind, field, column_type))
                .await;
            tolerate_duplicate(result, kind, Some(field.as_str()))?;
            self.cache().invalidate_columns(kind);
            info!(table = kind, column = %field, column_type, "Added column");
        }

        Ok(())
    }
}

/// A concurrent synchronization may have created the same table or column
/// first; that DDL failure is not an error.
fn tolerate_duplicate<T>(
    result: std::result::Result<T, DbError>,
    table: &str,
    column: Option<&str>,
) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.is_duplicate_definition() => {
            warn!(table, column, error = %err, "Schema object already exists; ignoring");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
