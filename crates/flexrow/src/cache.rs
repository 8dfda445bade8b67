//! Read-through cache of table names and per-table column maps.
//!
//! Entries have no TTL. Schema mutations must invalidate the entry they
//! change after the DDL completes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use flexrow_db::StoreCollaborator;
use tracing::debug;

use crate::error::Result;

/// Known tables.
pub type TableSet = Arc<BTreeSet<String>>;
/// Column name -> backend-reported column type.
pub type ColumnMap = Arc<BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Tables,
    Columns(String),
}

#[derive(Debug, Clone)]
enum Cached {
    Tables(TableSet),
    Columns(ColumnMap),
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, Cached>,
    /// Bumped by every invalidation. A lookup that started before an
    /// invalidation must not store its result.
    generation: u64,
}

/// Schema metadata cache shared by all operations of one store.
#[derive(Debug, Default)]
pub struct MetadataCache {
    state: Mutex<CacheState>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Names of all tables, introspected on a miss.
    pub async fn tables(&self, collab: &dyn StoreCollaborator) -> Result<TableSet> {
        let generation = {
            let state = self.lock();
            if let Some(Cached::Tables(tables)) = state.entries.get(&CacheKey::Tables) {
                debug!(key = "tables", "Metadata cache hit");
                return Ok(Arc::clone(tables));
            }
            state.generation
        };

        debug!(key = "tables", "Metadata cache miss");
        let rows = collab.query(collab.dialect().list_tables_sql()).await?;
        let tables = rows
            .iter()
            .map(|row| row.get::<String>(0))
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        let tables = Arc::new(tables);

        self.store(generation, CacheKey::Tables, Cached::Tables(Arc::clone(&tables)));
        Ok(tables)
    }

    /// Column map of `table`, introspected on a miss.
    pub async fn columns(&self, collab: &dyn StoreCollaborator, table: &str) -> Result<ColumnMap> {
        let key = CacheKey::Columns(table.to_string());
        let generation = {
            let state = self.lock();
            if let Some(Cached::Columns(columns)) = state.entries.get(&key) {
                debug!(key = "columns", table, "Metadata cache hit");
                return Ok(Arc::clone(columns));
            }
            state.generation
        };

        debug!(key = "columns", table, "Metadata cache miss");
        let dialect = collab.dialect();
        let (field_col, type_col) = dialect.describe_columns();
        let rows = collab.query(&dialect.describe_sql(table)).await?;
        let mut columns = BTreeMap::new();
        for row in &rows {
            let field: String = row.get_by_name(field_col)?;
            let column_type: String = row.get_by_name(type_col)?;
            columns.insert(field, column_type.trim().to_string());
        }
        let columns = Arc::new(columns);

        self.store(generation, key, Cached::Columns(Arc::clone(&columns)));
        Ok(columns)
    }

    fn store(&self, generation: u64, key: CacheKey, value: Cached) {
        let mut state = self.lock();
        if state.generation == generation {
            state.entries.insert(key, value);
        }
    }

    pub fn invalidate_tables(&self) {
        self.invalidate(&CacheKey::Tables);
    }

    pub fn invalidate_columns(&self, table: &str) {
        self.invalidate(&CacheKey::Columns(table.to_string()));
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let mut state = self.lock();
        state.entries.remove(key);
        state.generation += 1;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.generation += 1;
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexrow_db::{connect, ConnectionConfig};

    async fn collaborator() -> Arc<dyn StoreCollaborator> {
        let collab = connect(&ConnectionConfig::sqlite_memory()).await.unwrap();
        collab
            .query("CREATE TABLE book (id INTEGER PRIMARY KEY AUTOINCREMENT, title VARCHAR(191))")
            .await
            .unwrap();
        collab
    }

    #[tokio::test]
    async fn test_tables_read_through() {
        let collab = collaborator().await;
        let cache = MetadataCache::new();
        assert!(!cache.contains(&CacheKey::Tables));

        let tables = cache.tables(collab.as_ref()).await.unwrap();
        assert!(tables.contains("book"));
        assert!(cache.contains(&CacheKey::Tables));

        // Served from cache until invalidated.
        collab.query("CREATE TABLE page (id INTEGER PRIMARY KEY)").await.unwrap();
        let cached = cache.tables(collab.as_ref()).await.unwrap();
        assert!(!cached.contains("page"));

        cache.invalidate_tables();
        let fresh = cache.tables(collab.as_ref()).await.unwrap();
        assert!(fresh.contains("page"));
    }

    #[tokio::test]
    async fn test_columns_read_through() {
        let collab = collaborator().await;
        let cache = MetadataCache::new();

        let columns = cache.columns(collab.as_ref(), "book").await.unwrap();
        assert_eq!(columns.get("id").map(String::as_str), Some("INTEGER"));
        assert_eq!(columns.get("title").map(String::as_str), Some("VARCHAR(191)"));

        collab.query("ALTER TABLE book ADD pages INTEGER").await.unwrap();
        assert!(!cache.columns(collab.as_ref(), "book").await.unwrap().contains_key("pages"));

        cache.invalidate_columns("book");
        assert!(cache.columns(collab.as_ref(), "book").await.unwrap().contains_key("pages"));
    }

    #[tokio::test]
    async fn test_invalidation_is_per_table() {
        let collab = collaborator().await;
        let cache = MetadataCache::new();
        cache.tables(collab.as_ref()).await.unwrap();
        cache.columns(collab.as_ref(), "book").await.unwrap();

        cache.invalidate_columns("other");
        assert!(cache.contains(&CacheKey::Columns("book".to_string())));
        assert!(cache.contains(&CacheKey::Tables));

        cache.clear();
        assert!(!cache.contains(&CacheKey::Columns("book".to_string())));
        assert!(!cache.contains(&CacheKey::Tables));
    }

    #[test]
    fn test_lookup_started_before_invalidation_is_discarded() {
        let cache = MetadataCache::new();
        let generation = cache.lock().generation;
        cache.invalidate_tables();
        cache.store(
            generation,
            CacheKey::Tables,
            Cached::Tables(Arc::new(BTreeSet::new())),
        );
        assert!(!cache.contains(&CacheKey::Tables));
    }
}
