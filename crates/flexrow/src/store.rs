//! The CRUD orchestrator: decides INSERT vs UPDATE and commits records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flexrow_db::{connect, ConnectionConfig, Dialect, StoreCollaborator, Value};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::MetadataCache;
use crate::entity::Entity;
use crate::error::{OrmError, Result};

/// Environment variable enabling freeze mode.
pub const FREEZE_ENV: &str = "FLEXROW_FREEZE";

/// Predicate matching every row.
pub const ALL_ROWS: &str = "1";

/// Store behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Skip schema synchronization; the schema is assumed to be complete.
    pub frozen: bool,
}

impl StoreOptions {
    /// Options from `FLEXROW_FREEZE` (`1`, `true` or `yes` enable freezing).
    pub fn from_env() -> Self {
        let frozen = std::env::var(FREEZE_ENV)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self { frozen }
    }
}

/// Records of one backend.
///
/// All reads and writes go through the collaborator; schema metadata is
/// cached per store.
pub struct EntityStore {
    collab: Arc<dyn StoreCollaborator>,
    cache: MetadataCache,
    frozen: AtomicBool,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("dialect", &self.dialect())
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

impl EntityStore {
    pub fn new(collab: Arc<dyn StoreCollaborator>) -> Self {
        Self::with_options(collab, StoreOptions::default())
    }

    pub fn with_options(collab: Arc<dyn StoreCollaborator>, options: StoreOptions) -> Self {
        Self {
            collab,
            cache: MetadataCache::new(),
            frozen: AtomicBool::new(options.frozen),
        }
    }

    /// Open a collaborator for `config` and wrap it.
    pub async fn connect(config: &ConnectionConfig, options: StoreOptions) -> Result<Self> {
        let collab = connect(config).await?;
        Ok(Self::with_options(collab, options))
    }

    pub fn collaborator(&self) -> &Arc<dyn StoreCollaborator> {
        &self.collab
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn dialect(&self) -> Dialect {
        self.collab.dialect()
    }

    pub fn is_ready(&self) -> bool {
        self.collab.is_ready()
    }

    /// Enable or disable schema synchronization on write.
    pub fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::Relaxed);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Relaxed)
    }

    /// An empty record of `kind`; nothing touches the store until it is stored.
    pub fn create(&self, kind: &str) -> Entity {
        Entity::new(kind)
    }

    /// Record `id` of `kind`, or a new record (id 0) when no row matches.
    pub async fn load(&self, kind: &str, id: u64) -> Result<Entity> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.table(kind));
        let rows = self
            .collab
            .execute(&sql, &[Value::Int(id_binding(id))])
            .await?
            .into_rows();
        Ok(match rows.into_iter().next() {
            Some(row) => Entity::from_row(kind, row),
            None => Entity::new(kind),
        })
    }

    /// Replace `entity` with the store's current version of it.
    ///
    /// A record that was never stored is left as is.
    pub async fn reload(&self, entity: &mut Entity) -> Result<()> {
        if entity.id() == 0 {
            return Ok(());
        }
        let kind = entity.kind().to_string();
        *entity = self.load(&kind, entity.id()).await?;
        Ok(())
    }

    /// Records of `kind` matching a raw SQL predicate with `?` bindings.
    pub async fn find(&self, kind: &str, predicate: &str, bindings: &[Value]) -> Result<Vec<Entity>> {
        let sql = format!("SELECT * FROM {} WHERE {}", self.table(kind), predicate);
        let rows = self.collab.execute(&sql, bindings).await?.into_rows();
        Ok(rows
            .into_iter()
            .map(|row| Entity::from_row(kind, row))
            .collect())
    }

    pub async fn find_all(&self, kind: &str) -> Result<Vec<Entity>> {
        self.find(kind, ALL_ROWS, &[]).await
    }

    /// First record matching the predicate.
    pub async fn find_one(
        &self,
        kind: &str,
        predicate: &str,
        bindings: &[Value],
    ) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} LIMIT 1",
            self.table(kind),
            predicate
        );
        let rows = self.collab.execute(&sql, bindings).await?.into_rows();
        Ok(rows.into_iter().next().map(|row| Entity::from_row(kind, row)))
    }

    /// First record matching the predicate, or a new record of `kind`.
    pub async fn find_one_or_create(
        &self,
        kind: &str,
        predicate: &str,
        bindings: &[Value],
    ) -> Result<Entity> {
        Ok(self
            .find_one(kind, predicate, bindings)
            .await?
            .unwrap_or_else(|| Entity::new(kind)))
    }

    /// Number of records matching the predicate, counted by the backend.
    pub async fn count(&self, kind: &str, predicate: &str, bindings: &[Value]) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.table(kind),
            predicate
        );
        let rows = self.collab.execute(&sql, bindings).await?.into_rows();
        match rows.first() {
            Some(row) => Ok(row.get::<u64>(0)?),
            None => Ok(0),
        }
    }

    /// Persist pending edits and return the record's id.
    ///
    /// A record without edits is not written. Otherwise the schema is
    /// synchronized (unless frozen), the record is inserted or updated, and
    /// only a confirmed write commits it. On failure the record stays dirty
    /// with its edits intact so it can be stored again.
    pub async fn store(&self, entity: &mut Entity) -> Result<u64> {
        if !entity.is_changed() {
            return Ok(entity.id());
        }

        entity.begin_write();
        match self.write(entity).await {
            Ok(id) => {
                entity.commit(id);
                debug!(table = entity.kind(), id = entity.id(), "Stored entity");
                Ok(entity.id())
            }
            Err(err) => {
                entity.abort();
                warn!(
                    table = entity.kind(),
                    id = entity.id(),
                    error = %err,
                    "Write failed; entity left dirty"
                );
                Err(err)
            }
        }
    }

    /// Store every record independently; one result per record, in order.
    pub async fn store_all(&self, entities: &mut [Entity]) -> Vec<Result<u64>> {
        join_all(entities.iter_mut().map(|entity| self.store(entity))).await
    }

    /// Delete the record's row. The in-memory record is left untouched.
    pub async fn trash(&self, entity: &Entity) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table(entity.kind()));
        let outcome = self
            .collab
            .execute(&sql, &[Value::Int(id_binding(entity.id()))])
            .await?;
        debug!(table = entity.kind(), id = entity.id(), "Trashed entity");
        Ok(outcome.rows_affected())
    }

    async fn write(&self, entity: &Entity) -> Result<u64> {
        if !self.is_frozen() {
            self.ensure_schema(entity.kind(), entity.changes()).await?;
        }
        if entity.is_created() {
            self.insert(entity).await
        } else {
            self.update(entity).await?;
            Ok(entity.id())
        }
    }

    async fn insert(&self, entity: &Entity) -> Result<u64> {
        let changes = entity.changes();
        let columns: Vec<&str> = changes.keys().map(String::as_str).collect();
        let bindings: Vec<Value> = changes.values().cloned().collect();
        let sql = self.dialect().insert_sql(entity.kind(), &columns);

        let outcome = self.collab.execute(&sql, &bindings).await?;
        outcome
            .last_insert_id()
            .ok_or_else(|| OrmError::MissingGeneratedId(entity.kind().to_string()))
    }

    async fn update(&self, entity: &Entity) -> Result<()> {
        let changes = entity.changes();
        if changes.is_empty() {
            return Ok(());
        }
        let columns: Vec<&str> = changes.keys().map(String::as_str).collect();
        let mut bindings: Vec<Value> = changes.values().cloned().collect();
        bindings.push(Value::Int(id_binding(entity.id())));
        let sql = self.dialect().update_sql(entity.kind(), &columns);

        self.collab.execute(&sql, &bindings).await?;
        Ok(())
    }

    fn table(&self, kind: &str) -> String {
        self.dialect().quote_ident(kind)
    }
}

/// Ids are generated by the backend and fit in a signed 64-bit binding.
fn id_binding(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}
