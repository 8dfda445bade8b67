//! Named stores and the current selection.
//!
//! A `Registry` is an ordinary value owned by the caller. Switching the
//! current store affects every caller sharing the same registry; code that
//! needs isolation should hold an `Arc<EntityStore>` from [`Registry::get`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use flexrow_db::ConnectionConfig;
use tracing::info;

use crate::error::{OrmError, Result};
use crate::store::{EntityStore, StoreOptions};

#[derive(Debug, Default)]
struct RegistryState {
    stores: HashMap<String, Arc<EntityStore>>,
    current: Option<String>,
}

/// Stores by connection key, plus the current one.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
    options: StoreOptions,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose connected stores start with `options`.
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            state: Mutex::default(),
            options,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connect and register under `config.key()`, making it current.
    ///
    /// # Errors
    ///
    /// [`OrmError::DuplicateConnection`] if the key is taken (checked before
    /// connecting), or the connection error.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<EntityStore>> {
        let key = config.key();
        if self.lock().stores.contains_key(&key) {
            return Err(OrmError::DuplicateConnection(key));
        }
        let store = Arc::new(EntityStore::connect(config, self.options).await?);
        self.register(&key, Arc::clone(&store))?;
        info!(key = %key, backend = config.backend_name(), "Registered connection");
        Ok(store)
    }

    /// Register an existing store under `key`, making it current.
    pub fn register(&self, key: &str, store: Arc<EntityStore>) -> Result<()> {
        let mut state = self.lock();
        if state.stores.contains_key(key) {
            return Err(OrmError::DuplicateConnection(key.to_string()));
        }
        state.stores.insert(key.to_string(), store);
        state.current = Some(key.to_string());
        Ok(())
    }

    /// Make `key` the current store.
    pub fn select(&self, key: &str) -> Result<Arc<EntityStore>> {
        let mut state = self.lock();
        let store = state
            .stores
            .get(key)
            .cloned()
            .ok_or_else(|| OrmError::UnknownConnection(key.to_string()))?;
        state.current = Some(key.to_string());
        Ok(store)
    }

    /// Forget every store and the current selection.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.stores.clear();
        state.current = None;
    }

    pub fn current(&self) -> Result<Arc<EntityStore>> {
        let state = self.lock();
        state
            .current
            .as_ref()
            .and_then(|key| state.stores.get(key))
            .cloned()
            .ok_or(OrmError::NoCurrentConnection)
    }

    pub fn current_key(&self) -> Option<String> {
        self.lock().current.clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<EntityStore>> {
        self.lock().stores.get(key).cloned()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().stores.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Readiness of the current store; false when none is selected.
    pub fn is_ready(&self) -> bool {
        self.current().map(|store| store.is_ready()).unwrap_or(false)
    }
}
