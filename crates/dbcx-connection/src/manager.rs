//! Connection manager for configured connections and their live providers

use crate::events::ConnectionEvent;
use crate::secrets::SecretStore;
use crate::store::{CONNECTIONS_KEY, KeyValueStore, load_json, save_json};
use dbcx_core::{ConnectionConfig, ConnectionState, DbcxError, Provider, ProviderRef, Result};
use dbcx_drivers::DriverRegistry;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, broadcast};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

/// Exclusive use of one connection's provider.
///
/// Holding a lease serializes callers on the same connection id (an
/// interactive query and a schema refresh never overlap); different
/// connections are never blocked by each other.
pub struct ProviderLease {
    provider: ProviderRef,
    _guard: OwnedMutexGuard<()>,
}

impl ProviderLease {
    /// The shared provider handle. The handle outlives the lease, the
    /// exclusivity does not.
    pub fn provider(&self) -> ProviderRef {
        self.provider.clone()
    }
}

impl Deref for ProviderLease {
    type Target = dyn Provider;

    fn deref(&self) -> &Self::Target {
        self.provider.as_ref()
    }
}

/// Owns the configured connections and their providers.
///
/// Configs are persisted to a [`KeyValueStore`] under [`CONNECTIONS_KEY`],
/// passwords to a [`SecretStore`]. Providers are created lazily on the first
/// `connect` and kept after a failed attempt so a retry reuses them.
pub struct ConnectionManager {
    registry: DriverRegistry,
    secrets: Arc<dyn SecretStore>,
    store: Arc<dyn KeyValueStore>,
    configs: RwLock<IndexMap<Uuid, ConnectionConfig>>,
    providers: RwLock<HashMap<Uuid, ProviderRef>>,
    gates: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(
        registry: DriverRegistry,
        secrets: Arc<dyn SecretStore>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            secrets,
            store,
            configs: RwLock::new(IndexMap::new()),
            providers: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Restore saved configs, replacing anything held in memory
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Result<usize> {
        let saved: Vec<ConnectionConfig> =
            load_json(self.store.as_ref(), CONNECTIONS_KEY)?.unwrap_or_default();
        let count = saved.len();
        *self.configs.write() = saved.into_iter().map(|c| (c.id, c)).collect();
        tracing::info!(count, "connections loaded from storage");
        Ok(count)
    }

    /// Write `configs` to the store. Called before the in-memory map is
    /// touched so a failed write leaves both sides unchanged.
    fn persist(&self, configs: &IndexMap<Uuid, ConnectionConfig>) -> Result<()> {
        let list: Vec<&ConnectionConfig> = configs.values().collect();
        save_json(self.store.as_ref(), CONNECTIONS_KEY, &list)
    }

    fn emit(&self, event: ConnectionEvent) {
        tracing::trace!(?event, "connection event");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn not_found(id: Uuid) -> DbcxError {
        DbcxError::NotFound(format!("connection {}", id))
    }

    fn gate(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.gates.lock().entry(id).or_default().clone()
    }

    /// Register a new connection and store its password
    #[tracing::instrument(skip(self, config, password), fields(connection_id = %config.id, connection_name = %config.name, dialect = %config.dialect))]
    pub fn add(&self, config: ConnectionConfig, password: &str) -> Result<()> {
        config.validate()?;
        if !self.registry.has(config.dialect) {
            return Err(DbcxError::UnsupportedDialect(config.dialect.to_string()));
        }

        let id = config.id;
        let duplicate = || DbcxError::Configuration(format!("connection {} already exists", id));
        if self.configs.read().contains_key(&id) {
            return Err(duplicate());
        }

        // Password before config, so a failed secret write leaves nothing saved
        if !password.is_empty() {
            self.secrets.store_password(id, password)?;
        }
        let persisted = {
            let mut configs = self.configs.write();
            if configs.contains_key(&id) {
                return Err(duplicate());
            }
            let mut next = configs.clone();
            next.insert(id, config);
            self.persist(&next).map(|()| *configs = next)
        };
        if let Err(e) = persisted {
            if !password.is_empty()
                && let Err(cleanup) = self.secrets.delete_password(id)
            {
                tracing::warn!(error = %cleanup, "failed to roll back stored password");
            }
            return Err(e);
        }

        tracing::info!("connection added");
        self.emit(ConnectionEvent::Added(id));
        Ok(())
    }

    /// Overwrite a stored config, rotating the password when one is given.
    /// A live provider keeps its current session until reconnected.
    #[tracing::instrument(skip(self, config, password), fields(connection_id = %config.id))]
    pub fn update(&self, config: ConnectionConfig, password: Option<&str>) -> Result<()> {
        config.validate()?;
        let id = config.id;
        {
            let mut configs = self.configs.write();
            if !configs.contains_key(&id) {
                return Err(Self::not_found(id));
            }
            let mut next = configs.clone();
            next.insert(id, config);
            self.persist(&next)?;
            *configs = next;
        }
        if let Some(password) = password {
            self.secrets.store_password(id, password)?;
        }

        tracing::info!(password_rotated = password.is_some(), "connection updated");
        self.emit(ConnectionEvent::Updated(id));
        Ok(())
    }

    /// Disconnect if live, then forget the password and the config
    #[tracing::instrument(skip(self), fields(connection_id = %id))]
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        if !self.configs.read().contains_key(&id) {
            return Err(Self::not_found(id));
        }
        self.close_provider(id).await?;
        self.secrets.delete_password(id)?;
        {
            let mut configs = self.configs.write();
            let mut next = configs.clone();
            next.shift_remove(&id);
            self.persist(&next)?;
            *configs = next;
        }
        self.gates.lock().remove(&id);

        tracing::info!("connection removed");
        self.emit(ConnectionEvent::Removed(id));
        Ok(())
    }

    /// Connect a configured connection, creating its provider on first use
    #[tracing::instrument(skip(self), fields(connection_id = %id))]
    pub async fn connect(&self, id: Uuid) -> Result<()> {
        let config = self.config(id).ok_or_else(|| Self::not_found(id))?;
        let password = self.secrets.get_password(id)?.unwrap_or_default();

        let provider = {
            let mut providers = self.providers.write();
            match providers.get(&id) {
                Some(provider) => provider.clone(),
                None => {
                    let provider = self.registry.create(config.dialect)?;
                    providers.insert(id, provider.clone());
                    provider
                }
            }
        };

        let gate = self.gate(id);
        let _guard = gate.lock().await;
        tracing::info!(dialect = %config.dialect, host = %config.host, "connecting");
        let outcome = provider.connect(&config, &password).await;
        let state = provider.state();
        match &outcome {
            Ok(()) => tracing::info!("connection established"),
            Err(e) => tracing::error!(error = %e, "connection failed"),
        }
        self.emit(ConnectionEvent::StateChanged { id, state });
        outcome
    }

    /// Close and discard the live provider. A no-op when there is none.
    #[tracing::instrument(skip(self), fields(connection_id = %id))]
    pub async fn disconnect(&self, id: Uuid) -> Result<()> {
        match self.close_provider(id).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                self.emit_disconnected(id);
                Ok(())
            }
            Err(e) => {
                self.emit_disconnected(id);
                Err(e)
            }
        }
    }

    fn emit_disconnected(&self, id: Uuid) {
        self.emit(ConnectionEvent::StateChanged {
            id,
            state: ConnectionState::Disconnected,
        });
    }

    /// Take the provider out of the map and close it. `Ok(false)` when there
    /// was none; on `Err` the instance is discarded all the same.
    async fn close_provider(&self, id: Uuid) -> Result<bool> {
        let provider = self.providers.write().remove(&id);
        let Some(provider) = provider else {
            return Ok(false);
        };
        tracing::info!(connection_id = %id, "disconnecting");
        provider.disconnect().await?;
        Ok(true)
    }

    /// Probe `config` with a throwaway provider. Any failure, including an
    /// unsupported dialect, reads as `false`.
    #[tracing::instrument(skip(self, config, password), fields(connection_name = %config.name, dialect = %config.dialect))]
    pub async fn test_connection(&self, config: &ConnectionConfig, password: &str) -> bool {
        let outcome = match self.registry.create(config.dialect) {
            Ok(provider) => {
                let outcome = provider.test_connection(config, password).await;
                // The probe opens its own session, this only drops the handle
                let _ = provider.disconnect().await;
                outcome
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "connection test failed");
                false
            }
        }
    }

    /// All configs in insertion order
    pub fn connections(&self) -> Vec<ConnectionConfig> {
        self.configs.read().values().cloned().collect()
    }

    pub fn config(&self, id: Uuid) -> Option<ConnectionConfig> {
        self.configs.read().get(&id).cloned()
    }

    /// First `Connected` connection whose name matches, ignoring case
    pub fn find_connected_by_name(&self, name: &str) -> Option<Uuid> {
        let configs = self.configs.read();
        configs
            .values()
            .filter(|c| c.name.eq_ignore_ascii_case(name.trim()))
            .map(|c| c.id)
            .find(|id| self.state(*id).is_connected())
    }

    /// State of the live provider, `Disconnected` when there is none
    pub fn state(&self, id: Uuid) -> ConnectionState {
        self.providers
            .read()
            .get(&id)
            .map(|p| p.state())
            .unwrap_or_default()
    }

    pub fn provider(&self, id: Uuid) -> Option<ProviderRef> {
        self.providers.read().get(&id).cloned()
    }

    /// Configs paired with their live provider, for connections that have one
    pub fn live_connections(&self) -> Vec<(ConnectionConfig, ProviderRef)> {
        let providers = self.providers.read();
        self.configs
            .read()
            .values()
            .filter_map(|c| providers.get(&c.id).map(|p| (c.clone(), p.clone())))
            .collect()
    }

    /// Wait for exclusive use of a connection's provider.
    ///
    /// Fails with `NotConnected` when no provider exists. `disconnect` does
    /// not wait for outstanding leases.
    pub async fn lease(&self, id: Uuid) -> Result<ProviderLease> {
        let provider = self.provider(id).ok_or_else(|| {
            let label = self
                .config(id)
                .map(|c| c.name)
                .unwrap_or_else(|| id.to_string());
            DbcxError::NotConnected(label)
        })?;
        let guard = self.gate(id).lock_owned().await;
        Ok(ProviderLease {
            provider,
            _guard: guard,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Disconnect every live provider. Errors are logged, not returned.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.providers.read().keys().copied().collect();
        tracing::info!(live = ids.len(), "shutting down connection manager");
        for id in ids {
            if let Err(e) = self.disconnect(id).await {
                tracing::warn!(connection_id = %id, error = %e, "disconnect during shutdown failed");
            }
        }
    }
}
