//! Wiring of the core services with explicit startup and shutdown

use anyhow::Context;
use dbcx_connection::{
    ConnectionManager, JsonFileStore, KeyValueStore, KeyringSecretStore, SecretStore,
};
use dbcx_core::Result;
use dbcx_drivers::DriverRegistry;
use dbcx_edit::{DataEditor, EditableTableInfo};
use dbcx_query::QueryExecutor;
use dbcx_schema::{SchemaCache, SchemaCacheConfig};
use dbcx_settings::CoreSettings;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Manager, executor and schema cache sharing one store.
///
/// Start from inside a tokio runtime: the schema cache listener is spawned
/// on it.
pub struct CoreServices {
    settings: CoreSettings,
    manager: Arc<ConnectionManager>,
    executor: Arc<QueryExecutor>,
    schema_cache: Arc<SchemaCache>,
    listener: JoinHandle<()>,
}

impl CoreServices {
    /// Start with the OS keychain and the JSON store in the data directory
    pub fn start(settings: CoreSettings) -> anyhow::Result<Self> {
        let path = dbcx_settings::store_file()?;
        let store = JsonFileStore::open(&path)
            .with_context(|| format!("Failed to open store {:?}", path))?;
        Self::start_with(
            settings,
            DriverRegistry::with_defaults(),
            Arc::new(KeyringSecretStore::new()),
            Arc::new(store),
        )
    }

    /// Start with explicit collaborators
    pub fn start_with(
        settings: CoreSettings,
        registry: DriverRegistry,
        secrets: Arc<dyn SecretStore>,
        store: Arc<dyn KeyValueStore>,
    ) -> anyhow::Result<Self> {
        tracing::info!(drivers = ?registry.list(), "starting core services");

        let manager = Arc::new(ConnectionManager::new(registry, secrets, store.clone()));
        manager.load().context("Failed to load saved connections")?;

        let executor = Arc::new(
            QueryExecutor::with_store(manager.clone(), store, settings.history.max_entries)
                .context("Failed to load query history")?,
        );

        let schema_cache = Arc::new(SchemaCache::new(
            manager.clone(),
            SchemaCacheConfig {
                ttl: settings.schema_cache.ttl(),
                max_tables_per_database: settings.schema_cache.max_tables_per_database,
            },
        ));
        let listener = schema_cache.spawn_invalidation_listener();

        Ok(Self {
            settings,
            manager,
            executor,
            schema_cache,
            listener,
        })
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schema_cache
    }

    /// Decide whether the result of `query` can be edited, looking up the
    /// table's keys on the connection
    pub async fn analyze_result(
        &self,
        connection_id: Uuid,
        query: &str,
        database: Option<&str>,
    ) -> Result<EditableTableInfo> {
        let info = dbcx_edit::classify(query);
        if !info.editable {
            return Ok(info);
        }
        let provider = self.manager.lease(connection_id).await?;
        dbcx_edit::enrich(info, &*provider, database).await
    }

    /// An empty editor for the connection's dialect
    pub fn editor_for(&self, connection_id: Uuid) -> Option<DataEditor> {
        self.manager
            .config(connection_id)
            .map(|config| DataEditor::new(config.dialect))
    }

    /// Stop the cache listener, then close every connection
    pub async fn shutdown(self) {
        tracing::info!("shutting down core services");
        self.listener.abort();
        self.schema_cache.invalidate_cache();
        self.manager.shutdown().await;
    }
}
