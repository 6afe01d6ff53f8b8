//! Schema cache for completion

use dbcx_connection::{ConnectionManager, ProviderLease};
use dbcx_core::{ColumnInfo, ConnectionConfig, Result, TableInfo, TableScope};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Age after which a snapshot is fetched again
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Tables kept per database; the rest of a large catalog is ignored
pub const DEFAULT_MAX_TABLES_PER_DATABASE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaCacheConfig {
    pub ttl: Duration,
    pub max_tables_per_database: usize,
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_tables_per_database: DEFAULT_MAX_TABLES_PER_DATABASE,
        }
    }
}

/// A table and its columns. `columns` is empty when they could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTable {
    pub info: TableInfo,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedDatabase {
    pub name: String,
    pub tables: Vec<CachedTable>,
}

/// Everything cached for one connection
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub databases: Vec<CachedDatabase>,
    pub cached_at: Instant,
}

impl SchemaSnapshot {
    fn tables(&self, database: Option<&str>) -> impl Iterator<Item = &CachedTable> {
        self.databases
            .iter()
            .filter(move |db| database.is_none_or(|name| db.name == name))
            .flat_map(|db| db.tables.iter())
    }
}

/// Per-connection snapshots of databases, tables and columns.
///
/// Only connected SQL connections are cached. System databases are left
/// out and each database contributes at most
/// [`SchemaCacheConfig::max_tables_per_database`] tables. A snapshot younger
/// than the TTL is not fetched again.
pub struct SchemaCache {
    manager: Arc<ConnectionManager>,
    config: SchemaCacheConfig,
    /// Cache per connection ID
    cache: RwLock<HashMap<Uuid, SchemaSnapshot>>,
    /// Bumped by every invalidation; a fetch that started before one is
    /// discarded
    generation: AtomicU64,
    /// Serializes update passes
    updating: tokio::sync::Mutex<()>,
}

impl SchemaCache {
    pub fn new(manager: Arc<ConnectionManager>, config: SchemaCacheConfig) -> Self {
        Self {
            manager,
            config,
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            updating: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> SchemaCacheConfig {
        self.config
    }

    /// Check if cache is valid for a connection
    pub fn is_valid(&self, connection_id: Uuid) -> bool {
        self.cache
            .read()
            .get(&connection_id)
            .is_some_and(|s| s.cached_at.elapsed() < self.config.ttl)
    }

    /// Fetch snapshots for every connected SQL connection whose snapshot is
    /// missing or stale. Returns how many connections were refreshed.
    ///
    /// A connection whose database listing fails keeps no snapshot; the pass
    /// moves on to the next one.
    #[tracing::instrument(skip(self))]
    pub async fn update_schema_cache(&self) -> usize {
        let _pass = self.updating.lock().await;
        let mut refreshed = 0;

        for (config, provider) in self.manager.live_connections() {
            if config.dialect.is_document_store() {
                tracing::trace!(connection_id = %config.id, "document store, not cached");
                continue;
            }
            if !provider.state().is_connected() {
                continue;
            }
            if self.is_valid(config.id) {
                tracing::debug!(connection_id = %config.id, "schema cache hit");
                continue;
            }

            tracing::debug!(connection_id = %config.id, "schema cache miss");
            let generation = self.generation.load(Ordering::SeqCst);
            match self.fetch_snapshot(&config).await {
                Ok(snapshot) => {
                    let mut cache = self.cache.write();
                    if self.generation.load(Ordering::SeqCst) != generation {
                        tracing::debug!(connection_id = %config.id, "invalidated during fetch, discarded");
                        continue;
                    }
                    tracing::info!(
                        connection_id = %config.id,
                        databases = snapshot.databases.len(),
                        "schema cached"
                    );
                    cache.insert(config.id, snapshot);
                    refreshed += 1;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %config.id, error = %e, "schema refresh failed");
                }
            }
        }
        refreshed
    }

    async fn fetch_snapshot(&self, config: &ConnectionConfig) -> Result<SchemaSnapshot> {
        let provider = self.manager.lease(config.id).await?;
        let dialect = config.dialect;

        let names: Vec<String> = provider
            .get_databases()
            .await?
            .into_iter()
            .map(|db| db.name)
            .filter(|name| !dialect.is_system_database(name))
            .collect();

        let mut databases = Vec::with_capacity(names.len());
        match provider.table_scope() {
            TableScope::PerDatabase => {
                for name in names {
                    let tables = self.fetch_tables(&provider, Some(&name)).await?;
                    databases.push(CachedDatabase { name, tables });
                }
            }
            TableScope::Connection => {
                // Tables belong to the database chosen at connect time
                let home = config.default_database().unwrap_or_default().to_string();
                let tables = self.fetch_tables(&provider, None).await?;
                databases.extend(
                    names
                        .into_iter()
                        .filter(|name| *name != home)
                        .map(|name| CachedDatabase {
                            name,
                            tables: Vec::new(),
                        }),
                );
                databases.insert(0, CachedDatabase { name: home, tables });
            }
        }

        Ok(SchemaSnapshot {
            databases,
            cached_at: Instant::now(),
        })
    }

    async fn fetch_tables(
        &self,
        provider: &ProviderLease,
        database: Option<&str>,
    ) -> Result<Vec<CachedTable>> {
        let mut listed = provider.get_tables(database).await?;
        if listed.len() > self.config.max_tables_per_database {
            tracing::debug!(
                database = ?database,
                total = listed.len(),
                kept = self.config.max_tables_per_database,
                "table list capped"
            );
            listed.truncate(self.config.max_tables_per_database);
        }

        let mut tables = Vec::with_capacity(listed.len());
        for info in listed {
            let columns = match provider.get_columns(database, &info.qualified_name()).await {
                Ok(columns) => columns,
                Err(e) => {
                    tracing::debug!(table = %info.qualified_name(), error = %e, "columns unavailable");
                    Vec::new()
                }
            };
            tables.push(CachedTable { info, columns });
        }
        Ok(tables)
    }

    /// Drop every snapshot
    pub fn invalidate_cache(&self) {
        let dropped = {
            let mut cache = self.cache.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            let dropped = cache.len();
            cache.clear();
            dropped
        };
        tracing::debug!(dropped, "schema cache invalidated");
    }

    /// Drop one connection's snapshot and run an update pass
    #[tracing::instrument(skip(self), fields(connection_id = %connection_id))]
    pub async fn refresh_cache(&self, connection_id: Uuid) -> usize {
        self.cache.write().remove(&connection_id);
        self.update_schema_cache().await
    }

    /// Invalidate on every connection event until the manager goes away.
    /// A lagging receiver also invalidates, since events were missed.
    pub fn spawn_invalidation_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.manager.subscribe();
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        tracing::trace!(connection_id = %event.connection_id(), "connections changed");
                        cache.invalidate_cache();
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!(missed, "connection events lagged");
                        cache.invalidate_cache();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn snapshot(&self, connection_id: Uuid) -> Option<SchemaSnapshot> {
        self.cache.read().get(&connection_id).cloned()
    }

    /// Cached database names
    pub fn databases(&self, connection_id: Uuid) -> Vec<String> {
        self.cache
            .read()
            .get(&connection_id)
            .map(|s| s.databases.iter().map(|db| db.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Tables of one database, or of all cached databases when `None`
    pub fn tables(&self, connection_id: Uuid, database: Option<&str>) -> Vec<TableInfo> {
        self.cache
            .read()
            .get(&connection_id)
            .map(|s| s.tables(database).map(|t| t.info.clone()).collect())
            .unwrap_or_default()
    }

    /// Columns of the first cached table matching `table` by plain or
    /// qualified name
    pub fn columns(
        &self,
        connection_id: Uuid,
        database: Option<&str>,
        table: &str,
    ) -> Option<Vec<ColumnInfo>> {
        let cache = self.cache.read();
        let snapshot = cache.get(&connection_id)?;
        snapshot
            .tables(database)
            .find(|t| t.info.name == table || t.info.qualified_name() == table)
            .map(|t| t.columns.clone())
    }

    /// Distinct qualified table names across the snapshot, sorted
    pub fn table_names(&self, connection_id: Uuid) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .read()
            .get(&connection_id)
            .map(|s| s.tables(None).map(|t| t.info.qualified_name()).collect())
            .unwrap_or_default();
        names.sort();
        names.dedup();
        names
    }
}
