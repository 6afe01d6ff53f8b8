//! Dialect → provider constructor registry

use dbcx_core::{DbcxError, Dialect, ProviderFactory, ProviderRef, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available providers, keyed by dialect
#[derive(Clone)]
pub struct DriverRegistry {
    factories: HashMap<Dialect, ProviderFactory>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with all built-in providers registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "postgres")]
        registry.register(
            Dialect::Postgres,
            Arc::new(|_: Dialect| Arc::new(crate::postgres::PostgresProvider::new()) as ProviderRef),
        );
        #[cfg(feature = "mysql")]
        {
            // MariaDB shares the MySQL implementation under its own tag
            let mysql: ProviderFactory =
                Arc::new(|dialect: Dialect| Arc::new(crate::mysql::MySqlProvider::new(dialect)) as ProviderRef);
            registry.register(Dialect::MySql, mysql.clone());
            registry.register(Dialect::MariaDb, mysql);
        }
        #[cfg(feature = "mssql")]
        registry.register(
            Dialect::Mssql,
            Arc::new(|_: Dialect| Arc::new(crate::mssql::MssqlProvider::new()) as ProviderRef),
        );
        #[cfg(feature = "mongodb")]
        registry.register(
            Dialect::MongoDb,
            Arc::new(|_: Dialect| Arc::new(crate::mongodb::MongoProvider::new()) as ProviderRef),
        );

        registry
    }

    /// Register (or replace) the constructor for a dialect
    pub fn register(&mut self, dialect: Dialect, factory: ProviderFactory) {
        tracing::info!(dialect = %dialect, "registering provider");
        self.factories.insert(dialect, factory);
    }

    /// Construct a fresh, disconnected provider for `dialect`
    pub fn create(&self, dialect: Dialect) -> Result<ProviderRef> {
        match self.factories.get(&dialect) {
            Some(factory) => Ok(factory(dialect)),
            None => {
                tracing::warn!(dialect = %dialect, "no provider registered for dialect");
                Err(DbcxError::UnsupportedDialect(dialect.to_string()))
            }
        }
    }

    /// List registered dialects
    pub fn list(&self) -> Vec<Dialect> {
        let mut dialects: Vec<Dialect> = self.factories.keys().copied().collect();
        dialects.sort_by_key(|d| d.id());
        dialects
    }

    /// Check if a dialect is registered
    pub fn has(&self, dialect: Dialect) -> bool {
        self.factories.contains_key(&dialect)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("dialects", &self.list())
            .finish()
    }
}
