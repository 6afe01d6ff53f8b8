//! PostgreSQL provider

use crate::connection::{
    DEFAULT_DATABASE, build_pg_config, fetch_rows, open_client, run_statement, tls_connector,
};
use crate::schema;
use async_trait::async_trait;
use dbcx_core::{
    ColumnInfo, ConnectionConfig, ConnectionState, DatabaseInfo, DbcxError, Dialect, Provider,
    QueryResult, Result, StateCell, TableInfo, split_qualified_table,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_postgres::Client;

/// What is needed to open further per-database sessions after connect
#[derive(Clone)]
struct SessionSettings {
    config: ConnectionConfig,
    password: String,
    primary: String,
}

/// Provider holding one `tokio_postgres::Client` per database
pub struct PostgresProvider {
    state: StateCell,
    settings: RwLock<Option<SessionSettings>>,
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl PostgresProvider {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            settings: RwLock::new(None),
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn label() -> &'static str {
        Dialect::Postgres.display_name()
    }

    /// Client for `database`, opening a session on first use
    async fn client_for(&self, database: Option<&str>) -> Result<Arc<Client>> {
        self.state.ensure_connected(Self::label())?;
        let settings = self
            .settings
            .read()
            .clone()
            .ok_or_else(|| DbcxError::NotConnected(Self::label().into()))?;
        let database = database
            .filter(|db| !db.is_empty())
            .unwrap_or(settings.primary.as_str())
            .to_string();

        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&database).filter(|c| !c.is_closed()) {
            return Ok(client.clone());
        }

        tracing::debug!(database = %database, "opening PostgreSQL session");
        let pg_config = build_pg_config(&settings.config, &settings.password, &database);
        let client = Arc::new(open_client(&pg_config, tls_connector(&settings.config)?).await?);
        clients.insert(database, client.clone());
        Ok(client)
    }
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for PostgresProvider {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[tracing::instrument(skip(self, config, password), fields(host = %config.host, port = config.port))]
    async fn connect(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        self.state.set(ConnectionState::Connecting);
        self.clients.lock().await.clear();

        let primary = config
            .default_database()
            .unwrap_or(DEFAULT_DATABASE)
            .to_string();
        let pg_config = build_pg_config(config, password, &primary);

        let opened = match tls_connector(config) {
            Ok(tls) => open_client(&pg_config, tls).await,
            Err(e) => Err(e),
        };

        match opened {
            Ok(client) => {
                self.clients
                    .lock()
                    .await
                    .insert(primary.clone(), Arc::new(client));
                *self.settings.write() = Some(SessionSettings {
                    config: config.clone(),
                    password: password.to_string(),
                    primary: primary.clone(),
                });
                self.state.set(ConnectionState::Connected);
                tracing::info!(database = %primary, "PostgreSQL connection established");
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Error);
                tracing::error!(error = %e, "PostgreSQL connection failed");
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn disconnect(&self) -> Result<()> {
        let sessions = {
            let mut clients = self.clients.lock().await;
            std::mem::take(&mut *clients)
        };
        if !sessions.is_empty() {
            tracing::info!(sessions = sessions.len(), "closing PostgreSQL sessions");
        }
        // Dropping the clients ends their connection tasks
        drop(sessions);
        *self.settings.write() = None;
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    #[tracing::instrument(skip(self, config, password), fields(host = %config.host))]
    async fn test_connection(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        let database = config.default_database().unwrap_or(DEFAULT_DATABASE);
        let pg_config = build_pg_config(config, password, database);
        let client = open_client(&pg_config, tls_connector(config)?).await?;
        client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| DbcxError::Connection(crate::format_postgres_error(&e)))
    }

    #[tracing::instrument(skip(self))]
    async fn get_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let client = self.client_for(None).await?;
        let rows = fetch_rows(&client, schema::DATABASES_QUERY, &[]).await?;
        Ok(rows
            .iter()
            .filter_map(schema::database_name)
            .map(DatabaseInfo::named)
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn get_tables(&self, database: Option<&str>) -> Result<Vec<TableInfo>> {
        let client = self.client_for(database).await?;
        let rows = fetch_rows(&client, schema::TABLES_QUERY, &[]).await?;
        Ok(rows.iter().filter_map(schema::table_from_row).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn get_columns(&self, database: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        let (schema_name, table) = split_qualified_table(table);
        let schema_name = schema_name.unwrap_or(schema::DEFAULT_SCHEMA);
        let client = self.client_for(database).await?;
        let rows = fetch_rows(&client, schema::COLUMNS_QUERY, &[&schema_name, &table]).await?;
        Ok(rows.iter().filter_map(schema::column_from_row).collect())
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute_query(&self, sql: &str, database: Option<&str>) -> Result<QueryResult> {
        self.state.ensure_connected(Self::label())?;
        let started = Instant::now();
        let outcome = async {
            let client = self.client_for(database).await?;
            run_statement(&client, sql).await
        }
        .await;
        let result = QueryResult::from_outcome(outcome, started);
        tracing::debug!(
            row_count = result.row_count,
            execution_time_ms = result.execution_time_ms,
            failed = result.is_error(),
            "statement executed"
        );
        Ok(result)
    }
}
