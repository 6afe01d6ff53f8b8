//! SQL Server provider

use crate::connection::{MssqlClient, build_config, fetch_rows, open_client, run_statement, use_database};
use crate::schema;
use async_trait::async_trait;
use dbcx_core::{
    ColumnInfo, ConnectionConfig, ConnectionState, DatabaseInfo, DbcxError, Dialect, Provider,
    QueryResult, Result, Row, StateCell, TableInfo, TableScope, split_qualified_table,
};
use parking_lot::RwLock;
use std::time::Instant;
use tokio::sync::Mutex;

/// Provider holding a single TDS session
pub struct MssqlProvider {
    state: StateCell,
    /// Database selected at connect time
    home: RwLock<Option<String>>,
    client: Mutex<Option<MssqlClient>>,
}

impl MssqlProvider {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            home: RwLock::new(None),
            client: Mutex::new(None),
        }
    }

    fn label() -> &'static str {
        Dialect::Mssql.display_name()
    }

    /// Run a catalog query, optionally in another database first
    async fn fetch(&self, sql: &str, database: Option<&str>) -> Result<Vec<Row>> {
        self.state.ensure_connected(Self::label())?;
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| DbcxError::NotConnected(Self::label().into()))?;
        if let Some(database) = database {
            use_database(client, database).await?;
        }
        let (_, rows) = fetch_rows(client, sql).await?;
        Ok(rows)
    }

    async fn close(client: MssqlClient) {
        if let Err(e) = client.close().await {
            tracing::warn!(error = %e, "error while closing SQL Server session");
        }
    }
}

impl Default for MssqlProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MssqlProvider {
    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[tracing::instrument(skip(self, config, password), fields(host = %config.host, port = config.port))]
    async fn connect(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        self.state.set(ConnectionState::Connecting);

        let mut guard = self.client.lock().await;
        if let Some(previous) = guard.take() {
            Self::close(previous).await;
        }

        let opened = match build_config(config, password) {
            Ok(tds) => open_client(tds).await,
            Err(e) => Err(e),
        };

        match opened {
            Ok(client) => {
                *guard = Some(client);
                *self.home.write() = config.default_database().map(str::to_string);
                self.state.set(ConnectionState::Connected);
                tracing::info!(database = ?config.database, "SQL Server connection established");
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Error);
                tracing::error!(error = %e, "SQL Server connection failed");
                Err(e.into())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn disconnect(&self) -> Result<()> {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            tracing::info!("closing SQL Server session");
            Self::close(client).await;
        }
        *self.home.write() = None;
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    #[tracing::instrument(skip(self, config, password), fields(host = %config.host))]
    async fn test_connection(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        let mut client = open_client(build_config(config, password)?).await?;
        let probe = client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| DbcxError::Connection(e.to_string()));
        Self::close(client).await;
        probe
    }

    #[tracing::instrument(skip(self))]
    async fn get_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let rows = self.fetch(schema::DATABASES_QUERY, None).await?;
        Ok(rows
            .iter()
            .filter_map(schema::database_name)
            .map(DatabaseInfo::named)
            .collect())
    }

    /// Tables of the connect-time database unless another one is named
    #[tracing::instrument(skip(self))]
    async fn get_tables(&self, database: Option<&str>) -> Result<Vec<TableInfo>> {
        let home = self.home.read().clone();
        let database = database.filter(|db| !db.is_empty()).map(str::to_string).or(home);
        let rows = self.fetch(schema::TABLES_QUERY, database.as_deref()).await?;
        Ok(rows.iter().filter_map(schema::table_from_row).collect())
    }

    fn table_scope(&self) -> TableScope {
        TableScope::Connection
    }

    #[tracing::instrument(skip(self))]
    async fn get_columns(&self, database: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        let (schema_name, table) = split_qualified_table(table);
        let schema_name = schema_name.unwrap_or(schema::DEFAULT_SCHEMA);
        let sql = schema::columns_query(database, schema_name, table);
        let rows = self.fetch(&sql, None).await?;
        Ok(rows.iter().filter_map(schema::column_from_row).collect())
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute_query(&self, sql: &str, database: Option<&str>) -> Result<QueryResult> {
        self.state.ensure_connected(Self::label())?;
        let started = Instant::now();
        let outcome = async {
            let mut guard = self.client.lock().await;
            let client = guard
                .as_mut()
                .ok_or_else(|| DbcxError::NotConnected(Self::label().into()))?;
            run_statement(client, sql, database).await.map_err(DbcxError::from)
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
