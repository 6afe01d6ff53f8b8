//! MySQL/MariaDB provider

use crate::connection::{build_opts, get_conn, open_pool, run_statement};
use crate::schema;
use async_trait::async_trait;
use dbcx_core::{
    ColumnInfo, ConnectionConfig, ConnectionState, DatabaseInfo, Dialect, Provider, QueryResult,
    Result, StateCell, TableInfo, split_qualified_table,
};
use mysql_async::{Pool, prelude::*};
use parking_lot::RwLock;
use std::time::Instant;

/// Provider backed by a single-connection `mysql_async` pool
pub struct MySqlProvider {
    dialect: Dialect,
    state: StateCell,
    pool: RwLock<Option<Pool>>,
}

impl MySqlProvider {
    /// Create a disconnected provider tagged with `dialect`
    /// (`Dialect::MySql` or `Dialect::MariaDb`)
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: StateCell::new(),
            pool: RwLock::new(None),
        }
    }

    fn live_pool(&self) -> Result<Pool> {
        self.state.ensure_connected(self.dialect.display_name())?;
        self.pool
            .read()
            .clone()
            .ok_or_else(|| dbcx_core::DbcxError::NotConnected(self.dialect.display_name().into()))
    }

    async fn fetch(&self, sql: &str) -> Result<QueryResult> {
        let pool = self.live_pool()?;
        let mut conn = get_conn(&pool).await?;
        run_statement(&mut conn, sql, None).await
    }

    async fn close_pool(pool: Pool) {
        if let Err(e) = pool.disconnect().await {
            tracing::warn!(error = %e, "error while closing MySQL pool");
        }
    }
}

#[async_trait]
impl Provider for MySqlProvider {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[tracing::instrument(skip(self, config, password), fields(dialect = %self.dialect, host = %config.host, port = config.port))]
    async fn connect(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        self.state.set(ConnectionState::Connecting);

        let previous = self.pool.write().take();
        if let Some(pool) = previous {
            Self::close_pool(pool).await;
        }

        let opened = match build_opts(config, password) {
            Ok(opts) => open_pool(opts).await,
            Err(e) => Err(e),
        };

        match opened {
            Ok(pool) => {
                *self.pool.write() = Some(pool);
                self.state.set(ConnectionState::Connected);
                tracing::info!(database = ?config.database, "MySQL connection established");
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Error);
                tracing::error!(error = %e, "MySQL connection failed");
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self), fields(dialect = %self.dialect))]
    async fn disconnect(&self) -> Result<()> {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            tracing::info!("closing MySQL connection pool");
            Self::close_pool(pool).await;
        }
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    #[tracing::instrument(skip(self, config, password), fields(dialect = %self.dialect, host = %config.host))]
    async fn test_connection(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        let pool = open_pool(build_opts(config, password)?).await?;
        let probe = async {
            let mut conn = get_conn(&pool).await?;
            conn.query_drop("SELECT 1")
                .await
                .map_err(|e| dbcx_core::DbcxError::Connection(e.to_string()))
        }
        .await;
        Self::close_pool(pool).await;
        probe
    }

    #[tracing::instrument(skip(self))]
    async fn get_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let result = self.fetch(schema::DATABASES_QUERY).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(schema::database_name)
            .map(DatabaseInfo::named)
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn get_tables(&self, database: Option<&str>) -> Result<Vec<TableInfo>> {
        let result = self.fetch(&schema::tables_query(database)).await?;
        Ok(result.rows.iter().filter_map(schema::table_from_row).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn get_columns(&self, database: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        // `db.table` names override the database argument
        let (qualifier, table) = split_qualified_table(table);
        let database = qualifier.or(database);
        let result = self.fetch(&schema::columns_query(database, table)).await?;
        Ok(result.rows.iter().filter_map(schema::column_from_row).collect())
    }

    #[tracing::instrument(skip(self, sql), fields(dialect = %self.dialect, sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute_query(&self, sql: &str, database: Option<&str>) -> Result<QueryResult> {
        let pool = self.live_pool()?;
        let started = Instant::now();
        let outcome = async {
            let mut conn = get_conn(&pool).await?;
            run_statement(&mut conn, sql, database).await
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
