//! In-memory [`Provider`] for exercising manager, executor, editor and cache
//! logic without a real database.

use async_trait::async_trait;
use dbcx_core::{
    ColumnInfo, ConnectionConfig, ConnectionState, DatabaseInfo, DbcxError, Dialect, Provider,
    ProviderFactory, ProviderRef, QueryResult, Result, StateCell, TableInfo, TableScope,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// One recorded `execute_query` call
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    pub sql: String,
    pub database: Option<String>,
}

type QueryHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Log and counters shared by every instance spawned from one template
#[derive(Default)]
struct Shared {
    query_log: Mutex<Vec<LoggedQuery>>,
    database_calls: AtomicUsize,
    connect_calls: AtomicUsize,
}

/// Mock provider with scripted schema, pattern-matched query responses and
/// a shared query log.
///
/// Configure a template with the `with_*` builders, then hand
/// [`MockProvider::factory`] to a registry; every provider it constructs
/// starts disconnected but shares the template's script and log.
#[derive(Clone)]
pub struct MockProvider {
    dialect: Dialect,
    state: Arc<StateCell>,
    fail_connect: Option<String>,
    databases: Vec<DatabaseInfo>,
    tables: HashMap<String, Vec<TableInfo>>,
    columns: HashMap<String, Vec<ColumnInfo>>,
    failing_columns: HashSet<String>,
    scope: TableScope,
    /// SQL-pattern-based responses, first match wins
    responses: Vec<(String, QueryResult)>,
    /// SQL patterns whose execution fails with the given message
    failures: Vec<(String, String)>,
    default_affected: u64,
    hook: Option<QueryHook>,
    /// Statements after which the instance drops its connection
    disconnect_after: Option<String>,
    connect_gate: Option<Arc<Notify>>,
    databases_hook: Option<Arc<dyn Fn() + Send + Sync>>,
    shared: Arc<Shared>,
}

impl MockProvider {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Arc::new(StateCell::new()),
            fail_connect: None,
            databases: Vec::new(),
            tables: HashMap::new(),
            columns: HashMap::new(),
            failing_columns: HashSet::new(),
            scope: TableScope::PerDatabase,
            responses: Vec::new(),
            failures: Vec::new(),
            default_affected: 1,
            hook: None,
            disconnect_after: None,
            connect_gate: None,
            databases_hook: None,
            shared: Arc::new(Shared::default()),
        }
    }

    /// A provider that is already connected
    pub fn connected(dialect: Dialect) -> Self {
        let provider = Self::new(dialect);
        provider.state.set(ConnectionState::Connected);
        provider
    }

    /// Make `connect` and `test_connection` fail with `message`
    pub fn with_connect_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_connect = Some(message.into());
        self
    }

    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.databases.push(DatabaseInfo::named(name));
        self
    }

    /// Tables listed for `database` (or for every database with a
    /// connection-scoped provider, pass `""`)
    pub fn with_tables(mut self, database: impl Into<String>, tables: &[&str]) -> Self {
        self.tables
            .entry(database.into())
            .or_default()
            .extend(tables.iter().map(|t| TableInfo::new(*t)));
        self
    }

    pub fn with_columns(mut self, table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        self.columns.insert(table.into(), columns);
        self
    }

    /// Make `get_columns` fail for `table`
    pub fn with_failing_columns(mut self, table: impl Into<String>) -> Self {
        self.failing_columns.insert(table.into());
        self
    }

    pub fn with_table_scope(mut self, scope: TableScope) -> Self {
        self.scope = scope;
        self
    }

    /// Register a response for statements containing `sql_contains`
    pub fn with_query_response(mut self, sql_contains: impl Into<String>, result: QueryResult) -> Self {
        self.responses.push((sql_contains.into(), result));
        self
    }

    /// Statements containing `sql_contains` yield an error-bearing result
    pub fn with_query_failure(
        mut self,
        sql_contains: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures.push((sql_contains.into(), message.into()));
        self
    }

    /// Affected-row count reported by statements without a scripted response
    pub fn with_default_affected(mut self, affected: u64) -> Self {
        self.default_affected = affected;
        self
    }

    /// Called with every statement before it is answered
    pub fn with_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Answer statements containing `sql_contains`, then behave as if the
    /// server closed the session
    pub fn with_disconnect_after(mut self, sql_contains: impl Into<String>) -> Self {
        self.disconnect_after = Some(sql_contains.into());
        self
    }

    /// `connect` stays in `Connecting` until `gate` is notified
    pub fn with_connect_gate(mut self, gate: Arc<Notify>) -> Self {
        self.connect_gate = Some(gate);
        self
    }

    /// Called on every `get_databases` before it answers
    pub fn with_databases_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.databases_hook = Some(Arc::new(hook));
        self
    }

    /// A disconnected instance sharing this template's script and log
    pub fn spawn(&self, dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Arc::new(StateCell::new()),
            ..self.clone()
        }
    }

    /// Factory producing fresh instances via [`MockProvider::spawn`]
    pub fn factory(&self) -> ProviderFactory {
        let template = self.clone();
        Arc::new(move |dialect: Dialect| Arc::new(template.spawn(dialect)) as ProviderRef)
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
    }

    pub fn query_log(&self) -> Vec<LoggedQuery> {
        self.shared.query_log.lock().clone()
    }

    /// Statements executed so far, in order
    pub fn executed_sql(&self) -> Vec<String> {
        self.shared
            .query_log
            .lock()
            .iter()
            .map(|q| q.sql.clone())
            .collect()
    }

    pub fn database_calls(&self) -> usize {
        self.shared.database_calls.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.shared.connect_calls.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<()> {
        self.state.ensure_connected("mock")
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self, _config: &ConnectionConfig, _password: &str) -> Result<()> {
        self.shared.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.state.set(ConnectionState::Connecting);
        if let Some(gate) = &self.connect_gate {
            gate.notified().await;
        }
        match &self.fail_connect {
            Some(message) => {
                self.state.set(ConnectionState::Error);
                Err(DbcxError::Connection(message.clone()))
            }
            None => {
                self.state.set(ConnectionState::Connected);
                Ok(())
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    async fn test_connection(&self, _config: &ConnectionConfig, _password: &str) -> Result<()> {
        match &self.fail_connect {
            Some(message) => Err(DbcxError::Connection(message.clone())),
            None => Ok(()),
        }
    }

    async fn get_databases(&self) -> Result<Vec<DatabaseInfo>> {
        self.ensure_connected()?;
        self.shared.database_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.databases_hook {
            hook();
        }
        Ok(self.databases.clone())
    }

    async fn get_tables(&self, database: Option<&str>) -> Result<Vec<TableInfo>> {
        self.ensure_connected()?;
        let key = match self.scope {
            TableScope::Connection => "",
            TableScope::PerDatabase => database.unwrap_or(""),
        };
        Ok(self.tables.get(key).cloned().unwrap_or_default())
    }

    fn table_scope(&self) -> TableScope {
        self.scope
    }

    async fn get_columns(&self, _database: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        self.ensure_connected()?;
        if self.failing_columns.contains(table) {
            return Err(DbcxError::Schema(format!("cannot describe {}", table)));
        }
        Ok(self.columns.get(table).cloned().unwrap_or_default())
    }

    async fn execute_query(&self, sql: &str, database: Option<&str>) -> Result<QueryResult> {
        self.ensure_connected()?;
        tracing::trace!(sql, "mock statement");
        self.shared.query_log.lock().push(LoggedQuery {
            sql: sql.to_string(),
            database: database.map(str::to_string),
        });
        if let Some(hook) = &self.hook {
            hook(sql);
        }
        if let Some(pattern) = &self.disconnect_after
            && sql.contains(pattern.as_str())
        {
            self.state.set(ConnectionState::Disconnected);
        }

        if let Some((_, message)) = self.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Ok(QueryResult::failure(message.clone()));
        }
        if let Some((_, result)) = self.responses.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Ok(result.clone());
        }
        Ok(QueryResult::affected(self.default_affected))
    }
}
