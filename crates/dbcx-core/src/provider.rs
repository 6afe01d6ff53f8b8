//! The per-dialect provider trait

use crate::{
    ColumnInfo, ConnectionConfig, ConnectionState, DatabaseInfo, Dialect, QueryResult, Result,
    TableInfo, TableScope,
};
use async_trait::async_trait;
use std::sync::Arc;

/// One live connection to one backend.
///
/// Methods take `&self`; implementations keep their client handle and
/// [`crate::StateCell`] behind interior mutability so the manager can share
/// an `Arc<dyn Provider>` across tasks.
///
/// Every metadata and query method fails with
/// [`crate::DbcxError::NotConnected`] when the state is not `Connected`,
/// before attempting any I/O.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The dialect this instance was constructed for
    fn dialect(&self) -> Dialect;

    /// Current lifecycle state
    fn state(&self) -> ConnectionState;

    /// Open the connection. Transitions `Connecting` then `Connected`, or
    /// `Error` on failure (the error is returned).
    async fn connect(&self, config: &ConnectionConfig, password: &str) -> Result<()>;

    /// Close the connection. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Open a separate connection, run a trivial probe and close it again.
    /// Does not touch this instance's state.
    async fn test_connection(&self, config: &ConnectionConfig, password: &str) -> Result<()>;

    /// List databases. Document stores nest collections with estimated counts.
    async fn get_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// List tables. Ignores `database` when [`Provider::table_scope`] is
    /// [`TableScope::Connection`]; document stores return an empty list.
    async fn get_tables(&self, database: Option<&str>) -> Result<Vec<TableInfo>>;

    /// Whether `get_tables` is scoped per database or by the connection
    fn table_scope(&self) -> TableScope {
        TableScope::PerDatabase
    }

    /// Ordered column metadata. `table` may be `schema.table`.
    async fn get_columns(&self, database: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Execute one statement.
    ///
    /// Only `NotConnected` is returned as `Err`; every backend failure is
    /// converted into a [`QueryResult::failure`]. Elapsed wall-clock time is
    /// always recorded.
    async fn execute_query(&self, sql: &str, database: Option<&str>) -> Result<QueryResult>;
}

/// Shared handle to a provider
pub type ProviderRef = Arc<dyn Provider>;

/// Constructor for a provider of a given dialect
pub type ProviderFactory = Arc<dyn Fn(Dialect) -> ProviderRef + Send + Sync>;
