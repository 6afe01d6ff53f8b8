//! Script execution against a managed connection

use crate::directives::parse_directives;
use crate::history::{QueryHistory, QueryHistoryEntry};
use crate::splitter::split_statements;
use dbcx_connection::{ConnectionManager, KeyValueStore};
use dbcx_core::{DbcxError, QueryResult, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Status of a single statement in the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementStatus {
    /// Statement executed successfully
    Success,
    /// Statement ran and produced an error result
    Failed,
    /// Statement was not started because the batch was cancelled
    Skipped,
}

/// One statement of a script with its outcome
#[derive(Debug, Clone)]
pub struct StatementResult {
    /// Position in the script (0-based)
    pub index: usize,
    /// The statement text that was sent
    pub sql: String,
    pub status: StatementStatus,
    /// `None` only for skipped statements
    pub result: Option<QueryResult>,
}

impl StatementResult {
    fn executed(index: usize, sql: String, result: QueryResult) -> Self {
        let status = if result.is_error() {
            StatementStatus::Failed
        } else {
            StatementStatus::Success
        };
        Self {
            index,
            sql,
            status,
            result: Some(result),
        }
    }

    fn skipped(index: usize, sql: String) -> Self {
        Self {
            index,
            sql,
            status: StatementStatus::Skipped,
            result: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatementStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == StatementStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status == StatementStatus::Skipped
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.error.as_deref())
    }
}

/// Result of a multi-statement run
#[derive(Debug, Clone)]
pub struct BatchExecutionResult {
    /// Results for each statement in source order
    pub results: Vec<StatementResult>,
    /// Total execution time for the entire batch
    pub total_execution_time: Duration,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    /// Whether cancellation stopped the batch early
    pub cancelled: bool,
}

impl BatchExecutionResult {
    fn new(results: Vec<StatementResult>, total_time: Duration, cancelled: bool) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        let failure_count = results.iter().filter(|r| r.is_failed()).count();
        let skipped_count = results.iter().filter(|r| r.is_skipped()).count();
        Self {
            results,
            total_execution_time: total_time,
            success_count,
            failure_count,
            skipped_count,
            cancelled,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0 && self.skipped_count == 0
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count > 0
    }

    /// Rows affected across all executed statements
    pub fn total_affected_rows(&self) -> u64 {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref())
            .map(|r| r.affected_rows)
            .sum()
    }

    pub fn statement_count(&self) -> usize {
        self.results.len()
    }
}

/// What running a script produced
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The script held exactly one statement
    Single(StatementResult),
    /// Zero or several statements
    Batch(BatchExecutionResult),
}

impl ExecutionOutcome {
    /// Every statement result in order, whichever shape the run took
    pub fn statements(&self) -> &[StatementResult] {
        match self {
            ExecutionOutcome::Single(result) => std::slice::from_ref(result),
            ExecutionOutcome::Batch(batch) => &batch.results,
        }
    }
}

/// Connection and database chosen outside the script (the active editor tab)
#[derive(Debug, Clone, Default)]
pub struct AmbientSelection {
    pub connection_id: Option<Uuid>,
    pub database: Option<String>,
}

/// Runs scripts through the connection manager and records every executed
/// statement in a bounded history.
///
/// The provider lease is held for the whole script, so statements run
/// strictly in order and never interleave with other users of the same
/// connection.
pub struct QueryExecutor {
    manager: Arc<ConnectionManager>,
    history: RwLock<QueryHistory>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl QueryExecutor {
    /// Executor with in-memory history only
    pub fn new(manager: Arc<ConnectionManager>, max_history: usize) -> Self {
        Self {
            manager,
            history: RwLock::new(QueryHistory::new(max_history)),
            store: None,
        }
    }

    /// Executor whose history is loaded from and saved to `store`
    pub fn with_store(
        manager: Arc<ConnectionManager>,
        store: Arc<dyn KeyValueStore>,
        max_history: usize,
    ) -> Result<Self> {
        let history = QueryHistory::load(store.as_ref(), max_history)?;
        Ok(Self {
            manager,
            history: RwLock::new(history),
            store: Some(store),
        })
    }

    /// Run `script` on `connection_id`.
    ///
    /// A single statement is executed directly. Several statements run one
    /// after another; a failing statement yields an error-bearing result and
    /// the rest still run. `cancel` is checked before each statement of a
    /// batch; statements already sent are not rolled back.
    ///
    /// Only a missing or disconnected connection is an `Err`.
    #[tracing::instrument(skip(self, script, cancel), fields(connection_id = %connection_id, database = ?database))]
    pub async fn execute_query(
        &self,
        connection_id: Uuid,
        script: &str,
        database: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let provider = self.manager.lease(connection_id).await?;
        if !provider.state().is_connected() {
            return Err(DbcxError::NotConnected(self.connection_label(connection_id)));
        }

        let statements = split_statements(script, provider.dialect());
        tracing::debug!(statements = statements.len(), dialect = %provider.dialect(), "script split");

        if let [single] = statements.as_slice() {
            let result = provider.execute_query(single, database).await?;
            self.record(connection_id, single, &result);
            self.persist_history();
            return Ok(ExecutionOutcome::Single(StatementResult::executed(
                0,
                single.clone(),
                result,
            )));
        }

        let batch_start = Instant::now();
        let mut results = Vec::with_capacity(statements.len());
        let mut cancelled = false;
        let mut aborted = false;

        for (index, sql) in statements.into_iter().enumerate() {
            if !aborted && !cancelled && cancel.is_cancelled() {
                tracing::info!(index, "batch cancelled");
                cancelled = true;
            }
            if cancelled || aborted {
                results.push(StatementResult::skipped(index, sql));
                continue;
            }

            let result = match provider.execute_query(&sql, database).await {
                Ok(result) => result,
                Err(e) => {
                    // The connection went away under the batch; what already
                    // ran stands, the rest is not attempted
                    tracing::warn!(index, error = %e, "batch aborted");
                    aborted = true;
                    QueryResult::failure(e.to_string())
                }
            };
            if let Some(error) = &result.error
                && !aborted
            {
                tracing::warn!(index, error = %error, "statement failed, continuing");
            }
            self.record(connection_id, &sql, &result);
            results.push(StatementResult::executed(index, sql, result));
        }
        self.persist_history();

        let batch = BatchExecutionResult::new(results, batch_start.elapsed(), cancelled);
        tracing::info!(
            succeeded = batch.success_count,
            failed = batch.failure_count,
            skipped = batch.skipped_count,
            total_ms = batch.total_execution_time.as_millis() as u64,
            "batch finished"
        );
        Ok(ExecutionOutcome::Batch(batch))
    }

    /// Resolve leading directives, then run the remaining script.
    ///
    /// A `-- Connection:` directive wins when it names a connected
    /// connection; otherwise the ambient connection is used. A
    /// `-- Database:` directive overrides the ambient database.
    pub async fn execute_script(
        &self,
        script: &str,
        ambient: &AmbientSelection,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let (directives, body) = parse_directives(script);

        let directed = directives.connection.as_deref().and_then(|name| {
            let found = self.manager.find_connected_by_name(name);
            if found.is_none() {
                tracing::debug!(connection = name, "directive names no connected connection, using ambient");
            }
            found
        });
        let connection_id = directed
            .or(ambient.connection_id)
            .ok_or_else(|| DbcxError::NotConnected("no connection selected".into()))?;
        let database = directives.database.as_deref().or(ambient.database.as_deref());

        self.execute_query(connection_id, &body, database, cancel).await
    }

    fn record(&self, connection_id: Uuid, sql: &str, result: &QueryResult) {
        self.history
            .write()
            .add(QueryHistoryEntry::from_result(connection_id, sql, result));
    }

    fn persist_history(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let history = self.history.read().clone();
        if let Err(e) = history.save(store.as_ref()) {
            tracing::warn!(error = %e, "failed to persist query history");
        }
    }

    fn connection_label(&self, id: Uuid) -> String {
        self.manager
            .config(id)
            .map(|c| c.name)
            .unwrap_or_else(|| id.to_string())
    }

    /// Snapshot of the history, most recent first
    pub fn history(&self) -> Vec<QueryHistoryEntry> {
        self.history.read().entries().cloned().collect()
    }

    pub fn history_for(&self, connection_id: Uuid) -> Vec<QueryHistoryEntry> {
        self.history
            .read()
            .for_connection(connection_id)
            .cloned()
            .collect()
    }

    pub fn search_history(&self, text: &str) -> Vec<QueryHistoryEntry> {
        self.history.read().search(text).cloned().collect()
    }

    pub fn clear_history(&self) -> Result<()> {
        self.history.write().clear();
        match &self.store {
            Some(store) => self.history.read().save(store.as_ref()),
            None => Ok(()),
        }
    }
}
