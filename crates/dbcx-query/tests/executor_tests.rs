//! QueryExecutor against mock providers

use dbcx_connection::{ConnectionManager, KeyValueStore, MemorySecretStore, MemoryStore, QUERY_HISTORY_KEY};
use dbcx_core::{ConnectionConfig, DbcxError, Dialect, Value};
use dbcx_drivers::DriverRegistry;
use dbcx_query::{
    AmbientSelection, CancellationToken, ExecutionOutcome, QueryExecutor, StatementStatus,
};
use dbcx_test_support::{MockProvider, config, result_set};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Harness {
    manager: Arc<ConnectionManager>,
    mock: MockProvider,
}

fn harness(mock: MockProvider) -> Harness {
    let mut registry = DriverRegistry::new();
    for dialect in [Dialect::Postgres, Dialect::MySql, Dialect::MongoDb] {
        registry.register(dialect, mock.factory());
    }
    let manager = Arc::new(ConnectionManager::new(
        registry,
        Arc::new(MemorySecretStore::new()),
        Arc::new(MemoryStore::new()),
    ));
    Harness { manager, mock }
}

async fn connected(h: &Harness, cfg: ConnectionConfig) -> uuid::Uuid {
    let id = cfg.id;
    h.manager.add(cfg, "").unwrap();
    h.manager.connect(id).await.unwrap();
    id
}

fn batch(outcome: ExecutionOutcome) -> dbcx_query::BatchExecutionResult {
    match outcome {
        ExecutionOutcome::Batch(batch) => batch,
        ExecutionOutcome::Single(_) => panic!("expected a batch"),
    }
}

#[tokio::test]
async fn test_single_statement_runs_directly() {
    let mock = MockProvider::new(Dialect::Postgres).with_query_response(
        "SELECT name",
        result_set(&["name"], vec![vec![Value::from("ada")]]),
    );
    let h = harness(mock);
    let id = connected(&h, config(Dialect::Postgres, "pg")).await;
    let executor = QueryExecutor::new(h.manager.clone(), 100);

    let outcome = executor
        .execute_query(id, "SELECT name FROM users;", Some("app"), &CancellationToken::new())
        .await
        .unwrap();

    let ExecutionOutcome::Single(statement) = outcome else {
        panic!("expected a single statement");
    };
    assert_eq!(statement.sql, "SELECT name FROM users");
    assert_eq!(statement.result.unwrap().row_count, 1);
    let log = h.mock.query_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].database.as_deref(), Some("app"));
}

#[tokio::test]
async fn test_batch_continues_past_failed_statement() {
    let mock = MockProvider::new(Dialect::Postgres).with_query_failure("broken", "relation \"broken\" does not exist");
    let h = harness(mock);
    let id = connected(&h, config(Dialect::Postgres, "pg")).await;
    let executor = QueryExecutor::new(h.manager.clone(), 100);

    let outcome = executor
        .execute_query(
            id,
            "INSERT INTO t VALUES (1); SELECT * FROM broken; INSERT INTO t VALUES (2);",
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let batch = batch(outcome);

    assert_eq!(batch.statement_count(), 3);
    let statuses: Vec<StatementStatus> = batch.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![StatementStatus::Success, StatementStatus::Failed, StatementStatus::Success]
    );
    let failed = batch.results[1].result.as_ref().unwrap();
    assert!(!failed.error.as_deref().unwrap_or_default().is_empty());
    assert_eq!(failed.row_count, 0);
    assert_eq!(batch.total_affected_rows(), 2);
    assert_eq!(
        h.mock.executed_sql(),
        vec!["INSERT INTO t VALUES (1)", "SELECT * FROM broken", "INSERT INTO t VALUES (2)"]
    );

    let history = executor.history_for(id);
    assert_eq!(history.len(), 3);
    // Most recent first
    assert_eq!(history[1].query_text, "SELECT * FROM broken");
    assert!(!history[1].success);
}

#[tokio::test]
async fn test_cancellation_skips_remaining_statements() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mock = MockProvider::new(Dialect::MySql).with_hook(move |sql| {
        if sql.contains("second") {
            trigger.cancel();
        }
    });
    let h = harness(mock);
    let id = connected(&h, config(Dialect::MySql, "my")).await;
    let executor = QueryExecutor::new(h.manager.clone(), 100);

    let batch = batch(
        executor
            .execute_query(id, "SELECT 'first'; SELECT 'second'; SELECT 'third'", None, &cancel)
            .await
            .unwrap(),
    );

    assert!(batch.cancelled);
    assert_eq!(batch.success_count, 2);
    assert_eq!(batch.skipped_count, 1);
    assert!(batch.results[2].is_skipped());
    assert_eq!(h.mock.executed_sql().len(), 2);
    assert_eq!(executor.history().len(), 2);
}

#[tokio::test]
async fn test_connection_lost_mid_batch_keeps_completed_results() {
    let mock = MockProvider::new(Dialect::Postgres).with_disconnect_after("first");
    let h = harness(mock);
    let id = connected(&h, config(Dialect::Postgres, "drops")).await;
    let store = Arc::new(MemoryStore::new());
    let executor = QueryExecutor::with_store(h.manager.clone(), store.clone(), 100).unwrap();

    let batch = batch(
        executor
            .execute_query(
                id,
                "DELETE FROM t WHERE first; DELETE FROM t WHERE second; DELETE FROM t WHERE third",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap(),
    );

    assert!(!batch.cancelled);
    assert_eq!(batch.statement_count(), 3);
    assert_eq!(batch.results[0].status, StatementStatus::Success);
    assert_eq!(batch.results[0].result.as_ref().map(|r| r.affected_rows), Some(1));
    assert_eq!(batch.results[1].status, StatementStatus::Failed);
    assert!(batch.results[1].error().is_some_and(|e| e.contains("Not connected")));
    assert_eq!(batch.results[2].status, StatementStatus::Skipped);
    assert_eq!(batch.total_affected_rows(), 1);
    assert_eq!(h.mock.executed_sql(), vec!["DELETE FROM t WHERE first"]);

    let stored = store.get(QUERY_HISTORY_KEY).unwrap().unwrap();
    assert_eq!(stored.as_array().map(|a| a.len()), Some(2));
}

#[tokio::test]
async fn test_document_store_script_is_not_split() {
    let h = harness(MockProvider::new(Dialect::MongoDb));
    let id = connected(&h, config(Dialect::MongoDb, "docs")).await;
    let executor = QueryExecutor::new(h.manager.clone(), 100);

    let outcome = executor
        .execute_query(id, "db.users.deleteMany({\"a\": 1}); ", None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Single(_)));
    assert_eq!(h.mock.executed_sql(), vec!["db.users.deleteMany({\"a\": 1});"]);
}

#[tokio::test]
async fn test_disconnected_connection_fails_loudly() {
    let h = harness(MockProvider::new(Dialect::Postgres));
    let cfg = config(Dialect::Postgres, "pg");
    let id = cfg.id;
    h.manager.add(cfg, "").unwrap();
    let executor = QueryExecutor::new(h.manager.clone(), 100);

    let err = executor
        .execute_query(id, "SELECT 1", None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DbcxError::NotConnected(_)));
    assert!(executor.history().is_empty());
}

#[tokio::test]
async fn test_directives_override_ambient_selection() {
    let h = harness(MockProvider::new(Dialect::Postgres));
    let ambient_id = connected(&h, config(Dialect::Postgres, "Primary")).await;
    let reporting_id = connected(&h, config(Dialect::MySql, "Reporting")).await;
    let executor = QueryExecutor::new(h.manager.clone(), 100);
    let ambient = AmbientSelection {
        connection_id: Some(ambient_id),
        database: Some("main".into()),
    };

    executor
        .execute_script(
            "-- connection: reporting\n-- Database: analytics\nSELECT 1",
            &ambient,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let log = h.mock.query_log();
    assert_eq!(log[0].sql, "SELECT 1");
    assert_eq!(log[0].database.as_deref(), Some("analytics"));
    assert_eq!(executor.history_for(reporting_id).len(), 1);

    // Unknown connection falls back to the ambient one
    executor
        .execute_script("-- Connection: nowhere\nSELECT 2", &ambient, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(h.mock.query_log()[1].database.as_deref(), Some("main"));
    assert_eq!(executor.history_for(ambient_id).len(), 1);

    let err = executor
        .execute_script("SELECT 3", &AmbientSelection::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DbcxError::NotConnected(_)));
}

#[tokio::test]
async fn test_history_is_persisted_and_capped() {
    let h = harness(MockProvider::new(Dialect::Postgres));
    let id = connected(&h, config(Dialect::Postgres, "pg")).await;
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let executor = QueryExecutor::with_store(h.manager.clone(), store.clone(), 2).unwrap();

    executor
        .execute_query(id, "SELECT 1; SELECT 2; SELECT 3", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(executor.history().len(), 2);
    assert_eq!(executor.search_history("select 3").len(), 1);

    let saved = store.get(QUERY_HISTORY_KEY).unwrap().unwrap();
    assert_eq!(saved.as_array().map(|a| a.len()), Some(2));

    let reloaded = QueryExecutor::with_store(h.manager.clone(), store.clone(), 10).unwrap();
    assert_eq!(reloaded.history()[0].query_text, "SELECT 3");

    reloaded.clear_history().unwrap();
    assert!(reloaded.history().is_empty());
    assert_eq!(store.get(QUERY_HISTORY_KEY).unwrap(), Some(serde_json::json!([])));
}
