//! Analyzer enrichment and saving edits through mock providers

use dbcx_connection::{ConnectionManager, MemorySecretStore, MemoryStore};
use dbcx_core::{ColumnInfo, ConnectionState, DbcxError, Dialect, Provider, RowMap, Value};
use dbcx_drivers::DriverRegistry;
use dbcx_edit::{DataEditor, EditError, EditorState, classify, enrich};
use dbcx_test_support::{MockProvider, config, users_columns};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn row(id: i64, name: &str) -> RowMap {
    let mut row = RowMap::new();
    row.insert("id".into(), Value::Int64(id));
    row.insert("name".into(), Value::from(name));
    row
}

#[tokio::test]
async fn test_enrich_attaches_primary_keys() {
    let provider = MockProvider::connected(Dialect::Postgres).with_columns("public.users", users_columns());

    let info = enrich(classify("SELECT * FROM public.users"), &provider, Some("app"))
        .await
        .unwrap();
    assert!(info.editable);
    assert_eq!(info.primary_keys, vec!["id".to_string()]);
    assert_eq!(info.columns.len(), 3);
}

#[tokio::test]
async fn test_enrich_without_primary_key_is_not_editable() {
    let provider = MockProvider::connected(Dialect::MySql)
        .with_columns("logs", vec![ColumnInfo::new("line", "text")])
        .with_failing_columns("broken");

    let info = enrich(classify("SELECT * FROM logs"), &provider, None).await.unwrap();
    assert!(!info.editable);
    assert!(info.reason.unwrap().contains("primary key"));

    let info = enrich(classify("SELECT * FROM broken"), &provider, None).await.unwrap();
    assert!(!info.editable);
    assert!(info.reason.unwrap().starts_with("Could not load columns"));
}

#[tokio::test]
async fn test_enrich_skips_rejected_and_propagates_not_connected() {
    let provider = MockProvider::new(Dialect::Postgres).with_columns("users", users_columns());

    let rejected = enrich(classify("SELECT * FROM a JOIN b ON true"), &provider, None)
        .await
        .unwrap();
    assert!(!rejected.editable);

    let err = enrich(classify("SELECT * FROM users"), &provider, None).await.unwrap_err();
    assert!(matches!(err, DbcxError::NotConnected(_)));
}

#[tokio::test]
async fn test_successful_save_clears_changes() {
    let provider = MockProvider::connected(Dialect::Postgres)
        .with_columns("users", users_columns())
        .with_default_affected(1);
    let table = enrich(classify("SELECT * FROM users"), &provider, None).await.unwrap();

    let mut editor = DataEditor::new(provider.dialect());
    editor.add_cell_change(0, "name", Value::from("A"), Value::from("B"));
    editor.mark_row_for_deletion(1, row(2, "Z"));

    let outcome = editor
        .execute_changes(&table, &[row(1, "A"), row(2, "Z")], &provider, Some("app"))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.affected_rows, 2);
    assert_eq!(outcome.statements_executed, 2);
    assert_eq!(editor.state(), EditorState::Clean);
    assert_eq!(
        provider.executed_sql(),
        vec![
            r#"DELETE FROM "users" WHERE "id" = 2"#,
            r#"UPDATE "users" SET "name" = 'B' WHERE "id" = 1"#,
        ]
    );
    assert!(provider.query_log().iter().all(|q| q.database.as_deref() == Some("app")));
}

#[tokio::test]
async fn test_partial_failure_keeps_changes_for_retry() {
    let provider = MockProvider::connected(Dialect::MySql)
        .with_columns("users", users_columns())
        .with_query_failure("DELETE", "foreign key constraint fails")
        .with_default_affected(3);
    let table = enrich(classify("SELECT * FROM users"), &provider, None).await.unwrap();

    let mut editor = DataEditor::new(Dialect::MySql);
    editor.mark_row_for_deletion(0, row(1, "A"));
    editor.add_new_row("tmp", row(9, "New"));

    let outcome = editor
        .execute_changes(&table, &[row(1, "A")], &provider, None)
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.affected_rows, 3);
    assert_eq!(outcome.errors, vec!["foreign key constraint fails".to_string()]);
    assert!(outcome.message.contains("1 of 2"));
    // The insert still ran
    assert_eq!(provider.executed_sql().len(), 2);
    assert_eq!(editor.state(), EditorState::Dirty);
    assert_eq!(editor.pending().deletes.len(), 1);
    assert_eq!(editor.pending().inserts.len(), 1);
}

#[tokio::test]
async fn test_lost_connection_counts_applied_statements() {
    let provider = MockProvider::connected(Dialect::Postgres)
        .with_columns("users", users_columns())
        .with_default_affected(2)
        .with_disconnect_after("DELETE");
    let table = enrich(classify("SELECT * FROM users"), &provider, None).await.unwrap();

    let mut editor = DataEditor::new(Dialect::Postgres);
    editor.mark_row_for_deletion(0, row(1, "A"));
    editor.add_new_row("tmp", row(9, "New"));

    let outcome = editor
        .execute_changes(&table, &[row(1, "A")], &provider, None)
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.affected_rows, 2);
    assert_eq!(outcome.statements_executed, 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains("Not connected"));
    assert_eq!(provider.executed_sql().len(), 1);
    assert_eq!(editor.state(), EditorState::Dirty);
}

#[tokio::test]
async fn test_no_changes_is_a_successful_noop() {
    let provider = MockProvider::connected(Dialect::Postgres).with_columns("users", users_columns());
    let table = enrich(classify("SELECT * FROM users"), &provider, None).await.unwrap();

    let mut editor = DataEditor::new(Dialect::Postgres);
    let outcome = editor.execute_changes(&table, &[], &provider, None).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.statements_executed, 0);
    assert!(provider.executed_sql().is_empty());
}

#[tokio::test]
async fn test_save_through_manager_lease() {
    let mock = MockProvider::new(Dialect::Mssql).with_columns("dbo.users", users_columns());
    let mut registry = DriverRegistry::new();
    registry.register(Dialect::Mssql, mock.factory());
    let manager = ConnectionManager::new(
        registry,
        Arc::new(MemorySecretStore::new()),
        Arc::new(MemoryStore::new()),
    );
    let cfg = config(Dialect::Mssql, "warehouse");
    let id = cfg.id;
    manager.add(cfg, "pw").unwrap();

    let mut editor = DataEditor::new(Dialect::Mssql);
    editor.add_cell_change(0, "email", Value::Null, Value::from("a@example.com"));
    let table = classify("SELECT * FROM dbo.users");

    // Not connected yet
    let err = editor.save(&manager, id, &table, &[row(1, "A")], None).await.unwrap_err();
    assert!(matches!(err, EditError::Provider(DbcxError::NotConnected(_))));

    manager.connect(id).await.unwrap();
    assert_eq!(manager.state(id), ConnectionState::Connected);
    let provider = manager.provider(id).unwrap();
    let table = enrich(table, provider.as_ref(), None).await.unwrap();

    let outcome = editor
        .save(&manager, id, &table, &[row(1, "A")], None)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(
        mock.executed_sql(),
        vec!["UPDATE [dbo].[users] SET [email] = 'a@example.com' WHERE [id] = 1"]
    );
}
