//! CoreServices startup, wiring and shutdown

use dbcx_app::CoreServices;
use dbcx_connection::{JsonFileStore, MemorySecretStore};
use dbcx_core::{ConnectionState, Dialect};
use dbcx_drivers::DriverRegistry;
use dbcx_query::CancellationToken;
use dbcx_settings::CoreSettings;
use dbcx_test_support::{MockProvider, config, users_columns};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

fn mock() -> MockProvider {
    MockProvider::new(Dialect::Postgres)
        .with_database("app")
        .with_tables("app", &["users"])
        .with_columns("users", users_columns())
}

fn start(settings: CoreSettings, store_path: &Path, mock: &MockProvider) -> CoreServices {
    let mut registry = DriverRegistry::new();
    registry.register(Dialect::Postgres, mock.factory());
    CoreServices::start_with(
        settings,
        registry,
        Arc::new(MemorySecretStore::new()),
        Arc::new(JsonFileStore::open(store_path).unwrap()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_connections_and_history_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mock = mock();

    let services = start(CoreSettings::default(), &path, &mock);
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    services.manager().add(cfg, "pw").unwrap();
    services.manager().connect(id).await.unwrap();
    services
        .executor()
        .execute_query(id, "DELETE FROM users WHERE id = 1", None, &CancellationToken::new())
        .await
        .unwrap();

    let manager = services.manager().clone();
    services.shutdown().await;
    assert_eq!(manager.state(id), ConnectionState::Disconnected);

    let restarted = start(CoreSettings::default(), &path, &mock);
    assert_eq!(restarted.manager().connections().len(), 1);
    let history = restarted.executor().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].query_text, "DELETE FROM users WHERE id = 1");
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_settings_drive_history_cap_and_cache_config() {
    let dir = tempfile::tempdir().unwrap();
    let mock = mock();
    let mut settings = CoreSettings::default();
    settings.history.max_entries = 2;
    settings.schema_cache.max_tables_per_database = 7;

    let services = start(settings, &dir.path().join("store.json"), &mock);
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    services.manager().add(cfg, "").unwrap();
    services.manager().connect(id).await.unwrap();
    services
        .executor()
        .execute_query(id, "SELECT 1; SELECT 2; SELECT 3", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(services.executor().history().len(), 2);
    assert_eq!(services.schema_cache().config().max_tables_per_database, 7);
    services.shutdown().await;
}

#[tokio::test]
async fn test_analyze_result_and_editor() {
    let dir = tempfile::tempdir().unwrap();
    let mock = mock();
    let services = start(CoreSettings::default(), &dir.path().join("store.json"), &mock);
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    services.manager().add(cfg, "").unwrap();
    services.manager().connect(id).await.unwrap();

    let info = services
        .analyze_result(id, "SELECT * FROM users", None)
        .await
        .unwrap();
    assert!(info.editable);
    assert_eq!(info.primary_keys, vec!["id"]);

    let joined = services
        .analyze_result(id, "SELECT * FROM users u JOIN teams t ON t.id = u.team_id", None)
        .await
        .unwrap();
    assert!(!joined.editable);

    let editor = services.editor_for(id).unwrap();
    assert_eq!(editor.dialect(), Dialect::Postgres);
    assert!(services.editor_for(uuid::Uuid::nil()).is_none());
    services.shutdown().await;
}

#[tokio::test]
async fn test_schema_cache_is_invalidated_by_connection_changes() {
    let dir = tempfile::tempdir().unwrap();
    let mock = mock();
    let services = start(CoreSettings::default(), &dir.path().join("store.json"), &mock);
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    services.manager().add(cfg, "").unwrap();
    services.manager().connect(id).await.unwrap();

    // The listener may still be draining the add/connect events
    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        loop {
            services.schema_cache().update_schema_cache().await;
            tokio::task::yield_now().await;
            if services.schema_cache().snapshot(id).is_some() {
                break;
            }
        }
    })
    .await
    .expect("schema cached");
    assert_eq!(services.schema_cache().table_names(id), vec!["users"]);

    services.manager().disconnect(id).await.unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        while services.schema_cache().snapshot(id).is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("snapshot dropped after disconnect");
    services.shutdown().await;
}
