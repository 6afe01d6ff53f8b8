//! ConnectionManager lifecycle against mock providers

use dbcx_connection::{
    CONNECTIONS_KEY, ConnectionEvent, ConnectionManager, JsonFileStore, KeyValueStore,
    MemorySecretStore, MemoryStore, SecretStore,
};
use dbcx_core::{ConnectionConfig, ConnectionState, DbcxError, Dialect};
use dbcx_drivers::DriverRegistry;
use dbcx_test_support::{MockProvider, config};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

struct Harness {
    manager: ConnectionManager,
    secrets: Arc<MemorySecretStore>,
    store: Arc<MemoryStore>,
    mock: MockProvider,
}

fn harness_with(mock: MockProvider) -> Harness {
    let mut registry = DriverRegistry::new();
    registry.register(Dialect::Postgres, mock.factory());
    registry.register(Dialect::MySql, mock.factory());
    let secrets = Arc::new(MemorySecretStore::new());
    let store = Arc::new(MemoryStore::new());
    let manager = ConnectionManager::new(registry, secrets.clone(), store.clone());
    Harness {
        manager,
        secrets,
        store,
        mock,
    }
}

fn harness() -> Harness {
    harness_with(MockProvider::new(Dialect::Postgres))
}

#[tokio::test]
async fn test_add_persists_config_and_password() {
    let h = harness();
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    let mut events = h.manager.subscribe();

    h.manager.add(cfg.clone(), "s3cret").unwrap();

    assert_eq!(h.manager.connections(), vec![cfg]);
    assert_eq!(h.secrets.get_password(id).unwrap().as_deref(), Some("s3cret"));
    let stored = h.store.get(CONNECTIONS_KEY).unwrap().unwrap();
    assert_eq!(stored.as_array().map(|a| a.len()), Some(1));
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Added(id));
}

#[tokio::test]
async fn test_add_rejects_invalid_and_duplicate_configs() {
    let h = harness();

    let nameless = ConnectionConfig::new(Dialect::Postgres, "  ");
    assert!(h.manager.add(nameless, "").unwrap_err().is_configuration());

    let unregistered = config(Dialect::Mssql, "warehouse");
    assert!(matches!(
        h.manager.add(unregistered, ""),
        Err(DbcxError::UnsupportedDialect(_))
    ));

    let cfg = config(Dialect::Postgres, "local");
    h.manager.add(cfg.clone(), "").unwrap();
    assert!(h.manager.add(cfg, "").unwrap_err().is_configuration());
    assert_eq!(h.manager.connections().len(), 1);
}

/// Secret store whose writes fail until switched on
#[derive(Default)]
struct LockedKeychain {
    inner: MemorySecretStore,
    unlocked: AtomicBool,
}

impl SecretStore for LockedKeychain {
    fn store_password(&self, connection_id: Uuid, password: &str) -> dbcx_core::Result<()> {
        if !self.unlocked.load(Ordering::SeqCst) {
            return Err(DbcxError::Security("keychain locked".into()));
        }
        self.inner.store_password(connection_id, password)
    }

    fn get_password(&self, connection_id: Uuid) -> dbcx_core::Result<Option<String>> {
        self.inner.get_password(connection_id)
    }

    fn delete_password(&self, connection_id: Uuid) -> dbcx_core::Result<()> {
        self.inner.delete_password(connection_id)
    }
}

#[tokio::test]
async fn test_add_with_failing_secret_store_saves_nothing() {
    let mock = MockProvider::new(Dialect::Postgres);
    let mut registry = DriverRegistry::new();
    registry.register(Dialect::Postgres, mock.factory());
    let secrets = Arc::new(LockedKeychain::default());
    let store = Arc::new(MemoryStore::new());
    let manager = ConnectionManager::new(registry, secrets.clone(), store.clone());
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;

    let err = manager.add(cfg.clone(), "s3cret").unwrap_err();
    assert!(matches!(err, DbcxError::Security(_)));
    assert!(manager.connections().is_empty());
    assert_eq!(store.get(CONNECTIONS_KEY).unwrap(), None);

    secrets.unlocked.store(true, Ordering::SeqCst);
    manager.add(cfg, "s3cret").unwrap();
    assert_eq!(manager.connections().len(), 1);
    assert_eq!(secrets.get_password(id).unwrap().as_deref(), Some("s3cret"));
}

#[tokio::test]
async fn test_connect_passes_through_connecting() {
    let gate = Arc::new(Notify::new());
    let h = harness_with(MockProvider::new(Dialect::Postgres).with_connect_gate(gate.clone()));
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    h.manager.add(cfg, "").unwrap();
    assert_eq!(h.manager.state(id), ConnectionState::Disconnected);

    let observe = async {
        while h.manager.state(id) != ConnectionState::Connecting {
            tokio::task::yield_now().await;
        }
        let seen = h.manager.state(id);
        gate.notify_one();
        seen
    };
    let (outcome, seen) = tokio::time::timeout(Duration::from_secs(1), async {
        tokio::join!(h.manager.connect(id), observe)
    })
    .await
    .expect("connect finished");

    outcome.unwrap();
    assert_eq!(seen, ConnectionState::Connecting);
    assert_eq!(h.manager.state(id), ConnectionState::Connected);
}

#[tokio::test]
async fn test_connect_then_disconnect_lifecycle() {
    let h = harness();
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    h.manager.add(cfg.clone(), "pw").unwrap();

    assert!(h.manager.test_connection(&cfg, "pw").await);
    assert_eq!(h.manager.state(id), ConnectionState::Disconnected);

    let mut events = h.manager.subscribe();
    h.manager.connect(id).await.unwrap();
    assert_eq!(h.manager.state(id), ConnectionState::Connected);
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectionEvent::StateChanged {
            id,
            state: ConnectionState::Connected
        }
    );

    h.manager.disconnect(id).await.unwrap();
    assert_eq!(h.manager.state(id), ConnectionState::Disconnected);
    assert!(h.manager.provider(id).is_none());
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectionEvent::StateChanged {
            id,
            state: ConnectionState::Disconnected
        }
    );

    // Second disconnect is a silent no-op
    h.manager.disconnect(id).await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_connect_keeps_provider_for_retry() {
    let h = harness_with(MockProvider::new(Dialect::Postgres).with_connect_failure("auth failed"));
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    h.manager.add(cfg, "").unwrap();

    let err = h.manager.connect(id).await.unwrap_err();
    assert!(err.is_connection());
    assert_eq!(h.manager.state(id), ConnectionState::Error);
    let first = h.manager.provider(id).expect("provider retained after failure");

    assert!(h.manager.connect(id).await.is_err());
    let second = h.manager.provider(id).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.mock.connect_calls(), 2);
}

#[tokio::test]
async fn test_test_connection_failure_is_false_and_stateless() {
    let h = harness_with(MockProvider::new(Dialect::Postgres).with_connect_failure("refused"));
    let cfg = config(Dialect::Postgres, "local");
    h.manager.add(cfg.clone(), "").unwrap();

    assert!(!h.manager.test_connection(&cfg, "").await);
    assert!(!h.manager.test_connection(&config(Dialect::MongoDb, "docs"), "").await);
    assert!(h.manager.provider(cfg.id).is_none());
    assert_eq!(h.manager.state(cfg.id), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_unknown_id_is_not_found() {
    let h = harness();
    let err = h.manager.connect(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, DbcxError::NotFound(_)));
}

#[tokio::test]
async fn test_remove_disconnects_and_deletes_everything() {
    let h = harness();
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    h.manager.add(cfg, "pw").unwrap();
    h.manager.connect(id).await.unwrap();

    let mut events = h.manager.subscribe();
    h.manager.remove(id).await.unwrap();

    assert!(h.manager.connections().is_empty());
    assert!(h.manager.provider(id).is_none());
    assert_eq!(h.secrets.get_password(id).unwrap(), None);
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Removed(id));
    assert!(events.try_recv().is_err());

    assert!(matches!(
        h.manager.remove(id).await,
        Err(DbcxError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_update_rotates_password_without_reconnecting() {
    let h = harness();
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    h.manager.add(cfg.clone(), "old").unwrap();
    h.manager.connect(id).await.unwrap();

    let renamed = ConnectionConfig {
        name: "renamed".into(),
        ..cfg.clone()
    };
    h.manager.update(renamed, Some("new")).unwrap();
    assert_eq!(h.manager.config(id).unwrap().name, "renamed");
    assert_eq!(h.secrets.get_password(id).unwrap().as_deref(), Some("new"));
    assert_eq!(h.mock.connect_calls(), 1);
    assert_eq!(h.manager.state(id), ConnectionState::Connected);

    h.manager.update(cfg, None).unwrap();
    assert_eq!(h.secrets.get_password(id).unwrap().as_deref(), Some("new"));

    let stranger = config(Dialect::Postgres, "stranger");
    assert!(matches!(
        h.manager.update(stranger, None),
        Err(DbcxError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_find_connected_by_name_ignores_case_and_idle_connections() {
    let h = harness();
    let idle = config(Dialect::Postgres, "Reporting");
    let live = config(Dialect::MySql, "Orders");
    h.manager.add(idle.clone(), "").unwrap();
    h.manager.add(live.clone(), "").unwrap();
    h.manager.connect(live.id).await.unwrap();

    assert_eq!(h.manager.find_connected_by_name("orders"), Some(live.id));
    assert_eq!(h.manager.find_connected_by_name("reporting"), None);
    assert_eq!(h.manager.find_connected_by_name("missing"), None);
}

#[tokio::test]
async fn test_lease_serializes_callers_on_one_connection() {
    let h = harness();
    let cfg = config(Dialect::Postgres, "local");
    let id = cfg.id;
    h.manager.add(cfg, "").unwrap();

    assert!(matches!(
        h.manager.lease(id).await,
        Err(DbcxError::NotConnected(name)) if name == "local"
    ));

    h.manager.connect(id).await.unwrap();
    let lease = h.manager.lease(id).await.unwrap();
    assert_eq!(lease.dialect(), Dialect::Postgres);

    let blocked = tokio::time::timeout(Duration::from_millis(50), h.manager.lease(id)).await;
    assert!(blocked.is_err(), "second lease must wait for the first");

    drop(lease);
    let again = tokio::time::timeout(Duration::from_millis(50), h.manager.lease(id)).await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn test_shutdown_disconnects_all() {
    let h = harness();
    let a = config(Dialect::Postgres, "a");
    let b = config(Dialect::MySql, "b");
    h.manager.add(a.clone(), "").unwrap();
    h.manager.add(b.clone(), "").unwrap();
    h.manager.connect(a.id).await.unwrap();
    h.manager.connect(b.id).await.unwrap();
    assert_eq!(h.manager.live_connections().len(), 2);

    h.manager.shutdown().await;
    assert!(h.manager.live_connections().is_empty());
    assert_eq!(h.manager.state(a.id), ConnectionState::Disconnected);
    assert_eq!(h.manager.connections().len(), 2);
}

#[tokio::test]
async fn test_load_restores_configs_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mock = MockProvider::new(Dialect::Postgres);
    let registry = || {
        let mut registry = DriverRegistry::new();
        registry.register(Dialect::Postgres, mock.factory());
        registry
    };

    let first = config(Dialect::Postgres, "first");
    let second = config(Dialect::Postgres, "second");
    {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        let manager = ConnectionManager::new(registry(), Arc::new(MemorySecretStore::new()), store);
        manager.add(first.clone(), "").unwrap();
        manager.add(second.clone(), "").unwrap();
    }

    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let manager = ConnectionManager::new(registry(), Arc::new(MemorySecretStore::new()), store);
    assert_eq!(manager.load().unwrap(), 2);
    assert_eq!(manager.connections(), vec![first, second]);
}
