//! dbcx connection - connection lifecycle and persistence
//!
//! [`ConnectionManager`] owns the configured connections and their live
//! providers. Passwords go to a [`SecretStore`], configs to a
//! [`KeyValueStore`], and every mutation is announced on a broadcast
//! channel of [`ConnectionEvent`]s.

mod events;
mod manager;
mod secrets;
mod store;

pub use events::ConnectionEvent;
pub use manager::{ConnectionManager, ProviderLease};
pub use secrets::{KeyringSecretStore, MemorySecretStore, SecretStore, password_key};
pub use store::{
    CONNECTIONS_KEY, JsonFileStore, KeyValueStore, MemoryStore, QUERY_HISTORY_KEY, load_json,
    save_json,
};
