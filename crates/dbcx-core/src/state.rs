//! Connection lifecycle state

use crate::{DbcxError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single provider connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Interior-mutable state holder shared by provider implementations
#[derive(Debug, Default)]
pub struct StateCell {
    state: RwLock<ConnectionState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn set(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            tracing::trace!(from = %*state, to = %next, "connection state transition");
            *state = next;
        }
    }

    /// Fail with `NotConnected` unless the state is `Connected`
    pub fn ensure_connected(&self, label: &str) -> Result<()> {
        match self.get() {
            ConnectionState::Connected => Ok(()),
            _ => Err(DbcxError::NotConnected(label.to_string())),
        }
    }
}
