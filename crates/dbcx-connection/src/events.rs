//! Notifications emitted by the connection manager

use dbcx_core::ConnectionState;
use uuid::Uuid;

/// Something about the set of connections changed. Each completed
/// mutating manager call emits exactly one event.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Added(Uuid),
    Updated(Uuid),
    Removed(Uuid),
    /// A connect or disconnect finished with the given state
    StateChanged { id: Uuid, state: ConnectionState },
}

impl ConnectionEvent {
    /// The connection the event is about
    pub fn connection_id(&self) -> Uuid {
        match self {
            ConnectionEvent::Added(id)
            | ConnectionEvent::Updated(id)
            | ConnectionEvent::Removed(id)
            | ConnectionEvent::StateChanged { id, .. } => *id,
        }
    }
}
