//! Composition root for the dbcx core
//!
//! [`CoreServices`] wires the connection manager, query executor and schema
//! cache over one persistent store; [`logging`] installs the subscriber.

pub mod logging;
mod services;

pub use services::CoreServices;
