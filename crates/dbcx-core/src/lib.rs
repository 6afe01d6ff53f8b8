//! dbcx core - shared abstractions for the database connectivity core
//!
//! This crate provides the types every other dbcx crate depends on:
//!
//! - `Provider` - trait implemented once per backend dialect
//! - `Dialect` - identifier quoting and literal formatting rules
//! - `ConnectionConfig` / `ConnectionState` - connection identity and lifecycle
//! - `Value`, `Row`, `QueryResult` - query results
//! - schema records (`DatabaseInfo`, `TableInfo`, `ColumnInfo`)

mod config;
mod dialect;
mod error;
mod provider;
mod schema;
mod state;
pub mod statement;
mod types;

pub use config::*;
pub use dialect::*;
pub use error::*;
pub use provider::*;
pub use schema::*;
pub use state::*;
pub use types::*;
