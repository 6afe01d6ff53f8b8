//! MS SQL Server provider
//!
//! Tables are listed for the database selected at connect time, so the
//! provider reports [`dbcx_core::TableScope::Connection`].

mod connection;
mod provider;
mod schema;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod schema_tests;

pub use connection::{MssqlError, build_config};
pub use provider::MssqlProvider;
