//! PostgreSQL provider
//!
//! A PostgreSQL session is bound to one database, so the provider keeps one
//! client per database it has been asked about, opened on first use.

mod connection;
mod provider;
mod schema;
mod value;

#[cfg(test)]
mod connection_tests;

pub use connection::{build_pg_config, format_postgres_error};
pub use provider::PostgresProvider;
