//! MySQL/MariaDB provider
//!
//! One implementation serves both backends; the instance carries the dialect
//! tag it was constructed with.

mod connection;
mod provider;
mod schema;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod schema_tests;

pub use connection::build_opts;
pub use provider::MySqlProvider;
