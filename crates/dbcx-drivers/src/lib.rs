//! dbcx drivers - provider implementations per backend
//!
//! Each backend lives in its own crate behind a cargo feature; this crate
//! re-exports them and offers a [`DriverRegistry`] mapping dialects to
//! provider constructors.

#[cfg(feature = "mongodb")]
pub use dbcx_driver_mongodb as mongodb;
#[cfg(feature = "mssql")]
pub use dbcx_driver_mssql as mssql;
#[cfg(feature = "mysql")]
pub use dbcx_driver_mysql as mysql;
#[cfg(feature = "postgres")]
pub use dbcx_driver_postgres as postgres;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from dbcx-core
pub use dbcx_core::{
    ConnectionConfig, ConnectionState, DbcxError, Dialect, Provider, ProviderFactory, ProviderRef,
    QueryResult, Result,
};
