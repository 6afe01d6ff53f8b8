//! dbcx query - splitting, executing and remembering scripts
//!
//! - [`split_statements`] cuts a script into statements, respecting quotes
//!   and comments
//! - [`parse_directives`] reads `-- Connection:` / `-- Database:` headers
//! - [`QueryExecutor`] runs scripts against a managed connection and keeps
//!   a bounded [`QueryHistory`]

mod directives;
mod executor;
mod history;
mod splitter;

pub use directives::{Directives, parse_directives};
pub use executor::{
    AmbientSelection, BatchExecutionResult, ExecutionOutcome, QueryExecutor, StatementResult,
    StatementStatus,
};
pub use history::{QueryHistory, QueryHistoryEntry};
pub use splitter::split_statements;

/// Re-exported so callers can cancel a running batch without another import
pub use tokio_util::sync::CancellationToken;
