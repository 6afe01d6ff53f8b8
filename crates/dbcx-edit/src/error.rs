//! Edit-session errors

use dbcx_core::DbcxError;
use thiserror::Error;

pub type EditResult<T> = Result<T, EditError>;

/// Why pending changes could not be compiled or saved
#[derive(Debug, Error)]
pub enum EditError {
    #[error("Result is not editable: {0}")]
    NotEditable(String),

    #[error("Row {0} is not part of the current result")]
    RowNotFound(usize),

    #[error("Row {row} has no value for key column '{column}'")]
    MissingKeyValue { row: usize, column: String },

    #[error(transparent)]
    Provider(#[from] DbcxError),
}
