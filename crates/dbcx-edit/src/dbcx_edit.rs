//! dbcx edit - editing query results in place
//!
//! [`classify`] decides from the query text whether a result maps back to
//! exactly one table, and [`enrich`] attaches that table's key columns.
//! A [`DataEditor`] then collects cell edits, new rows and deletions and
//! compiles them into dialect-quoted DELETE, UPDATE and INSERT statements.

mod analyzer;
mod editor;
mod error;

pub use analyzer::{EditableTableInfo, classify, enrich};
pub use editor::{
    CellChange, DataEditor, EditorState, NewRow, PendingChanges, RowDeletion, SaveOutcome,
    TEMP_ID_FIELD,
};
pub use error::{EditError, EditResult};
