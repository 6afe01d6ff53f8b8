//! Pending result edits and their compilation into SQL

use crate::analyzer::{EditableTableInfo, REASON_NO_PRIMARY_KEY};
use crate::error::{EditError, EditResult};
use dbcx_connection::ConnectionManager;
use dbcx_core::{Dialect, Provider, QueryResult, RowMap, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bookkeeping field carrying a new row's temporary id in row data
pub const TEMP_ID_FIELD: &str = "__tempId";

/// Fields with this prefix are never written to the database
const INTERNAL_FIELD_PREFIX: &str = "__";

/// One edited cell. `old_value` is the value before the first edit of the
/// cell and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    pub row_index: usize,
    pub column: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// A row added in the grid and not yet inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRow {
    pub temp_id: String,
    pub data: RowMap,
}

/// A saved row marked for deletion, with its data before any edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowDeletion {
    pub row_index: usize,
    pub row_data: RowMap,
}

/// Changes waiting to be saved, each collection in recording order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingChanges {
    pub updates: Vec<CellChange>,
    pub inserts: Vec<NewRow>,
    pub deletes: Vec<RowDeletion>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Clean,
    Dirty,
}

/// Outcome of writing pending changes to the database
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// Every statement succeeded
    pub success: bool,
    pub message: String,
    /// Sum over the statements that succeeded
    pub affected_rows: u64,
    pub statements_executed: usize,
    /// Error text of each failed statement
    pub errors: Vec<String>,
}

/// Edit session over one result set.
///
/// Statements are compiled deletes first, then updates, then inserts, so an
/// update or insert reusing a deleted row's key cannot collide with it.
/// There is no transaction around a save: when a statement fails, the ones
/// before it stay applied and the pending changes are kept for a retry.
#[derive(Debug, Clone)]
pub struct DataEditor {
    dialect: Dialect,
    changes: PendingChanges,
}

impl DataEditor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            changes: PendingChanges::default(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Record an edit of one cell.
    ///
    /// A second edit of the same cell overwrites the new value only. An edit
    /// back to the original value drops the change.
    pub fn add_cell_change(&mut self, row_index: usize, column: &str, old_value: Value, new_value: Value) {
        let existing = self
            .changes
            .updates
            .iter()
            .position(|c| c.row_index == row_index && c.column == column);

        match existing {
            Some(pos) => {
                if self.changes.updates[pos].old_value == new_value {
                    self.changes.updates.remove(pos);
                } else {
                    self.changes.updates[pos].new_value = new_value;
                }
            }
            None if old_value == new_value => {}
            None => self.changes.updates.push(CellChange {
                row_index,
                column: column.to_string(),
                old_value,
                new_value,
            }),
        }
    }

    /// Buffer a new row. `temp_id` lets a later deletion cancel it.
    pub fn add_new_row(&mut self, temp_id: impl Into<String>, data: RowMap) {
        self.changes.inserts.push(NewRow {
            temp_id: temp_id.into(),
            data,
        });
    }

    /// Mark a row for deletion. A row that is still an unsaved insert
    /// (its data carries a pending temp id) is simply dropped.
    pub fn mark_row_for_deletion(&mut self, row_index: usize, row_data: RowMap) {
        if let Some(temp_id) = row_data.get(TEMP_ID_FIELD).and_then(Value::as_str)
            && let Some(pos) = self.changes.inserts.iter().position(|r| r.temp_id == temp_id)
        {
            self.changes.inserts.remove(pos);
            return;
        }
        if self.changes.deletes.iter().any(|d| d.row_index == row_index) {
            return;
        }
        self.changes.deletes.push(RowDeletion { row_index, row_data });
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn state(&self) -> EditorState {
        if self.has_changes() {
            EditorState::Dirty
        } else {
            EditorState::Clean
        }
    }

    pub fn pending(&self) -> &PendingChanges {
        &self.changes
    }

    pub fn clear_changes(&mut self) {
        self.changes = PendingChanges::default();
    }

    /// Compile pending changes against `current_rows` (the result as loaded)
    pub fn generate_sql_statements(
        &self,
        table: &EditableTableInfo,
        current_rows: &[RowMap],
    ) -> EditResult<Vec<String>> {
        if !table.editable {
            return Err(EditError::NotEditable(
                table.reason.clone().unwrap_or_else(|| "not editable".into()),
            ));
        }
        let needs_key = !self.changes.updates.is_empty() || !self.changes.deletes.is_empty();
        if needs_key && table.primary_keys.is_empty() {
            return Err(EditError::NotEditable(REASON_NO_PRIMARY_KEY.into()));
        }

        let target = self.table_name(table);
        let mut statements = Vec::new();

        for deletion in &self.changes.deletes {
            let predicate = self.key_predicate(table, deletion.row_index, &deletion.row_data, &[])?;
            statements.push(format!("DELETE FROM {} WHERE {}", target, predicate));
        }

        // Several edits on one row become one UPDATE
        let mut by_row: IndexMap<usize, Vec<&CellChange>> = IndexMap::new();
        for change in &self.changes.updates {
            by_row.entry(change.row_index).or_default().push(change);
        }
        for (row_index, changes) in by_row {
            let row = current_rows
                .get(row_index)
                .ok_or(EditError::RowNotFound(row_index))?;
            let assignments = changes
                .iter()
                .map(|c| {
                    format!(
                        "{} = {}",
                        self.dialect.quote_identifier(&c.column),
                        self.dialect.format_value(&c.new_value)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            let predicate = self.key_predicate(table, row_index, row, &changes)?;
            statements.push(format!("UPDATE {} SET {} WHERE {}", target, assignments, predicate));
        }

        for insert in &self.changes.inserts {
            statements.push(self.insert_statement(&target, &insert.data));
        }

        Ok(statements)
    }

    /// Compile and run the pending changes one statement at a time.
    ///
    /// Changes are cleared only when every statement succeeds.
    #[tracing::instrument(skip(self, table, baseline_rows, provider), fields(table = %table.qualified_name()))]
    pub async fn execute_changes(
        &mut self,
        table: &EditableTableInfo,
        baseline_rows: &[RowMap],
        provider: &dyn Provider,
        database: Option<&str>,
    ) -> EditResult<SaveOutcome> {
        let statements = self.generate_sql_statements(table, baseline_rows)?;
        if statements.is_empty() {
            return Ok(SaveOutcome {
                success: true,
                message: "No changes to save".into(),
                affected_rows: 0,
                statements_executed: 0,
                errors: Vec::new(),
            });
        }

        let database = database.or(table.database.as_deref());
        let mut affected_rows = 0;
        let mut errors = Vec::new();
        for sql in &statements {
            let result = match provider.execute_query(sql, database).await {
                Ok(result) => result,
                // Statements already applied stay counted
                Err(e) => QueryResult::failure(e.to_string()),
            };
            match result.error {
                Some(error) => {
                    tracing::warn!(sql = %sql, error = %error, "edit statement failed");
                    errors.push(error);
                }
                None => affected_rows += result.affected_rows,
            }
        }

        let success = errors.is_empty();
        let message = if success {
            self.clear_changes();
            format!(
                "Saved {} statement(s), {} row(s) affected",
                statements.len(),
                affected_rows
            )
        } else {
            format!(
                "{} of {} statement(s) failed: {}",
                errors.len(),
                statements.len(),
                errors.join("; ")
            )
        };
        tracing::info!(success, affected_rows, statements = statements.len(), "changes saved");

        Ok(SaveOutcome {
            success,
            message,
            affected_rows,
            statements_executed: statements.len(),
            errors,
        })
    }

    /// [`DataEditor::execute_changes`] on a leased connection
    pub async fn save(
        &mut self,
        manager: &ConnectionManager,
        connection_id: Uuid,
        table: &EditableTableInfo,
        baseline_rows: &[RowMap],
        database: Option<&str>,
    ) -> EditResult<SaveOutcome> {
        let provider = manager.lease(connection_id).await?;
        self.execute_changes(table, baseline_rows, &*provider, database)
            .await
    }

    fn table_name(&self, table: &EditableTableInfo) -> String {
        match &table.schema {
            Some(schema) => self
                .dialect
                .quote_qualified(&[schema.as_str(), table.table.as_str()]),
            None => self.dialect.quote_identifier(&table.table),
        }
    }

    /// `pk1 = v1 AND pk2 = v2`. A key column edited in this row is matched
    /// on its value before the edit.
    fn key_predicate(
        &self,
        table: &EditableTableInfo,
        row_index: usize,
        row: &RowMap,
        changes: &[&CellChange],
    ) -> EditResult<String> {
        let clauses = table
            .primary_keys
            .iter()
            .map(|key| {
                let value = changes
                    .iter()
                    .find(|c| &c.column == key)
                    .map(|c| &c.old_value)
                    .or_else(|| row.get(key))
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| EditError::MissingKeyValue {
                        row: row_index,
                        column: key.clone(),
                    })?;
                Ok(format!(
                    "{} = {}",
                    self.dialect.quote_identifier(key),
                    self.dialect.format_value(value)
                ))
            })
            .collect::<EditResult<Vec<_>>>()?;
        Ok(clauses.join(" AND "))
    }

    fn insert_statement(&self, target: &str, data: &RowMap) -> String {
        let fields: Vec<(&String, &Value)> = data
            .iter()
            .filter(|(k, _)| !k.starts_with(INTERNAL_FIELD_PREFIX))
            .collect();

        if fields.is_empty() {
            return match self.dialect {
                Dialect::MySql | Dialect::MariaDb => format!("INSERT INTO {} () VALUES ()", target),
                _ => format!("INSERT INTO {} DEFAULT VALUES", target),
            };
        }

        let columns = fields
            .iter()
            .map(|(k, _)| self.dialect.quote_identifier(k))
            .collect::<Vec<_>>()
            .join(", ");
        let values = fields
            .iter()
            .map(|(_, v)| self.dialect.format_value(v))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", target, columns, values)
    }
}
