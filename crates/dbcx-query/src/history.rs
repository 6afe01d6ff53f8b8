//! Query history management

use chrono::{DateTime, Utc};
use dbcx_connection::{KeyValueStore, QUERY_HISTORY_KEY, load_json, save_json};
use dbcx_core::{QueryResult, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default cap on remembered statements
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// A single executed statement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryHistoryEntry {
    /// Unique identifier
    pub id: Uuid,

    /// Connection the statement ran against
    pub connection_id: Uuid,

    /// The statement text
    pub query_text: String,

    /// When the statement was executed
    pub timestamp: DateTime<Utc>,

    /// Execution duration in milliseconds
    pub execution_time_ms: u64,

    /// Whether the statement succeeded
    pub success: bool,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Rows returned or affected, for successful statements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl QueryHistoryEntry {
    /// Record the outcome of one statement
    pub fn from_result(connection_id: Uuid, query_text: impl Into<String>, result: &QueryResult) -> Self {
        let success = !result.is_error();
        Self {
            id: Uuid::new_v4(),
            connection_id,
            query_text: query_text.into(),
            timestamp: Utc::now(),
            execution_time_ms: result.execution_time_ms,
            success,
            error: result.error.clone(),
            row_count: success.then_some(result.row_count),
        }
    }
}

/// Bounded history, most recent first. Adding past the cap evicts the
/// oldest entries.
#[derive(Debug, Clone)]
pub struct QueryHistory {
    entries: VecDeque<QueryHistoryEntry>,
    max_entries: usize,
}

impl QueryHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    /// Restore from the store, trimming to `max_entries`
    pub fn load(store: &dyn KeyValueStore, max_entries: usize) -> Result<Self> {
        let saved: Vec<QueryHistoryEntry> = load_json(store, QUERY_HISTORY_KEY)?.unwrap_or_default();
        let mut entries: VecDeque<QueryHistoryEntry> = saved.into();
        entries.truncate(max_entries);
        tracing::debug!(entries = entries.len(), "query history loaded");
        Ok(Self {
            entries,
            max_entries,
        })
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        save_json(store, QUERY_HISTORY_KEY, &self.entries)
    }

    pub fn add(&mut self, entry: QueryHistoryEntry) {
        tracing::debug!(
            query_id = %entry.id,
            success = entry.success,
            execution_time_ms = entry.execution_time_ms,
            "adding query to history"
        );
        self.entries.push_front(entry);
        self.entries.truncate(self.max_entries);
    }

    /// All entries, most recent first
    pub fn entries(&self) -> impl Iterator<Item = &QueryHistoryEntry> {
        self.entries.iter()
    }

    pub fn for_connection(&self, connection_id: Uuid) -> impl Iterator<Item = &QueryHistoryEntry> {
        self.entries
            .iter()
            .filter(move |e| e.connection_id == connection_id)
    }

    /// Case-insensitive substring search over the statement text
    pub fn search(&self, query: &str) -> impl Iterator<Item = &QueryHistoryEntry> {
        let query_lower = query.to_lowercase();
        self.entries
            .iter()
            .filter(move |e| e.query_text.to_lowercase().contains(&query_lower))
    }

    pub fn clear(&mut self) {
        tracing::info!(entries_cleared = self.entries.len(), "clearing query history");
        self.entries.clear();
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcx_connection::MemoryStore;

    fn entry(connection_id: Uuid, sql: &str) -> QueryHistoryEntry {
        QueryHistoryEntry::from_result(connection_id, sql, &QueryResult::affected(1))
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let conn = Uuid::new_v4();
        let mut history = QueryHistory::new(3);
        for i in 0..5 {
            history.add(entry(conn, &format!("SELECT {}", i)));
        }
        let texts: Vec<&str> = history.entries().map(|e| e.query_text.as_str()).collect();
        assert_eq!(texts, vec!["SELECT 4", "SELECT 3", "SELECT 2"]);
    }

    #[test]
    fn test_failed_result_records_error() {
        let e = QueryHistoryEntry::from_result(Uuid::new_v4(), "SELEC 1", &QueryResult::failure("syntax error"));
        assert!(!e.success);
        assert_eq!(e.error.as_deref(), Some("syntax error"));
        assert_eq!(e.row_count, None);
    }

    #[test]
    fn test_filters() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut history = QueryHistory::default();
        history.add(entry(a, "SELECT * FROM Users"));
        history.add(entry(b, "DELETE FROM users"));
        history.add(entry(a, "SELECT 1"));

        assert_eq!(history.for_connection(a).count(), 2);
        assert_eq!(history.search("users").count(), 2);
        assert_eq!(history.search("DELETE").count(), 1);

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_save_and_load_trims_to_cap() {
        let store = MemoryStore::new();
        let conn = Uuid::new_v4();
        let mut history = QueryHistory::new(10);
        for i in 0..4 {
            history.add(entry(conn, &format!("SELECT {}", i)));
        }
        history.save(&store).unwrap();

        let restored = QueryHistory::load(&store, 2).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.entries().next().unwrap().query_text, "SELECT 3");

        let empty = QueryHistory::load(&MemoryStore::new(), 5).unwrap();
        assert!(empty.is_empty());
    }
}
