//! Core data types shared by providers, the executor and the editor

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A dynamically typed cell value as returned by any backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Date (year, month, day)
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
    /// DateTime with timezone (UTC)
    DateTimeUtc(DateTime<Utc>),
    /// JSON value (documents, nested structures)
    Json(serde_json::Value),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value renders as an unquoted numeric literal
    pub fn is_numeric(&self) -> bool {
        match self {
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) | Value::Decimal(_) => true,
            Value::Float32(v) => v.is_finite(),
            Value::Float64(v) => v.is_finite(),
            _ => false,
        }
    }

    /// Whether the value is a date, time or timestamp
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Value::Date(_) | Value::Time(_) | Value::DateTime(_) | Value::DateTimeUtc(_)
        )
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::Decimal(s) | Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Decimal(s) | Value::String(s) => s.parse::<f64>().ok(),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v),
            Value::Json(v) => write!(f, "{}", v),
            Value::Array(v) => write!(f, "[{} items]", v.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered mapping from column name to value
pub type RowMap = IndexMap<String, Value>;

/// A row from a query result
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
    /// Column names, parallel to `values`
    columns: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Convert to an ordered column → value map
    pub fn to_map(&self) -> RowMap {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Field metadata for a result column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ColumnMeta {
    /// Column name
    #[serde(default)]
    pub name: String,
    /// Data type (database-specific string)
    #[serde(default)]
    pub data_type: String,
    /// Column ordinal position (0-based)
    #[serde(default)]
    pub ordinal: usize,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ordinal,
        }
    }
}

/// Outcome of executing one statement.
///
/// A result either carries rows or an error, never both: a failed result has
/// no rows and a row count of zero. Immutable once produced.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Unique result ID
    pub id: Uuid,
    /// Field metadata, when the statement produced a result set
    pub columns: Vec<ColumnMeta>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Number of rows returned, or affected for DML statements
    pub row_count: u64,
    /// Rows affected (for DML statements)
    pub affected_rows: u64,
    /// Wall-clock execution time in milliseconds
    pub execution_time_ms: u64,
    /// Error message when the statement failed
    pub error: Option<String>,
}

impl QueryResult {
    /// Create a new empty, successful result
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            affected_rows: 0,
            execution_time_ms: 0,
            error: None,
        }
    }

    /// Result carrying rows
    pub fn with_rows(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self {
            row_count: rows.len() as u64,
            columns,
            rows,
            ..Self::empty()
        }
    }

    /// Result of a statement that only reports affected rows
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            row_count: affected_rows,
            affected_rows,
            ..Self::empty()
        }
    }

    /// Error-bearing result: no rows, row count 0
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty()
        }
    }

    /// Attach the elapsed wall-clock time
    pub fn elapsed(mut self, duration: Duration) -> Self {
        self.execution_time_ms = duration.as_millis() as u64;
        self
    }

    /// Fold a fallible execution into a result, timing it from `started`.
    pub fn from_outcome(outcome: crate::Result<QueryResult>, started: Instant) -> Self {
        match outcome {
            Ok(result) => result.elapsed(started.elapsed()),
            Err(err) => QueryResult::failure(err.to_string()).elapsed(started.elapsed()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Rows as ordered column → value maps
    pub fn row_maps(&self) -> Vec<RowMap> {
        self.rows.iter().map(Row::to_map).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_has_no_rows() {
        let result = QueryResult::failure("syntax error at or near \"SELEC\"");
        assert!(result.is_error());
        assert_eq!(result.row_count, 0);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_from_outcome_converts_errors() {
        let started = Instant::now();
        let result = QueryResult::from_outcome(
            Err(crate::DbcxError::Query("permission denied".into())),
            started,
        );
        assert_eq!(result.error.as_deref(), Some("Query error: permission denied"));
        assert_eq!(result.row_count, 0);
    }

    #[test]
    fn test_with_rows_counts_rows() {
        let columns = vec![ColumnMeta::new("id", "int4", 0)];
        let rows = vec![
            Row::new(vec!["id".into()], vec![Value::Int32(1)]),
            Row::new(vec!["id".into()], vec![Value::Int32(2)]),
        ];
        let result = QueryResult::with_rows(columns, rows);
        assert_eq!(result.row_count, 2);
        assert!(!result.is_error());
    }

    #[test]
    fn test_row_lookup_by_name() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::Int64(7), Value::from("Ada")],
        );
        assert_eq!(row.get_by_name("name"), Some(&Value::String("Ada".into())));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_value_numeric_classification() {
        assert!(Value::Int32(42).is_numeric());
        assert!(Value::Decimal("10.50".into()).is_numeric());
        assert!(!Value::Float64(f64::NAN).is_numeric());
        assert!(!Value::String("42".into()).is_numeric());
    }
}
