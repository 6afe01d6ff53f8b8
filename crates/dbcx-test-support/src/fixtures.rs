//! Fixture builders

use dbcx_core::{ColumnInfo, ColumnMeta, ConnectionConfig, Dialect, QueryResult, Row, Value};

/// A named config for `dialect` pointing at localhost
pub fn config(dialect: Dialect, name: &str) -> ConnectionConfig {
    ConnectionConfig::new(dialect, name).with_username("tester")
}

/// Result set built from column names and value rows
pub fn result_set(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
    let metas = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| ColumnMeta::new(*name, "text", idx))
        .collect();
    let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    let rows = rows
        .into_iter()
        .map(|values| Row::new(names.clone(), values))
        .collect();
    QueryResult::with_rows(metas, rows)
}

/// `id` primary key plus nullable `name` and `email` columns
pub fn users_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("id", "integer").primary_key(),
        ColumnInfo::new("name", "varchar"),
        ColumnInfo::new("email", "varchar"),
    ]
}
