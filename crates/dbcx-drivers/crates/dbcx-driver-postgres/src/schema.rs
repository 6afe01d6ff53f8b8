//! PostgreSQL catalog queries

use dbcx_core::{ColumnInfo, Row, TableInfo};

pub(crate) const DATABASES_QUERY: &str = "SELECT datname::text \
     FROM pg_database \
     WHERE datistemplate = false \
     ORDER BY datname";

/// Base tables across user schemas with the planner's row estimate
pub(crate) const TABLES_QUERY: &str = "SELECT t.table_schema::text, t.table_name::text, c.reltuples::bigint \
     FROM information_schema.tables t \
     LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = t.table_schema \
     LEFT JOIN pg_catalog.pg_class c ON c.relname = t.table_name AND c.relnamespace = n.oid \
     WHERE t.table_type = 'BASE TABLE' \
       AND t.table_schema NOT IN ('pg_catalog', 'information_schema') \
     ORDER BY t.table_schema, t.table_name";

/// Columns of `$1.$2` with key flags
pub(crate) const COLUMNS_QUERY: &str = "SELECT c.column_name::text, c.data_type::text, c.is_nullable::text, c.column_default::text, \
       EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
               JOIN information_schema.key_column_usage k \
                 ON k.constraint_name = tc.constraint_name AND k.table_schema = tc.table_schema \
               WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = c.table_schema \
                 AND tc.table_name = c.table_name AND k.column_name = c.column_name) AS is_pk, \
       EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
               JOIN information_schema.key_column_usage k \
                 ON k.constraint_name = tc.constraint_name AND k.table_schema = tc.table_schema \
               WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = c.table_schema \
                 AND tc.table_name = c.table_name AND k.column_name = c.column_name) AS is_fk \
     FROM information_schema.columns c \
     WHERE c.table_schema::text = $1::text AND c.table_name::text = $2::text \
     ORDER BY c.ordinal_position";

pub(crate) const DEFAULT_SCHEMA: &str = "public";

pub(crate) fn database_name(row: &Row) -> Option<String> {
    row.get(0).and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) fn table_from_row(row: &Row) -> Option<TableInfo> {
    let schema = row.get(0).and_then(|v| v.as_str())?;
    let name = row.get(1).and_then(|v| v.as_str())?;
    Some(TableInfo {
        name: name.to_string(),
        schema: Some(schema.to_string()),
        // reltuples is -1 for tables that were never analyzed
        row_count: row.get(2).and_then(|v| v.as_i64()).filter(|n| *n >= 0),
    })
}

pub(crate) fn column_from_row(row: &Row) -> Option<ColumnInfo> {
    let text = |idx: usize| row.get(idx).and_then(|v| v.as_str()).map(str::to_string);
    let flag = |idx: usize| row.get(idx).and_then(|v| v.as_bool()).unwrap_or(false);
    Some(ColumnInfo {
        name: text(0)?,
        data_type: text(1).unwrap_or_default(),
        nullable: text(2).as_deref() == Some("YES"),
        default_value: text(3),
        is_primary_key: flag(4),
        is_foreign_key: flag(5),
    })
}
