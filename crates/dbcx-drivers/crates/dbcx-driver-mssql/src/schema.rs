//! SQL Server catalog queries

use dbcx_core::{ColumnInfo, Dialect, Row, TableInfo, quote_literal};

pub(crate) const DATABASES_QUERY: &str = "SELECT name FROM sys.databases ORDER BY name";

/// Base tables of the session's current database
pub(crate) const TABLES_QUERY: &str = "SELECT t.TABLE_SCHEMA, t.TABLE_NAME, \
       (SELECT SUM(p.rows) FROM sys.partitions p \
        WHERE p.object_id = OBJECT_ID(QUOTENAME(t.TABLE_SCHEMA) + '.' + QUOTENAME(t.TABLE_NAME)) \
          AND p.index_id IN (0, 1)) AS ROW_COUNT \
     FROM INFORMATION_SCHEMA.TABLES t \
     WHERE t.TABLE_TYPE = 'BASE TABLE' \
     ORDER BY t.TABLE_SCHEMA, t.TABLE_NAME";

pub(crate) const DEFAULT_SCHEMA: &str = "dbo";

fn key_exists(catalog: &str, constraint_type: &str) -> String {
    format!(
        "CASE WHEN EXISTS (SELECT 1 FROM {catalog}INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
           JOIN {catalog}INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
             ON k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA \
           WHERE tc.CONSTRAINT_TYPE = '{constraint_type}' AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA \
             AND tc.TABLE_NAME = c.TABLE_NAME AND k.COLUMN_NAME = c.COLUMN_NAME) \
         THEN 1 ELSE 0 END"
    )
}

/// Columns of `schema.table`, read from `database`'s catalog when given
pub(crate) fn columns_query(database: Option<&str>, schema: &str, table: &str) -> String {
    let catalog = database
        .filter(|db| !db.is_empty())
        .map(|db| format!("{}.", Dialect::Mssql.quote_identifier(db)))
        .unwrap_or_default();
    format!(
        "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.IS_NULLABLE, c.COLUMN_DEFAULT, \
           {pk} AS IS_PK, {fk} AS IS_FK \
         FROM {catalog}INFORMATION_SCHEMA.COLUMNS c \
         WHERE c.TABLE_SCHEMA = N{schema} AND c.TABLE_NAME = N{table} \
         ORDER BY c.ORDINAL_POSITION",
        pk = key_exists(&catalog, "PRIMARY KEY"),
        fk = key_exists(&catalog, "FOREIGN KEY"),
        schema = quote_literal(schema),
        table = quote_literal(table),
    )
}

pub(crate) fn database_name(row: &Row) -> Option<String> {
    row.get(0).and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) fn table_from_row(row: &Row) -> Option<TableInfo> {
    let schema = row.get(0).and_then(|v| v.as_str())?;
    let name = row.get(1).and_then(|v| v.as_str())?;
    Some(TableInfo {
        name: name.to_string(),
        schema: Some(schema.to_string()),
        row_count: row.get(2).and_then(|v| v.as_i64()),
    })
}

pub(crate) fn column_from_row(row: &Row) -> Option<ColumnInfo> {
    let text = |idx: usize| row.get(idx).and_then(|v| v.as_str()).map(str::to_string);
    let flag = |idx: usize| row.get(idx).and_then(|v| v.as_i64()) == Some(1);
    Some(ColumnInfo {
        name: text(0)?,
        data_type: text(1).unwrap_or_default(),
        nullable: text(2).as_deref() == Some("YES"),
        default_value: text(3),
        is_primary_key: flag(4),
        is_foreign_key: flag(5),
    })
}
