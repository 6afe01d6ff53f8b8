//! MySQL catalog queries

use dbcx_core::{ColumnInfo, Row, TableInfo, quote_literal};

pub(crate) const DATABASES_QUERY: &str = "SHOW DATABASES";

/// Base tables of one database, or of the session database when `None`
pub(crate) fn tables_query(database: Option<&str>) -> String {
    let schema = match database {
        Some(db) => quote_literal(db),
        None => "DATABASE()".to_string(),
    };
    format!(
        "SELECT TABLE_NAME, TABLE_ROWS \
         FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE' \
         ORDER BY TABLE_NAME",
        schema
    )
}

/// Column metadata, including primary and foreign key flags
pub(crate) fn columns_query(database: Option<&str>, table: &str) -> String {
    let schema = match database {
        Some(db) => quote_literal(db),
        None => "DATABASE()".to_string(),
    };
    format!(
        "SELECT c.COLUMN_NAME, c.COLUMN_TYPE, c.IS_NULLABLE, c.COLUMN_KEY, c.COLUMN_DEFAULT, \
         EXISTS (SELECT 1 FROM information_schema.KEY_COLUMN_USAGE k \
                 WHERE k.TABLE_SCHEMA = c.TABLE_SCHEMA AND k.TABLE_NAME = c.TABLE_NAME \
                 AND k.COLUMN_NAME = c.COLUMN_NAME AND k.REFERENCED_TABLE_NAME IS NOT NULL) AS IS_FK \
         FROM information_schema.COLUMNS c \
         WHERE c.TABLE_SCHEMA = {} AND c.TABLE_NAME = {} \
         ORDER BY c.ORDINAL_POSITION",
        schema,
        quote_literal(table)
    )
}

pub(crate) fn database_name(row: &Row) -> Option<String> {
    row.get(0).map(|v| v.to_string()).filter(|s| !s.is_empty())
}

pub(crate) fn table_from_row(row: &Row) -> Option<TableInfo> {
    let name = row.get(0).map(|v| v.to_string())?;
    Some(TableInfo {
        name,
        schema: None,
        row_count: row.get(1).and_then(|v| v.as_i64()),
    })
}

pub(crate) fn column_from_row(row: &Row) -> Option<ColumnInfo> {
    let name = row.get(0).map(|v| v.to_string())?;
    let text = |idx: usize| {
        row.get(idx)
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
    };
    Some(ColumnInfo {
        name,
        data_type: text(1).unwrap_or_default(),
        nullable: text(2).as_deref() == Some("YES"),
        is_primary_key: text(3).as_deref() == Some("PRI"),
        is_foreign_key: row.get(5).and_then(|v| v.as_i64()).unwrap_or(0) != 0,
        default_value: text(4),
    })
}
