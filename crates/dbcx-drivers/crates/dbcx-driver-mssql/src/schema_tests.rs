use crate::schema::{column_from_row, columns_query, table_from_row};
use dbcx_core::{Row, Value};

fn row(values: Vec<Value>) -> Row {
    let names = (0..values.len()).map(|i| format!("c{}", i)).collect();
    Row::new(names, values)
}

#[test]
fn test_columns_query_escapes_names() {
    let sql = columns_query(None, "dbo", "o'brien");
    assert!(sql.contains("c.TABLE_NAME = N'o''brien'"));
    assert!(sql.contains("FROM INFORMATION_SCHEMA.COLUMNS c"));
}

#[test]
fn test_columns_query_targets_other_catalog() {
    let sql = columns_query(Some("sales]db"), "dbo", "orders");
    assert!(sql.contains("FROM [sales]]db].INFORMATION_SCHEMA.COLUMNS c"));
    assert!(sql.contains("[sales]]db].INFORMATION_SCHEMA.KEY_COLUMN_USAGE"));
}

#[test]
fn test_table_row_mapping() {
    let t = table_from_row(&row(vec![
        Value::from("dbo"),
        Value::from("orders"),
        Value::Int64(42),
    ]))
    .unwrap();
    assert_eq!(t.qualified_name(), "dbo.orders");
    assert_eq!(t.row_count, Some(42));
}

#[test]
fn test_column_row_flags() {
    let c = column_from_row(&row(vec![
        Value::from("id"),
        Value::from("int"),
        Value::from("NO"),
        Value::Null,
        Value::Int32(1),
        Value::Int32(0),
    ]))
    .unwrap();
    assert!(c.is_primary_key);
    assert!(!c.is_foreign_key);
    assert!(!c.nullable);
    assert_eq!(c.default_value, None);
}
