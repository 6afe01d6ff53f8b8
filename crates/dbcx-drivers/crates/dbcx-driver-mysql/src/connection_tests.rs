//! Tests for MySQL option building and value decoding

use crate::MySqlProvider;
use crate::connection::{
    build_opts, build_result, column_type_name, describe_columns, mysql_value_to_value,
};
use dbcx_core::{ConnectionConfig, ConnectionState, DbcxError, Dialect, Provider, Value};
use mysql_async::Column;
use mysql_async::consts::ColumnType;

fn config() -> ConnectionConfig {
    ConnectionConfig::new(Dialect::MySql, "local")
        .with_host("db.internal", 3307)
        .with_username("app")
        .with_database("shop")
}

#[test]
fn test_build_opts_maps_config_fields() {
    let opts = build_opts(&config(), "secret").unwrap();
    assert_eq!(opts.ip_or_hostname(), "db.internal");
    assert_eq!(opts.tcp_port(), 3307);
    assert_eq!(opts.db_name(), Some("shop"));
    assert_eq!(opts.user(), Some("app"));
    assert_eq!(opts.pass(), Some("secret"));
    assert!(opts.ssl_opts().is_none());
}

#[test]
fn test_build_opts_skips_empty_password_and_enables_ssl() {
    let opts = build_opts(&config().with_ssl(true), "").unwrap();
    assert_eq!(opts.pass(), None);
    assert!(opts.ssl_opts().is_some());
}

#[test]
fn test_text_protocol_integers() {
    let value = mysql_value_to_value(
        mysql_async::Value::Bytes(b"42".to_vec()),
        ColumnType::MYSQL_TYPE_LONG,
    );
    assert_eq!(value, Value::Int64(42));
}

#[test]
fn test_text_protocol_decimal_keeps_precision() {
    let value = mysql_value_to_value(
        mysql_async::Value::Bytes(b"12345678901234567890.01".to_vec()),
        ColumnType::MYSQL_TYPE_NEWDECIMAL,
    );
    assert_eq!(value, Value::Decimal("12345678901234567890.01".into()));
}

#[test]
fn test_text_protocol_dates() {
    let date = mysql_value_to_value(
        mysql_async::Value::Bytes(b"2024-02-29".to_vec()),
        ColumnType::MYSQL_TYPE_DATE,
    );
    assert!(matches!(date, Value::Date(_)));

    let ts = mysql_value_to_value(
        mysql_async::Value::Bytes(b"2024-02-29 13:45:00".to_vec()),
        ColumnType::MYSQL_TYPE_DATETIME,
    );
    assert!(matches!(ts, Value::DateTime(_)));
}

#[test]
fn test_zero_date_falls_back_to_string() {
    let value = mysql_value_to_value(
        mysql_async::Value::Date(0, 0, 0, 0, 0, 0, 0),
        ColumnType::MYSQL_TYPE_DATETIME,
    );
    assert_eq!(value, Value::String("0000-00-00 00:00:00".into()));
}

#[test]
fn test_binary_payload_stays_bytes() {
    let value = mysql_value_to_value(
        mysql_async::Value::Bytes(vec![0xff, 0xfe]),
        ColumnType::MYSQL_TYPE_BLOB,
    );
    assert_eq!(value, Value::Bytes(vec![0xff, 0xfe]));
}

#[test]
fn test_large_unsigned_becomes_decimal() {
    let value = mysql_value_to_value(
        mysql_async::Value::UInt(u64::MAX),
        ColumnType::MYSQL_TYPE_LONGLONG,
    );
    assert_eq!(value, Value::Decimal(u64::MAX.to_string()));
}

#[test]
fn test_column_type_names() {
    assert_eq!(column_type_name(ColumnType::MYSQL_TYPE_VAR_STRING), "varchar");
    assert_eq!(column_type_name(ColumnType::MYSQL_TYPE_NEWDECIMAL), "decimal");
}

#[test]
fn test_select_without_rows_keeps_columns() {
    let (columns, types) = describe_columns(&[
        Column::new(ColumnType::MYSQL_TYPE_LONG).with_name(b"id"),
        Column::new(ColumnType::MYSQL_TYPE_VAR_STRING).with_name(b"email"),
    ]);
    let result = build_result(columns, &types, Vec::new(), 0);

    let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "email"]);
    assert_eq!(result.columns[1].data_type, "varchar");
    assert!(result.rows.is_empty());
    assert_eq!(result.row_count, 0);
}

#[test]
fn test_statement_without_result_set_reports_affected_rows() {
    let (columns, types) = describe_columns(&[]);
    let result = build_result(columns, &types, Vec::new(), 3);
    assert!(result.columns.is_empty());
    assert_eq!(result.affected_rows, 3);
}

#[tokio::test]
async fn test_queries_require_connection() {
    let provider = MySqlProvider::new(Dialect::MariaDb);
    assert_eq!(provider.dialect(), Dialect::MariaDb);
    assert_eq!(provider.state(), ConnectionState::Disconnected);

    let err = provider.execute_query("SELECT 1", None).await.unwrap_err();
    assert!(matches!(err, DbcxError::NotConnected(_)));
    assert!(provider.get_databases().await.is_err());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let provider = MySqlProvider::new(Dialect::MySql);
    provider.disconnect().await.unwrap();
    provider.disconnect().await.unwrap();
    assert_eq!(provider.state(), ConnectionState::Disconnected);
}
