//! Pool construction, statement execution and value decoding for MySQL

use dbcx_core::{ColumnMeta, ConnectionConfig, DbcxError, QueryResult, Result, Row, Value};
use mysql_async::{
    Column, Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row as MySqlRow, SslOpts,
    consts::ColumnType, prelude::*,
};

/// Build connection options from a config.
///
/// The pool is pinned to a single connection so session state such as
/// `USE <db>` survives between statements.
pub fn build_opts(config: &ConnectionConfig, password: &str) -> Result<Opts> {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .db_name(config.default_database().map(str::to_string));

    if !config.username.is_empty() {
        builder = builder.user(Some(config.username.clone()));
    }
    if !password.is_empty() {
        builder = builder.pass(Some(password.to_string()));
    }
    if config.ssl_enabled() {
        let mut ssl_opts = SslOpts::default();
        if config.option("rejectUnauthorized") == Some("false") {
            ssl_opts = ssl_opts
                .with_danger_accept_invalid_certs(true)
                .with_danger_skip_domain_validation(true);
        }
        builder = builder.ssl_opts(Some(ssl_opts));
    }

    let constraints = PoolConstraints::new(1, 1).ok_or_else(|| {
        DbcxError::Connection("Failed to configure MySQL pool constraints (min=1, max=1)".into())
    })?;
    let pool_opts = PoolOpts::default()
        .with_constraints(constraints)
        .with_reset_connection(false);

    Ok(builder.pool_opts(pool_opts).into())
}

/// Create a pool and verify it can hand out a connection
pub(crate) async fn open_pool(opts: Opts) -> Result<Pool> {
    let pool = Pool::new(opts);
    match pool.get_conn().await {
        Ok(conn) => {
            drop(conn);
            Ok(pool)
        }
        Err(e) => {
            // Best effort: the pool never produced a usable connection
            let _ = pool.disconnect().await;
            Err(DbcxError::Connection(format!(
                "Failed to connect to MySQL: {}",
                e
            )))
        }
    }
}

pub(crate) async fn get_conn(pool: &Pool) -> Result<Conn> {
    pool.get_conn()
        .await
        .map_err(|e| DbcxError::Connection(format!("Failed to get MySQL connection: {}", e)))
}

/// Run one statement, optionally switching databases first
pub(crate) async fn run_statement(
    conn: &mut Conn,
    sql: &str,
    database: Option<&str>,
) -> Result<QueryResult> {
    if let Some(db) = database.filter(|db| !db.is_empty()) {
        conn.query_drop(format!("USE `{}`", db.replace('`', "``")))
            .await
            .map_err(|e| DbcxError::Query(e.to_string()))?;
    }

    let mut result = conn
        .query_iter(sql)
        .await
        .map_err(|e| DbcxError::Query(e.to_string()))?;
    // Taken from the result set so a SELECT matching no rows keeps them
    let (columns, column_types) = describe_columns(result.columns_ref());
    let mysql_rows: Vec<MySqlRow> = result
        .collect()
        .await
        .map_err(|e| DbcxError::Query(e.to_string()))?;
    let affected_rows = result.affected_rows();
    result
        .drop_result()
        .await
        .map_err(|e| DbcxError::Query(e.to_string()))?;

    Ok(build_result(columns, &column_types, mysql_rows, affected_rows))
}

/// Rows and column metadata into a result; no columns means a statement
/// that was never meant to return rows
pub(crate) fn build_result(
    columns: Vec<ColumnMeta>,
    column_types: &[ColumnType],
    mysql_rows: Vec<MySqlRow>,
    affected_rows: u64,
) -> QueryResult {
    if columns.is_empty() {
        return QueryResult::affected(affected_rows);
    }
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let rows = mysql_rows
        .into_iter()
        .map(|mysql_row| {
            let values = (0..column_names.len())
                .map(|idx| {
                    let raw: mysql_async::Value =
                        mysql_row.get(idx).unwrap_or(mysql_async::Value::NULL);
                    let col_type = column_types
                        .get(idx)
                        .copied()
                        .unwrap_or(ColumnType::MYSQL_TYPE_STRING);
                    mysql_value_to_value(raw, col_type)
                })
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect();

    QueryResult::with_rows(columns, rows)
}

pub(crate) fn describe_columns(columns: &[Column]) -> (Vec<ColumnMeta>, Vec<ColumnType>) {
    columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let meta = ColumnMeta::new(
                col.name_str().to_string(),
                column_type_name(col.column_type()),
                idx,
            );
            (meta, col.column_type())
        })
        .unzip()
}

/// Human-readable type name for a wire column type
pub(crate) fn column_type_name(col_type: ColumnType) -> &'static str {
    match col_type {
        ColumnType::MYSQL_TYPE_TINY => "tinyint",
        ColumnType::MYSQL_TYPE_SHORT => "smallint",
        ColumnType::MYSQL_TYPE_INT24 => "mediumint",
        ColumnType::MYSQL_TYPE_LONG => "int",
        ColumnType::MYSQL_TYPE_LONGLONG => "bigint",
        ColumnType::MYSQL_TYPE_FLOAT => "float",
        ColumnType::MYSQL_TYPE_DOUBLE => "double",
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => "decimal",
        ColumnType::MYSQL_TYPE_DATE => "date",
        ColumnType::MYSQL_TYPE_TIME => "time",
        ColumnType::MYSQL_TYPE_DATETIME => "datetime",
        ColumnType::MYSQL_TYPE_TIMESTAMP => "timestamp",
        ColumnType::MYSQL_TYPE_YEAR => "year",
        ColumnType::MYSQL_TYPE_JSON => "json",
        ColumnType::MYSQL_TYPE_BIT => "bit",
        ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB => "blob",
        ColumnType::MYSQL_TYPE_NULL => "null",
        _ => "varchar",
    }
}

/// Convert a wire value to our Value type, using the column type to
/// interpret text-protocol byte strings.
pub(crate) fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => {
                    s.parse::<i64>().map(Value::Int64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_FLOAT => {
                    s.parse::<f32>().map(Value::Float32).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                    Value::Decimal(s)
                }
                ColumnType::MYSQL_TYPE_DATE => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .map(Value::Date)
                    .unwrap_or(Value::String(s)),
                ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
                    chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                        .map(Value::DateTime)
                        .unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_JSON => serde_json::from_str(&s)
                    .map(Value::Json)
                    .unwrap_or(Value::String(s)),
                _ => Value::String(s),
            },
            Err(err) => Value::Bytes(err.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => {
            if u <= i64::MAX as u64 {
                Value::Int64(u as i64)
            } else {
                Value::Decimal(u.to_string())
            }
        }
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32);
            match date {
                Some(date) if col_type == ColumnType::MYSQL_TYPE_DATE => Value::Date(date),
                Some(date) => date
                    .and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Date(date)),
                // Zero dates such as 0000-00-00 have no chrono representation
                None => Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                )),
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}
