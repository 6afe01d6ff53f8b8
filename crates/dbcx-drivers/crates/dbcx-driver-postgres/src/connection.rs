//! Client construction and statement execution for PostgreSQL

use crate::value::postgres_to_value;
use dbcx_core::{ColumnMeta, ConnectionConfig, DbcxError, QueryResult, Result, Row};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row as PgRow};

/// Database used when the config names none
pub const DEFAULT_DATABASE: &str = "postgres";

/// Build a client config for one database of a connection
pub fn build_pg_config(
    config: &ConnectionConfig,
    password: &str,
    database: &str,
) -> tokio_postgres::Config {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&config.host)
        .port(config.port)
        .dbname(database)
        .application_name("dbcx");

    if !config.username.is_empty() {
        pg_config.user(&config.username);
    }
    if !password.is_empty() {
        pg_config.password(password);
    }
    pg_config.ssl_mode(if config.ssl_enabled() {
        SslMode::Require
    } else {
        SslMode::Disable
    });
    pg_config
}

/// TLS connector when the config asks for TLS
pub(crate) fn tls_connector(config: &ConnectionConfig) -> Result<Option<MakeTlsConnector>> {
    if !config.ssl_enabled() {
        return Ok(None);
    }
    let verify = config.option("rejectUnauthorized") != Some("false");
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify)
        .build()
        .map_err(|e| DbcxError::Connection(format!("Failed to build TLS connector: {}", e)))?;
    Ok(Some(MakeTlsConnector::new(connector)))
}

/// Connect and spawn the connection driver task
pub(crate) async fn open_client(
    pg_config: &tokio_postgres::Config,
    tls: Option<MakeTlsConnector>,
) -> Result<Client> {
    let connect_err =
        |e: tokio_postgres::Error| DbcxError::Connection(format!("Failed to connect to PostgreSQL: {}", format_postgres_error(&e)));

    let client = match tls {
        Some(tls) => {
            let (client, connection) = pg_config.connect(tls).await.map_err(connect_err)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        }
        None => {
            let (client, connection) = pg_config.connect(NoTls).await.map_err(connect_err)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        }
    };
    Ok(client)
}

/// Render a server error with its detail, hint and a friendlier prefix for
/// common constraint and input failures.
pub fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut message = db_error.message().to_string();
    if let Some(detail) = db_error.detail().filter(|d| !d.trim().is_empty()) {
        message.push_str(&format!(" (detail: {})", detail));
    }
    if let Some(hint) = db_error.hint().filter(|h| !h.trim().is_empty()) {
        message.push_str(&format!(" (hint: {})", hint));
    }

    let code = db_error.code().code();
    match code {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        _ => format!("{} (code: {})", message, code),
    }
}

fn query_err(e: tokio_postgres::Error) -> DbcxError {
    DbcxError::Query(format_postgres_error(&e))
}

/// Run one statement. Row-returning statements are detected from the
/// prepared statement's column list.
pub(crate) async fn run_statement(client: &Client, sql: &str) -> Result<QueryResult> {
    let statement = client.prepare(sql).await.map_err(query_err)?;

    if statement.columns().is_empty() {
        let affected = client.execute(&statement, &[]).await.map_err(query_err)?;
        return Ok(QueryResult::affected(affected));
    }

    let columns: Vec<ColumnMeta> = statement
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| ColumnMeta::new(col.name(), col.type_().name(), idx))
        .collect();
    let pg_rows = client.query(&statement, &[]).await.map_err(query_err)?;
    let rows = convert_rows(&pg_rows, &columns);
    Ok(QueryResult::with_rows(columns, rows))
}

/// Run a catalog query with bound parameters
pub(crate) async fn fetch_rows(
    client: &Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<Row>> {
    let pg_rows = client.query(sql, params).await.map_err(query_err)?;
    let columns: Vec<ColumnMeta> = pg_rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| ColumnMeta::new(col.name(), col.type_().name(), idx))
                .collect()
        })
        .unwrap_or_default();
    Ok(convert_rows(&pg_rows, &columns))
}

fn convert_rows(pg_rows: &[PgRow], columns: &[ColumnMeta]) -> Vec<Row> {
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    pg_rows
        .iter()
        .map(|pg_row| {
            let values = (0..names.len())
                .map(|idx| postgres_to_value(pg_row, idx))
                .collect();
            Row::new(names.clone(), values)
        })
        .collect()
}
