//! SQL Server session setup and statement execution using tiberius

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use dbcx_core::{
    ColumnMeta, ConnectionConfig, DbcxError, Dialect, QueryResult, Row, Value, statement,
};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

pub(crate) type MssqlClient = Client<Compat<TcpStream>>;

/// SQL Server errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlError> for DbcxError {
    fn from(err: MssqlError) -> Self {
        match err {
            MssqlError::ConnectionFailed(_)
            | MssqlError::AuthenticationFailed(_)
            | MssqlError::Io(_) => DbcxError::Connection(err.to_string()),
            MssqlError::QueryFailed(msg) => DbcxError::Query(msg),
            MssqlError::Tiberius(e) => DbcxError::Query(e.to_string()),
        }
    }
}

/// Build a tiberius config. Without a username, integrated authentication
/// is used where the platform supports it.
pub fn build_config(config: &ConnectionConfig, password: &str) -> Result<Config, MssqlError> {
    let mut tds = Config::new();
    tds.host(&config.host);
    tds.port(config.port);

    if let Some(database) = config.default_database() {
        tds.database(database);
    }
    if config.option_flag("trustServerCertificate") {
        tds.trust_cert();
    }
    tds.encryption(if config.ssl_enabled() {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });

    if config.username.is_empty() {
        #[cfg(windows)]
        {
            tds.authentication(AuthMethod::Integrated);
        }
        #[cfg(not(windows))]
        {
            return Err(MssqlError::AuthenticationFailed(
                "a username is required for SQL Server authentication".to_string(),
            ));
        }
    } else {
        tds.authentication(AuthMethod::sql_server(&config.username, password));
    }
    Ok(tds)
}

/// Open a TDS session over TCP
pub(crate) async fn open_client(tds: Config) -> Result<MssqlClient, MssqlError> {
    tracing::debug!(addr = %tds.get_addr(), "connecting to SQL Server");

    let tcp = TcpStream::connect(tds.get_addr())
        .await
        .map_err(|e| MssqlError::ConnectionFailed(e.to_string()))?;
    tcp.set_nodelay(true)?;

    Client::connect(tds, tcp.compat_write())
        .await
        .map_err(|e| MssqlError::ConnectionFailed(e.to_string()))
}

/// Switch the session's database
pub(crate) async fn use_database(client: &mut MssqlClient, database: &str) -> Result<(), MssqlError> {
    let sql = format!("USE {}", Dialect::Mssql.quote_identifier(database));
    client
        .execute(sql, &[])
        .await
        .map_err(|e| MssqlError::QueryFailed(e.to_string()))?;
    Ok(())
}

/// Run one statement. Row-returning statements are detected by their
/// leading keyword since TDS has no cheap describe step.
pub(crate) async fn run_statement(
    client: &mut MssqlClient,
    sql: &str,
    database: Option<&str>,
) -> Result<QueryResult, MssqlError> {
    if let Some(database) = database.filter(|db| !db.is_empty()) {
        use_database(client, database).await?;
    }

    if !statement::returns_rows(sql) {
        let done = client
            .execute(sql, &[])
            .await
            .map_err(|e| MssqlError::QueryFailed(e.to_string()))?;
        return Ok(QueryResult::affected(done.rows_affected().iter().sum()));
    }

    let (columns, rows) = fetch_rows(client, sql).await?;
    Ok(QueryResult::with_rows(columns, rows))
}

/// Run a query and convert its first result set
pub(crate) async fn fetch_rows(
    client: &mut MssqlClient,
    sql: &str,
) -> Result<(Vec<ColumnMeta>, Vec<Row>), MssqlError> {
    let tds_rows = client
        .simple_query(sql)
        .await
        .map_err(|e| MssqlError::QueryFailed(e.to_string()))?
        .into_first_result()
        .await
        .map_err(|e| MssqlError::QueryFailed(e.to_string()))?;

    let columns: Vec<ColumnMeta> = tds_rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| ColumnMeta::new(col.name(), column_type_name(col), idx))
                .collect()
        })
        .unwrap_or_default();
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let rows = tds_rows
        .into_iter()
        .map(|row| {
            let values = row.into_iter().map(column_data_to_value).collect();
            Row::new(names.clone(), values)
        })
        .collect();
    Ok((columns, rows))
}

pub(crate) fn column_type_name(column: &tiberius::Column) -> String {
    format!("{:?}", column.column_type()).to_lowercase()
}

fn decode<T>(data: &ColumnData<'static>, wrap: fn(T) -> Value) -> Value
where
    T: for<'a> FromSql<'a>,
{
    T::from_sql(data).ok().flatten().map(wrap).unwrap_or(Value::Null)
}

/// Convert tiberius column data to a [`Value`]
pub(crate) fn column_data_to_value(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::U8(v) => v.map(|n| Value::Int16(n as i16)).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::Int16).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::Int32).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::Int64).unwrap_or(Value::Null),
        ColumnData::F32(v) => v.map(Value::Float32).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(Value::Float64).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .map(|s| Value::String(s.into_owned()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(Value::Uuid).unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .map(|b| Value::Bytes(b.into_owned()))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .map(|n| Value::Decimal(n.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .map(|x| Value::String(x.into_owned().into_string()))
            .unwrap_or(Value::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            decode::<NaiveDateTime>(&data, Value::DateTime)
        }
        ColumnData::Date(_) => decode::<NaiveDate>(&data, Value::Date),
        ColumnData::Time(_) => decode::<NaiveTime>(&data, Value::Time),
        ColumnData::DateTimeOffset(_) => decode::<DateTime<Utc>>(&data, Value::DateTimeUtc),
    }
}
