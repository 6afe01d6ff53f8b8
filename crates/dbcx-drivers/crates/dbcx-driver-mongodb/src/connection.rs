//! Connection strings and BSON conversion

use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use dbcx_core::{ColumnMeta, ConnectionConfig, QueryResult, Row, Value};
use indexmap::IndexMap;

/// Database used when the config names none
pub const DEFAULT_DATABASE: &str = "admin";

/// Build a `mongodb://` URI. A full URI in the `uri` option wins over the
/// discrete fields.
pub fn build_connection_string(config: &ConnectionConfig, password: &str) -> String {
    if let Some(uri) = config.option("uri").filter(|u| !u.trim().is_empty()) {
        return uri.trim().to_string();
    }

    let mut uri = String::from("mongodb://");
    if !config.username.is_empty() {
        uri.push_str(&percent_encode(&config.username));
        if !password.is_empty() {
            uri.push(':');
            uri.push_str(&percent_encode(password));
        }
        uri.push('@');
    }
    uri.push_str(&config.host);
    uri.push(':');
    uri.push_str(&config.port.to_string());
    uri.push('/');
    uri.push_str(config.default_database().unwrap_or(DEFAULT_DATABASE));

    let mut params = Vec::new();
    if !config.username.is_empty() {
        params.push(format!(
            "authSource={}",
            percent_encode(config.option("authSource").unwrap_or(DEFAULT_DATABASE))
        ));
    }
    for key in ["replicaSet", "authMechanism", "directConnection"] {
        if let Some(value) = config.option(key) {
            params.push(format!("{}={}", key, percent_encode(value)));
        }
    }
    if config.ssl_enabled() {
        params.push("tls=true".to_string());
        if config.option("rejectUnauthorized") == Some("false") {
            params.push("tlsAllowInvalidCertificates=true".to_string());
        }
    }
    if !params.is_empty() {
        uri.push('?');
        uri.push_str(&params.join("&"));
    }
    uri
}

/// RFC 3986 unreserved characters pass through, everything else is
/// percent-encoded byte by byte
fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Convert a BSON value to a [`Value`]
pub fn bson_to_value(bson: &Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined | Bson::MaxKey | Bson::MinKey => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::Int32(*i),
        Bson::Int64(i) => Value::Int64(*i),
        Bson::Double(d) => Value::Float64(*d),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_value).collect()),
        Bson::Document(_) => Value::Json(bson.clone().into_relaxed_extjson()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis())
            .map(Value::DateTimeUtc)
            .unwrap_or(Value::Null),
        Bson::Binary(bin) => Value::Bytes(bin.bytes.clone()),
        Bson::Decimal128(d) => Value::Decimal(d.to_string()),
        Bson::Timestamp(ts) => Value::Int64(ts.time as i64),
        Bson::RegularExpression(re) => Value::String(format!("/{}/{}", re.pattern, re.options)),
        Bson::JavaScriptCodeWithScope(code) => Value::String(code.code.clone()),
        Bson::DbPointer(_) => Value::Json(bson.clone().into_relaxed_extjson()),
    }
}

/// BSON type name used as a column's data type
pub fn bson_type_name(bson: &Bson) -> &'static str {
    match bson {
        Bson::Null | Bson::Undefined => "null",
        Bson::Boolean(_) => "bool",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Double(_) => "double",
        Bson::Decimal128(_) => "decimal",
        Bson::String(_) | Bson::Symbol(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}

/// Tabulate documents. Columns are the union of keys in first-seen order,
/// typed by the first non-null value; missing fields read as NULL.
pub fn documents_to_result(documents: &[Document]) -> QueryResult {
    let mut keys: IndexMap<&str, Option<&'static str>> = IndexMap::new();
    for doc in documents {
        for (key, value) in doc {
            let type_name = (!matches!(value, Bson::Null)).then(|| bson_type_name(value));
            let slot = keys.entry(key.as_str()).or_insert(None);
            if slot.is_none() {
                *slot = type_name;
            }
        }
    }

    let columns: Vec<ColumnMeta> = keys
        .iter()
        .enumerate()
        .map(|(idx, (name, type_name))| ColumnMeta::new(*name, type_name.unwrap_or("null"), idx))
        .collect();
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let rows = documents
        .iter()
        .map(|doc| {
            let values = names
                .iter()
                .map(|name| doc.get(name).map(bson_to_value).unwrap_or(Value::Null))
                .collect();
            Row::new(names.clone(), values)
        })
        .collect();
    QueryResult::with_rows(columns, rows)
}

/// Single-column result, used for counts and `distinct`
pub fn scalar_column(name: &str, values: Vec<Bson>) -> QueryResult {
    let type_name = values
        .iter()
        .find(|v| !matches!(v, Bson::Null))
        .map(bson_type_name)
        .unwrap_or("null");
    let names = vec![name.to_string()];
    let rows = values
        .iter()
        .map(|v| Row::new(names.clone(), vec![bson_to_value(v)]))
        .collect();
    QueryResult::with_rows(vec![ColumnMeta::new(name, type_name, 0)], rows)
}

/// `runCommand` reply: cursor replies expand to their first batch, anything
/// else is a one-row result
pub fn command_reply_to_result(reply: &Document) -> QueryResult {
    let batch = reply
        .get_document("cursor")
        .ok()
        .and_then(|cursor| cursor.get_array("firstBatch").ok());

    match batch {
        Some(batch) => {
            let documents: Vec<Document> = batch
                .iter()
                .filter_map(|b| b.as_document().cloned())
                .collect();
            documents_to_result(&documents)
        }
        None => documents_to_result(std::slice::from_ref(reply)),
    }
}
