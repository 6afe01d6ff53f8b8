//! Backend dialects and the SQL text rules that vary between them

use crate::{DbcxError, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    Postgres,
    Mssql,
    MongoDb,
    MariaDb,
}

/// How a dialect renders boolean literals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanStyle {
    /// `TRUE` / `FALSE`
    Keyword,
    /// `1` / `0`
    Numeric,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::Mssql,
        Dialect::MongoDb,
        Dialect::MariaDb,
    ];

    /// Stable lowercase tag used in persisted configs
    pub fn id(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Mssql => "mssql",
            Dialect::MongoDb => "mongodb",
            Dialect::MariaDb => "mariadb",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Dialect::MySql => "MySQL",
            Dialect::Postgres => "PostgreSQL",
            Dialect::Mssql => "SQL Server",
            Dialect::MongoDb => "MongoDB",
            Dialect::MariaDb => "MariaDB",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Dialect::MySql | Dialect::MariaDb => 3306,
            Dialect::Postgres => 5432,
            Dialect::Mssql => 1433,
            Dialect::MongoDb => 27017,
        }
    }

    /// Document stores use a non-SQL query language
    pub fn is_document_store(&self) -> bool {
        matches!(self, Dialect::MongoDb)
    }

    /// Catalog databases hidden from schema snapshots
    pub fn system_databases(&self) -> &'static [&'static str] {
        match self {
            Dialect::MySql | Dialect::MariaDb => {
                &["information_schema", "mysql", "performance_schema", "sys"]
            }
            Dialect::Postgres => &["postgres", "template0", "template1"],
            Dialect::Mssql => &["master", "tempdb", "model", "msdb"],
            Dialect::MongoDb => &["admin", "config", "local"],
        }
    }

    pub fn is_system_database(&self, name: &str) -> bool {
        self.system_databases()
            .iter()
            .any(|db| db.eq_ignore_ascii_case(name))
    }

    pub fn boolean_style(&self) -> BooleanStyle {
        match self {
            Dialect::Postgres => BooleanStyle::Keyword,
            _ => BooleanStyle::Numeric,
        }
    }

    /// Wrap an identifier in the dialect's quote characters, doubling any
    /// embedded closing quote.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Dialect::MySql | Dialect::MariaDb => format!("`{}`", name.replace('`', "``")),
            Dialect::Mssql => format!("[{}]", name.replace(']', "]]")),
            Dialect::Postgres | Dialect::MongoDb => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quote an optionally qualified name, e.g. `schema.table`
    pub fn quote_qualified(&self, parts: &[&str]) -> String {
        parts
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| self.quote_identifier(p))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render a value as an inline SQL literal.
    ///
    /// Only embedded single quotes are escaped (doubled). Values are inlined
    /// into statement text, so callers must not feed untrusted input here
    /// expecting parameter-binding safety.
    pub fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match (self.boolean_style(), b) {
                (BooleanStyle::Keyword, true) => "TRUE".to_string(),
                (BooleanStyle::Keyword, false) => "FALSE".to_string(),
                (BooleanStyle::Numeric, true) => "1".to_string(),
                (BooleanStyle::Numeric, false) => "0".to_string(),
            },
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Float32(v) if v.is_finite() => v.to_string(),
            Value::Float64(v) if v.is_finite() => v.to_string(),
            Value::Decimal(v) => v.clone(),
            Value::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => quote_literal(&t.format("%H:%M:%S%.3f").to_string()),
            Value::DateTime(dt) => quote_literal(&dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
            Value::DateTimeUtc(dt) => {
                quote_literal(&dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            }
            Value::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                quote_literal(&hex)
            }
            Value::Json(json) => quote_literal(&json.to_string()),
            Value::Array(items) => {
                let json = serde_json::Value::Array(items.iter().map(value_to_json).collect());
                quote_literal(&json.to_string())
            }
            other => quote_literal(&other.to_string()),
        }
    }
}

/// Single-quote a string, doubling embedded single quotes
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Convert a value to its JSON representation
pub fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;
    match value {
        Value::Null => J::Null,
        Value::Bool(b) => J::Bool(*b),
        Value::Int16(v) => J::from(*v),
        Value::Int32(v) => J::from(*v),
        Value::Int64(v) => J::from(*v),
        Value::Float32(v) => J::from(*v as f64),
        Value::Float64(v) => J::from(*v),
        Value::Json(j) => j.clone(),
        Value::Array(items) => J::Array(items.iter().map(value_to_json).collect()),
        other => J::String(other.to_string()),
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Dialect {
    type Err = DbcxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            "mongodb" | "mongo" => Ok(Dialect::MongoDb),
            "mariadb" => Ok(Dialect::MariaDb),
            other => Err(DbcxError::UnsupportedDialect(other.to_string())),
        }
    }
}
