//! Connection configuration

use crate::{DbcxError, Dialect, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A configured connection. Never carries the password; that lives in the
/// secret store keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Backend dialect
    #[serde(rename = "type")]
    pub dialect: Dialect,
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Username
    #[serde(default)]
    pub username: String,
    /// Default database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Use TLS when connecting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    /// Dialect-specific options (e.g. `authSource`, `trustServerCertificate`)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub options: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a configuration pointing at localhost on the dialect's default port
    pub fn new(dialect: Dialect, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            dialect,
            host: "localhost".to_string(),
            port: dialect.default_port(),
            username: String::new(),
            database: None,
            ssl: None,
            options: HashMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = Some(ssl);
        self
    }

    /// Set a dialect-specific option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Interpret an option as a boolean flag (`true`, `1`, `yes`)
    pub fn option_flag(&self, key: &str) -> bool {
        self.option(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    pub fn ssl_enabled(&self) -> bool {
        self.ssl.unwrap_or(false)
    }

    /// Default database, ignoring blank values
    pub fn default_database(&self) -> Option<&str> {
        self.database.as_deref().filter(|db| !db.trim().is_empty())
    }

    /// Reject configurations that cannot possibly connect
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DbcxError::Configuration(
                "connection name must not be empty".into(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(DbcxError::Configuration(format!(
                "connection '{}' has no host",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(DbcxError::Configuration(format!(
                "connection '{}' has an invalid port",
                self.name
            )));
        }
        Ok(())
    }
}
