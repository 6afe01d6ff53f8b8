//! Core settings
//!
//! Read from `settings.toml` in the config directory. Every field has a
//! default, so a missing file or a partial one is fine, and keys this
//! version does not know are ignored.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod settings_file;

pub use settings_file::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoreSettings {
    pub history: HistorySettings,
    pub schema_cache: SchemaCacheSettings,
    pub logging: LoggingSettings,
}

impl CoreSettings {
    /// Load from the default settings file
    pub fn load() -> Result<Self> {
        Self::load_from(&settings_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse settings TOML {:?}", path))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Oldest entries are dropped beyond this
    pub max_entries: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaCacheSettings {
    pub ttl_secs: u64,
    pub max_tables_per_database: usize,
}

impl SchemaCacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for SchemaCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_tables_per_database: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directives; `RUST_LOG` still takes precedence.
    /// `None` keeps the preset's filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_filter: Option<String>,
}
