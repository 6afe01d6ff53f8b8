//! Settings file utilities

use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "dbcx";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .context("Could not determine config directory")
        .map(|p| p.join(APP_DIR))
}

pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .context("Could not determine data directory")
        .map(|p| p.join(APP_DIR))
}

pub fn settings_file() -> Result<PathBuf> {
    config_dir().map(|p| p.join("settings.toml"))
}

/// Key/value store holding connections and query history
pub fn store_file() -> Result<PathBuf> {
    data_dir().map(|p| p.join("store.json"))
}

pub fn log_dir() -> Result<PathBuf> {
    data_dir().map(|p| p.join("logs"))
}

pub fn ensure_directories() -> Result<()> {
    let dirs = [config_dir()?, data_dir()?, log_dir()?];
    for dir in dirs {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }
    }
    Ok(())
}
