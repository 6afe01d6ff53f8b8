//! Headless host for the dbcx core.
//!
//! Loads settings, starts the services, connects every saved connection and
//! keeps their schema snapshots fresh until interrupted.

use anyhow::Context;
use dbcx_app::{CoreServices, logging};
use dbcx_settings::CoreSettings;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = CoreSettings::load().context("Failed to load settings")?;
    let config = logging::default_config()
        .with_default_filter(settings.logging.default_filter.as_deref());
    let _log_guard = logging::init(config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        build_mode = if cfg!(debug_assertions) { "debug" } else { "release" },
        "Starting dbcx"
    );
    dbcx_settings::ensure_directories()?;

    let services = CoreServices::start(settings)?;
    for config in services.manager().connections() {
        if let Err(e) = services.manager().connect(config.id).await {
            tracing::warn!(connection = %config.name, error = %e, "saved connection unavailable");
        }
    }

    let period = services.schema_cache().config().ttl.max(Duration::from_secs(1));
    let mut refresh = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = refresh.tick() => {
                let refreshed = services.schema_cache().update_schema_cache().await;
                tracing::debug!(refreshed, "schema refresh pass");
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "failed to listen for interrupt");
                }
                break;
            }
        }
    }

    services.shutdown().await;
    tracing::info!("dbcx stopped");
    Ok(())
}
