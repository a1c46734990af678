mod bootstrap;
mod health;

use anyhow::Result;
use hotbot_core::config::{AppConfig, LoadOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use hotbot_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the loaded config, so config errors surface on stderr only.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    if app.config.server.health_enabled {
        health::spawn(
            &app.config.server.bind_address,
            app.config.server.health_check_port,
            app.coordinator.clone(),
        )
        .await?;
    }

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        transport_mode = app.transport_mode,
        keywords = ?app.config.flow.keywords,
        timezone = %app.config.flow.timezone,
        "hotbot-server started"
    );

    app.runner.run_until(wait_for_shutdown()).await?;

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        active_polls = app.coordinator.snapshot().active_polls,
        "hotbot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "could not listen for ctrl-c; shutting down");
    }
}
