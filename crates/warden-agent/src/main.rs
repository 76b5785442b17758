use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use warden_process::{Controller, ControllerOptions, OsInspector, Registry, ShellLauncher};

mod commands;
mod config;
mod discord;
mod render;
mod server_info;
mod support;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = support::log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))?;
    let (file_writer, _guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, "bot.log"));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    let config_path = support::config_path();
    let config = config::AgentConfig::load(&config_path)?;

    let registry = Registry::build(config.games());
    if registry.is_empty() {
        tracing::warn!(config = %config_path.display(), "no valid games configured");
    }
    tracing::info!(
        games = ?registry.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
        version = env!("CARGO_PKG_VERSION"),
        "warden-agent starting"
    );

    let controller = Controller::new(
        registry,
        Arc::new(OsInspector::new()),
        Arc::new(ShellLauncher),
    )
    .with_options(ControllerOptions {
        tail_poll_interval: support::tail_poll_interval(),
    });

    discord::run(config, controller).await
}
