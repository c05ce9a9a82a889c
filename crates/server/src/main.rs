mod bootstrap;
mod chat;
mod health;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use ledgerbot_core::config::{AppConfig, LoadOptions, LogFormat};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Application;

const SESSION_SWEEP_SECS: u64 = 60;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = TcpListener::bind(&address).await?;

    spawn_session_sweeper(&app);
    info!(event_name = "system.server.started", bind_address = %address, "ledgerbot-server listening");

    axum::serve(listener, routes(&app)).with_graceful_shutdown(wait_for_shutdown()).await?;

    info!(event_name = "system.server.stopping", "draining database connections");
    let drain = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(drain, app.db_pool.close()).await.is_err() {
        warn!(
            event_name = "system.server.drain_timeout",
            graceful_shutdown_secs = app.config.server.graceful_shutdown_secs,
            "database pool did not close in time"
        );
    }

    Ok(())
}

fn routes(app: &Application) -> Router {
    health::router(app.db_pool.clone()).merge(chat::router(app.agent.clone()))
}

fn spawn_session_sweeper(app: &Application) {
    let agent = app.agent.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(SESSION_SWEEP_SECS));
        loop {
            ticker.tick().await;
            agent.sessions().purge_expired().await;
        }
    });
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(event_name = "system.server.signal_error", error = %error, "ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
    info!(event_name = "system.server.shutdown_requested", "shutdown signal received");
}
