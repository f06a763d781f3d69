//  █████╗ ███╗   ██╗██████╗  █████╗ ███╗   ███╗███████╗███╗   ██╗████████╗ ██████╗
// ██╔══██╗████╗  ██║██╔══██╗██╔══██╗████╗ ████║██╔════╝████╗  ██║╚══██╔══╝██╔═══██╗
// ███████║██╔██╗ ██║██║  ██║███████║██╔████╔██║█████╗  ██╔██╗ ██║   ██║   ██║   ██║
// ██╔══██║██║╚██╗██║██║  ██║██╔══██║██║╚██╔╝██║██╔══╝  ██║╚██╗██║   ██║   ██║   ██║
// ██║  ██║██║ ╚████║██████╔╝██║  ██║██║ ╚═╝ ██║███████╗██║ ╚████║   ██║   ╚██████╔╝
// ╚═╝  ╚═╝╚═╝  ╚═══╝╚═════╝ ╚═╝  ╚═╝╚═╝     ╚═╝╚══════╝╚═╝  ╚═══╝   ╚═╝    ╚═════╝
//
// E N G I N E
//
// The docket-movement monitor. Polls the external docket API per tracked
// legal case, persists genuinely new relevant movements exactly once, and
// tells the lawyers. One case's bad day never becomes the batch's bad day.

mod classifier;
mod config;
mod diff;
mod fetcher;
mod models;
mod monitor;
mod normalizer;
mod redis_store;
mod scheduler;
mod server;
mod store;

use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::fetcher::JuditClient;
use crate::monitor::{MonitorService, SystemClock};
use crate::redis_store::RedisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("⚖️  ANDAMENTO ENGINE initializing...");

    let config = Config::from_env();
    info!(
        redis_url = config.redis_url.as_str(),
        docket_base_url = config.docket_base_url.as_str(),
        workers = config.workers,
        "configuration loaded"
    );

    let store = Arc::new(
        RedisStore::connect(&config.redis_url, config.notification_channel.clone()).await?,
    );

    // The monitor only exists when the docket token does. Without it the
    // server still runs and answers every trigger with the configuration
    // error, per the response contract.
    let monitor = match &config.docket_api_token {
        Some(token) => {
            let client = JuditClient::new(
                config.docket_base_url.clone(),
                token.clone(),
                config.fetch_limit,
                config.fetch_timeout,
            )?;
            Some(Arc::new(MonitorService::new(
                store,
                Arc::new(client),
                Arc::new(SystemClock),
                config.clone(),
            )))
        }
        None => {
            warn!("ANDAMENTO_DOCKET_API_TOKEN is not set — triggers will be refused with HTTP 500");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let port = config.http_port;
    let mut server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        server::run_trigger_server(monitor, port, &mut server_shutdown).await;
    });

    info!("═══════════════════════════════════════════════════════");
    info!("  🟢 ANDAMENTO ENGINE ACTIVE");
    info!("  📮 POST http://0.0.0.0:{port}/run to start a monitor run");
    info!("  ⚡ Press Ctrl+C for graceful shutdown");
    info!("═══════════════════════════════════════════════════════");

    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
        Err(err) => {
            error!("signal listener error: {err}");
            let _ = shutdown_tx.send(true);
        }
    }

    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), server_handle).await;

    info!("ANDAMENTO ENGINE: offline");
    Ok(())
}
