use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use token_sidecar::config::loader::file_to_config;
use token_sidecar::config::types::DaemonConfig;
use token_sidecar::observability::metrics::get_metrics;
use token_sidecar::sources::zts::ZtsClient;
use token_sidecar::tokend;
use token_sidecar::utils::logging::{self, LogLevel};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-sidecar.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, start logging
    // -------------------------------

    let args = Args::parse();
    let service_config = file_to_config(Path::new(&args.config)).await?;
    logging::init_logging(&logging::resolve(&service_config, args.log_level));
    let daemon_config = DaemonConfig::from_service_config(&service_config);

    // -------------------------------
    // 2. Create issuer client
    // -------------------------------

    let issuer = ZtsClient::new(&service_config.issuer)?;

    // -------------------------------
    // 3. Forward SIGINT / SIGTERM to the shared shutdown token
    // -------------------------------

    let shutdown = CancellationToken::new();
    forward_signals(shutdown.clone())?;

    // -------------------------------
    // 4. Start token daemon: server, refresh and report activities
    // -------------------------------

    let registry = get_metrics().await.registry.clone();
    let Some(handle) = tokend(&daemon_config, issuer, registry, shutdown.clone()).await? else {
        info!("Token daemon not started, exiting");
        return Ok(());
    };
    info!("Service started, token provider listening on {}", handle.local_addr);

    // -------------------------------
    // 5. Wait for shutdown, then for the daemon to complete
    // -------------------------------

    shutdown.cancelled().await;
    handle.wait().await;

    info!("Exiting application.");
    Ok(())
}

/// Install the handlers now and cancel `shutdown` on the first signal.
fn forward_signals(shutdown: CancellationToken) -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT. Initiating graceful shutdown..."),
            _ = sigterm.recv() => info!("Received SIGTERM. Initiating graceful shutdown..."),
        }
        shutdown.cancel();
    });
    Ok(())
}
