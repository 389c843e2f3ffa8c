use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::types::DaemonConfig;
use crate::daemon::error::DaemonError;
use crate::daemon::refresh::TokenDaemon;
use crate::daemon::report::MetricsReporter;
use crate::server::server::{router, spawn_server, AppState, KeepAlive, TokenServerListener};
use crate::sources::issuer::TokenIssuer;

pub const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Running token daemon. Completes once the refresh activity has shut the
/// token server down after the shutdown signal.
pub struct TokendHandle {
    pub local_addr: SocketAddr,
    done: JoinHandle<()>,
}

impl TokendHandle {
    pub async fn wait(self) {
        if let Err(e) = self.done.await {
            error!("token refresh activity terminated abnormally: {}", e);
        }
    }
}

/// Start the token server, the refresh loop and the report loop.
///
/// All three activities observe the same `shutdown` token. Returns `None`
/// when the daemon is disabled by configuration, runs in init mode, or
/// `shutdown` fired before serving started.
/// Cache gauges are registered in `registry`, which the metrics route also
/// serves.
pub async fn tokend<I: TokenIssuer>(
    config: &DaemonConfig,
    issuer: I,
    registry: Registry,
    shutdown: CancellationToken,
) -> Result<Option<TokendHandle>, DaemonError> {
    if config.server.addr.is_empty() || config.token_mode.is_disabled() {
        info!(
            "Token server is disabled due to insufficient options: address[{}], roles[{}], token-type[{:?}]",
            config.server.addr, config.target_domain_roles, config.token_mode
        );
        return Ok(None);
    }

    let daemon = Arc::new(TokenDaemon::new(config, issuer)?);
    match daemon.cache_collector() {
        Ok(collector) => {
            if let Err(e) = registry.register(Box::new(collector)) {
                warn!("failed to register cache metrics: {}", e);
            }
        }
        Err(e) => warn!("failed to create cache metrics: {}", e),
    }

    if let Err(e) = daemon.update_token_with_retry().await {
        error!("Failed to get initial tokens after multiple retries: {}", e);
    }
    if config.init {
        info!("Token server is disabled for init mode: address[{}]", config.server.addr);
        return Ok(None);
    }
    if shutdown.is_cancelled() {
        info!("Shutdown requested during initial token fetch, token server not started");
        return Ok(None);
    }

    let state = AppState::new(
        daemon.access_token_cache().clone(),
        daemon.role_token_cache().clone(),
        config.token_mode,
        &config.role_auth_header,
        config.server.request_timeout,
        registry,
    )?;
    let keep_alive = state.keep_alive.clone();
    let app = router(state, config.rest_api, &config.metrics);

    let listener = TokenServerListener::bind(&config.server).await.map_err(DaemonError::Server)?;
    let local_addr = listener.local_addr().map_err(|e| DaemonError::Server(e.into()))?;
    let server_stop = CancellationToken::new();
    let server_done = spawn_server(listener, app, server_stop.clone());

    let shutdown_plan = ShutdownPlan {
        delay: config.shutdown_delay,
        timeout: config.shutdown_timeout,
        keep_alive,
        server_stop,
        server_done,
    };
    let done = tokio::spawn(refresh_loop(daemon.clone(), shutdown.clone(), shutdown_plan));

    #[cfg(feature = "debug-tokens")]
    crate::cache::synthetic::spawn_synthetic_tokens(
        daemon.access_token_cache().clone(),
        daemon.role_token_cache().clone(),
        Duration::from_secs(30),
        100,
    );

    let reporter = MetricsReporter::new(daemon.access_token_cache().clone(), daemon.role_token_cache().clone());
    tokio::spawn(report_loop(reporter, REPORT_INTERVAL, shutdown));

    Ok(Some(TokendHandle { local_addr, done }))
}

/// Steps the refresh activity takes to stop the token server.
pub struct ShutdownPlan {
    pub delay: Duration,
    pub timeout: Duration,
    pub keep_alive: KeepAlive,
    pub server_stop: CancellationToken,
    pub server_done: JoinHandle<()>,
}

impl ShutdownPlan {
    /// Grace delay, keep-alives off, then a graceful stop bounded by `timeout`.
    pub async fn execute(self) -> Result<(), DaemonError> {
        sleep(self.delay).await;
        self.keep_alive.disable();
        self.server_stop.cancel();
        match timeout(self.timeout, self.server_done).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DaemonError::Server(e.into())),
            Err(_) => Err(DaemonError::ShutdownTimeout(self.timeout)),
        }
    }
}

async fn refresh_loop<I: TokenIssuer>(daemon: Arc<TokenDaemon<I>>, shutdown: CancellationToken, plan: ShutdownPlan) {
    let refresh = daemon.refresh_interval();
    // a cycle outliving the interval leaves at most one tick pending
    let mut ticker = interval_at(Instant::now() + refresh, refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        info!("Will refresh tokens after {:?}", refresh);
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = daemon.update_token_with_retry().await {
                    error!("Failed to refresh tokens after multiple retries: {}", e);
                }
            }
            _ = shutdown.cancelled() => {
                info!("Initiating shutdown of token provider daemon ...");
                match plan.execute().await {
                    Ok(()) => info!("Token provider daemon stopped"),
                    Err(DaemonError::ShutdownTimeout(t)) => {
                        error!("Failed to shutdown token provider within {:?}", t);
                        std::process::exit(1);
                    }
                    Err(e) => error!("Token provider stopped with error: {}", e),
                }
                return;
            }
        }
    }
}

/// No completion handshake: stops as soon as shutdown is observed.
pub async fn report_loop(mut reporter: MetricsReporter, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reporter.report().await;
            }
            _ = shutdown.cancelled() => return,
        }
    }
}
