use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use http::header::{HeaderName, HeaderValue, CONNECTION};
use http::StatusCode;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::token::{AccessToken, RoleToken};
use crate::cache::token_cache::TokenCache;
use crate::config::settings::MetricsConfig;
use crate::config::types::{ServerSettings, TokenMode};
use crate::daemon::error::DaemonError;
use crate::observability::metrics::get_metrics;
use crate::observability::routes;
use crate::server::handlers;
use crate::server::tls::{load_server_config, TlsListener};

/// Switch for HTTP keep-alive. Once disabled, every response asks the client
/// to close its connection.
#[derive(Debug, Clone)]
pub struct KeepAlive(Arc<AtomicBool>);

impl Default for KeepAlive {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl KeepAlive {
    pub fn disable(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub access_token_cache: TokenCache<AccessToken>,
    pub role_token_cache: TokenCache<RoleToken>,
    pub token_mode: TokenMode,
    pub role_auth_header: HeaderName,
    pub keep_alive: KeepAlive,
    pub request_timeout: Duration,
    pub registry: Registry,
}

impl AppState {
    pub fn new(
        access_token_cache: TokenCache<AccessToken>,
        role_token_cache: TokenCache<RoleToken>,
        token_mode: TokenMode,
        role_auth_header: &str,
        request_timeout: Duration,
        registry: Registry,
    ) -> Result<Self, DaemonError> {
        let role_auth_header = HeaderName::from_bytes(role_auth_header.as_bytes())
            .map_err(|e| DaemonError::Config(format!("invalid role auth header '{}': {}", role_auth_header, e)))?;
        Ok(Self {
            access_token_cache,
            role_token_cache,
            token_mode,
            role_auth_header,
            keep_alive: KeepAlive::default(),
            request_timeout,
            registry,
        })
    }
}

/// Token routes plus the metrics route, wrapped in timeout and keep-alive handling.
pub fn router(state: AppState, rest_api: bool, metrics_config: &MetricsConfig) -> Router {
    let mut router = Router::new();
    if rest_api {
        if state.token_mode.access_token {
            router = router.route("/accesstoken", post(handlers::post_access_token));
        }
        if state.token_mode.role_token {
            router = router.route("/roletoken", post(handlers::post_role_token));
        }
    } else {
        router = router.route("/", get(handlers::get_tokens_by_headers));
    }

    router
        .merge(routes::router(metrics_config))
        .layer(from_fn_with_state(state.clone(), enforce_timeout))
        .layer(from_fn_with_state(state.clone(), close_unless_keep_alive))
        .with_state(state)
}

async fn enforce_timeout(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match tokio::time::timeout(state.request_timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "request timed out").into_response(),
    }
}

async fn close_unless_keep_alive(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    if !state.keep_alive.is_enabled() {
        response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
    }
    response
}

pub enum TokenServerListener {
    Plain(TcpListener),
    Tls(TlsListener),
}

impl TokenServerListener {
    /// Bind the configured address, with TLS when certificate and key are set.
    pub async fn bind(settings: &ServerSettings) -> Result<Self> {
        let listener = TcpListener::bind(&settings.addr)
            .await
            .with_context(|| format!("failed to bind token server to {}", settings.addr))?;
        match &settings.tls {
            Some(paths) => Ok(Self::Tls(TlsListener::new(listener, load_server_config(paths)?)?)),
            None => Ok(Self::Plain(listener)),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            Self::Plain(listener) => listener.local_addr(),
            Self::Tls(listener) => listener.local_addr(),
        }
    }
}

/// Serve until `stop` is cancelled and in-flight requests have drained.
/// The returned handle completes once the server has stopped.
pub fn spawn_server(listener: TokenServerListener, app: Router, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let metrics = get_metrics().await;
        let addr = listener.local_addr().map(|a| a.to_string()).unwrap_or_default();
        info!("Starting token provider[{}]", addr);
        metrics.up.set(1);

        let signal = async move { stop.cancelled().await };
        let result = match listener {
            TokenServerListener::Plain(listener) => axum::serve(listener, app).with_graceful_shutdown(signal).await,
            TokenServerListener::Tls(listener) => axum::serve(listener, app).with_graceful_shutdown(signal).await,
        };
        if let Err(e) = result {
            error!("Failed to serve token provider: {}", e);
        }
        metrics.up.set(0);
        info!("Token provider[{}] stopped", addr);
    })
}
