use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::batch::PreparedBatch;
use crate::cache::key::{parse_targets, CacheKey};
use crate::cache::token::{AccessToken, RoleToken, Token, TokenKind};
use crate::cache::token_cache::TokenCache;
use crate::config::types::{DaemonConfig, MAX_REFRESH_SECONDS};
use crate::daemon::error::DaemonError;
use crate::observability::cache_collector::CachedTokenCollector;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::resilience::retry::RetrySettings;
use crate::sinks::file_writer::StagedWriter;
use crate::sources::issuer::TokenIssuer;

const TOKEN_FILE_MODE: u32 = 0o644;
static SUCCESS_MSG: &str = "success";
static FAILURE_MSG: &str = "failure";

/// Owns both token caches and the issuer client.
pub struct TokenDaemon<I: TokenIssuer> {
    access_token_cache: TokenCache<AccessToken>,
    role_token_cache: TokenCache<RoleToken>,
    issuer: I,
    caller_service: String,
    token_dir: Option<PathBuf>,
    refresh: Duration,
    retry: RetrySettings,
}

impl<I: TokenIssuer> TokenDaemon<I> {
    /// Build the caches with one placeholder per configured target and kind.
    pub fn new(config: &DaemonConfig, issuer: I) -> Result<Self, DaemonError> {
        if config.refresh.is_zero() {
            return Err(DaemonError::Config("token refresh interval must be positive".to_owned()));
        }
        if config.refresh > Duration::from_secs(MAX_REFRESH_SECONDS) {
            return Err(DaemonError::Config(format!(
                "token refresh interval {:?} exceeds {}s",
                config.refresh, MAX_REFRESH_SECONDS
            )));
        }
        let targets = parse_targets(&config.target_domain_roles)?;

        let access_token_cache = TokenCache::new();
        let role_token_cache = TokenCache::new();
        for (domain, role) in &targets {
            if config.token_mode.access_token {
                access_token_cache.store(CacheKey::access_token(domain, role, config.expiry_seconds), AccessToken::default());
            }
            if config.token_mode.role_token {
                role_token_cache.store(CacheKey::role_token(domain, role, config.expiry_seconds), RoleToken::default());
            }
        }
        info!(
            "token caches initialized: targets[{}], accessTokens({}), roleTokens({})",
            targets.len(),
            access_token_cache.len(),
            role_token_cache.len()
        );

        Ok(Self {
            access_token_cache,
            role_token_cache,
            issuer,
            caller_service: config.caller_service.clone(),
            token_dir: config.token_dir.clone(),
            refresh: config.refresh,
            retry: RetrySettings::for_refresh_interval(config.refresh),
        })
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn access_token_cache(&self) -> &TokenCache<AccessToken> {
        &self.access_token_cache
    }

    pub fn role_token_cache(&self) -> &TokenCache<RoleToken> {
        &self.role_token_cache
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh
    }

    /// Collector for the `cached_token_*` gauges of both caches.
    pub fn cache_collector(&self) -> prometheus::Result<CachedTokenCollector> {
        CachedTokenCollector::new(self.access_token_cache.clone(), self.role_token_cache.clone())
    }

    /// `update_token` under exponential backoff bounded by a quarter of the
    /// refresh interval. On exhaustion the cache keeps its previous state.
    pub async fn update_token_with_retry(&self) -> Result<(), DaemonError> {
        self.retry.run_with_retry(|| self.update_token()).await
    }

    /// One refresh cycle followed by writing the token files.
    pub async fn update_token(&self) -> Result<(), DaemonError> {
        let metrics = get_metrics().await;
        let start = Instant::now();
        let result = self.fetch_tokens_and_update_caches().await;
        metrics.refresh_duration.observe(start.elapsed().as_secs_f64());

        if let Err(e) = result {
            warn!("Error while requesting tokens: {}", e);
            metrics.refresh_cycles.with_label_values(&[FAILURE_MSG]).inc();
            return Err(e);
        }
        metrics.refresh_cycles.with_label_values(&[SUCCESS_MSG]).inc();

        self.write_files().await.inspect_err(|e| {
            error!("{}", e);
            metrics.token_file_write_failures.inc();
        })
    }

    /// Fetch every target of both kinds, then commit all of them as a batch.
    ///
    /// Fetches run sequentially in key order. The first failure aborts the
    /// cycle before any cache mutation. Returns the number of committed
    /// access and role tokens.
    pub async fn fetch_tokens_and_update_caches(&self) -> Result<(usize, usize), DaemonError> {
        let metrics = get_metrics().await;
        let at_targets = self.access_token_cache.keys();
        let rt_targets = self.role_token_cache.keys();
        info!(
            "Attempting to fetch tokens from issuer: access token targets{:?}, role token targets{:?}",
            at_targets.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            rt_targets.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        );

        let mut at_batch = PreparedBatch::with_capacity(at_targets.len());
        for key in at_targets {
            metrics.issuer_fetch_requests.with_label_values(&[AccessToken::KIND.as_str()]).inc();
            let token = self
                .issuer
                .fetch_access_token(&key, &self.caller_service)
                .await
                .map_err(|source| fetch_error(metrics, AccessToken::KIND, &key, source))?;
            debug!("Successfully received token from issuer: accessTokens({}, len={})", key, token.raw().len());
            at_batch.push(key, token);
        }

        let mut rt_batch = PreparedBatch::with_capacity(rt_targets.len());
        for key in rt_targets {
            metrics.issuer_fetch_requests.with_label_values(&[RoleToken::KIND.as_str()]).inc();
            let token = self
                .issuer
                .fetch_role_token(&key)
                .await
                .map_err(|source| fetch_error(metrics, RoleToken::KIND, &key, source))?;
            debug!("Successfully received token from issuer: roleTokens({}, len={})", key, token.raw().len());
            rt_batch.push(key, token);
        }

        let at_count = self.access_token_cache.commit(at_batch);
        let rt_count = self.role_token_cache.commit(rt_batch);
        info!("Successfully updated token cache: accessTokens({}), roleTokens({})", at_count, rt_count);
        Ok((at_count, rt_count))
    }

    /// Write one file per fetched token, all or nothing. Skipped when no
    /// token directory is configured.
    pub async fn write_files(&self) -> Result<(), DaemonError> {
        let Some(dir) = &self.token_dir else {
            debug!("Skipping to write token files, no token directory configured");
            return Ok(());
        };

        let mut writer = StagedWriter::new();
        self.access_token_cache.range(|key, token| stage_token(&mut writer, dir, key, token))?;
        self.role_token_cache.range(|key, token| stage_token(&mut writer, dir, key, token))?;

        if writer.is_empty() {
            return Ok(());
        }
        writer.save().await.map_err(DaemonError::Persist)
    }
}

/// `<dir>/<domain>:role.<role>.accesstoken` or `.roletoken`
pub fn token_file_path(dir: &Path, domain: &str, role: &str, kind: TokenKind) -> PathBuf {
    dir.join(format!("{}:role.{}.{}", domain, role, kind.as_str()))
}

fn stage_token<T: Token>(writer: &mut StagedWriter, dir: &Path, key: &CacheKey, token: &T) -> Result<(), DaemonError> {
    // nothing fetched yet for this target
    if token.is_placeholder() {
        return Ok(());
    }
    let out_path = token_file_path(dir, &key.domain, &key.role, T::KIND);
    info!("[New {}] Domain: {}, Role: {}", T::KIND, key.domain, key.role);
    debug!("Saving {}[{} bytes] at {}", T::KIND, token.raw().len(), out_path.display());
    writer
        .add_bytes(out_path, TOKEN_FILE_MODE, token.raw().to_vec())
        .map_err(|e| DaemonError::Persist(e.context(format!("unable to save {}", T::KIND))))
}

fn fetch_error(metrics: &Metrics, kind: TokenKind, key: &CacheKey, source: anyhow::Error) -> DaemonError {
    metrics.issuer_fetch_failures.with_label_values(&[kind.as_str()]).inc();
    DaemonError::Fetch {
        kind,
        domain: key.domain.clone(),
        role: key.role.clone(),
        source,
    }
}
