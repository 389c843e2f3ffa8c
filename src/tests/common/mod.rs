// src/tests/common/mod.rs
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;

use crate::cache::key::CacheKey;
use crate::cache::token::{AccessToken, RoleToken, TokenKind};
use crate::config::settings::MetricsConfig;
use crate::config::types::{DaemonConfig, ServerSettings, TokenMode};
use crate::helpers::time::now_i64;
use crate::sources::issuer::TokenIssuer;

pub const ACCESS_ONLY: TokenMode = TokenMode { access_token: true, role_token: false };
pub const BOTH_KINDS: TokenMode = TokenMode { access_token: true, role_token: true };

#[derive(Default)]
struct MockIssuerState {
    calls: Vec<(TokenKind, String)>,
    // remaining failures per (kind, domain); usize::MAX fails forever
    failures: HashMap<(TokenKind, String), usize>,
    delay: Duration,
}

/// In-memory issuer. Clones share state, so a test can keep a handle while
/// the daemon owns another.
#[derive(Clone, Default)]
pub struct MockIssuer {
    state: Arc<Mutex<MockIssuerState>>,
}

impl MockIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, kind: TokenKind, domain: &str, times: usize) {
        self.state.lock().unwrap().failures.insert((kind, domain.to_owned()), times);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn calls(&self) -> Vec<(TokenKind, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    fn record(&self, kind: TokenKind, key: &CacheKey) -> (Result<usize>, Duration) {
        let mut state = self.state.lock().unwrap();
        state.calls.push((kind, key.domain.clone()));
        let n = state.calls.len();
        let delay = state.delay;

        if let Some(remaining) = state.failures.get_mut(&(kind, key.domain.clone())) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return (Err(anyhow!("issuer unavailable for {} {}", kind, key)), delay);
            }
        }
        (Ok(n), delay)
    }
}

impl TokenIssuer for MockIssuer {
    async fn fetch_access_token(&self, key: &CacheKey, _caller_service: &str) -> Result<AccessToken> {
        let (result, delay) = self.record(TokenKind::AccessToken, key);
        tokio::time::sleep(delay).await;
        let n = result?;
        Ok(AccessToken::new(
            key.domain.clone(),
            key.role.clone(),
            format!("at-{}-{}", key.domain, n).into_bytes(),
            format!("{}:role.{}", key.domain, key.role),
            now_i64() + 3600,
        ))
    }

    async fn fetch_role_token(&self, key: &CacheKey) -> Result<RoleToken> {
        let (result, delay) = self.record(TokenKind::RoleToken, key);
        tokio::time::sleep(delay).await;
        let n = result?;
        Ok(RoleToken::new(
            key.domain.clone(),
            key.role.clone(),
            format!("rt-{}-{}", key.domain, n).into_bytes(),
            now_i64() + 3600,
        ))
    }
}

pub fn daemon_config(targets: &str, token_mode: TokenMode, token_dir: Option<PathBuf>) -> DaemonConfig {
    DaemonConfig {
        target_domain_roles: targets.to_owned(),
        token_mode,
        refresh: Duration::from_secs(60),
        expiry_seconds: 0,
        token_dir,
        rest_api: true,
        role_auth_header: "Athenz-Role-Auth".to_owned(),
        caller_service: String::new(),
        init: false,
        server: ServerSettings {
            addr: "127.0.0.1:0".to_owned(),
            tls: None,
            request_timeout: Duration::from_secs(3),
        },
        shutdown_delay: Duration::ZERO,
        shutdown_timeout: Duration::from_secs(5),
        metrics: MetricsConfig::default(),
    }
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}
