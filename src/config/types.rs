use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::settings::{MetricsConfig, SettingsConfig};

/// Upper bound for `refresh_seconds`: one week.
pub const MAX_REFRESH_SECONDS: u64 = 7 * 24 * 60 * 60;

/// ================================
/// Full service configuration (YAML)
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    pub issuer: IssuerConfig,
    pub token: TokenConfig,
}

/// Upstream token issuer connection.
#[derive(Debug, Deserialize, Clone)]
pub struct IssuerConfig {
    /// base url, e.g. https://zts.example.com/zts/v1
    pub endpoint: String,
    pub key_file: Option<String>,
    pub cert_file: Option<String>,
    pub ca_cert_file: Option<String>,
    /// caller service name sent along with access token requests
    pub service_account: Option<String>,
    #[serde(default = "default_issuer_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    /// comma separated `domain:role.role` pairs
    #[serde(default)]
    pub target_domain_roles: String,
    /// comma separated: accesstoken, roletoken
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    /// requested token lifetime, 0 lets the issuer decide
    #[serde(default)]
    pub expiry_seconds: i64,
    /// empty disables token files
    #[serde(default)]
    pub dir: String,
    #[serde(default = "default_true")]
    pub rest_api: bool,
    #[serde(default = "default_role_auth_header")]
    pub role_auth_header: String,
    /// fetch once and exit without serving
    #[serde(default)]
    pub init: bool,
    #[serde(default)]
    pub server: TokenServerConfig,
    #[serde(default)]
    pub shutdown_delay_seconds: u64,
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenServerConfig {
    /// empty disables the token daemon
    #[serde(default)]
    pub addr: String,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub tls_ca_path: Option<String>,
    #[serde(default = "default_server_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for TokenServerConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            tls_cert_path: None,
            tls_key_path: None,
            tls_ca_path: None,
            timeout_seconds: default_server_timeout_seconds(),
        }
    }
}

/// Which token kinds are maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenMode {
    pub access_token: bool,
    pub role_token: bool,
}

impl TokenMode {
    pub fn parse(token_type: &str) -> Self {
        let mut mode = TokenMode::default();
        for kind in token_type.split(',').map(|t| t.trim().to_lowercase()) {
            match kind.as_str() {
                "accesstoken" => mode.access_token = true,
                "roletoken" => mode.role_token = true,
                _ => {}
            }
        }
        mode
    }

    pub fn is_disabled(&self) -> bool {
        !self.access_token && !self.role_token
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: String,
    pub tls: Option<TlsPaths>,
    pub request_timeout: Duration,
}

/// Validated view of the configuration consumed by the token daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub target_domain_roles: String,
    pub token_mode: TokenMode,
    pub refresh: Duration,
    pub expiry_seconds: i64,
    pub token_dir: Option<PathBuf>,
    pub rest_api: bool,
    pub role_auth_header: String,
    pub caller_service: String,
    pub init: bool,
    pub server: ServerSettings,
    pub shutdown_delay: Duration,
    pub shutdown_timeout: Duration,
    pub metrics: MetricsConfig,
}

impl DaemonConfig {
    pub fn from_service_config(cfg: &ServiceConfig) -> Self {
        let token = &cfg.token;
        let tls = match (&token.server.tls_cert_path, &token.server.tls_key_path) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some(TlsPaths {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
                ca_path: token.server.tls_ca_path.as_ref().filter(|p| !p.is_empty()).map(PathBuf::from),
            }),
            _ => None,
        };

        Self {
            target_domain_roles: token.target_domain_roles.clone(),
            token_mode: TokenMode::parse(&token.token_type),
            refresh: Duration::from_secs(token.refresh_seconds),
            expiry_seconds: token.expiry_seconds,
            token_dir: Some(token.dir.trim()).filter(|d| !d.is_empty()).map(PathBuf::from),
            rest_api: token.rest_api,
            role_auth_header: token.role_auth_header.clone(),
            caller_service: cfg.issuer.service_account.clone().unwrap_or_default(),
            init: token.init,
            server: ServerSettings {
                addr: token.server.addr.clone(),
                tls,
                request_timeout: Duration::from_secs(token.server.timeout_seconds),
            },
            shutdown_delay: Duration::from_secs(token.shutdown_delay_seconds),
            shutdown_timeout: Duration::from_secs(token.shutdown_timeout_seconds),
            metrics: cfg.settings.metrics.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_token_type() -> String {
    "accesstoken".to_owned()
}

fn default_refresh_seconds() -> u64 {
    30 * 60
}

fn default_role_auth_header() -> String {
    "Athenz-Role-Auth".to_owned()
}

fn default_shutdown_timeout_seconds() -> u64 {
    5
}

fn default_server_timeout_seconds() -> u64 {
    3
}

fn default_issuer_timeout_seconds() -> u64 {
    10
}
