//! Configuration validation with aggregated errors.

use crate::cache::key::parse_targets;
use crate::config::types::{ServiceConfig, MAX_REFRESH_SECONDS};

/// Returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    if cfg.issuer.endpoint.trim().is_empty() {
        errors.push("issuer: 'endpoint' is empty".to_string());
    }
    if cfg.issuer.key_file.is_some() != cfg.issuer.cert_file.is_some() {
        errors.push("issuer: 'key_file' and 'cert_file' must be set together".to_string());
    }

    if let Err(e) = parse_targets(&cfg.token.target_domain_roles) {
        errors.push(format!("token.target_domain_roles: {}", e));
    }
    if cfg.token.refresh_seconds == 0 {
        errors.push("token: 'refresh_seconds' must be positive".to_string());
    } else if cfg.token.refresh_seconds > MAX_REFRESH_SECONDS {
        errors.push(format!("token: 'refresh_seconds' must not exceed {}", MAX_REFRESH_SECONDS));
    }
    if cfg.token.expiry_seconds < 0 {
        errors.push("token: 'expiry_seconds' must not be negative".to_string());
    }

    let server = &cfg.token.server;
    let has_cert = server.tls_cert_path.as_deref().is_some_and(|p| !p.is_empty());
    let has_key = server.tls_key_path.as_deref().is_some_and(|p| !p.is_empty());
    if server.timeout_seconds == 0 {
        errors.push("token.server: 'timeout_seconds' must be positive".to_string());
    }
    if has_cert != has_key {
        errors.push("token.server: 'tls_cert_path' and 'tls_key_path' must be set together".to_string());
    }

    if let Some(logging) = &cfg.settings.logging {
        if !matches!(logging.level.to_lowercase().as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            errors.push(format!("settings.logging: unknown level '{}'", logging.level));
        }
    }
    if cfg.settings.metrics.is_enabled && !cfg.settings.metrics.path.starts_with('/') {
        errors.push("settings.metrics: 'path' must start with '/'".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
