use std::path::Path;

use anyhow::{anyhow, Result};
use regex::Regex;
use tokio::fs;
use tracing::{debug, error};

use crate::config::types::ServiceConfig;
use crate::config::validator;

/// Load and validate config from YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("failed to read config {}: {}", path.display(), e))?;

    let expanded = expand_env_vars(&content);
    parse_config(&expanded)
}

pub fn parse_config(content: &str) -> Result<ServiceConfig> {
    let service_config: ServiceConfig = serde_yaml::from_str(content)
        .inspect_err(|e| error!("parse config error: {}", e))?;

    debug!("validation config ...");
    validator::validate_service_config(&service_config)
        .map_err(|errors| anyhow!("Invalid config: {}", errors.join("; ")))?;

    Ok(service_config)
}

/// Replace `${VAR}` and `${VAR:default}` with environment values.
fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").expect("valid env var pattern");
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const CONFIG: &str = r#"
settings:
  logging:
    level: debug
    format: json
  metrics:
    is_enabled: true
issuer:
  endpoint: ${TOKEN_SIDECAR_TEST_ENDPOINT:https://zts.local/zts/v1}
  service_account: api
token:
  target_domain_roles: "domA:role.roleA,domB:role.roleB"
  token_type: accesstoken,roletoken
  refresh_seconds: 60
  dir: /var/run/tokens
  server:
    addr: 127.0.0.1:8880
"#;

    #[test]
    #[serial]
    fn expands_env_with_default() {
        std::env::remove_var("TOKEN_SIDECAR_TEST_ENDPOINT");
        let cfg = parse_config(&expand_env_vars(CONFIG)).unwrap();
        assert_eq!(cfg.issuer.endpoint, "https://zts.local/zts/v1");

        std::env::set_var("TOKEN_SIDECAR_TEST_ENDPOINT", "http://127.0.0.1:4443");
        let cfg = parse_config(&expand_env_vars(CONFIG)).unwrap();
        assert_eq!(cfg.issuer.endpoint, "http://127.0.0.1:4443");
        std::env::remove_var("TOKEN_SIDECAR_TEST_ENDPOINT");
    }

    #[test]
    #[serial]
    fn applies_defaults() {
        let cfg = parse_config(&expand_env_vars(CONFIG)).unwrap();
        assert!(cfg.token.rest_api);
        assert_eq!(cfg.token.role_auth_header, "Athenz-Role-Auth");
        assert_eq!(cfg.token.shutdown_timeout_seconds, 5);
        assert_eq!(cfg.settings.metrics.path, "/metrics");
        assert_eq!(cfg.token.server.timeout_seconds, 3);
    }

    #[test]
    fn rejects_invalid_targets() {
        let content = CONFIG.replace("domB:role.roleB", "domB-roleB").replace("${TOKEN_SIDECAR_TEST_ENDPOINT:https://zts.local/zts/v1}", "https://zts.local");
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("target_domain_roles"));
    }

    #[test]
    fn rejects_unbounded_refresh_interval() {
        let content = CONFIG
            .replace("refresh_seconds: 60", "refresh_seconds: 18446744073709551615")
            .replace("${TOKEN_SIDECAR_TEST_ENDPOINT:https://zts.local/zts/v1}", "https://zts.local");
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("refresh_seconds"), "{err}");
    }
}
