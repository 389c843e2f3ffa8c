use std::fs;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Certificate, Client, Identity, Response};
use serde::Deserialize;
use tracing::debug;

use crate::cache::key::CacheKey;
use crate::cache::token::{AccessToken, RoleToken};
use crate::config::types::IssuerConfig;
use crate::helpers::time::now_i64;
use crate::sources::issuer::TokenIssuer;

const ERROR_BODY_EXCERPT: usize = 256;

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    scope: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleTokenResponse {
    token: String,
    expiry_time: i64,
}

/// HTTP client for a ZTS-style token issuer.
#[derive(Debug, Clone)]
pub struct ZtsClient {
    client: Client,
    endpoint: String,
}

impl ZtsClient {
    pub fn new(config: &IssuerConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.timeout_seconds));

        if let (Some(key_file), Some(cert_file)) = (&config.key_file, &config.cert_file) {
            let mut pem = fs::read(cert_file).with_context(|| format!("failed to read issuer cert file {}", cert_file))?;
            pem.push(b'\n');
            pem.extend(fs::read(key_file).with_context(|| format!("failed to read issuer key file {}", key_file))?);
            builder = builder.identity(Identity::from_pem(&pem).context("invalid issuer client identity")?);
        }
        if let Some(ca_file) = &config.ca_cert_file {
            let ca = fs::read(ca_file).with_context(|| format!("failed to read issuer CA file {}", ca_file))?;
            builder = builder.add_root_certificate(Certificate::from_pem(&ca).context("invalid issuer CA certificate")?);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
        })
    }

    fn access_token_scope(key: &CacheKey, caller_service: &str) -> String {
        let scope = format!("{}:role.{}", key.domain, key.role);
        if caller_service.is_empty() {
            return scope;
        }
        format!("{} openid {}:service.{}", scope, key.domain, caller_service)
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    Err(anyhow!("issuer responded with status {}: {}", status, excerpt))
}

impl TokenIssuer for ZtsClient {
    async fn fetch_access_token(&self, key: &CacheKey, caller_service: &str) -> Result<AccessToken> {
        let url = format!("{}/oauth2/token", self.endpoint);
        let mut form = vec![
            ("grant_type", "client_credentials".to_owned()),
            ("scope", Self::access_token_scope(key, caller_service)),
        ];
        if let Some(expires_in) = key.max_expiry.filter(|e| *e > 0) {
            form.push(("expires_in", expires_in.to_string()));
        }
        debug!("requesting access token for {} at {}", key, url);

        let response = ensure_success(self.client.post(&url).form(&form).send().await?).await?;
        let body: AccessTokenResponse = response.json().await.context("invalid access token response")?;

        Ok(AccessToken::new(
            key.domain.clone(),
            key.role.clone(),
            body.access_token.into_bytes(),
            body.scope,
            now_i64() + body.expires_in,
        ))
    }

    async fn fetch_role_token(&self, key: &CacheKey) -> Result<RoleToken> {
        let url = format!("{}/domain/{}/token", self.endpoint, key.domain);
        let mut query = vec![("role", key.role.clone())];
        if let Some(min_expiry) = key.min_expiry.filter(|e| *e > 0) {
            query.push(("minExpiryTime", min_expiry.to_string()));
        }
        debug!("requesting role token for {} at {}", key, url);

        let response = ensure_success(self.client.get(&url).query(&query).send().await?).await?;
        let body: RoleTokenResponse = response.json().await.context("invalid role token response")?;

        Ok(RoleToken::new(key.domain.clone(), key.role.clone(), body.token.into_bytes(), body.expiry_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    fn issuer_config(endpoint: String) -> IssuerConfig {
        IssuerConfig {
            endpoint,
            key_file: None,
            cert_file: None,
            ca_cert_file: None,
            service_account: None,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn fetches_access_token() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/zts/v1/oauth2/token");
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({
                        "access_token": "at-abc",
                        "token_type": "Bearer",
                        "expires_in": 3600,
                        "scope": "domA:role.roleA"
                    }));
            })
            .await;

        let client = ZtsClient::new(&issuer_config(format!("{}/zts/v1/", server.base_url())))?;
        let key = CacheKey::access_token("domA", "roleA", 3600);
        let before = now_i64();
        let token = client.fetch_access_token(&key, "").await?;

        mock.assert_async().await;
        assert_eq!(token.raw, b"at-abc".to_vec());
        assert_eq!(token.scope, "domA:role.roleA");
        assert_eq!(token.domain, "domA");
        assert!(token.expiry >= before + 3600);
        Ok(())
    }

    #[tokio::test]
    async fn fetches_role_token() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/domain/domB/token")
                    .query_param("role", "roleB")
                    .query_param("minExpiryTime", "900");
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({ "token": "v=Z1;d=domB;r=roleB", "expiryTime": 1900000000 }));
            })
            .await;

        let client = ZtsClient::new(&issuer_config(server.base_url()))?;
        let token = client.fetch_role_token(&CacheKey::role_token("domB", "roleB", 900)).await?;

        mock.assert_async().await;
        assert_eq!(token.raw, b"v=Z1;d=domB;r=roleB".to_vec());
        assert_eq!(token.expiry, 1_900_000_000);
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() -> Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/domain/domB/token");
                then.status(403).body("forbidden");
            })
            .await;

        let client = ZtsClient::new(&issuer_config(server.base_url()))?;
        let err = client.fetch_role_token(&CacheKey::role_token("domB", "roleB", 0)).await.unwrap_err();
        assert!(err.to_string().contains("403"));
        Ok(())
    }

    #[test]
    fn scope_includes_caller_service_when_present() {
        let key = CacheKey::access_token("dom", "reader", 0);
        assert_eq!(ZtsClient::access_token_scope(&key, ""), "dom:role.reader");
        assert_eq!(ZtsClient::access_token_scope(&key, "api"), "dom:role.reader openid dom:service.api");
    }
}
