use std::future::Future;

use anyhow::Result;

use crate::cache::key::CacheKey;
use crate::cache::token::{AccessToken, RoleToken};

/// Upstream token issuer.
///
/// Calls are made only from the refresh activity, strictly one at a time,
/// and are never cancelled once issued.
pub trait TokenIssuer: Send + Sync + 'static {
    fn fetch_access_token(
        &self,
        key: &CacheKey,
        caller_service: &str,
    ) -> impl Future<Output = Result<AccessToken>> + Send;

    fn fetch_role_token(&self, key: &CacheKey) -> impl Future<Output = Result<RoleToken>> + Send;
}
