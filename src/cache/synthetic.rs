//! Bulk synthetic tokens for load and capacity testing. Debug builds only.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::cache::key::CacheKey;
use crate::cache::token::{AccessToken, RoleToken};
use crate::cache::token_cache::TokenCache;

// average sizes of real tokens
const ACCESS_TOKEN_BYTES: usize = 750;
const ROLE_TOKEN_BYTES: usize = 550;
const SYNTHETIC_EXPIRY: i64 = 1_864_233_600;

fn random_payload(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    STANDARD.encode(buf).into_bytes()
}

/// Store `count` random entries of both kinds, starting at `start_index`.
pub fn add_synthetic_tokens(
    access_token_cache: &TokenCache<AccessToken>,
    role_token_cache: &TokenCache<RoleToken>,
    start_index: usize,
    count: usize,
) {
    warn!("Generating fake tokens for testing ...");
    for i in start_index..start_index + count {
        let domain = format!("domain{}", i);
        let role = format!("role{}", i);

        access_token_cache.store(
            CacheKey::access_token(&domain, &role, 0),
            AccessToken::new(domain.clone(), role.clone(), random_payload(ACCESS_TOKEN_BYTES), String::new(), SYNTHETIC_EXPIRY),
        );
        role_token_cache.store(
            CacheKey::role_token(&domain, &role, 0),
            RoleToken::new(domain, role, random_payload(ROLE_TOKEN_BYTES), SYNTHETIC_EXPIRY),
        );
    }
    warn!("Generating fake tokens for testing ...END");
}

pub fn spawn_synthetic_tokens(
    access_token_cache: TokenCache<AccessToken>,
    role_token_cache: TokenCache<RoleToken>,
    delay: Duration,
    count: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        add_synthetic_tokens(&access_token_cache, &role_token_cache, 0, count);
    })
}
