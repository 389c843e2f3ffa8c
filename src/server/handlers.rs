use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::token::{Token, TokenKind};
use crate::cache::token_cache::TokenCache;
use crate::helpers::time::remaining_seconds;
use crate::server::server::AppState;

const DOMAIN_HEADER: &str = "X-Athenz-Domain";
const ROLE_HEADER: &str = "X-Athenz-Role";

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub domain: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scope: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleTokenResponse {
    pub token: String,
    pub expiry_time: i64,
}

/// Latest committed token for the target; placeholders count as absent.
fn lookup<T: Token>(cache: &TokenCache<T>, domain: &str, role: &str) -> Option<T> {
    cache.find(domain, role).filter(|token| !token.is_placeholder())
}

fn not_found(kind: TokenKind, domain: &str, role: &str) -> Response {
    debug!("{} not found: {}:role.{}", kind, domain, role);
    (StatusCode::NOT_FOUND, format!("{} not found for {}:role.{}", kind, domain, role)).into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

pub async fn post_access_token(State(state): State<AppState>, request: Result<Json<TokenRequest>, JsonRejection>) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match lookup(&state.access_token_cache, &request.domain, &request.role) {
        Some(token) => Json(AccessTokenResponse {
            access_token: String::from_utf8_lossy(token.raw()).into_owned(),
            token_type: "Bearer",
            expires_in: remaining_seconds(token.expiry()),
            scope: token.scope().to_owned(),
        })
        .into_response(),
        None => not_found(TokenKind::AccessToken, &request.domain, &request.role),
    }
}

pub async fn post_role_token(State(state): State<AppState>, request: Result<Json<TokenRequest>, JsonRejection>) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match lookup(&state.role_token_cache, &request.domain, &request.role) {
        Some(token) => Json(RoleTokenResponse {
            token: String::from_utf8_lossy(token.raw()).into_owned(),
            expiry_time: token.expiry(),
        })
        .into_response(),
        None => not_found(TokenKind::RoleToken, &request.domain, &request.role),
    }
}

/// Header mode: target from `X-Athenz-Domain` / `X-Athenz-Role`, tokens
/// returned in `Authorization` and the configured role auth header.
pub async fn get_tokens_by_headers(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty());
    let (Some(domain), Some(role)) = (header(DOMAIN_HEADER), header(ROLE_HEADER)) else {
        return bad_request(format!("{} and {} headers are required", DOMAIN_HEADER, ROLE_HEADER));
    };

    let mut response_headers = HeaderMap::new();
    if state.token_mode.access_token {
        let Some(token) = lookup(&state.access_token_cache, domain, role) else {
            return not_found(TokenKind::AccessToken, domain, role);
        };
        let mut bearer = b"Bearer ".to_vec();
        bearer.extend_from_slice(token.raw());
        match HeaderValue::from_bytes(&bearer) {
            Ok(value) => response_headers.insert(AUTHORIZATION, value),
            Err(e) => return invalid_header(TokenKind::AccessToken, e),
        };
    }
    if state.token_mode.role_token {
        let Some(token) = lookup(&state.role_token_cache, domain, role) else {
            return not_found(TokenKind::RoleToken, domain, role);
        };
        match HeaderValue::from_bytes(token.raw()) {
            Ok(value) => response_headers.insert(state.role_auth_header.clone(), value),
            Err(e) => return invalid_header(TokenKind::RoleToken, e),
        };
    }
    (StatusCode::OK, response_headers).into_response()
}

fn invalid_header(kind: TokenKind, e: http::header::InvalidHeaderValue) -> Response {
    warn!("cached {} cannot be sent as a header: {}", kind, e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{} cannot be sent as a header", kind)).into_response()
}
