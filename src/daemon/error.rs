use std::time::Duration;

use thiserror::Error;

use crate::cache::token::TokenKind;

#[derive(Debug, Error)]
pub enum DaemonError {
    /// malformed startup configuration, fatal
    #[error("config error: {0}")]
    Config(String),

    /// issuer call failed; the whole cycle is abandoned without cache mutation
    #[error("failed to fetch {kind} for {domain}:role.{role}: {source}")]
    Fetch {
        kind: TokenKind,
        domain: String,
        role: String,
        #[source]
        source: anyhow::Error,
    },

    /// token files could not be written; the cache keeps the committed tokens
    #[error("failed to persist token files: {0}")]
    Persist(#[source] anyhow::Error),

    /// token server did not stop in time, fatal
    #[error("token server did not shut down within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("token server error: {0}")]
    Server(#[source] anyhow::Error),
}
