//! # Token Sidecar Library
//!
//! Keeps access tokens and role tokens fresh for a fixed set of
//! `domain:role.<role>` targets and exposes them to local consumers.
//!
//! Modules:
//! - `cache` : cache keys, token types and the thread-safe token cache
//! - `config` : YAML service configuration and the validated daemon view
//! - `sources` : the issuer interface and its HTTP client
//! - `resilience` : bounded exponential backoff
//! - `daemon` : refresh cycle, lifecycle coordination and cache reports
//! - `sinks` : staged multi-file token writer
//! - `server` : token serving endpoint
//! - `observability` : metrics registry, cache gauges, process memory

pub mod cache;
pub mod config;
pub mod daemon;
pub mod helpers;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod sinks;
pub mod sources;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::daemon::{tokend, DaemonError, TokenDaemon, TokendHandle};
