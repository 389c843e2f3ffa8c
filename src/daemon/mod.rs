//! Token daemon: owns both caches, runs the fetch-then-commit refresh cycle
//! and coordinates the serving, refresh and report activities.

pub mod error;
pub mod lifecycle;
pub mod refresh;
pub mod report;

pub use error::DaemonError;
pub use lifecycle::{tokend, TokendHandle};
pub use refresh::TokenDaemon;
