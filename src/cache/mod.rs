pub mod batch;
pub mod key;
pub mod token;
pub mod token_cache;
#[cfg(feature = "debug-tokens")]
pub mod synthetic;
