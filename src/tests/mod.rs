pub mod common;
mod lifecycle_shutdown;
