pub mod cache_collector;
pub mod metrics;
pub mod process_memory;
pub mod routes;
