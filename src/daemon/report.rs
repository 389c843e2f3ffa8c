use tracing::info;

use crate::cache::token::{AccessToken, RoleToken};
use crate::cache::token_cache::TokenCache;
use crate::observability::metrics::get_metrics;
use crate::observability::process_memory::{ProcessMemory, ProcessMemorySampler};

/// One sample of cache and process memory usage.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheReport {
    pub system_memory_in_use: u64,
    pub heap_in_use: u64,
    pub access_token_bytes: usize,
    pub access_token_entries: usize,
    pub role_token_bytes: usize,
    pub role_token_entries: usize,
    pub total_bytes: usize,
    pub total_entries: usize,
    /// cached bytes / system memory in use, in percent
    pub system_ratio: f64,
    /// cached bytes / heap in use, in percent
    pub heap_ratio: f64,
}

impl CacheReport {
    pub fn compute(memory: ProcessMemory, access_token: (usize, usize), role_token: (usize, usize)) -> Self {
        let system_memory_in_use = memory.system_in_use_bytes();
        let heap_in_use = memory.heap_in_use_bytes;
        let (access_token_bytes, access_token_entries) = access_token;
        let (role_token_bytes, role_token_entries) = role_token;
        let total_bytes = access_token_bytes + role_token_bytes;

        Self {
            system_memory_in_use,
            heap_in_use,
            access_token_bytes,
            access_token_entries,
            role_token_bytes,
            role_token_entries,
            total_bytes,
            total_entries: access_token_entries + role_token_entries,
            system_ratio: percent(total_bytes as f64, system_memory_in_use as f64),
            heap_ratio: percent(total_bytes as f64, heap_in_use as f64),
        }
    }

    pub fn log(&self) {
        info!(
            "system_memory_inuse[{:.1}MB]; process_heap_inuse[{:.1}MB]; accesstoken:cached_token_bytes[{:.1}MB],entries[{}]; roletoken:cached_token_bytes[{:.1}MB],entries[{}]; total:cached_token_bytes[{:.1}MB],entries[{}]; cache_token_ratio:sys[{:.1}%],heap[{:.1}%]",
            to_mb(self.system_memory_in_use as f64),
            to_mb(self.heap_in_use as f64),
            to_mb(self.access_token_bytes as f64),
            self.access_token_entries,
            to_mb(self.role_token_bytes as f64),
            self.role_token_entries,
            to_mb(self.total_bytes as f64),
            self.total_entries,
            self.system_ratio,
            self.heap_ratio,
        );
    }
}

fn to_mb(bytes: f64) -> f64 {
    bytes / 1024.0 / 1024.0
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    part / whole * 100.0
}

/// Periodic cache usage reporter.
pub struct MetricsReporter {
    access_token_cache: TokenCache<AccessToken>,
    role_token_cache: TokenCache<RoleToken>,
    sampler: ProcessMemorySampler,
}

impl MetricsReporter {
    pub fn new(access_token_cache: TokenCache<AccessToken>, role_token_cache: TokenCache<RoleToken>) -> Self {
        Self {
            access_token_cache,
            role_token_cache,
            sampler: ProcessMemorySampler::new(),
        }
    }

    pub async fn report(&mut self) -> CacheReport {
        let memory = self.sampler.sample();
        let metrics = get_metrics().await;
        metrics.process_memory_usage.set(memory.heap_in_use_bytes as i64);
        metrics.process_virtual_memory.set(memory.total_bytes as i64);

        let report = CacheReport::compute(
            memory,
            (self.access_token_cache.size(), self.access_token_cache.len()),
            (self.role_token_cache.size(), self.role_token_cache.len()),
        );
        report.log();
        report
    }
}
