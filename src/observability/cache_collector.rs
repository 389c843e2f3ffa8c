use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntGaugeVec, Opts};

use crate::cache::token::{AccessToken, RoleToken, Token};
use crate::cache::token_cache::TokenCache;

/// Exposes `cached_token_bytes{type}` and `cached_token_entries{type}`.
///
/// Values are read from the caches at scrape time, so nothing has to be
/// kept in sync with the refresh cycle.
pub struct CachedTokenCollector {
    access_token_cache: TokenCache<AccessToken>,
    role_token_cache: TokenCache<RoleToken>,
    bytes: IntGaugeVec,
    entries: IntGaugeVec,
}

impl CachedTokenCollector {
    pub fn new(access_token_cache: TokenCache<AccessToken>, role_token_cache: TokenCache<RoleToken>) -> prometheus::Result<Self> {
        Ok(Self {
            access_token_cache,
            role_token_cache,
            bytes: IntGaugeVec::new(Opts::new("cached_token_bytes", "Number of bytes cached."), &["type"])?,
            entries: IntGaugeVec::new(Opts::new("cached_token_entries", "Number of entries cached."), &["type"])?,
        })
    }

    fn sample<T: Token>(&self, cache: &TokenCache<T>) {
        let kind = T::KIND.as_str();
        self.bytes.with_label_values(&[kind]).set(cache.size() as i64);
        self.entries.with_label_values(&[kind]).set(cache.len() as i64);
    }
}

impl Collector for CachedTokenCollector {
    fn desc(&self) -> Vec<&Desc> {
        let mut desc = self.bytes.desc();
        desc.extend(self.entries.desc());
        desc
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.sample(&self.access_token_cache);
        self.sample(&self.role_token_cache);
        let mut families = self.bytes.collect();
        families.extend(self.entries.collect());
        families
    }
}
