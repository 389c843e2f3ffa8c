use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::batch::PreparedBatch;
use crate::cache::key::CacheKey;
use crate::cache::token::Token;

/// Thread-safe token cache: CacheKey -> Token, one instance per token kind.
///
/// The key set is fixed once the daemon has stored its placeholders. Writers
/// take the lock exclusively; readers share it. Keys iterate in a stable,
/// sorted order so refresh cycles contact the issuer deterministically.
///
/// Clones share the same storage; the daemon hands clones to the server and
/// the metrics collector, which only ever go through these methods.
#[derive(Debug, Clone)]
pub struct TokenCache<T: Token> {
    inner: Arc<RwLock<BTreeMap<CacheKey, T>>>,
}

impl<T: Token> Default for TokenCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Token> TokenCache<T> {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    // a panicking writer cannot leave a half-written entry behind, so poisoned guards are safe to reuse
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<CacheKey, T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<CacheKey, T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert, last write wins.
    pub fn store(&self, key: CacheKey, token: T) {
        self.write().insert(key, token);
    }

    /// Apply a fully fetched batch under a single exclusive lock.
    /// Returns the number of entries written.
    pub fn commit(&self, batch: PreparedBatch<T>) -> usize {
        let mut map = self.write();
        let mut count = 0;
        for (key, token) in batch {
            map.insert(key, token);
            count += 1;
        }
        count
    }

    /// Visit every entry under a shared lock. Stops at the first error and
    /// returns it.
    pub fn range<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&CacheKey, &T) -> Result<(), E>,
    {
        let map = self.read();
        for (key, token) in map.iter() {
            visit(key, token)?;
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.read().keys().cloned().collect()
    }

    pub fn get(&self, key: &CacheKey) -> Option<T> {
        self.read().get(key).cloned()
    }

    /// Find the entry for a (domain, role) target regardless of expiry bounds.
    pub fn find(&self, domain: &str, role: &str) -> Option<T> {
        self.read()
            .iter()
            .find(|(key, _)| key.domain == domain && key.role == role)
            .map(|(_, token)| token.clone())
    }

    pub fn snapshot(&self) -> Vec<(CacheKey, T)> {
        self.read().iter().map(|(k, t)| (k.clone(), t.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Total bytes of cached credential material.
    pub fn size(&self) -> usize {
        self.read().values().map(|t| t.raw().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::token::{AccessToken, RoleToken};
    use std::thread;

    fn access_token(domain: &str, role: &str, raw: &str) -> AccessToken {
        AccessToken::new(domain.into(), role.into(), raw.as_bytes().to_vec(), format!("{}:role.{}", domain, role), 1_900_000_000)
    }

    #[test]
    fn store_is_idempotent_upsert() {
        let cache = TokenCache::new();
        let key = CacheKey::access_token("dom", "role", 0);
        let token = access_token("dom", "role", "abc");

        cache.store(key.clone(), token.clone());
        let (len, size) = (cache.len(), cache.size());
        cache.store(key.clone(), token.clone());

        assert_eq!(cache.len(), len);
        assert_eq!(cache.size(), size);
        assert_eq!(cache.get(&key), Some(token));

        cache.store(key.clone(), access_token("dom", "role", "abcdef"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), 6);
    }

    #[test]
    fn placeholders_count_as_entries_with_zero_bytes() {
        let cache: TokenCache<RoleToken> = TokenCache::new();
        cache.store(CacheKey::role_token("a", "r", 0), RoleToken::default());
        cache.store(CacheKey::role_token("b", "r", 0), RoleToken::default());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.size(), 0);
        assert!(cache.get(&CacheKey::role_token("a", "r", 0)).unwrap().is_placeholder());
    }

    #[test]
    fn range_stops_at_first_error() {
        let cache = TokenCache::new();
        for d in ["a", "b", "c"] {
            cache.store(CacheKey::access_token(d, "r", 0), access_token(d, "r", "x"));
        }

        let mut visited = Vec::new();
        let result: Result<(), String> = cache.range(|key, _| {
            visited.push(key.domain.clone());
            if key.domain == "b" {
                return Err("stop".to_owned());
            }
            Ok(())
        });

        assert_eq!(result, Err("stop".to_owned()));
        assert_eq!(visited, vec!["a", "b"]);
    }

    #[test]
    fn keys_are_sorted_and_find_ignores_bounds() {
        let cache = TokenCache::new();
        cache.store(CacheKey::access_token("b", "r", 60), access_token("b", "r", "x"));
        cache.store(CacheKey::access_token("a", "r", 60), access_token("a", "r", "y"));

        let domains: Vec<_> = cache.keys().into_iter().map(|k| k.domain).collect();
        assert_eq!(domains, vec!["a", "b"]);
        assert_eq!(cache.find("a", "r").unwrap().raw, b"y".to_vec());
        assert!(cache.find("a", "other").is_none());
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let cache = TokenCache::new();
        let key = CacheKey::access_token("dom", "role", 0);
        cache.store(key.clone(), access_token("dom", "role", "0000"));

        let mut handles = Vec::new();
        for i in 0..4 {
            let cache = cache.clone();
            let key = key.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    if i == 0 {
                        cache.store(key.clone(), access_token("dom", "role", "1111"));
                    } else {
                        assert_eq!(cache.size(), 4);
                        assert_eq!(cache.len(), 1);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.get(&key).unwrap().raw, b"1111".to_vec());
    }
}
