use crate::cache::key::CacheKey;
use crate::cache::token::Token;

/// Fetched-but-not-yet-applied tokens of one refresh cycle.
///
/// A batch is only handed to [`TokenCache::commit`](crate::cache::token_cache::TokenCache::commit)
/// once every fetch of the cycle has succeeded; dropping it applies nothing.
#[derive(Debug)]
pub struct PreparedBatch<T: Token> {
    entries: Vec<(CacheKey, T)>,
}

impl<T: Token> PreparedBatch<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, key: CacheKey, token: T) {
        self.entries.push((key, token));
    }
}

impl<T: Token> IntoIterator for PreparedBatch<T> {
    type Item = (CacheKey, T);
    type IntoIter = std::vec::IntoIter<(CacheKey, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
