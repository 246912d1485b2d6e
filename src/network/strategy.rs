//! Caching strategies.

/// How a GET request weighs the cache against the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachingStrategy {
    /// Always fetch; the cache is neither read nor used as a fallback.
    NetworkOnly,
    /// Fetch; on a transport failure fall back to an unexpired cached response.
    NetworkFirst,
    /// Never fetch. A miss is an error.
    CacheOnly,
    /// Use an unexpired cached response, otherwise fetch.
    #[default]
    CacheFirst,
    /// Answer from the cache and refresh it in the background for the next read.
    StaleWhileRevalidate,
    /// Answer from the cache, then deliver the refreshed response as a second event.
    StaleAndUpdate,
}

impl CachingStrategy {
    /// Whether a cached entry may answer the request before any fetch.
    pub(crate) fn reads_cache_first(&self) -> bool {
        matches!(
            self,
            CachingStrategy::CacheOnly
                | CachingStrategy::CacheFirst
                | CachingStrategy::StaleWhileRevalidate
                | CachingStrategy::StaleAndUpdate
        )
    }

    /// Whether cached entries are served regardless of age.
    pub(crate) fn ignores_max_age(&self) -> bool {
        matches!(
            self,
            CachingStrategy::CacheOnly
                | CachingStrategy::StaleWhileRevalidate
                | CachingStrategy::StaleAndUpdate
        )
    }

    /// Whether a cache hit still triggers a background fetch.
    pub(crate) fn revalidates(&self) -> bool {
        matches!(
            self,
            CachingStrategy::StaleWhileRevalidate | CachingStrategy::StaleAndUpdate
        )
    }
}
