//! NetworkConfig - builder-style configuration for the network overlay.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::fetcher::Fetcher;
use super::request::{FetchRequest, RawResponse};
use super::strategy::CachingStrategy;

type RequestHook = dyn Fn(FetchRequest) -> FetchRequest + Send + Sync;
type ResponseHook = dyn Fn(RawResponse) -> RawResponse + Send + Sync;

/// Everything the overlay needs to talk to a JSON:API server.
///
/// ```ignore
/// let config = NetworkConfig::new("https://api.example.com", ReqwestFetcher::new())
///     .header("Authorization", format!("Bearer {}", token))
///     .strategy(CachingStrategy::StaleWhileRevalidate)
///     .max_age(Duration::from_secs(30))
///     .transform_response(|response| {
///         // pick up refreshed tokens, rewrite bodies, ...
///         response
///     });
/// ```
#[derive(Clone)]
pub struct NetworkConfig {
    pub(crate) base_url: String,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) transform_request: Option<Arc<RequestHook>>,
    pub(crate) transform_response: Option<Arc<ResponseHook>>,
    pub(crate) strategy: CachingStrategy,
    pub(crate) max_age: Option<Duration>,
    pub(crate) infer_endpoints: bool,
    pub(crate) max_pages: usize,
}

impl NetworkConfig {
    pub fn new(base_url: impl Into<String>, fetcher: impl Fetcher + 'static) -> Self {
        Self {
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            fetcher: Arc::new(fetcher),
            transform_request: None,
            transform_response: None,
            strategy: CachingStrategy::default(),
            max_age: None,
            infer_endpoints: true,
            max_pages: 100,
        }
    }

    /// Default header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Runs on every request right before it is sent.
    pub fn transform_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(FetchRequest) -> FetchRequest + Send + Sync + 'static,
    {
        self.transform_request = Some(Arc::new(hook));
        self
    }

    /// Runs on every response before it is parsed or cached.
    pub fn transform_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(RawResponse) -> RawResponse + Send + Sync + 'static,
    {
        self.transform_response = Some(Arc::new(hook));
        self
    }

    pub fn strategy(mut self, strategy: CachingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Age after which cached responses no longer count for `CacheFirst`/`NetworkFirst`.
    /// Without one, entries never expire.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// When on, a type without an explicit endpoint uses its type name as the path.
    pub fn infer_endpoints(mut self, infer: bool) -> Self {
        self.infer_endpoints = infer;
        self
    }

    /// Upper bound on requests made by one `get_all`.
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_strategy(&self) -> CachingStrategy {
        self.strategy
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("strategy", &self.strategy)
            .field("max_age", &self.max_age)
            .field("infer_endpoints", &self.infer_endpoints)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}
