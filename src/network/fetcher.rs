//! Fetchers - the pluggable transport under the network overlay.

use std::sync::Arc;

use futures::future::BoxFuture;

use super::request::{FetchRequest, RawResponse};
use crate::error::NetworkError;

/// Sends one request.
///
/// Any HTTP response, including 4xx/5xx, is `Ok`; `Err` means no response was
/// obtained at all.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<RawResponse, NetworkError>>;
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<RawResponse, NetworkError>> {
        (**self).fetch(request)
    }
}

/// Adapts a closure into a [`Fetcher`].
///
/// ```ignore
/// let fetcher = FnFetcher::new(|request: FetchRequest| {
///     Box::pin(async move { Ok(RawResponse::new(200, Some(json!({ "data": [] })))) })
/// });
/// ```
pub struct FnFetcher<F> {
    f: F,
}

impl<F> FnFetcher<F>
where
    F: Fn(FetchRequest) -> BoxFuture<'static, Result<RawResponse, NetworkError>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Fetcher for FnFetcher<F>
where
    F: Fn(FetchRequest) -> BoxFuture<'static, Result<RawResponse, NetworkError>> + Send + Sync,
{
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<RawResponse, NetworkError>> {
        (self.f)(request)
    }
}

#[cfg(feature = "http")]
pub use http::ReqwestFetcher;

#[cfg(feature = "http")]
mod http {
    use std::collections::BTreeMap;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use reqwest::header::{ACCEPT, CONTENT_TYPE};

    use super::Fetcher;
    use crate::error::NetworkError;
    use crate::network::request::{FetchRequest, Method, RawResponse};

    const JSON_API: &str = "application/vnd.api+json";

    /// [`Fetcher`] over a `reqwest::Client`.
    #[derive(Clone, Default)]
    pub struct ReqwestFetcher {
        client: reqwest::Client,
    }

    impl ReqwestFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl Fetcher for ReqwestFetcher {
        fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<RawResponse, NetworkError>> {
            let client = self.client.clone();
            async move {
                let method = match request.method {
                    Method::Get => reqwest::Method::GET,
                    Method::Post => reqwest::Method::POST,
                    Method::Patch => reqwest::Method::PATCH,
                    Method::Delete => reqwest::Method::DELETE,
                };
                let mut builder = client
                    .request(method, &request.url)
                    .header(ACCEPT, JSON_API);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                if let Some(body) = &request.body {
                    let bytes = serde_json::to_vec(body)
                        .map_err(|e| NetworkError::new(e.to_string()))?;
                    builder = builder.header(CONTENT_TYPE, JSON_API).body(bytes);
                }

                let response = builder
                    .send()
                    .await
                    .map_err(|e| NetworkError::new(e.to_string()))?;

                let status = response.status().as_u16();
                let headers: BTreeMap<String, String> = response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|value| (name.as_str().to_string(), value.to_string()))
                    })
                    .collect();
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| NetworkError::new(e.to_string()))?;
                let body = if bytes.is_empty() {
                    None
                } else {
                    Some(
                        serde_json::from_slice(&bytes)
                            .map_err(|e| NetworkError::new(format!("invalid response body: {}", e)))?,
                    )
                };

                Ok::<_, NetworkError>(RawResponse {
                    status,
                    headers,
                    body,
                })
            }
            .boxed()
        }
    }
}
