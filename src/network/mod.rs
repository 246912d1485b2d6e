//! Network overlay: a [`NetworkStore`] wraps a [`Collection`](crate::Collection)
//! and feeds JSON:API responses into it.
//!
//! ```text
//! fetch_* / get_all / request
//!     -> strategy decides: cache entry or fetch
//!     -> Fetcher (transform hooks, in-flight dedup)
//!     -> Document parsed, included + primary resources merged via add_raw
//!     -> Response { data, error, links, meta, update }
//! ```
//!
//! Only raw response envelopes are cached. Successful saves and deletes drop
//! every cached response of the record's type.

mod cache;
mod config;
mod fetcher;
mod request;
mod response;
mod store;
mod strategy;

pub use cache::RequestStatus;
pub use config::NetworkConfig;
#[cfg(feature = "http")]
pub use fetcher::ReqwestFetcher;
pub use fetcher::{Fetcher, FnFetcher};
pub use request::{FetchRequest, Method, RawResponse, RequestOptions};
pub use response::{Response, ResponseData};
pub use store::NetworkStore;
pub use strategy::CachingStrategy;
