//! Requests: methods, per-request options and URL/cache-key construction.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use super::strategy::CachingStrategy;
use crate::error::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the fetcher is asked to do.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// What the fetcher hands back: any HTTP response, error statuses included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RawResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-request options: JSON:API query parameters, headers and cache overrides.
///
/// ```ignore
/// let options = RequestOptions::new()
///     .include("responsible")
///     .filter("status", "open")
///     .page("number", 2)
///     .strategy(CachingStrategy::NetworkOnly);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub include: Vec<String>,
    pub fields: BTreeMap<String, Vec<String>>,
    pub filter: BTreeMap<String, String>,
    pub sort: Vec<String>,
    pub page: BTreeMap<String, String>,
    pub params: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub strategy: Option<CachingStrategy>,
    pub max_age: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.include.push(path.into());
        self
    }

    /// Sparse fieldset for one type.
    pub fn fields<I, S>(mut self, type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .insert(type_name.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.filter.insert(name.into(), value.to_string());
        self
    }

    /// Sort by `field`; prefix with `-` for descending.
    pub fn sort(mut self, field: impl Into<String>) -> Self {
        self.sort.push(field.into());
        self
    }

    pub fn page(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.page.insert(name.into(), value.to_string());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn strategy(mut self, strategy: CachingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Query pairs in JSON:API bracket notation.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if !self.include.is_empty() {
            pairs.push(("include".to_string(), self.include.join(",")));
        }
        for (type_name, fields) in &self.fields {
            pairs.push((format!("fields[{}]", type_name), fields.join(",")));
        }
        for (name, value) in &self.filter {
            pairs.push((format!("filter[{}]", name), value.clone()));
        }
        if !self.sort.is_empty() {
            pairs.push(("sort".to_string(), self.sort.join(",")));
        }
        for (name, value) in &self.page {
            pairs.push((format!("page[{}]", name), value.clone()));
        }
        pairs.extend(self.params.iter().cloned());
        pairs
    }
}

/// `base` + `/` + `path`, with the options' query appended.
pub(crate) fn endpoint_url(
    base: &str,
    path: &str,
    options: &RequestOptions,
) -> Result<String, NetworkError> {
    let joined = if Url::parse(path).is_ok() {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };
    let mut url = Url::parse(&joined)
        .map_err(|err| NetworkError::new(format!("invalid url {}: {}", joined, err)))?;
    let pairs = options.query_pairs();
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url.to_string())
}

/// Append one percent-encoded path segment, keeping any query.
pub(crate) fn push_segment(url: &str, segment: &str) -> Result<String, NetworkError> {
    let mut parsed =
        Url::parse(url).map_err(|err| NetworkError::new(format!("invalid url {}: {}", url, err)))?;
    parsed
        .path_segments_mut()
        .map_err(|_| NetworkError::new(format!("url {} cannot take a path", url)))?
        .pop_if_empty()
        .push(segment);
    Ok(parsed.to_string())
}

/// Resolve a pagination link: absolute URLs as-is, anything else against `base`.
pub(crate) fn resolve_link(base: &str, link: &str) -> Result<String, NetworkError> {
    if let Ok(url) = Url::parse(link) {
        return Ok(url.to_string());
    }
    let base = Url::parse(base)
        .map_err(|err| NetworkError::new(format!("invalid base url {}: {}", base, err)))?;
    base.join(link)
        .map(|url| url.to_string())
        .map_err(|err| NetworkError::new(format!("invalid link {}: {}", link, err)))
}

/// Cache key: method plus URL with its query pairs sorted.
pub(crate) fn cache_key(method: Method, url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return format!("{} {}", method, url);
    };
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    parsed.set_fragment(None);
    format!("{} {}", method, parsed)
}
