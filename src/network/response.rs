//! Responses from the network overlay.
//!
//! Failures on the network path never come back as `Err` from the request
//! call; they are carried in [`Response::error`]. Callers branch on it, or
//! use [`Response::into_result`].

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tokio::sync::oneshot;

use super::request::RequestOptions;
use super::store::NetworkStore;
use crate::jsonapi::Links;
use crate::model::Model;
use crate::view::View;
use crate::DatxError;

/// Records a response resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    One(Option<Model>),
    Many(Vec<Model>),
}

impl ResponseData {
    pub fn models(&self) -> Vec<Model> {
        match self {
            ResponseData::One(model) => model.iter().cloned().collect(),
            ResponseData::Many(models) => models.clone(),
        }
    }
}

/// Enough of the originating request to follow pagination links.
#[derive(Clone)]
pub(crate) struct PageContext {
    pub store: NetworkStore,
    pub type_name: Option<String>,
    pub options: RequestOptions,
    pub view: Option<View>,
}

pub struct Response {
    pub(crate) data: Option<ResponseData>,
    pub(crate) error: Option<DatxError>,
    pub(crate) status: Option<u16>,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) links: Option<Links>,
    pub(crate) meta: Option<Value>,
    pub(crate) from_cache: bool,
    pub(crate) update: Option<oneshot::Receiver<Response>>,
    pub(crate) page: Option<PageContext>,
}

impl Response {
    pub(crate) fn empty() -> Self {
        Self {
            data: None,
            error: None,
            status: None,
            headers: BTreeMap::new(),
            links: None,
            meta: None,
            from_cache: false,
            update: None,
            page: None,
        }
    }

    pub(crate) fn failed(error: DatxError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty()
        }
    }

    pub fn data(&self) -> Option<&ResponseData> {
        self.data.as_ref()
    }

    /// Every record in the response, in document order.
    pub fn models(&self) -> Vec<Model> {
        self.data.as_ref().map(ResponseData::models).unwrap_or_default()
    }

    /// The single record of a one-record response.
    pub fn model(&self) -> Option<Model> {
        match &self.data {
            Some(ResponseData::One(model)) => model.clone(),
            Some(ResponseData::Many(models)) => models.first().cloned(),
            None => None,
        }
    }

    pub fn error(&self) -> Option<&DatxError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// HTTP status, when a response was obtained.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn links(&self) -> Option<&Links> {
        self.links.as_ref()
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    /// Whether the data came from a cached response.
    pub fn is_cached(&self) -> bool {
        self.from_cache
    }

    /// The view the records were added to, for `fetch_all_into`.
    pub fn view(&self) -> Option<&View> {
        self.page.as_ref().and_then(|page| page.view.as_ref())
    }

    /// The second event of a `StaleAndUpdate` request: resolves with the
    /// refreshed response once the background fetch completes.
    ///
    /// `None` unless the request was answered from the cache under that strategy.
    pub fn take_update(&mut self) -> Option<oneshot::Receiver<Response>> {
        self.update.take()
    }

    pub fn has_link(&self, name: &str) -> bool {
        self.links.as_ref().and_then(|links| links.href(name)).is_some()
    }

    pub async fn next(&self) -> Option<Response> {
        self.follow("next").await
    }

    pub async fn prev(&self) -> Option<Response> {
        self.follow("prev").await
    }

    pub async fn first(&self) -> Option<Response> {
        self.follow("first").await
    }

    pub async fn last(&self) -> Option<Response> {
        self.follow("last").await
    }

    /// Fetch the page behind a pagination link. Records are merged into the
    /// collection (and appended to the view) like any other response; `None`
    /// when the document has no such link.
    async fn follow(&self, name: &str) -> Option<Response> {
        let page = self.page.as_ref()?;
        let href = self.links.as_ref()?.href(name)?;
        Some(page.store.follow_link(page, href).await)
    }

    pub fn into_result(self) -> Result<Option<ResponseData>, DatxError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("data", &self.data)
            .field("error", &self.error)
            .field("status", &self.status)
            .field("links", &self.links)
            .field("from_cache", &self.from_cache)
            .field("has_update", &self.update.is_some())
            .finish_non_exhaustive()
    }
}
