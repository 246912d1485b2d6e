//! NetworkStore - a collection decorated with fetching, caching and saving.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::cache::{CacheStore, Flight, RequestStatus};
use super::config::NetworkConfig;
use super::request::{
    cache_key, endpoint_url, push_segment, resolve_link, FetchRequest, Method, RawResponse,
    RequestOptions,
};
use super::response::{PageContext, Response, ResponseData};
use super::strategy::CachingStrategy;
use crate::collection::Collection;
use crate::error::NetworkError;
use crate::id::Id;
use crate::jsonapi::{Document, Resource};
use crate::meta::{MetaLookup, MetaScope};
use crate::model::Model;
use crate::view::View;
use crate::DatxError;

const HEADERS: &str = "headers";

struct StoreInner {
    collection: Collection,
    config: NetworkConfig,
    cache: CacheStore,
}

/// A [`Collection`] that can talk to a JSON:API server.
///
/// Every record a response carries is merged through the collection, so the
/// store never holds a second copy of domain data; the cache only keeps raw
/// response envelopes.
///
/// ```ignore
/// let store = NetworkStore::new(collection, NetworkConfig::new(url, ReqwestFetcher::new()));
/// let response = store.fetch_all("event", RequestOptions::new().include("responsible")).await;
/// if let Some(err) = response.error() {
///     // network-path failures land here, never in a panic or an `Err`
/// }
/// ```
#[derive(Clone)]
pub struct NetworkStore {
    inner: Arc<StoreInner>,
}

impl NetworkStore {
    pub fn new(collection: Collection, config: NetworkConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                collection,
                config,
                cache: CacheStore::new(),
            }),
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.inner.collection
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Headers
    // ------------------------------------------------------------------

    /// Header sent with every request made by this store.
    pub fn set_header(&self, name: &str, value: impl Into<String>) {
        self.put_header(MetaScope::Root, name, value.into());
    }

    /// Header sent with requests for one record type; overrides store-wide headers.
    pub fn set_type_header(&self, type_name: &str, name: &str, value: impl Into<String>) {
        self.put_header(MetaScope::Type(type_name.to_string()), name, value.into());
    }

    fn put_header(&self, scope: MetaScope, name: &str, value: String) {
        let meta = self.inner.collection.meta();
        let mut headers = match meta.get(&scope, HEADERS) {
            Some(Value::Object(headers)) => headers,
            _ => Map::new(),
        };
        headers.insert(name.to_ascii_lowercase(), Value::String(value));
        meta.set(scope, HEADERS, Value::Object(headers));
    }

    /// Config headers, then store-wide, then per-type, then per-request.
    fn headers_for(
        &self,
        type_name: Option<&str>,
        options: &RequestOptions,
    ) -> BTreeMap<String, String> {
        let mut headers = self.inner.config.headers.clone();
        let chain = match type_name {
            Some(type_name) => vec![MetaScope::Type(type_name.to_string()), MetaScope::Root],
            None => vec![MetaScope::Root],
        };
        if let Some(Value::Object(layered)) =
            self.inner
                .collection
                .meta()
                .lookup(&chain, HEADERS, MetaLookup::Merged)
        {
            for (name, value) in layered {
                if let Value::String(value) = value {
                    headers.insert(name, value);
                }
            }
        }
        for (name, value) in &options.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        headers
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    fn endpoint(&self, type_name: &str, action: &str) -> Result<String, DatxError> {
        let schema = self.inner.collection.registry().get(type_name)?;
        match schema.endpoint_path() {
            Some(path) => Ok(path.to_string()),
            None if self.inner.config.infer_endpoints => Ok(type_name.to_string()),
            None => Err(DatxError::MissingRequestDefinition {
                type_name: type_name.to_string(),
                action: action.to_string(),
            }),
        }
    }

    fn record_url(
        &self,
        type_name: &str,
        id: Option<&Id>,
        action: &str,
        options: &RequestOptions,
    ) -> Result<String, DatxError> {
        let path = self.endpoint(type_name, action)?;
        let url = endpoint_url(&self.inner.config.base_url, &path, options)?;
        Ok(match id {
            Some(id) => push_segment(&url, &id.to_string())?,
            None => url,
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn fetch_one(
        &self,
        type_name: &str,
        id: impl Into<Id>,
        options: RequestOptions,
    ) -> Response {
        let id = id.into();
        let url = match self.record_url(type_name, Some(&id), "fetch", &options) {
            Ok(url) => url,
            Err(err) => return Response::failed(err),
        };
        self.get(url, self.page_context(Some(type_name), options, None))
            .await
    }

    pub async fn fetch_all(&self, type_name: &str, options: RequestOptions) -> Response {
        let url = match self.record_url(type_name, None, "fetch", &options) {
            Ok(url) => url,
            Err(err) => return Response::failed(err),
        };
        self.get(url, self.page_context(Some(type_name), options, None))
            .await
    }

    /// Like [`fetch_all`](Self::fetch_all), appending the records to `view`.
    /// Following the response's pagination links keeps appending.
    pub async fn fetch_all_into(&self, view: &View, options: RequestOptions) -> Response {
        let type_name = view.type_name().to_string();
        let url = match self.record_url(&type_name, None, "fetch", &options) {
            Ok(url) => url,
            Err(err) => return Response::failed(err),
        };
        self.get(
            url,
            self.page_context(Some(&type_name), options, Some(view.clone())),
        )
        .await
    }

    /// Fetch every page of `type_name` by following `next` links.
    ///
    /// The first failing page aborts and its response is returned; pages merged
    /// before it stay in the collection. At most `max_pages` requests are made.
    pub async fn get_all(&self, type_name: &str, options: RequestOptions) -> Response {
        let mut response = self.fetch_all(type_name, options).await;
        if !response.is_ok() {
            return response;
        }

        let mut seen = HashSet::new();
        let mut models: Vec<Model> = Vec::new();
        let mut collect = |page: &Response| {
            for model in page.models() {
                if seen.insert(model.key()) {
                    models.push(model);
                }
            }
        };
        collect(&response);

        let mut pages = 1;
        while response.has_link("next") {
            if pages >= self.inner.config.max_pages {
                warn!(type_name, pages, "stopped following next links at the page limit");
                break;
            }
            let Some(next) = response.next().await else {
                break;
            };
            pages += 1;
            if !next.is_ok() {
                debug!(type_name, pages, "page fetch failed, aborting");
                return next;
            }
            collect(&next);
            response = next;
        }

        response.data = Some(ResponseData::Many(models));
        response
    }

    /// Request an arbitrary endpoint. Records in the response are merged into
    /// the collection; GETs go through the cache like any other read.
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Response {
        let url = match endpoint_url(&self.inner.config.base_url, path, &options) {
            Ok(url) => url,
            Err(err) => return Response::failed(err.into()),
        };
        let context = self.page_context(None, options, None);
        if method == Method::Get && body.is_none() {
            return self.get(url, context).await;
        }

        let headers = self.headers_for(None, &context.options);
        match self.send(method, url, headers, body).await {
            Ok(raw) => self.process(raw, &context, false),
            Err(err) => Response::failed(err.into()),
        }
    }

    pub fn request_status(
        &self,
        type_name: &str,
        id: Option<Id>,
        options: &RequestOptions,
    ) -> Result<RequestStatus, DatxError> {
        let url = self.record_url(type_name, id.as_ref(), "fetch", options)?;
        Ok(self.inner.cache.status(&cache_key(Method::Get, &url)))
    }

    pub(crate) async fn follow_link(&self, page: &PageContext, href: &str) -> Response {
        match resolve_link(&self.inner.config.base_url, href) {
            Ok(url) => self.get(url, page.clone()).await,
            Err(err) => Response::failed(err.into()),
        }
    }

    fn page_context(
        &self,
        type_name: Option<&str>,
        options: RequestOptions,
        view: Option<View>,
    ) -> PageContext {
        PageContext {
            store: self.clone(),
            type_name: type_name.map(str::to_string),
            options: RequestOptions {
                headers: options.headers,
                strategy: options.strategy,
                max_age: options.max_age,
                ..RequestOptions::default()
            },
            view,
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// POST a new record (every field) or PATCH a persisted one (dirty fields).
    ///
    /// On success the values that were sent become committed; edits made while
    /// the request was in flight stay dirty. A server-assigned id replaces the
    /// temporary one and the returned resource is merged into the model.
    pub async fn save(&self, model: &Model) -> Response {
        let model = match self.inner.collection.add_model(model) {
            Ok(model) => model,
            Err(err) => return Response::failed(err),
        };
        let type_name = model.type_name().to_string();
        let persisted = model.is_persisted();
        let (method, id) = if persisted {
            (Method::Patch, Some(model.id()))
        } else {
            (Method::Post, None)
        };
        let options = RequestOptions::new();
        let url = match self.record_url(&type_name, id.as_ref(), "save", &options) {
            Ok(url) => url,
            Err(err) => return Response::failed(err),
        };

        let dirty = persisted.then(|| model.dirty_fields());
        let (sent_attributes, sent_refs) = model.field_values(dirty.as_ref());
        let body = match serde_json::to_value(Document::single(Resource::from_model(&model, persisted))) {
            Ok(body) => body,
            Err(err) => return Response::failed(err.into()),
        };
        let headers = self.headers_for(Some(&type_name), &options);
        let raw = match self.send(method, url, headers, Some(body)).await {
            Ok(raw) => raw,
            Err(err) => return Response::failed(err.into()),
        };
        let context = self.page_context(Some(&type_name), options, None);
        if !raw.is_success() {
            return self.process(raw, &context, false);
        }

        model.commit_values(sent_attributes, sent_refs);
        model.set_persisted(true);
        self.inner.cache.purge_type(&type_name);
        debug!(key = %model.key(), %method, "record saved");

        let returned = raw
            .body
            .as_ref()
            .and_then(|body| serde_json::from_value::<Document>(body.clone()).ok())
            .and_then(|document| document.primary().first().map(|r| (*r).clone()));
        match returned {
            Some(resource) if resource.type_name == type_name => {
                if let Some(id) = resource.id.filter(|id| *id != model.id()) {
                    if let Err(err) = model.assign_id(id) {
                        return Response::failed(err);
                    }
                }
                self.process(raw, &context, false)
            }
            _ => Response {
                status: Some(raw.status),
                headers: raw.headers,
                data: Some(ResponseData::One(Some(model))),
                page: Some(context),
                ..Response::empty()
            },
        }
    }

    /// DELETE a persisted record and drop it from the collection. Records that
    /// were never saved are only removed locally.
    pub async fn destroy(&self, model: &Model) -> Response {
        let collection = &self.inner.collection;
        let type_name = model.type_name().to_string();
        if !model.is_persisted() {
            collection.remove_one(model);
            return Response {
                data: Some(ResponseData::One(None)),
                ..Response::empty()
            };
        }

        let options = RequestOptions::new();
        let url = match self.record_url(&type_name, Some(&model.id()), "destroy", &options) {
            Ok(url) => url,
            Err(err) => return Response::failed(err),
        };
        let headers = self.headers_for(Some(&type_name), &options);
        let raw = match self.send(Method::Delete, url, headers, None).await {
            Ok(raw) => raw,
            Err(err) => return Response::failed(err.into()),
        };
        if !raw.is_success() {
            let context = self.page_context(Some(&type_name), options, None);
            return self.process(raw, &context, false);
        }

        collection.remove_one(model);
        self.inner.cache.purge_type(&type_name);
        debug!(key = %model.key(), "record destroyed");
        Response {
            status: Some(raw.status),
            headers: raw.headers,
            data: Some(ResponseData::One(None)),
            ..Response::empty()
        }
    }

    // ------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn clear_cache_for_type(&self, type_name: &str) -> usize {
        self.inner.cache.purge_type(type_name)
    }

    /// Number of cached responses.
    pub fn cached_responses(&self) -> usize {
        self.inner.cache.len()
    }

    // ------------------------------------------------------------------
    // Request pipeline
    // ------------------------------------------------------------------

    async fn get(&self, url: String, context: PageContext) -> Response {
        let key = cache_key(Method::Get, &url);
        let strategy = context
            .options
            .strategy
            .unwrap_or(self.inner.config.strategy);
        let max_age = context.options.max_age.or(self.inner.config.max_age);

        if strategy.reads_cache_first() {
            let cached = self
                .inner
                .cache
                .get(&key)
                .filter(|entry| strategy.ignores_max_age() || entry.is_fresh(max_age));
            if let Some(entry) = cached {
                debug!(%key, ?strategy, "answered from cache");
                let mut response = self.process(entry.response, &context, true);
                if strategy.revalidates() {
                    response.update = self.revalidate(strategy, key, url, context);
                }
                return response;
            }
            if strategy == CachingStrategy::CacheOnly {
                return Response {
                    page: Some(context),
                    ..Response::failed(DatxError::CacheMiss(key))
                };
            }
        }

        self.fetch_get(strategy, key, url, context).await
    }

    /// Refresh a cached response in the background. Only `StaleAndUpdate`
    /// hands the refreshed response back to the caller.
    ///
    /// The refresh runs on the current Tokio runtime; without one it is skipped.
    fn revalidate(
        &self,
        strategy: CachingStrategy,
        key: String,
        url: String,
        context: PageContext,
    ) -> Option<oneshot::Receiver<Response>> {
        let Ok(runtime) = Handle::try_current() else {
            warn!(%key, ?strategy, "no tokio runtime, skipping background refresh");
            return None;
        };
        let (tx, rx) = match strategy {
            CachingStrategy::StaleAndUpdate => {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            }
            _ => (None, None),
        };
        let store = self.clone();
        runtime.spawn(async move {
            let refreshed = store.fetch_get(strategy, key.clone(), url, context).await;
            if let Some(err) = refreshed.error() {
                warn!(%key, error = %err, "background refresh failed");
            }
            if let Some(tx) = tx {
                let _ = tx.send(refreshed);
            }
        });
        rx
    }

    async fn fetch_get(
        &self,
        strategy: CachingStrategy,
        key: String,
        url: String,
        context: PageContext,
    ) -> Response {
        let headers = self.headers_for(context.type_name.as_deref(), &context.options);
        let result = match self.inner.cache.claim(&key) {
            Flight::Follow(rx) => {
                debug!(%key, "joined in-flight request");
                rx.await
                    .unwrap_or_else(|_| Err(NetworkError::new("in-flight request was abandoned")))
            }
            Flight::Lead => {
                let mut flight = FlightGuard::new(&self.inner.cache, &key);
                let result = self.send(Method::Get, url, headers, None).await;
                if let Ok(raw) = &result {
                    if raw.is_success() {
                        self.inner
                            .cache
                            .put(&key, context.type_name.as_deref(), raw.clone());
                    }
                }
                flight.finish(&result);
                result
            }
        };

        match result {
            Ok(raw) => self.process(raw, &context, false),
            Err(err) => {
                if strategy == CachingStrategy::NetworkFirst {
                    let max_age = context.options.max_age.or(self.inner.config.max_age);
                    if let Some(entry) = self.inner.cache.get(&key).filter(|e| e.is_fresh(max_age)) {
                        debug!(%key, error = %err, "network failed, falling back to cache");
                        return self.process(entry.response, &context, true);
                    }
                }
                Response {
                    page: Some(context),
                    ..Response::failed(err.into())
                }
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        headers: BTreeMap<String, String>,
        body: Option<Value>,
    ) -> Result<RawResponse, NetworkError> {
        let config = &self.inner.config;
        let mut request = FetchRequest {
            method,
            url,
            headers,
            body,
        };
        if let Some(hook) = &config.transform_request {
            request = hook(request);
        }
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = config.fetcher.fetch(request).await?;
        Ok(match &config.transform_response {
            Some(hook) => hook(response),
            None => response,
        })
    }

    /// Turn a raw response into a [`Response`], merging its records.
    fn process(&self, raw: RawResponse, context: &PageContext, from_cache: bool) -> Response {
        let success = raw.is_success();
        let RawResponse {
            status,
            headers,
            body,
        } = raw;
        let mut response = Response {
            status: Some(status),
            headers,
            from_cache,
            page: Some(context.clone()),
            ..Response::empty()
        };

        let document = match body {
            Some(body) => match serde_json::from_value::<Document>(body) {
                Ok(document) => Some(document),
                Err(_) if !success => None,
                Err(err) => {
                    response.error = Some(err.into());
                    return response;
                }
            },
            None => None,
        };

        let errors = document
            .as_ref()
            .and_then(|document| document.errors.clone())
            .unwrap_or_default();
        if !success || !errors.is_empty() {
            response.error = Some(DatxError::Api {
                status,
                errors,
            });
            return response;
        }

        let Some(document) = document else {
            return response;
        };
        response.links = document.links.clone();
        response.meta = document.meta.clone();
        match self.merge_document(&document, context.view.as_ref()) {
            Ok(data) => response.data = Some(data),
            Err(err) => response.error = Some(err),
        }
        response
    }

    fn merge_document(
        &self,
        document: &Document,
        view: Option<&View>,
    ) -> Result<ResponseData, DatxError> {
        let collection = &self.inner.collection;
        collection.batch(|| {
            for resource in &document.included {
                match self.add_resource(resource) {
                    Ok(_) => {}
                    Err(DatxError::UnknownType(type_name)) => {
                        warn!(%type_name, "skipping included resource of unregistered type");
                    }
                    Err(err) => return Err(err),
                }
            }

            let models = document
                .primary()
                .into_iter()
                .map(|resource| self.add_resource(resource))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(view) = view {
                for model in &models {
                    view.add(model)?;
                }
            }

            Ok(if document.is_collection() {
                ResponseData::Many(models)
            } else {
                ResponseData::One(models.into_iter().next())
            })
        })
    }

    fn add_resource(&self, resource: &Resource) -> Result<Model, DatxError> {
        let schema = self.inner.collection.registry().get(&resource.type_name)?;
        self.inner
            .collection
            .add_raw(resource.to_raw(schema.id_field()))
    }
}

impl std::fmt::Debug for NetworkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStore")
            .field("config", &self.inner.config)
            .field("cached", &self.inner.cache.len())
            .finish_non_exhaustive()
    }
}

/// Settles a claimed request key even if the leading request is dropped,
/// so followers never wait forever.
struct FlightGuard<'a> {
    cache: &'a CacheStore,
    key: &'a str,
    settled: bool,
}

impl<'a> FlightGuard<'a> {
    fn new(cache: &'a CacheStore, key: &'a str) -> Self {
        Self {
            cache,
            key,
            settled: false,
        }
    }

    fn finish(&mut self, result: &Result<RawResponse, NetworkError>) {
        self.cache.finish(self.key, result);
        self.settled = true;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.cache
                .finish(self.key, &Err(NetworkError::new("request abandoned")));
        }
    }
}
