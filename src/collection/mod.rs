//! Collections - the identity-mapped store of every record of every type.
//!
//! A `Collection` owns an ordered list of models plus an index from
//! `(type, id)` to model, so one record is only ever represented by one
//! instance. Adding data for a known key merges it into the existing instance.
//!
//! Clones of a `Collection` share the same store.
//!
//! ## Example
//!
//! ```ignore
//! let collection = Collection::new();
//! collection.register(Schema::new("person").attribute("name"));
//! collection.register(Schema::new("event").attribute("title").to_one("responsible", "person"));
//!
//! let event = collection.add("event", json!({
//!     "id": "e1",
//!     "title": "Launch",
//!     "responsible": { "id": "p1", "name": "Ada" },
//! }))?;
//!
//! let ada = collection.find_one("person", "p1").unwrap();
//! assert_eq!(event.one("responsible")?, Some(ada.clone()));
//!
//! collection.remove_one(&ada);
//! assert_eq!(event.one("responsible")?, None);
//! ```

mod hydrate;
mod records;
mod remove;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::id::{Id, RecordKey};
use crate::meta::{MetaRegistry, MetaScope};
use crate::model::{Model, Record, Snapshot};
use crate::observe::{Change, ChangeKind, ChangeSet, Observer, SubscriptionId};
use crate::schema::{Schema, TypeRegistry};
use crate::view::{SortMethod, View, ViewInner};
use crate::DatxError;

pub use records::RecordRepository;

#[derive(Default)]
struct CollectionState {
    models: Vec<Model>,
    index: HashMap<RecordKey, Model>,
    views: Vec<Weak<ViewInner>>,
    named_views: HashMap<String, View>,
}

pub(crate) struct CollectionInner {
    registry: TypeRegistry,
    meta: MetaRegistry,
    state: RwLock<CollectionState>,
    observer: Observer,
}

/// The record store. See the module docs.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

/// Every record in a collection, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub models: Vec<Snapshot>,
}

impl Collection {
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::new())
    }

    /// A collection over an existing (possibly shared) set of schemas.
    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                registry,
                meta: MetaRegistry::new(),
                state: RwLock::new(CollectionState::default()),
                observer: Observer::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<CollectionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<CollectionInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn register(&self, schema: Schema) -> Arc<Schema> {
        self.inner.registry.register(schema)
    }

    pub fn register_record<R: Record>(&self) -> Arc<Schema> {
        self.register(R::schema())
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    /// Side-table metadata for this collection's records and types.
    pub fn meta(&self) -> &MetaRegistry {
        &self.inner.meta
    }

    /// Metadata of one record, falling back to its type and the collection root.
    pub fn model_meta(&self, model: &Model, key: &str) -> Option<serde_json::Value> {
        self.inner.meta.lookup(
            &MetaScope::chain(Some(model.handle()), model.type_name()),
            key,
            crate::meta::MetaLookup::Nearest,
        )
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn find_one(&self, type_name: &str, id: impl Into<Id>) -> Option<Model> {
        self.find_by_key(&RecordKey::new(type_name, id))
    }

    pub fn find_by_key(&self, key: &RecordKey) -> Option<Model> {
        self.inner.state.read().index.get(key).cloned()
    }

    /// Every record of `type_name`, in insertion order.
    pub fn find_all(&self, type_name: &str) -> Vec<Model> {
        self.filter(type_name, |_| true)
    }

    pub fn filter(&self, type_name: &str, predicate: impl Fn(&Model) -> bool) -> Vec<Model> {
        self.models()
            .into_iter()
            .filter(|m| m.type_name() == type_name && predicate(m))
            .collect()
    }

    /// First record of `type_name` matching `predicate`.
    pub fn find(&self, type_name: &str, predicate: impl Fn(&Model) -> bool) -> Option<Model> {
        self.models()
            .into_iter()
            .find(|m| m.type_name() == type_name && predicate(m))
    }

    /// Every record of every type, in insertion order.
    pub fn models(&self) -> Vec<Model> {
        self.inner.state.read().models.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this exact instance is in the collection.
    pub fn has_item(&self, model: &Model) -> bool {
        self.find_by_key(&model.key())
            .is_some_and(|found| found.ptr_eq(model))
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Run `f` with change notifications held back; listeners get one change set at the end.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::new(&self.inner.observer);
        f()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(ChangeSet) + Send + Sync + 'static,
    {
        self.inner.observer.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.inner.observer.unsubscribe(id)
    }

    pub(crate) fn notify(&self, change: Change) {
        self.inner.observer.notify(change);
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub(crate) fn attach_view(&self, view: &View) {
        let mut state = self.inner.state.write();
        state.views.retain(|weak| weak.strong_count() > 0);
        state.views.push(view.downgrade());
    }

    pub(crate) fn views(&self) -> Vec<View> {
        self.inner
            .state
            .read()
            .views
            .iter()
            .filter_map(Weak::upgrade)
            .map(View::from_inner)
            .collect()
    }

    /// Create a view and keep it in the collection under `name`.
    pub fn create_view(
        &self,
        name: impl Into<String>,
        type_name: &str,
        sort: Option<SortMethod>,
        unique: bool,
    ) -> Result<View, DatxError> {
        let view = View::new(type_name, self, sort, &[], unique)?;
        self.add_view(name, &view);
        Ok(view)
    }

    pub fn add_view(&self, name: impl Into<String>, view: &View) {
        self.inner
            .state
            .write()
            .named_views
            .insert(name.into(), view.clone());
    }

    pub fn view(&self, name: &str) -> Result<View, DatxError> {
        self.inner
            .state
            .read()
            .named_views
            .get(name)
            .cloned()
            .ok_or_else(|| DatxError::UnknownView(name.to_string()))
    }

    // ------------------------------------------------------------------
    // Persistence hooks without a network
    // ------------------------------------------------------------------

    /// Accept a record's current state as persisted.
    pub fn save(&self, model: &Model) -> Result<Model, DatxError> {
        let model = self.add_model(model)?;
        model.commit();
        model.set_persisted(true);
        self.notify(Change::new(
            ChangeKind::Updated,
            model.type_name(),
            Some(&model.id()),
            None,
        ));
        Ok(model)
    }

    /// Remove a record. Returns whether it was in the collection.
    pub fn destroy(&self, model: &Model) -> bool {
        self.remove_one(model)
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            models: self.models().iter().map(Model::snapshot).collect(),
        }
    }

    /// Add every record of a snapshot; known records are merged.
    pub fn restore(&self, snapshot: CollectionSnapshot) -> Result<Vec<Model>, DatxError> {
        self.batch(|| {
            snapshot
                .models
                .into_iter()
                .map(|model| self.add_snapshot(model))
                .collect()
        })
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Collection")
            .field("models", &state.models.len())
            .field("views", &state.views.len())
            .field("named_views", &state.named_views.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Keeps the observer in batch mode until dropped, so panics still close the batch.
struct BatchGuard<'a> {
    observer: &'a Observer,
}

impl<'a> BatchGuard<'a> {
    fn new(observer: &'a Observer) -> Self {
        observer.begin();
        BatchGuard { observer }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.observer.end();
    }
}
