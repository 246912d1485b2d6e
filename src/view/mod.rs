//! Views - live, optionally sorted and unique windows onto one record type.
//!
//! A view stores member identifiers only. Every read resolves them through the
//! collection, so members that were never added (or have been removed) simply
//! do not show up. Sorting is applied on read.
//!
//! A view does not keep its collection alive.
//!
//! ```ignore
//! let upcoming = View::new("event", &collection, Some(SortMethod::field("date")), &[], true)?;
//! upcoming.sync(json!([{ "id": "e2", "date": "2024-06-01T00:00:00Z" }, "e1"]))?;
//! for event in upcoming.list() {
//!     // ...
//! }
//! ```

mod sort;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;

use crate::collection::{Collection, CollectionInner};
use crate::id::{Id, RecordKey};
use crate::model::{Model, RawRecord};
use crate::DatxError;

pub use sort::{compare_values, SortMethod};

struct ViewState {
    members: Vec<Id>,
    sort: Option<SortMethod>,
    unique: bool,
}

pub(crate) struct ViewInner {
    type_name: String,
    collection: Weak<CollectionInner>,
    state: RwLock<ViewState>,
}

#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

impl View {
    /// Create a view over `type_name` records of `collection`.
    pub fn new(
        type_name: &str,
        collection: &Collection,
        sort: Option<SortMethod>,
        initial: &[Model],
        unique: bool,
    ) -> Result<View, DatxError> {
        if !collection.registry().contains(type_name) {
            return Err(DatxError::UnknownType(type_name.to_string()));
        }
        let view = View {
            inner: Arc::new(ViewInner {
                type_name: type_name.to_string(),
                collection: collection.downgrade(),
                state: RwLock::new(ViewState {
                    members: Vec::new(),
                    sort,
                    unique,
                }),
            }),
        };
        collection.attach_view(&view);
        for model in initial {
            view.add(model)?;
        }
        Ok(view)
    }

    pub(crate) fn from_inner(inner: Arc<ViewInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ViewInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    pub fn is_unique(&self) -> bool {
        self.inner.state.read().unique
    }

    pub fn collection(&self) -> Option<Collection> {
        self.inner.collection.upgrade().map(Collection::from_inner)
    }

    fn require_collection(&self) -> Result<Collection, DatxError> {
        self.collection().ok_or_else(|| DatxError::InvalidReference {
            type_name: self.inner.type_name.clone(),
            field: String::new(),
            reason: "the view's collection has been dropped".into(),
        })
    }

    /// Add raw data to the collection and its records to the view.
    ///
    /// Accepts a record object, an identifier, or a list of either.
    /// Identifiers join the view even if the record is not loaded yet.
    pub fn sync(&self, data: Value) -> Result<Vec<Model>, DatxError> {
        let collection = self.require_collection()?;
        let items = match data {
            Value::Array(items) => items,
            other => vec![other],
        };
        collection.batch(|| -> Result<Vec<Model>, DatxError> {
            let mut models = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(_) => {
                        let model = collection.add(&self.inner.type_name, item)?;
                        self.push(model.id());
                        models.push(model);
                    }
                    other => {
                        let id = Id::from_value(&other).ok_or_else(|| DatxError::InvalidReference {
                            type_name: self.inner.type_name.clone(),
                            field: String::new(),
                            reason: format!("cannot add {} to a view", other),
                        })?;
                        self.push(id.clone());
                        if let Some(model) = collection.find_one(&self.inner.type_name, id) {
                            models.push(model);
                        }
                    }
                }
            }
            Ok(models)
        })
    }

    /// Add one record with its envelope.
    pub fn sync_raw(&self, mut raw: RawRecord) -> Result<Model, DatxError> {
        let collection = self.require_collection()?;
        raw.type_name = Some(self.inner.type_name.clone());
        let model = collection.add_raw(raw)?;
        self.push(model.id());
        Ok(model)
    }

    /// Add a model, putting it into the collection first if needed.
    pub fn add(&self, model: &Model) -> Result<Model, DatxError> {
        if model.type_name() != self.inner.type_name {
            return Err(DatxError::InvalidReference {
                type_name: self.inner.type_name.clone(),
                field: String::new(),
                reason: format!("a {} view cannot hold a {}", self.inner.type_name, model.type_name()),
            });
        }
        let model = self.require_collection()?.add_model(model)?;
        self.push(model.id());
        Ok(model)
    }

    /// Add a member by identifier; it shows up once the record is in the collection.
    pub fn add_id(&self, id: impl Into<Id>) {
        self.push(id.into());
    }

    fn push(&self, id: Id) {
        let mut state = self.inner.state.write();
        if state.unique && state.members.contains(&id) {
            return;
        }
        state.members.push(id);
    }

    /// Drop every membership of `model`. Returns whether it was a member.
    pub fn remove(&self, model: &Model) -> bool {
        if model.type_name() != self.inner.type_name {
            return false;
        }
        let id = model.id();
        let mut state = self.inner.state.write();
        let before = state.members.len();
        state.members.retain(|member| member != &id);
        state.members.len() != before
    }

    pub fn remove_all(&self) {
        self.clear();
    }

    /// Current members, resolved and sorted.
    pub fn list(&self) -> Vec<Model> {
        let Some(collection) = self.collection() else {
            return Vec::new();
        };
        let (members, sort) = {
            let state = self.inner.state.read();
            (state.members.clone(), state.sort.clone())
        };
        let mut models: Vec<Model> = members
            .into_iter()
            .filter_map(|id| collection.find_one(&self.inner.type_name, id))
            .collect();
        if let Some(sort) = sort {
            sort.sort(&mut models);
        }
        models
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Model> {
        self.list().into_iter().nth(index)
    }

    pub fn contains(&self, model: &Model) -> bool {
        self.list().iter().any(|m| m.ptr_eq(model))
    }

    /// Raw membership, including identifiers that do not resolve.
    pub fn ids(&self) -> Vec<Id> {
        self.inner.state.read().members.clone()
    }

    pub fn set_sort(&self, sort: Option<SortMethod>) {
        self.inner.state.write().sort = sort;
    }

    pub(crate) fn clear(&self) {
        self.inner.state.write().members.clear();
    }

    pub(crate) fn strip(&self, removed: &HashSet<RecordKey>) {
        let type_name = &self.inner.type_name;
        self.inner
            .state
            .write()
            .members
            .retain(|id| !removed.contains(&RecordKey::new(type_name.as_str(), id.clone())));
    }

    pub(crate) fn rename(&self, old: &RecordKey, new: &RecordKey) {
        if old.type_name != self.inner.type_name {
            return;
        }
        let mut state = self.inner.state.write();
        for member in state.members.iter_mut().filter(|m| **m == old.id) {
            *member = new.id.clone();
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("View")
            .field("type", &self.inner.type_name)
            .field("members", &state.members)
            .field("sort", &state.sort)
            .field("unique", &state.unique)
            .finish()
    }
}
