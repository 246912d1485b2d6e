//! Models - single typed records in the graph.
//!
//! A `Model` is a cheap, clonable handle. Clones share one record: writing
//! through any clone is visible through all of them, and `==` compares identity.
//!
//! Relationship fields store record keys. Reads resolve those keys through a
//! collection's identity map, so a dangling link reads as `None` and to-many
//! reads skip ids that do not resolve. Inverse fields (back-references) are
//! computed on every read by scanning the collection.
//!
//! ## Example
//!
//! ```ignore
//! let event = collection.add("event", json!({ "id": "1", "title": "Launch", "responsible": "p1" }))?;
//!
//! event.set("title", "Launch party")?;
//! assert!(event.is_field_dirty("title"));
//!
//! let person = event.one("responsible")?;
//! let organized = person.unwrap().many("organizes")?;
//! ```

mod fields;
mod raw;
mod record;
mod state;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::collection::{Collection, CollectionInner};
use crate::id::{Id, ModelHandle, RecordKey};
use crate::meta::MetaScope;
use crate::observe::{Change, ChangeKind};
use crate::schema::{Cardinality, Field, FieldKind, InverseDef, Schema};
use crate::DatxError;

pub(crate) use fields::{identifier_key, parse_fields, parse_ref};
pub use raw::{RawRecord, Snapshot, SnapshotOptions};
pub use record::Record;
pub use state::{ModelMeta, RefValue};
pub(crate) use state::ModelState;

pub(crate) struct ModelInner {
    handle: ModelHandle,
    schema: Arc<Schema>,
    state: RwLock<ModelState>,
    /// Owning collections, first one is the default scope for relationship reads.
    collections: RwLock<Vec<Weak<CollectionInner>>>,
}

/// A record instance. See the module docs.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Build a standalone model from raw fields.
    ///
    /// Relationship fields may hold ids or identifier objects; nested record
    /// data is only hydrated by `Collection::add`. Without an id in `data`, the
    /// schema hands out a temporary one.
    pub fn new(schema: Arc<Schema>, data: Value) -> Result<Model, DatxError> {
        let raw = RawRecord::from_value(schema.type_name(), data)?;
        let mut standalone = |_: &crate::schema::RefTarget,
                              type_name: Option<String>,
                              object: Map<String, Value>|
         -> Result<RecordKey, DatxError> {
            let id = object.get("id").and_then(Id::from_value);
            match (type_name, id) {
                (Some(type_name), Some(id)) => Ok(RecordKey::new(type_name, id)),
                _ => Err(DatxError::InvalidReference {
                    type_name: schema.type_name().to_string(),
                    field: String::new(),
                    reason: "nested records need a collection to be hydrated".into(),
                }),
            }
        };
        let parsed = parse_fields(&schema, None, raw.fields, &mut standalone)?;
        let id = parsed.id.unwrap_or_else(|| schema.next_id());
        let persisted = raw.persisted.unwrap_or(false);
        Ok(Model::from_parts(
            Arc::clone(&schema),
            id,
            parsed.attributes,
            parsed.refs,
            persisted,
        ))
    }

    /// Assemble a model, filling attribute defaults and empty declared links.
    pub(crate) fn from_parts(
        schema: Arc<Schema>,
        id: Id,
        mut attributes: Map<String, Value>,
        mut refs: BTreeMap<String, RefValue>,
        persisted: bool,
    ) -> Model {
        for (name, options) in schema.attributes() {
            if let Some(default) = &options.default {
                attributes
                    .entry(name.to_string())
                    .or_insert_with(|| default.clone());
            }
        }
        for (name, _, cardinality) in schema.references() {
            refs.entry(name.to_string()).or_insert_with(|| match cardinality {
                Cardinality::One => RefValue::One(None),
                Cardinality::Many => RefValue::Many(Vec::new()),
            });
        }

        let state = ModelState::new(
            schema.type_name().to_string(),
            id,
            attributes,
            refs,
            persisted,
        );
        Model {
            inner: Arc::new(ModelInner {
                handle: ModelHandle::next(),
                schema,
                state: RwLock::new(state),
                collections: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn handle(&self) -> ModelHandle {
        self.inner.handle
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn type_name(&self) -> &str {
        self.inner.schema.type_name()
    }

    pub fn id(&self) -> Id {
        self.inner.state.read().meta.id.clone()
    }

    pub fn key(&self) -> RecordKey {
        self.inner.state.read().key()
    }

    /// Copy of the hidden bookkeeping (type, id, persisted flag, dirty fields).
    pub fn meta(&self) -> ModelMeta {
        self.inner.state.read().meta.clone()
    }

    pub fn is_persisted(&self) -> bool {
        self.inner.state.read().meta.persisted
    }

    pub(crate) fn set_persisted(&self, persisted: bool) {
        self.inner.state.write().meta.persisted = persisted;
    }

    /// Same record, not merely equal data.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Parsed attribute values. Never includes the id, links or bookkeeping.
    pub fn attributes(&self) -> Map<String, Value> {
        self.inner.state.read().attributes.clone()
    }

    pub fn attr(&self, name: &str) -> Option<Value> {
        if name == self.inner.schema.id_field() {
            return Some(self.id().to_value());
        }
        self.inner.state.read().attributes.get(name).cloned()
    }

    /// Typed read of an attribute. `None` when missing or not deserializable as `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.attr(name)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Write one field.
    ///
    /// The id field goes through `set_id`. Relationship fields accept ids or
    /// identifier objects. Attributes run through their codec and become dirty
    /// unless the value equals the committed one.
    pub fn set<T: Serialize>(&self, name: &str, value: T) -> Result<(), DatxError> {
        let value = serde_json::to_value(value)?;

        if name == self.inner.schema.id_field() {
            let id = Id::from_value(&value).ok_or_else(|| DatxError::InvalidReference {
                type_name: self.type_name().to_string(),
                field: name.to_string(),
                reason: "identifier must be a string or integer".into(),
            })?;
            return self.set_id(id);
        }

        match self.field_def(name, None).map(|f| f.kind) {
            Some(FieldKind::Reference {
                target,
                cardinality,
                ..
            }) => {
                let type_name = self.type_name().to_string();
                let mut identifiers_only = |_: &crate::schema::RefTarget,
                                            nested: Option<String>,
                                            object: Map<String, Value>|
                 -> Result<RecordKey, DatxError> {
                    identifier_key(nested.as_deref(), &object).ok_or_else(|| {
                        DatxError::InvalidReference {
                            type_name: type_name.clone(),
                            field: name.to_string(),
                            reason: "use Collection::add to link nested records".into(),
                        }
                    })
                };
                let refs = parse_ref(
                    self.type_name(),
                    name,
                    &target,
                    cardinality,
                    value,
                    &mut identifiers_only,
                )?;
                self.inner.state.write().write_ref(name, refs);
            }
            Some(FieldKind::Inverse(_)) => {
                return Err(DatxError::InvalidReference {
                    type_name: self.type_name().to_string(),
                    field: name.to_string(),
                    reason: "computed field; write it with set_one/set_many".into(),
                });
            }
            Some(FieldKind::Attribute(options)) => {
                let value = options.parse(name, value)?;
                self.inner.state.write().write_attribute(name, value);
            }
            None => self.inner.state.write().write_attribute(name, value),
        }

        self.notify(ChangeKind::Updated, Some(name));
        Ok(())
    }

    /// Write several fields from one object, in order.
    pub fn assign(&self, fields: Value) -> Result<(), DatxError> {
        let Value::Object(fields) = fields else {
            return Err(DatxError::Serde("assign expects an object".into()));
        };
        for (name, value) in fields {
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// Change the identifier.
    ///
    /// Fails once the record is persisted. Every owning collection moves its
    /// index entry, and links held by other records follow the new id.
    pub fn set_id(&self, id: impl Into<Id>) -> Result<(), DatxError> {
        let id = id.into();
        let old = self.key();
        if old.id == id {
            return Ok(());
        }
        if self.is_persisted() {
            return Err(DatxError::ImmutableIdentifier {
                type_name: old.type_name,
                id: old.id.to_string(),
            });
        }
        self.assign_id(id)
    }

    /// Move to a new identifier regardless of persistence (server-assigned ids).
    pub(crate) fn assign_id(&self, id: Id) -> Result<(), DatxError> {
        let old = self.key();
        let new = RecordKey::new(old.type_name.clone(), id.clone());
        let collections = self.collections();

        for collection in &collections {
            if let Some(existing) = collection.find_by_key(&new) {
                if !existing.ptr_eq(self) {
                    return Err(DatxError::IdentifierConflict {
                        type_name: new.type_name,
                        id: new.id.to_string(),
                    });
                }
            }
        }

        self.inner.state.write().meta.id = id;
        for collection in &collections {
            collection.reindex(self, &old, &new);
        }
        debug!(from = %old, to = %new, "record identifier changed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        !self.inner.state.read().meta.dirty.is_empty()
    }

    pub fn is_field_dirty(&self, name: &str) -> bool {
        self.inner.state.read().meta.dirty.contains(name)
    }

    pub fn dirty_fields(&self) -> BTreeSet<String> {
        self.inner.state.read().meta.dirty.clone()
    }

    /// Accept the current values as the new baseline.
    pub fn commit(&self) {
        self.inner.state.write().commit();
    }

    /// Current values of `only`, or of every field.
    pub(crate) fn field_values(
        &self,
        only: Option<&BTreeSet<String>>,
    ) -> (Map<String, Value>, BTreeMap<String, RefValue>) {
        self.inner.state.read().values(only)
    }

    pub(crate) fn commit_values(
        &self,
        attributes: Map<String, Value>,
        refs: BTreeMap<String, RefValue>,
    ) {
        self.inner.state.write().commit_values(attributes, refs);
    }

    /// Throw away local edits since the last commit.
    pub fn revert(&self) {
        self.inner.state.write().revert();
        self.notify(ChangeKind::Updated, None);
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Stored keys of a relationship field.
    pub fn ref_value(&self, name: &str) -> Option<RefValue> {
        self.inner.state.read().refs.get(name).cloned()
    }

    pub(crate) fn refs(&self) -> BTreeMap<String, RefValue> {
        self.inner.state.read().refs.clone()
    }

    pub(crate) fn links_to(&self, field: &str, key: &RecordKey) -> bool {
        self.inner
            .state
            .read()
            .refs
            .get(field)
            .is_some_and(|refs| refs.contains(key))
    }

    /// Read a to-one field (or to-one inverse) in the default collection.
    pub fn one(&self, field: &str) -> Result<Option<Model>, DatxError> {
        match self.primary_collection() {
            Some(collection) => self.one_in(&collection, field),
            None => {
                self.reference_def(field, None)?;
                Ok(None)
            }
        }
    }

    /// Read a to-many field (or to-many inverse) in the default collection.
    pub fn many(&self, field: &str) -> Result<Vec<Model>, DatxError> {
        match self.primary_collection() {
            Some(collection) => self.many_in(&collection, field),
            None => {
                self.reference_def(field, None)?;
                Ok(Vec::new())
            }
        }
    }

    /// Read a to-one field resolved through `collection`.
    pub fn one_in(&self, collection: &Collection, field: &str) -> Result<Option<Model>, DatxError> {
        match self.reference_def(field, Some(collection))? {
            FieldKind::Reference {
                cardinality: Cardinality::One,
                ..
            } => {
                let key = match self.ref_value(field) {
                    Some(RefValue::One(Some(key))) => key,
                    _ => return Ok(None),
                };
                Ok(collection.find_by_key(&key))
            }
            FieldKind::Inverse(def) if def.cardinality == Cardinality::One => {
                Ok(self.inverse_in(collection, &def).into_iter().next())
            }
            _ => Err(self.cardinality_error(field, "holds many records; read it with many")),
        }
    }

    /// Read a to-many field resolved through `collection`, skipping dangling ids.
    pub fn many_in(&self, collection: &Collection, field: &str) -> Result<Vec<Model>, DatxError> {
        match self.reference_def(field, Some(collection))? {
            FieldKind::Reference {
                cardinality: Cardinality::Many,
                ..
            } => {
                let keys = match self.ref_value(field) {
                    Some(RefValue::Many(keys)) => keys,
                    _ => return Ok(Vec::new()),
                };
                Ok(keys
                    .iter()
                    .filter_map(|key| collection.find_by_key(key))
                    .collect())
            }
            FieldKind::Inverse(def) if def.cardinality == Cardinality::Many => {
                Ok(self.inverse_in(collection, &def))
            }
            _ => Err(self.cardinality_error(field, "holds one record; read it with one")),
        }
    }

    /// Point a to-one field (or to-one inverse) at `target`.
    ///
    /// A target that is not yet in this record's collection is added to it.
    pub fn set_one(&self, field: &str, target: Option<&Model>) -> Result<(), DatxError> {
        let collection = self.primary_collection();
        match self.reference_def(field, collection.as_ref())? {
            FieldKind::Reference {
                target: ref_target,
                cardinality: Cardinality::One,
                ..
            } => {
                let key = match target {
                    Some(model) => {
                        self.check_target(field, &ref_target, model)?;
                        Some(self.adopt(collection.as_ref(), model)?.key())
                    }
                    None => None,
                };
                self.inner
                    .state
                    .write()
                    .write_ref(field, RefValue::One(key));
                self.notify(ChangeKind::Updated, Some(field));
                Ok(())
            }
            FieldKind::Inverse(def) if def.cardinality == Cardinality::One => {
                let targets: Vec<Model> = target.into_iter().cloned().collect();
                self.write_inverse(collection.as_ref(), field, &def, &targets)
            }
            _ => Err(self.cardinality_error(field, "holds many records; write it with set_many")),
        }
    }

    /// Replace the records of a to-many field (or to-many inverse). Order is kept.
    pub fn set_many(&self, field: &str, targets: &[Model]) -> Result<(), DatxError> {
        let collection = self.primary_collection();
        match self.reference_def(field, collection.as_ref())? {
            FieldKind::Reference {
                target: ref_target,
                cardinality: Cardinality::Many,
                ..
            } => {
                let mut keys = Vec::with_capacity(targets.len());
                for model in targets {
                    self.check_target(field, &ref_target, model)?;
                    keys.push(self.adopt(collection.as_ref(), model)?.key());
                }
                self.inner
                    .state
                    .write()
                    .write_ref(field, RefValue::Many(keys));
                self.notify(ChangeKind::Updated, Some(field));
                Ok(())
            }
            FieldKind::Inverse(def) if def.cardinality == Cardinality::Many => {
                self.write_inverse(collection.as_ref(), field, &def, targets)
            }
            _ => Err(self.cardinality_error(field, "holds one record; write it with set_one")),
        }
    }

    /// Append one record to a to-many field.
    pub fn push_many(&self, field: &str, target: &Model) -> Result<(), DatxError> {
        let mut current = match self.ref_value(field) {
            Some(RefValue::Many(_)) => self.many(field)?,
            _ => {
                return self.set_many(field, std::slice::from_ref(target));
            }
        };
        current.push(target.clone());
        self.set_many(field, &current)
    }

    /// Remove every link to `target` from a to-many field. Returns whether it was linked.
    pub fn remove_from_many(&self, field: &str, target: &Model) -> Result<bool, DatxError> {
        let collection = self.primary_collection();
        if let FieldKind::Inverse(def) = self.reference_def(field, collection.as_ref())? {
            let current = self.many(field)?;
            let remaining: Vec<Model> = current
                .iter()
                .filter(|m| !m.ptr_eq(target))
                .cloned()
                .collect();
            let removed = remaining.len() != current.len();
            self.write_inverse(collection.as_ref(), field, &def, &remaining)?;
            return Ok(removed);
        }

        let key = target.key();
        let removed = {
            let mut state = self.inner.state.write();
            match state.refs.get(field).cloned() {
                Some(mut refs @ RefValue::Many(_)) => {
                    let removed = refs.strip(|k| k == &key);
                    if removed {
                        state.write_ref(field, refs);
                    }
                    removed
                }
                _ => return Err(self.cardinality_error(field, "holds one record")),
            }
        };
        if removed {
            self.notify(ChangeKind::Updated, Some(field));
        }
        Ok(removed)
    }

    /// Records of `def.source` whose forward field links to this record, in collection order.
    fn inverse_in(&self, collection: &Collection, def: &InverseDef) -> Vec<Model> {
        let key = self.key();
        collection
            .models()
            .into_iter()
            .filter(|m| def.source.accepts(m.type_name()) && m.links_to(&def.forward, &key))
            .collect()
    }

    /// Rewrite the forward side so the inverse `field` reads as exactly `targets`.
    pub(crate) fn write_inverse(
        &self,
        collection: Option<&Collection>,
        field: &str,
        def: &InverseDef,
        targets: &[Model],
    ) -> Result<(), DatxError> {
        let Some(collection) = collection else {
            return Err(DatxError::InvalidReference {
                type_name: self.type_name().to_string(),
                field: field.to_string(),
                reason: "computed fields need the record to be in a collection".into(),
            });
        };
        for model in targets {
            if !def.source.accepts(model.type_name()) {
                return Err(self.cardinality_error(
                    field,
                    &format!("cannot hold a {}", model.type_name()),
                ));
            }
        }

        let key = self.key();
        let current = self.inverse_in(collection, def);
        for model in current.iter().filter(|m| !targets.iter().any(|t| t.ptr_eq(m))) {
            model.unlink(&def.forward, &key);
        }
        for model in targets {
            if !current.iter().any(|c| c.ptr_eq(model)) {
                let model = collection.add_model(model)?;
                model.link(&def.forward, &key)?;
            }
        }
        Ok(())
    }

    fn link(&self, field: &str, key: &RecordKey) -> Result<(), DatxError> {
        let cardinality = self
            .inner
            .schema
            .references()
            .find(|(name, _, _)| *name == field)
            .map(|(_, _, c)| c)
            .ok_or_else(|| DatxError::UnknownField {
                type_name: self.type_name().to_string(),
                field: field.to_string(),
            })?;
        {
            let mut state = self.inner.state.write();
            let value = match (cardinality, state.refs.get(field).cloned()) {
                (Cardinality::One, _) => RefValue::One(Some(key.clone())),
                (Cardinality::Many, Some(RefValue::Many(mut keys))) => {
                    keys.push(key.clone());
                    RefValue::Many(keys)
                }
                (Cardinality::Many, _) => RefValue::Many(vec![key.clone()]),
            };
            state.write_ref(field, value);
        }
        self.notify(ChangeKind::Updated, Some(field));
        Ok(())
    }

    fn unlink(&self, field: &str, key: &RecordKey) {
        let changed = {
            let mut state = self.inner.state.write();
            match state.refs.get(field).cloned() {
                Some(mut refs) => {
                    let removed = refs.strip(|k| k == key);
                    if removed {
                        state.write_ref(field, refs);
                    }
                    removed
                }
                None => false,
            }
        };
        if changed {
            self.notify(ChangeKind::Updated, Some(field));
        }
    }

    /// Cascade cleanup: drop links to removed records without marking anything dirty.
    pub(crate) fn strip_links(&self, removed: &dyn Fn(&RecordKey) -> bool) -> Vec<String> {
        let mut state = self.inner.state.write();
        let mut changed = Vec::new();
        for (name, refs) in state.refs.iter_mut() {
            if refs.strip(removed) {
                changed.push(name.clone());
            }
        }
        for name in &changed {
            if let Some(refs) = state.committed.refs.get_mut(name) {
                refs.strip(removed);
            }
        }
        changed
    }

    pub(crate) fn rename_links(&self, old: &RecordKey, new: &RecordKey) {
        let mut state = self.inner.state.write();
        for refs in state.refs.values_mut() {
            refs.rename(old, new);
        }
        for refs in state.committed.refs.values_mut() {
            refs.rename(old, new);
        }
    }

    fn check_target(
        &self,
        field: &str,
        target: &crate::schema::RefTarget,
        model: &Model,
    ) -> Result<(), DatxError> {
        if target.accepts(model.type_name()) {
            Ok(())
        } else {
            Err(self.cardinality_error(field, &format!("cannot hold a {}", model.type_name())))
        }
    }

    /// Make sure `model` lives in the record's collection; returns the canonical instance.
    fn adopt(&self, collection: Option<&Collection>, model: &Model) -> Result<Model, DatxError> {
        match collection {
            Some(collection) => collection.add_model(model),
            None => Ok(model.clone()),
        }
    }

    fn field_def(&self, name: &str, collection: Option<&Collection>) -> Option<Field> {
        if let Some(field) = self.inner.schema.get_field(name) {
            return Some(field.clone());
        }
        let collection = match collection {
            Some(c) => Some(c.clone()),
            None => self.primary_collection(),
        };
        collection.and_then(|c| c.registry().field(self.type_name(), name))
    }

    fn reference_def(
        &self,
        name: &str,
        collection: Option<&Collection>,
    ) -> Result<FieldKind, DatxError> {
        match self.field_def(name, collection) {
            Some(field) if field.is_reference() => Ok(field.kind),
            Some(_) => Err(DatxError::NotARelationship {
                type_name: self.type_name().to_string(),
                field: name.to_string(),
            }),
            None => Err(DatxError::UnknownField {
                type_name: self.type_name().to_string(),
                field: name.to_string(),
            }),
        }
    }

    fn cardinality_error(&self, field: &str, reason: &str) -> DatxError {
        DatxError::InvalidReference {
            type_name: self.type_name().to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Hydration
    // ------------------------------------------------------------------

    /// Merge server/raw data in place: present fields overwrite and are committed,
    /// absent fields stay untouched.
    pub(crate) fn merge(
        &self,
        attributes: Map<String, Value>,
        refs: BTreeMap<String, RefValue>,
        persisted: Option<bool>,
    ) -> Vec<String> {
        let mut state = self.inner.state.write();
        let mut changed = Vec::new();
        for (name, value) in attributes {
            if state.attributes.get(&name) != Some(&value) {
                changed.push(name.clone());
            }
            state.merge_attribute(&name, value);
        }
        for (name, value) in refs {
            if state.refs.get(&name) != Some(&value) {
                changed.push(name.clone());
            }
            state.merge_ref(&name, value);
        }
        if let Some(persisted) = persisted {
            state.meta.persisted = persisted;
        }
        changed
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_with(SnapshotOptions::default())
    }

    /// Serializable picture of the record; attributes in wire form, links as ids.
    pub fn snapshot_with(&self, options: SnapshotOptions) -> Snapshot {
        let state = self.inner.state.read();
        let include = |name: &str| !options.only_dirty || state.meta.dirty.contains(name);
        let schema = &self.inner.schema;

        let mut attributes = Map::new();
        for (name, value) in state.attributes.iter().filter(|(n, _)| include(n)) {
            let value = match schema.get_field(name).map(|f| &f.kind) {
                Some(FieldKind::Attribute(options)) => options.serialize(value),
                _ => value.clone(),
            };
            attributes.insert(name.clone(), value);
        }

        let mut relationships = Map::new();
        for (name, target, _) in schema.references().filter(|(n, _, _)| include(n)) {
            if let Some(refs) = state.refs.get(name) {
                relationships.insert(name.to_string(), refs.to_value(target));
            }
        }

        Snapshot {
            type_name: state.meta.type_name.clone(),
            id: state.meta.id.clone(),
            persisted: state.meta.persisted,
            attributes,
            relationships,
        }
    }

    /// Flat raw form, accepted back by `Collection::add`.
    pub fn to_value(&self) -> Value {
        let id_field = self.inner.schema.id_field().to_string();
        let raw = self.snapshot().into_raw(&id_field);
        Value::Object(raw.fields)
    }

    /// Structural copy: a new record with the same data and no collection.
    ///
    /// Side-table metadata is copied in every collection the original belongs to.
    pub fn clone_model(&self) -> Model {
        let state = self.inner.state.read().clone();
        let copy = Model {
            inner: Arc::new(ModelInner {
                handle: ModelHandle::next(),
                schema: Arc::clone(&self.inner.schema),
                state: RwLock::new(state),
                collections: RwLock::new(Vec::new()),
            }),
        };
        for collection in self.collections() {
            collection.meta().copy_scope(
                &MetaScope::Model(self.handle()),
                MetaScope::Model(copy.handle()),
            );
        }
        copy
    }

    // ------------------------------------------------------------------
    // Collection membership
    // ------------------------------------------------------------------

    /// Live collections this record belongs to, default scope first.
    pub fn collections(&self) -> Vec<Collection> {
        let mut owners = self.inner.collections.write();
        owners.retain(|weak| weak.strong_count() > 0);
        owners
            .iter()
            .filter_map(Weak::upgrade)
            .map(Collection::from_inner)
            .collect()
    }

    pub fn collection(&self) -> Option<Collection> {
        self.primary_collection()
    }

    fn primary_collection(&self) -> Option<Collection> {
        self.inner
            .collections
            .read()
            .iter()
            .find_map(Weak::upgrade)
            .map(Collection::from_inner)
    }

    pub(crate) fn attach(&self, collection: &Collection) {
        let mut owners = self.inner.collections.write();
        let weak = collection.downgrade();
        if !owners.iter().any(|w| w.ptr_eq(&weak)) {
            owners.push(weak);
        }
    }

    pub(crate) fn detach(&self, collection: &Collection) {
        let weak = collection.downgrade();
        self.inner
            .collections
            .write()
            .retain(|w| !w.ptr_eq(&weak) && w.strong_count() > 0);
    }

    fn notify(&self, kind: ChangeKind, field: Option<&str>) {
        let change = Change::new(kind, self.type_name(), Some(&self.id()), field);
        for collection in self.collections() {
            collection.notify(change.clone());
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Model")
            .field("type", &state.meta.type_name)
            .field("id", &state.meta.id)
            .field("persisted", &state.meta.persisted)
            .field("attributes", &state.attributes)
            .field("refs", &state.refs)
            .finish()
    }
}
