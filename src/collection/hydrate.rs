//! Hydration: raw data in, identity-mapped models out.

use serde_json::{Map, Value};
use tracing::debug;

use super::Collection;
use crate::id::RecordKey;
use crate::meta::MetaScope;
use crate::model::{identifier_key, parse_fields, parse_ref, Model, RawRecord, Snapshot};
use crate::observe::{Change, ChangeKind};
use crate::schema::RefTarget;
use crate::DatxError;

impl Collection {
    /// Add one record from raw fields; a known `(type, id)` is merged in place.
    ///
    /// Relationship fields may carry ids or nested record objects. Objects are
    /// added recursively, so `{ "id": "p1" }` makes sure `p1` exists.
    pub fn add(&self, type_name: &str, data: Value) -> Result<Model, DatxError> {
        self.add_raw(RawRecord::from_value(type_name, data)?)
    }

    /// Add a list of records (a single object is treated as a list of one).
    pub fn add_all(&self, type_name: &str, data: Value) -> Result<Vec<Model>, DatxError> {
        let items = match data {
            Value::Array(items) => items,
            other => vec![other],
        };
        self.batch(|| {
            items
                .into_iter()
                .map(|item| self.add(type_name, item))
                .collect()
        })
    }

    /// Add a record with its out-of-band envelope (persisted flag, links, meta).
    pub fn add_raw(&self, raw: RawRecord) -> Result<Model, DatxError> {
        let type_name = raw
            .type_name
            .clone()
            .ok_or_else(|| DatxError::UnknownType(String::new()))?;
        self.batch(|| self.hydrate(&type_name, raw))
    }

    pub fn add_snapshot(&self, snapshot: Snapshot) -> Result<Model, DatxError> {
        let schema = self.inner.registry.get(&snapshot.type_name)?;
        self.add_raw(snapshot.into_raw(schema.id_field()))
    }

    /// Put an existing model into the collection.
    ///
    /// When another instance already holds the same key, this model's data is
    /// merged into that instance and the stored one is returned.
    pub fn add_model(&self, model: &Model) -> Result<Model, DatxError> {
        if !self.inner.registry.contains(model.type_name()) {
            return Err(DatxError::UnknownType(model.type_name().to_string()));
        }
        let key = model.key();
        match self.insert(model) {
            Ok(()) => Ok(model.clone()),
            Err(existing) if existing.ptr_eq(model) => Ok(existing),
            Err(existing) => {
                let changed = existing.merge(model.attributes(), model.refs(), Some(model.is_persisted()));
                debug!(key = %key, fields = changed.len(), "merged model into existing record");
                self.notify_updated(&existing, &changed);
                Ok(existing)
            }
        }
    }

    pub(super) fn hydrate(&self, type_name: &str, raw: RawRecord) -> Result<Model, DatxError> {
        let schema = self.inner.registry.get(type_name)?;
        let persisted = raw.persisted;
        let linkage = raw.linkage;

        let mut nested = |_: &RefTarget,
                          nested_type: Option<String>,
                          mut object: Map<String, Value>|
         -> Result<RecordKey, DatxError> {
            let nested_type = nested_type.ok_or_else(|| DatxError::InvalidReference {
                type_name: type_name.to_string(),
                field: String::new(),
                reason: "cannot tell the type of a nested record".into(),
            })?;
            if linkage {
                if let Some(key) = identifier_key(Some(&nested_type), &object) {
                    return Ok(key);
                }
            }
            if self.inner.registry.field(&nested_type, "type").is_none() {
                object.remove("type");
            }
            let mut child = RawRecord::new(nested_type.clone(), object);
            child.persisted = persisted;
            Ok(self.hydrate(&nested_type, child)?.key())
        };

        let parsed = parse_fields(&schema, Some(&self.inner.registry), raw.fields, &mut nested)?;

        let existing = parsed
            .id
            .as_ref()
            .and_then(|id| self.find_one(type_name, id.clone()));

        let model = match existing {
            Some(model) => {
                let changed = model.merge(parsed.attributes, parsed.refs, persisted);
                debug!(key = %model.key(), fields = changed.len(), "merged raw data into existing record");
                self.notify_updated(&model, &changed);
                model
            }
            None => {
                let id = parsed.id.unwrap_or_else(|| schema.next_id());
                let model = Model::from_parts(
                    schema,
                    id,
                    parsed.attributes,
                    parsed.refs.clone(),
                    persisted.unwrap_or(false),
                );
                match self.insert(&model) {
                    Ok(()) => model,
                    Err(existing) => {
                        let changed = existing.merge(model.attributes(), parsed.refs, persisted);
                        self.notify_updated(&existing, &changed);
                        existing
                    }
                }
            }
        };

        let scope = MetaScope::Model(model.handle());
        if let Some(links) = raw.links {
            self.inner.meta.set(scope.clone(), "links", links);
        }
        if let Some(meta) = raw.meta {
            self.inner.meta.set(scope, "meta", meta);
        }

        for (name, def, value) in parsed.inverses {
            let keys = parse_ref(type_name, &name, &def.source, def.cardinality, value, &mut nested)?;
            let targets: Vec<Model> = keys
                .keys()
                .into_iter()
                .filter_map(|key| self.find_by_key(key))
                .collect();
            model.write_inverse(Some(self), &name, &def, &targets)?;
        }

        Ok(model)
    }

    /// Register a new instance. Hands back the occupant when the key is taken.
    fn insert(&self, model: &Model) -> Result<(), Model> {
        let key = model.key();
        {
            let mut state = self.inner.state.write();
            if let Some(existing) = state.index.get(&key) {
                return Err(existing.clone());
            }
            state.index.insert(key.clone(), model.clone());
            state.models.push(model.clone());
        }
        model.attach(self);
        debug!(key = %key, "record added");
        self.notify(Change::new(
            ChangeKind::Added,
            model.type_name(),
            Some(&key.id),
            None,
        ));
        Ok(())
    }

    fn notify_updated(&self, model: &Model, fields: &[String]) {
        let id = model.id();
        for field in fields {
            self.notify(Change::new(
                ChangeKind::Updated,
                model.type_name(),
                Some(&id),
                Some(field),
            ));
        }
    }
}
