//! Model state: attribute values, stored links and out-of-band bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::id::{Id, RecordKey};
use crate::schema::RefTarget;

/// The stored side of a relationship field: record keys, never models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    One(Option<RecordKey>),
    Many(Vec<RecordKey>),
}

impl RefValue {
    pub fn keys(&self) -> Vec<&RecordKey> {
        match self {
            RefValue::One(key) => key.iter().collect(),
            RefValue::Many(keys) => keys.iter().collect(),
        }
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        match self {
            RefValue::One(Some(k)) => k == key,
            RefValue::One(None) => false,
            RefValue::Many(keys) => keys.contains(key),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RefValue::One(key) => key.is_none(),
            RefValue::Many(keys) => keys.is_empty(),
        }
    }

    /// Drop every link matching `remove`. Returns whether anything changed.
    pub(crate) fn strip(&mut self, remove: impl Fn(&RecordKey) -> bool) -> bool {
        match self {
            RefValue::One(key) => {
                if key.as_ref().is_some_and(&remove) {
                    *key = None;
                    true
                } else {
                    false
                }
            }
            RefValue::Many(keys) => {
                let before = keys.len();
                keys.retain(|k| !remove(k));
                keys.len() != before
            }
        }
    }

    /// Point every link at `old` to `new`. Returns whether anything changed.
    pub(crate) fn rename(&mut self, old: &RecordKey, new: &RecordKey) -> bool {
        let mut changed = false;
        match self {
            RefValue::One(Some(key)) if key == old => {
                *key = new.clone();
                changed = true;
            }
            RefValue::One(_) => {}
            RefValue::Many(keys) => {
                for key in keys.iter_mut().filter(|k| *k == old) {
                    *key = new.clone();
                    changed = true;
                }
            }
        }
        changed
    }

    /// Wire/snapshot form: bare ids, or `{type, id}` pairs for polymorphic targets.
    pub fn to_value(&self, target: &RefTarget) -> Value {
        let encode = |key: &RecordKey| {
            if target.is_polymorphic() {
                serde_json::json!({ "type": key.type_name, "id": key.id.to_value() })
            } else {
                key.id.to_value()
            }
        };
        match self {
            RefValue::One(None) => Value::Null,
            RefValue::One(Some(key)) => encode(key),
            RefValue::Many(keys) => Value::Array(keys.iter().map(encode).collect()),
        }
    }
}

/// Hidden bookkeeping for a model. Never part of its attributes.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    pub type_name: String,
    pub id: Id,
    pub persisted: bool,
    pub dirty: BTreeSet<String>,
}

/// Attribute and link values as of the last commit, used for dirty checks and revert.
#[derive(Debug, Clone, Default)]
pub(crate) struct Committed {
    pub attributes: Map<String, Value>,
    pub refs: BTreeMap<String, RefValue>,
}

#[derive(Debug, Clone)]
pub(crate) struct ModelState {
    pub meta: ModelMeta,
    pub attributes: Map<String, Value>,
    pub refs: BTreeMap<String, RefValue>,
    pub committed: Committed,
}

impl ModelState {
    pub fn new(
        type_name: String,
        id: Id,
        attributes: Map<String, Value>,
        refs: BTreeMap<String, RefValue>,
        persisted: bool,
    ) -> Self {
        Self {
            meta: ModelMeta {
                type_name,
                id,
                persisted,
                dirty: BTreeSet::new(),
            },
            committed: Committed {
                attributes: attributes.clone(),
                refs: refs.clone(),
            },
            attributes,
            refs,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.meta.type_name.clone(), self.meta.id.clone())
    }

    /// Local write: the field is dirty unless it is back to its committed value.
    pub fn write_attribute(&mut self, name: &str, value: Value) {
        let clean = self.committed.attributes.get(name) == Some(&value);
        self.attributes.insert(name.to_string(), value);
        self.track(name, clean);
    }

    pub fn write_ref(&mut self, name: &str, value: RefValue) {
        let clean = self.committed.refs.get(name) == Some(&value);
        self.refs.insert(name.to_string(), value);
        self.track(name, clean);
    }

    /// Write coming from the source of truth: the field is committed as-is.
    pub fn merge_attribute(&mut self, name: &str, value: Value) {
        self.committed
            .attributes
            .insert(name.to_string(), value.clone());
        self.attributes.insert(name.to_string(), value);
        self.meta.dirty.remove(name);
    }

    pub fn merge_ref(&mut self, name: &str, value: RefValue) {
        self.committed.refs.insert(name.to_string(), value.clone());
        self.refs.insert(name.to_string(), value);
        self.meta.dirty.remove(name);
    }

    fn track(&mut self, name: &str, clean: bool) {
        if clean {
            self.meta.dirty.remove(name);
        } else {
            self.meta.dirty.insert(name.to_string());
        }
    }

    pub fn commit(&mut self) {
        self.committed = Committed {
            attributes: self.attributes.clone(),
            refs: self.refs.clone(),
        };
        self.meta.dirty.clear();
    }

    /// Values of the named fields, or of every field without a filter.
    pub fn values(
        &self,
        only: Option<&BTreeSet<String>>,
    ) -> (Map<String, Value>, BTreeMap<String, RefValue>) {
        let wanted = |name: &String| only.map_or(true, |only| only.contains(name));
        let attributes = self
            .attributes
            .iter()
            .filter(|(name, _)| wanted(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let refs = self
            .refs
            .iter()
            .filter(|(name, _)| wanted(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        (attributes, refs)
    }

    /// Make the given values the committed baseline. A field edited since
    /// those values were taken stays dirty.
    pub fn commit_values(
        &mut self,
        attributes: Map<String, Value>,
        refs: BTreeMap<String, RefValue>,
    ) {
        for (name, value) in attributes {
            let clean = self.attributes.get(&name) == Some(&value);
            self.committed.attributes.insert(name.clone(), value);
            self.track(&name, clean);
        }
        for (name, value) in refs {
            let clean = self.refs.get(&name) == Some(&value);
            self.committed.refs.insert(name.clone(), value);
            self.track(&name, clean);
        }
    }

    pub fn revert(&mut self) {
        self.attributes = self.committed.attributes.clone();
        self.refs = self.committed.refs.clone();
        self.meta.dirty.clear();
    }
}
