//! Meta registry - out-of-band bookkeeping keyed by scope.
//!
//! Metadata lives in a side table instead of on the record, so it never shows up
//! among a model's attributes or in its snapshots. Scopes form a chain from the
//! most specific to the least specific:
//!
//! ```text
//! Model(handle)  ->  Type("event")  ->  Root
//! ```
//!
//! Lookups can read one scope (`Own`), take the nearest scope that defines a key
//! (`Nearest`), or merge object values down the whole chain (`Merged`), with more
//! specific scopes overriding keys from less specific ones.
//!
//! ## Example
//!
//! ```ignore
//! let meta = MetaRegistry::new();
//! meta.set(MetaScope::Root, "headers", json!({ "accept": "application/vnd.api+json" }));
//! meta.set(MetaScope::Type("event".into()), "headers", json!({ "x-tenant": "a" }));
//!
//! let chain = MetaScope::chain(None, "event");
//! let headers = meta.lookup(&chain, "headers", MetaLookup::Merged);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::id::ModelHandle;

/// One layer of the metadata chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetaScope {
    Root,
    Type(String),
    Model(ModelHandle),
}

impl MetaScope {
    /// Build the lookup chain for a record, most specific scope first.
    pub fn chain(handle: Option<ModelHandle>, type_name: &str) -> Vec<MetaScope> {
        let mut chain = Vec::with_capacity(3);
        if let Some(handle) = handle {
            chain.push(MetaScope::Model(handle));
        }
        chain.push(MetaScope::Type(type_name.to_string()));
        chain.push(MetaScope::Root);
        chain
    }
}

/// How `MetaRegistry::lookup` walks the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaLookup {
    /// Only the first scope in the chain.
    Own,
    /// First scope in the chain that defines the key.
    Nearest,
    /// Merge object values from the last scope to the first.
    Merged,
}

/// Side table of metadata. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct MetaRegistry {
    slots: Arc<RwLock<HashMap<MetaScope, Map<String, Value>>>>,
}

impl MetaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, scope: MetaScope, key: impl Into<String>, value: Value) {
        self.slots
            .write()
            .entry(scope)
            .or_default()
            .insert(key.into(), value);
    }

    pub fn get(&self, scope: &MetaScope, key: &str) -> Option<Value> {
        self.slots.read().get(scope).and_then(|m| m.get(key)).cloned()
    }

    /// Read a slot, installing `default` on first read.
    pub fn get_or_insert(&self, scope: MetaScope, key: &str, default: Value) -> Value {
        let mut slots = self.slots.write();
        slots
            .entry(scope)
            .or_default()
            .entry(key.to_string())
            .or_insert(default)
            .clone()
    }

    pub fn remove(&self, scope: &MetaScope, key: &str) -> Option<Value> {
        self.slots.write().get_mut(scope).and_then(|m| m.remove(key))
    }

    pub fn lookup(&self, chain: &[MetaScope], key: &str, mode: MetaLookup) -> Option<Value> {
        let slots = self.slots.read();
        let value_at = |scope: &MetaScope| slots.get(scope).and_then(|m| m.get(key));

        match mode {
            MetaLookup::Own => chain.first().and_then(value_at).cloned(),
            MetaLookup::Nearest => chain.iter().find_map(value_at).cloned(),
            MetaLookup::Merged => {
                let mut merged: Option<Value> = None;
                for value in chain.iter().rev().filter_map(value_at) {
                    merged = Some(match (merged, value) {
                        (Some(Value::Object(mut acc)), Value::Object(layer)) => {
                            for (k, v) in layer {
                                acc.insert(k.clone(), v.clone());
                            }
                            Value::Object(acc)
                        }
                        (_, value) => value.clone(),
                    });
                }
                merged
            }
        }
    }

    /// Copy every slot of `from` into `to`, keeping keys `to` already has.
    pub fn copy_scope(&self, from: &MetaScope, to: MetaScope) {
        let mut slots = self.slots.write();
        let Some(source) = slots.get(from).cloned() else {
            return;
        };
        let target = slots.entry(to).or_default();
        for (key, value) in source {
            target.entry(key).or_insert(value);
        }
    }

    pub fn remove_scope(&self, scope: &MetaScope) {
        self.slots.write().remove(scope);
    }

    /// Drop every model-scoped slot. Type and root slots are configuration and stay.
    pub fn clear_models(&self) {
        self.slots
            .write()
            .retain(|scope, _| !matches!(scope, MetaScope::Model(_)));
    }
}
