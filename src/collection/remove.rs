//! Removal with cascading link cleanup, reset and identifier moves.

use std::collections::HashSet;

use tracing::debug;

use super::Collection;
use crate::id::{Id, RecordKey};
use crate::meta::MetaScope;
use crate::model::Model;
use crate::observe::{Change, ChangeKind};

impl Collection {
    /// Remove one record. Returns whether this instance was in the collection.
    pub fn remove_one(&self, model: &Model) -> bool {
        if !self.has_item(model) {
            return false;
        }
        !self.remove_keys(vec![model.key()]).is_empty()
    }

    pub fn remove_by_key(&self, type_name: &str, id: impl Into<Id>) -> Option<Model> {
        self.remove_keys(vec![RecordKey::new(type_name, id)])
            .into_iter()
            .next()
    }

    /// Remove every record of `type_name`.
    pub fn remove_all(&self, type_name: &str) -> Vec<Model> {
        let keys = self.find_all(type_name).iter().map(Model::key).collect();
        self.remove_keys(keys)
    }

    /// Drop every record and empty every view. Named views stay registered.
    pub fn reset(&self) {
        let removed = {
            let mut state = self.inner.state.write();
            state.index.clear();
            std::mem::take(&mut state.models)
        };
        for model in &removed {
            model.detach(self);
        }
        self.inner.meta.clear_models();
        for view in self.views() {
            view.clear();
        }
        debug!(removed = removed.len(), "collection reset");
        self.notify(Change::reset());
    }

    /// Unlink the removed records everywhere they are referenced.
    ///
    /// Only types that can link to a removed type are scanned, but that includes
    /// every type with a polymorphic or dynamic relationship.
    fn remove_keys(&self, keys: Vec<RecordKey>) -> Vec<Model> {
        let removed: Vec<Model> = {
            let mut state = self.inner.state.write();
            let removed: Vec<Model> = keys
                .iter()
                .filter_map(|key| state.index.remove(key))
                .collect();
            if removed.is_empty() {
                return removed;
            }
            state
                .models
                .retain(|m| !removed.iter().any(|r| r.ptr_eq(m)));
            removed
        };

        self.batch(|| {
            let keys: HashSet<RecordKey> = removed.iter().map(Model::key).collect();
            for model in &removed {
                model.detach(self);
                self.inner
                    .meta
                    .remove_scope(&MetaScope::Model(model.handle()));
            }

            let referrers: HashSet<String> = keys
                .iter()
                .map(|key| key.type_name.as_str())
                .collect::<HashSet<_>>()
                .into_iter()
                .flat_map(|type_name| self.inner.registry.referrers(type_name))
                .map(|schema| schema.type_name().to_string())
                .collect();

            let is_removed = |key: &RecordKey| keys.contains(key);
            for model in self
                .models()
                .into_iter()
                .filter(|m| referrers.contains(m.type_name()))
            {
                let id = model.id();
                for field in model.strip_links(&is_removed) {
                    self.notify(Change::new(
                        ChangeKind::Updated,
                        model.type_name(),
                        Some(&id),
                        Some(&field),
                    ));
                }
            }

            for view in self.views() {
                view.strip(&keys);
            }

            for model in &removed {
                debug!(key = %model.key(), "record removed");
                self.notify(Change::new(
                    ChangeKind::Removed,
                    model.type_name(),
                    Some(&model.id()),
                    None,
                ));
            }
        });

        removed
    }

    /// Move an index entry after a record's identifier changed.
    pub(crate) fn reindex(&self, model: &Model, old: &RecordKey, new: &RecordKey) {
        {
            let mut state = self.inner.state.write();
            if state
                .index
                .get(old)
                .is_some_and(|stored| stored.ptr_eq(model))
            {
                state.index.remove(old);
            }
            state.index.insert(new.clone(), model.clone());
        }

        for other in self.models() {
            other.rename_links(old, new);
        }
        for view in self.views() {
            view.rename(old, new);
        }
        self.notify(Change::new(
            ChangeKind::Updated,
            model.type_name(),
            Some(&new.id),
            Some(model.schema().id_field()),
        ));
    }
}
