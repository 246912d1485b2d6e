//! RecordRepository - typed access to one record type of a collection.

use std::marker::PhantomData;

use serde_json::Value;

use super::Collection;
use crate::id::Id;
use crate::model::Record;
use crate::DatxError;

/// Typed wrapper over a collection for records of type `R`.
pub struct RecordRepository<'a, R> {
    collection: &'a Collection,
    _marker: PhantomData<R>,
}

impl<'a, R: Record> RecordRepository<'a, R> {
    pub fn new(collection: &'a Collection) -> Self {
        Self {
            collection,
            _marker: PhantomData,
        }
    }

    /// Add (or merge) a record from raw fields.
    pub fn add(&self, data: Value) -> Result<R, DatxError> {
        self.collection.add(R::TYPE, data).map(R::wrap)
    }

    pub fn get(&self, id: impl Into<Id>) -> Option<R> {
        self.collection.find_one(R::TYPE, id).map(R::wrap)
    }

    /// All records of this type, in insertion order.
    pub fn all(&self) -> Vec<R> {
        self.collection
            .find_all(R::TYPE)
            .into_iter()
            .map(R::wrap)
            .collect()
    }

    pub fn find(&self, predicate: &dyn Fn(&R) -> bool) -> Vec<R> {
        self.all().into_iter().filter(|r| predicate(r)).collect()
    }

    /// Returns true if the record was in the collection.
    pub fn remove(&self, record: &R) -> bool {
        self.collection.remove_one(record.model())
    }

    pub fn len(&self) -> usize {
        self.collection.find_all(R::TYPE).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Collection {
    /// Typed repository for `R`.
    pub fn records<R: Record>(&self) -> RecordRepository<'_, R> {
        RecordRepository::new(self)
    }
}
