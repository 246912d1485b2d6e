//! JSON:API documents.
//!
//! Decoding turns resource objects into [`RawRecord`]s for `Collection::add_raw`
//! (persisted, with the resource's `links`/`meta` in the envelope). Encoding
//! turns a model into a resource object for POST (every attribute) or PATCH
//! (dirty fields only).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::id::Id;
use crate::model::{Model, RawRecord, RefValue, SnapshotOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorObject>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonapi: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<Resource>),
    One(Box<Resource>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// `None`: no `data` member (links-only). `Some(None)`: `"data": null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Option<Linkage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceIdentifier>),
    One(ResourceIdentifier),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// A links object. Members are either URLs or `{ href, meta }` objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Links(pub Map<String, Value>);

impl Links {
    pub fn href(&self, name: &str) -> Option<&str> {
        match self.0.get(name)? {
            Value::String(url) => Some(url),
            Value::Object(link) => link.get("href").and_then(Value::as_str),
            _ => None,
        }
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl Document {
    /// Primary resources, in document order.
    pub fn primary(&self) -> Vec<&Resource> {
        match &self.data {
            Some(PrimaryData::Many(resources)) => resources.iter().collect(),
            Some(PrimaryData::One(resource)) => vec![resource.as_ref()],
            None => Vec::new(),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.data, Some(PrimaryData::Many(_)))
    }

    pub fn single(resource: Resource) -> Self {
        Self {
            data: Some(PrimaryData::One(Box::new(resource))),
            ..Default::default()
        }
    }
}

impl Resource {
    /// Hydration input for the collection. `id_attribute` is the schema's id field.
    pub fn to_raw(&self, id_attribute: &str) -> RawRecord {
        let mut fields = self.attributes.clone();
        for (name, relationship) in &self.relationships {
            // Links-only relationships leave the stored value alone.
            let Some(data) = &relationship.data else {
                continue;
            };
            let value = match data {
                None => Value::Null,
                Some(Linkage::One(identifier)) => identifier.to_value(),
                Some(Linkage::Many(identifiers)) => {
                    Value::Array(identifiers.iter().map(ResourceIdentifier::to_value).collect())
                }
            };
            fields.insert(name.clone(), value);
        }
        if let Some(id) = &self.id {
            fields.insert(id_attribute.to_string(), id.to_value());
        }

        let mut raw = RawRecord::new(self.type_name.clone(), fields)
            .persisted(true)
            .linkage_only();
        if let Some(links) = &self.links {
            raw = raw.links(Value::Object(links.0.clone()));
        }
        if let Some(meta) = &self.meta {
            raw = raw.meta(meta.clone());
        }
        raw
    }

    /// Resource object for a save request.
    ///
    /// With `only_dirty`, attributes and relationships are limited to fields
    /// changed since the last commit. Temporary ids are left out so the server
    /// assigns one.
    pub fn from_model(model: &Model, only_dirty: bool) -> Self {
        let snapshot = model.snapshot_with(SnapshotOptions { only_dirty });
        let id = model.id();

        let mut relationships = BTreeMap::new();
        for (name, _, _) in model.schema().references() {
            if !snapshot.relationships.contains_key(name) {
                continue;
            }
            let data = match model.ref_value(name) {
                Some(RefValue::One(None)) | None => None,
                Some(RefValue::One(Some(key))) => Some(Linkage::One(key.into())),
                Some(RefValue::Many(keys)) => {
                    Some(Linkage::Many(keys.into_iter().map(Into::into).collect()))
                }
            };
            relationships.insert(
                name.to_string(),
                Relationship {
                    data: Some(data),
                    ..Default::default()
                },
            );
        }

        let mut attributes = snapshot.attributes;
        attributes.remove("type");

        Resource {
            type_name: model.type_name().to_string(),
            id: (!id.is_temporary()).then_some(id),
            attributes,
            relationships,
            links: None,
            meta: None,
        }
    }
}

impl ResourceIdentifier {
    fn to_value(&self) -> Value {
        serde_json::json!({ "type": self.type_name, "id": self.id.to_value() })
    }
}

impl From<crate::id::RecordKey> for ResourceIdentifier {
    fn from(key: crate::id::RecordKey) -> Self {
        Self {
            type_name: key.type_name,
            id: key.id,
            meta: None,
        }
    }
}
