//! Hydration input and snapshot output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::Id;
use crate::DatxError;

/// Raw record data for `Collection::add_raw`: the record's fields plus an
/// out-of-band envelope (type, persisted flag, links/meta passthrough).
///
/// `fields` holds the identifier under the schema's id attribute, plain
/// attributes, and relationship fields as ids, `{type, id}` identifiers or
/// nested raw objects. Nested objects are added to the collection as records,
/// identifier-only ones included, unless `linkage` marks the relationship
/// fields as pointers to records held elsewhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub type_name: Option<String>,
    pub fields: Map<String, Value>,
    pub persisted: Option<bool>,
    pub links: Option<Value>,
    pub meta: Option<Value>,
    pub linkage: bool,
}

impl RawRecord {
    pub fn new(type_name: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            fields,
            ..Default::default()
        }
    }

    /// Wrap a JSON object. Anything else is rejected.
    pub fn from_value(type_name: impl Into<String>, value: Value) -> Result<Self, DatxError> {
        match value {
            Value::Object(fields) => Ok(Self::new(type_name, fields)),
            other => Err(DatxError::Serde(format!(
                "expected an object of record fields, got {}",
                other
            ))),
        }
    }

    pub fn persisted(mut self, persisted: bool) -> Self {
        self.persisted = Some(persisted);
        self
    }

    pub fn links(mut self, links: Value) -> Self {
        self.links = Some(links);
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Treat `{type, id}` objects in relationship fields as links only.
    pub fn linkage_only(mut self) -> Self {
        self.linkage = true;
        self
    }
}

/// Plain, serializable picture of a model.
///
/// Attributes are in their serialized (wire) form and relationships are bare
/// identifiers, or `{type, id}` pairs for polymorphic fields. Nested records are
/// never embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: Id,
    #[serde(default)]
    pub persisted: bool,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub relationships: Map<String, Value>,
}

impl Snapshot {
    /// Flatten back into hydration input.
    pub fn into_raw(self, id_attribute: &str) -> RawRecord {
        let mut fields = self.attributes;
        for (name, value) in self.relationships {
            fields.insert(name, value);
        }
        fields.insert(id_attribute.to_string(), self.id.to_value());
        RawRecord::new(self.type_name, fields)
            .persisted(self.persisted)
            .linkage_only()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Only fields changed since the last commit (partial-update payloads).
    pub only_dirty: bool,
}
