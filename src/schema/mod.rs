//! Schemas - per-type field declarations.
//!
//! A `Schema` tells the collection and the models how to treat each field:
//! plain attributes (with optional parse/serialize codecs), to-one and to-many
//! relationships, and computed inverse fields (back-references).
//!
//! ## Example
//!
//! ```ignore
//! use datx::{Cardinality, DateCodec, Field, Schema};
//!
//! let person = Schema::new("person")
//!     .attribute("name")
//!     .inverse_many("events", "event", "organizers");
//!
//! let event = Schema::new("event")
//!     .attribute("title")
//!     .attribute_with("date", Attribute::new().codec(DateCodec))
//!     .to_one("responsible", "person")
//!     .to_many("organizers", "person")
//!     .endpoint("events");
//! ```

mod codec;
mod registry;

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::id::Id;

pub use codec::{DateCodec, FieldCodec, FnCodec};
pub use registry::TypeRegistry;

type TypeResolver = Arc<dyn Fn(&Map<String, Value>) -> Option<String> + Send + Sync>;
type IdGenerator = Arc<dyn Fn() -> Id + Send + Sync>;

/// What a relationship field points at.
#[derive(Clone)]
pub enum RefTarget {
    /// Always a record of this type.
    Type(String),
    /// Any type; every link carries its own type.
    Polymorphic,
    /// Type computed from the nested raw object being linked.
    Dynamic(TypeResolver),
}

impl RefTarget {
    pub fn dynamic<F>(resolver: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    {
        RefTarget::Dynamic(Arc::new(resolver))
    }

    /// The single type this target always links to, if there is one.
    pub fn concrete(&self) -> Option<&str> {
        match self {
            RefTarget::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn accepts(&self, type_name: &str) -> bool {
        match self {
            RefTarget::Type(t) => t == type_name,
            RefTarget::Polymorphic | RefTarget::Dynamic(_) => true,
        }
    }

    /// Whether serialized links must carry their type next to the id.
    pub fn is_polymorphic(&self) -> bool {
        !matches!(self, RefTarget::Type(_))
    }
}

impl From<&str> for RefTarget {
    fn from(value: &str) -> Self {
        RefTarget::Type(value.to_string())
    }
}

impl From<String> for RefTarget {
    fn from(value: String) -> Self {
        RefTarget::Type(value)
    }
}

impl fmt::Debug for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Type(t) => write!(f, "Type({:?})", t),
            RefTarget::Polymorphic => f.write_str("Polymorphic"),
            RefTarget::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Plain attribute options.
#[derive(Clone, Default)]
pub struct Attribute {
    pub default: Option<Value>,
    pub codec: Option<Arc<dyn FieldCodec>>,
}

impl Attribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn codec(mut self, codec: impl FieldCodec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub(crate) fn parse(&self, field: &str, raw: Value) -> Result<Value, crate::DatxError> {
        match &self.codec {
            Some(codec) => codec.parse(raw).map_err(|message| crate::DatxError::Parse {
                field: field.to_string(),
                message,
            }),
            None => Ok(raw),
        }
    }

    pub(crate) fn serialize(&self, value: &Value) -> Value {
        match &self.codec {
            Some(codec) => codec.serialize(value),
            None => value.clone(),
        }
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("default", &self.default)
            .field("codec", &self.codec.is_some())
            .finish()
    }
}

/// A computed back-reference: the records of `source` whose `forward` field links here.
#[derive(Debug, Clone)]
pub struct InverseDef {
    pub source: RefTarget,
    pub forward: String,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Attribute(Attribute),
    Reference {
        target: RefTarget,
        cardinality: Cardinality,
        /// Name of the computed field this installs on the target type.
        inverse: Option<(String, Cardinality)>,
    },
    Inverse(InverseDef),
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn attribute(name: impl Into<String>, options: Attribute) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Attribute(options),
        }
    }

    pub fn to_one(name: impl Into<String>, target: impl Into<RefTarget>) -> Self {
        Self::reference(name, target.into(), Cardinality::One)
    }

    pub fn to_many(name: impl Into<String>, target: impl Into<RefTarget>) -> Self {
        Self::reference(name, target.into(), Cardinality::Many)
    }

    fn reference(name: impl Into<String>, target: RefTarget, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Reference {
                target,
                cardinality,
                inverse: None,
            },
        }
    }

    /// Declare the computed field the target type gets for this relationship.
    ///
    /// Only meaningful on a relationship with a concrete target type.
    pub fn inverse(mut self, name: impl Into<String>, cardinality: Cardinality) -> Self {
        if let FieldKind::Reference { inverse, .. } = &mut self.kind {
            *inverse = Some((name.into(), cardinality));
        }
        self
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self.kind, FieldKind::Attribute(_))
    }
}

/// Field declarations for one record type.
pub struct Schema {
    type_name: String,
    id_attribute: String,
    fields: Vec<Field>,
    endpoint: Option<String>,
    id_generator: Option<IdGenerator>,
    auto_id: AtomicI64,
}

impl Schema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id_attribute: "id".to_string(),
            fields: Vec::new(),
            endpoint: None,
            id_generator: None,
            auto_id: AtomicI64::new(0),
        }
    }

    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = name.into();
        self
    }

    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.field(Field::attribute(name, Attribute::new()))
    }

    pub fn attribute_with(self, name: impl Into<String>, options: Attribute) -> Self {
        self.field(Field::attribute(name, options))
    }

    pub fn to_one(self, name: impl Into<String>, target: impl Into<RefTarget>) -> Self {
        self.field(Field::to_one(name, target))
    }

    pub fn to_many(self, name: impl Into<String>, target: impl Into<RefTarget>) -> Self {
        self.field(Field::to_many(name, target))
    }

    pub fn inverse_one(
        self,
        name: impl Into<String>,
        source: impl Into<RefTarget>,
        forward: impl Into<String>,
    ) -> Self {
        self.inverse_field(name, source.into(), forward.into(), Cardinality::One)
    }

    pub fn inverse_many(
        self,
        name: impl Into<String>,
        source: impl Into<RefTarget>,
        forward: impl Into<String>,
    ) -> Self {
        self.inverse_field(name, source.into(), forward.into(), Cardinality::Many)
    }

    fn inverse_field(
        self,
        name: impl Into<String>,
        source: RefTarget,
        forward: String,
        cardinality: Cardinality,
    ) -> Self {
        self.field(Field {
            name: name.into(),
            kind: FieldKind::Inverse(InverseDef {
                source,
                forward,
                cardinality,
            }),
        })
    }

    /// Add a field. A later declaration with the same name replaces the earlier one.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn endpoint(mut self, path: impl Into<String>) -> Self {
        self.endpoint = Some(path.into());
        self
    }

    pub fn id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Id + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id_field(&self) -> &str {
        &self.id_attribute
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn endpoint_path(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Declared forward relationships (to-one and to-many), in declaration order.
    pub fn references(&self) -> impl Iterator<Item = (&str, &RefTarget, Cardinality)> {
        self.fields.iter().filter_map(|f| match &f.kind {
            FieldKind::Reference {
                target,
                cardinality,
                ..
            } => Some((f.name.as_str(), target, *cardinality)),
            _ => None,
        })
    }

    /// Declared attributes with their options.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.fields.iter().filter_map(|f| match &f.kind {
            FieldKind::Attribute(options) => Some((f.name.as_str(), options)),
            _ => None,
        })
    }

    /// Hand out an identifier for a record created without one.
    pub fn next_id(&self) -> Id {
        match &self.id_generator {
            Some(generate) => generate(),
            None => Id::Num(self.auto_id.fetch_sub(1, Ordering::Relaxed) - 1),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("id_attribute", &self.id_attribute)
            .field("fields", &self.fields)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
