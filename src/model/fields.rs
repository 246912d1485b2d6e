//! Splitting raw record fields into attributes and links.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::state::RefValue;
use crate::id::{Id, RecordKey};
use crate::schema::{Cardinality, FieldKind, InverseDef, RefTarget, Schema, TypeRegistry};
use crate::DatxError;

/// Resolves a nested raw object to the key of the record it describes.
pub(crate) type Linker<'a> =
    dyn FnMut(&RefTarget, Option<String>, Map<String, Value>) -> Result<RecordKey, DatxError> + 'a;

pub(crate) struct ParsedFields {
    pub id: Option<Id>,
    pub attributes: Map<String, Value>,
    pub refs: BTreeMap<String, RefValue>,
    /// Raw data given for computed inverse fields, wired after the record exists.
    pub inverses: Vec<(String, InverseDef, Value)>,
}

pub(crate) fn parse_fields(
    schema: &Schema,
    registry: Option<&TypeRegistry>,
    fields: Map<String, Value>,
    link: &mut Linker<'_>,
) -> Result<ParsedFields, DatxError> {
    let mut parsed = ParsedFields {
        id: None,
        attributes: Map::new(),
        refs: BTreeMap::new(),
        inverses: Vec::new(),
    };

    for (name, value) in fields {
        if name == schema.id_field() {
            parsed.id = Id::from_value(&value);
            continue;
        }

        let field = schema.get_field(&name).cloned().or_else(|| {
            registry.and_then(|r| r.field(schema.type_name(), &name))
        });

        match field.map(|f| f.kind) {
            Some(FieldKind::Attribute(options)) => {
                let value = options.parse(&name, value)?;
                parsed.attributes.insert(name, value);
            }
            Some(FieldKind::Reference {
                target,
                cardinality,
                ..
            }) => {
                let value = parse_ref(schema.type_name(), &name, &target, cardinality, value, link)?;
                parsed.refs.insert(name, value);
            }
            Some(FieldKind::Inverse(def)) => parsed.inverses.push((name, def, value)),
            None => {
                parsed.attributes.insert(name, value);
            }
        }
    }

    Ok(parsed)
}

pub(crate) fn parse_ref(
    type_name: &str,
    field: &str,
    target: &RefTarget,
    cardinality: Cardinality,
    value: Value,
    link: &mut Linker<'_>,
) -> Result<RefValue, DatxError> {
    let invalid = |reason: &str| DatxError::InvalidReference {
        type_name: type_name.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    };

    match (cardinality, value) {
        (Cardinality::One, Value::Null) => Ok(RefValue::One(None)),
        (Cardinality::One, Value::Array(_)) => Err(invalid("expected a single record")),
        (Cardinality::One, value) => Ok(RefValue::One(Some(link_value(
            target, value, link, &invalid,
        )?))),
        (Cardinality::Many, Value::Null) => Ok(RefValue::Many(Vec::new())),
        (Cardinality::Many, Value::Array(items)) => items
            .into_iter()
            .map(|item| link_value(target, item, link, &invalid))
            .collect::<Result<Vec<_>, _>>()
            .map(RefValue::Many),
        (Cardinality::Many, value) => Ok(RefValue::Many(vec![link_value(
            target, value, link, &invalid,
        )?])),
    }
}

fn link_value(
    target: &RefTarget,
    value: Value,
    link: &mut Linker<'_>,
    invalid: &dyn Fn(&str) -> DatxError,
) -> Result<RecordKey, DatxError> {
    match value {
        Value::String(_) | Value::Number(_) => {
            let id = Id::from_value(&value).ok_or_else(|| invalid("identifier must be a string or integer"))?;
            let type_name = target
                .concrete()
                .ok_or_else(|| invalid("a bare identifier needs a concrete target type"))?;
            Ok(RecordKey::new(type_name, id))
        }
        Value::Object(object) => {
            if object.get("id").is_some_and(|id| Id::from_value(id).is_none()) {
                return Err(invalid("identifier must be a string or integer"));
            }
            if let (RefTarget::Type(expected), Some(declared)) =
                (target, object.get("type").and_then(Value::as_str))
            {
                if is_identifier(&object) && declared != expected.as_str() {
                    return Err(invalid(&format!(
                        "links a {} where a {} is expected",
                        declared, expected
                    )));
                }
            }
            let type_name = nested_type(target, &object);
            link(target, type_name, object)
        }
        _ => Err(invalid("expected an identifier or a record object")),
    }
}

/// `{id}` or `{type, id}` with nothing else: a pointer, not data.
fn is_identifier(object: &Map<String, Value>) -> bool {
    object.contains_key("id") && object.keys().all(|k| k == "id" || k == "type")
}

/// Key named by an identifier object. `None` when the object carries record data.
pub(crate) fn identifier_key(
    type_name: Option<&str>,
    object: &Map<String, Value>,
) -> Option<RecordKey> {
    if !is_identifier(object) {
        return None;
    }
    let id = object.get("id").and_then(Id::from_value)?;
    Some(RecordKey::new(type_name?, id))
}

/// Type of a nested raw object linked through `target`.
fn nested_type(target: &RefTarget, object: &Map<String, Value>) -> Option<String> {
    let declared = object.get("type").and_then(Value::as_str).map(str::to_string);
    match target {
        RefTarget::Type(t) => Some(t.clone()),
        RefTarget::Polymorphic => declared,
        RefTarget::Dynamic(resolve) => resolve(object).or(declared),
    }
}
