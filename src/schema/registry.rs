//! TypeRegistry - the set of record types a collection accepts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::{Field, FieldKind, InverseDef, RefTarget, Schema};
use crate::DatxError;

#[derive(Default)]
struct RegistryState {
    schemas: HashMap<String, Arc<Schema>>,
    /// Inverse fields installed on a type by forward declarations of another type.
    derived: HashMap<(String, String), Field>,
}

/// Registered schemas, shared by every handle. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a schema and install the inverse fields it declares.
    pub fn register(&self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        let mut state = self.state.write();
        let type_name = schema.type_name().to_string();

        state.derived.retain(|_, field| match &field.kind {
            FieldKind::Inverse(def) => def.source.concrete() != Some(type_name.as_str()),
            _ => true,
        });

        for field in schema.fields() {
            let FieldKind::Reference {
                target,
                inverse: Some((inverse_name, cardinality)),
                ..
            } = &field.kind
            else {
                continue;
            };
            let Some(target_type) = target.concrete() else {
                warn!(
                    type_name = %type_name,
                    field = %field.name,
                    "inverse declared on a relationship without a concrete target; ignored"
                );
                continue;
            };
            state.derived.insert(
                (target_type.to_string(), inverse_name.clone()),
                Field {
                    name: inverse_name.clone(),
                    kind: FieldKind::Inverse(InverseDef {
                        source: RefTarget::Type(type_name.clone()),
                        forward: field.name.clone(),
                        cardinality: *cardinality,
                    }),
                },
            );
        }

        state.schemas.insert(type_name, Arc::clone(&schema));
        schema
    }

    pub fn get(&self, type_name: &str) -> Result<Arc<Schema>, DatxError> {
        self.state
            .read()
            .schemas
            .get(type_name)
            .cloned()
            .ok_or_else(|| DatxError::UnknownType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.state.read().schemas.contains_key(type_name)
    }

    pub fn types(&self) -> Vec<String> {
        self.state.read().schemas.keys().cloned().collect()
    }

    /// Look up a field on a type, including inverse fields installed by other types.
    pub fn field(&self, type_name: &str, name: &str) -> Option<Field> {
        let state = self.state.read();
        if let Some(field) = state
            .schemas
            .get(type_name)
            .and_then(|schema| schema.get_field(name))
        {
            return Some(field.clone());
        }
        state
            .derived
            .get(&(type_name.to_string(), name.to_string()))
            .cloned()
    }

    /// Types that declare a forward relationship able to link to `type_name`.
    pub fn referrers(&self, type_name: &str) -> Vec<Arc<Schema>> {
        self.state
            .read()
            .schemas
            .values()
            .filter(|schema| schema.references().any(|(_, target, _)| target.accepts(type_name)))
            .cloned()
            .collect()
    }
}
