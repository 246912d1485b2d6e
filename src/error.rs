use thiserror::Error;

use crate::jsonapi::ErrorObject;

/// Transport-level failure: no HTTP response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network error: {message}")]
pub struct NetworkError {
    pub message: String,
}

impl NetworkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Every failure the store can report.
///
/// Schema and programmer mistakes (`UnknownType`, `ImmutableIdentifier`, ...) come back
/// from synchronous calls as `Err`. Network-path failures (`Network`, `Api`, `CacheMiss`)
/// are carried inside a `Response` instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatxError {
    /// A record type that was never registered with the collection.
    #[error("unknown record type: {0}")]
    UnknownType(String),

    /// Tried to change the identifier of a persisted record.
    #[error("identifier of persisted record {type_name}:{id} cannot be changed")]
    ImmutableIdentifier { type_name: String, id: String },

    /// Tried to move a record onto an identifier another record already holds.
    #[error("identifier {id} is already taken by another {type_name}")]
    IdentifierConflict { type_name: String, id: String },

    /// A network action for a type/verb with no endpoint configured.
    #[error("no request definition for {type_name} ({action})")]
    MissingRequestDefinition { type_name: String, action: String },

    /// A relationship operation named a field the schema does not declare.
    #[error("unknown field {field} on {type_name}")]
    UnknownField { type_name: String, field: String },

    /// A relationship operation on a plain attribute.
    #[error("field {field} on {type_name} is not a relationship")]
    NotARelationship { type_name: String, field: String },

    /// A reference that cannot be stored in the target field.
    #[error("invalid reference in {type_name}.{field}: {reason}")]
    InvalidReference {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("unknown view: {0}")]
    UnknownView(String),

    /// A field codec rejected a raw value.
    #[error("failed to parse {field}: {message}")]
    Parse { field: String, message: String },

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// HTTP response with an error status or a JSON:API `errors` array.
    #[error("api error (status {status}): {}", summarize(errors))]
    Api { status: u16, errors: Vec<ErrorObject> },

    /// `CacheOnly` request with nothing cached.
    #[error("no cached response for {0}")]
    CacheMiss(String),
}

impl From<serde_json::Error> for DatxError {
    fn from(err: serde_json::Error) -> Self {
        DatxError::Serde(err.to_string())
    }
}

fn summarize(errors: &[ErrorObject]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| {
            e.detail
                .clone()
                .or_else(|| e.title.clone())
                .unwrap_or_else(|| "unspecified".to_string())
        })
        .collect::<Vec<_>>()
        .join("; ")
}
