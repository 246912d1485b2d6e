//! datx - a client-side object-graph store.
//!
//! Records are identity-mapped [`Model`]s held by a [`Collection`]; relationships
//! are stored as [`RecordKey`]s and resolved through the collection on read, so
//! cyclic graphs need no ownership tricks. [`View`]s are ordered subsets, and the
//! optional [`network`] overlay keeps the collection in sync with a JSON:API server.

mod collection;
mod error;
mod id;
pub mod jsonapi;
mod meta;
mod model;
mod observe;
mod schema;
mod view;

#[cfg(feature = "network")]
pub mod network;

pub use collection::{Collection, CollectionSnapshot, RecordRepository};
pub use error::{DatxError, NetworkError};
pub use id::{Id, ModelHandle, RecordKey};
pub use meta::{MetaLookup, MetaRegistry, MetaScope};
pub use model::{Model, ModelMeta, RawRecord, Record, RefValue, Snapshot, SnapshotOptions};
pub use observe::{Change, ChangeKind, ChangeSet, SubscriptionId};
pub use schema::{
    Attribute, Cardinality, DateCodec, Field, FieldCodec, FieldKind, FnCodec, InverseDef, RefTarget,
    Schema, TypeRegistry,
};
pub use view::{compare_values, SortMethod, View};

#[cfg(feature = "network")]
pub use network::{CachingStrategy, NetworkConfig, NetworkStore, RequestOptions, Response};
