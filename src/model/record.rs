//! Record - typed wrappers over untyped models.

use super::Model;
use crate::schema::Schema;

/// A typed view of one record type.
///
/// Implementors are thin newtypes around [`Model`]; the schema is registered
/// with `Collection::register_record::<R>()` and typed access goes through
/// `collection.records::<R>()`.
///
/// ```ignore
/// struct Person(Model);
///
/// impl Record for Person {
///     const TYPE: &'static str = "person";
///
///     fn schema() -> Schema {
///         Schema::new(Self::TYPE).attribute("name").inverse_many("events", "event", "responsible")
///     }
///
///     fn wrap(model: Model) -> Self {
///         Person(model)
///     }
///
///     fn model(&self) -> &Model {
///         &self.0
///     }
/// }
/// ```
pub trait Record: Sized {
    const TYPE: &'static str;

    fn schema() -> Schema;

    fn wrap(model: Model) -> Self;

    fn model(&self) -> &Model;
}
