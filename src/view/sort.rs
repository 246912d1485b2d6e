//! View ordering.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::Model;

type Selector = dyn Fn(&Model) -> Value + Send + Sync;
type Comparator = dyn Fn(&Model, &Model) -> Ordering + Send + Sync;

/// How a view orders its members.
#[derive(Clone)]
pub enum SortMethod {
    /// Compare the values of one attribute.
    Field(String),
    /// Compare whatever the selector returns for each model.
    Selector(Arc<Selector>),
    /// Full comparator.
    Comparator(Arc<Comparator>),
}

impl SortMethod {
    pub fn field(name: impl Into<String>) -> Self {
        SortMethod::Field(name.into())
    }

    pub fn selector<F>(selector: F) -> Self
    where
        F: Fn(&Model) -> Value + Send + Sync + 'static,
    {
        SortMethod::Selector(Arc::new(selector))
    }

    pub fn comparator<F>(comparator: F) -> Self
    where
        F: Fn(&Model, &Model) -> Ordering + Send + Sync + 'static,
    {
        SortMethod::Comparator(Arc::new(comparator))
    }

    /// Stable sort in place.
    pub(crate) fn sort(&self, models: &mut [Model]) {
        match self {
            SortMethod::Field(name) => {
                let mut keyed: Vec<(Value, Model)> = models
                    .iter()
                    .map(|m| (m.attr(name).unwrap_or(Value::Null), m.clone()))
                    .collect();
                keyed.sort_by(|a, b| compare_values(&a.0, &b.0));
                for (slot, (_, model)) in models.iter_mut().zip(keyed) {
                    *slot = model;
                }
            }
            SortMethod::Selector(select) => {
                let mut keyed: Vec<(Value, Model)> =
                    models.iter().map(|m| (select(m), m.clone())).collect();
                keyed.sort_by(|a, b| compare_values(&a.0, &b.0));
                for (slot, (_, model)) in models.iter_mut().zip(keyed) {
                    *slot = model;
                }
            }
            SortMethod::Comparator(compare) => models.sort_by(|a, b| compare(a, b)),
        }
    }
}

impl fmt::Debug for SortMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortMethod::Field(name) => f.debug_tuple("Field").field(name).finish(),
            SortMethod::Selector(_) => f.write_str("Selector(..)"),
            SortMethod::Comparator(_) => f.write_str("Comparator(..)"),
        }
    }
}

/// Default "less than" over JSON values.
///
/// Nulls sort first, then booleans, numbers, strings, arrays and objects.
/// Values of the same kind compare naturally; arrays element by element;
/// objects are not ordered among themselves.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(x, y)| compare_values(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}
