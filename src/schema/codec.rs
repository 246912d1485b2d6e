//! Field codecs - parse/serialize hooks for plain attributes.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Converts between the wire form of an attribute and the form held by the model.
///
/// `parse` runs on hydration and on writes through `Model::set`; `serialize` runs
/// when a model is snapshotted or sent over the wire.
pub trait FieldCodec: Send + Sync {
    fn parse(&self, raw: Value) -> Result<Value, String>;
    fn serialize(&self, value: &Value) -> Value;
}

/// Dates: accepts RFC 3339 / ISO-8601 strings or epoch milliseconds, holds them
/// as canonical RFC 3339 UTC strings with millisecond precision.
///
/// Read them back typed with `model.get::<DateTime<Utc>>("date")`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateCodec;

impl DateCodec {
    fn canonical(date: DateTime<Utc>) -> Value {
        Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl FieldCodec for DateCodec {
    fn parse(&self, raw: Value) -> Result<Value, String> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .map(|d| Self::canonical(d.with_timezone(&Utc)))
                .map_err(|e| format!("invalid date {:?}: {}", s, e)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(Self::canonical)
                .ok_or_else(|| format!("invalid timestamp {}", n)),
            other => Err(format!("expected a date, got {}", other)),
        }
    }

    fn serialize(&self, value: &Value) -> Value {
        value.clone()
    }
}

type CodecFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;
type SerializeFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Codec built from a pair of closures.
#[derive(Clone)]
pub struct FnCodec {
    parse: CodecFn,
    serialize: SerializeFn,
}

impl FnCodec {
    pub fn new<P, S>(parse: P, serialize: S) -> Self
    where
        P: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
        S: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self {
            parse: Arc::new(parse),
            serialize: Arc::new(serialize),
        }
    }
}

impl fmt::Debug for FnCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnCodec")
    }
}

impl FieldCodec for FnCodec {
    fn parse(&self, raw: Value) -> Result<Value, String> {
        (self.parse)(raw)
    }

    fn serialize(&self, value: &Value) -> Value {
        (self.serialize)(value)
    }
}
