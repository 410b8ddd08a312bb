//! The value tree the encoder accepts and the decoder produces.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use indexmap::IndexMap;
use serde_json::{Number, Value as JsonValue};

use crate::secrets::EncryptedScalar;
use crate::taint::TaintedContainer;

/// Object body used throughout the value tree. Keeps insertion order.
pub type Object = IndexMap<String, Value>;

/// Every kind of value that can cross the serialization boundary.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    /// Raw bytes. JSON has no representation for these.
    Bytes(Vec<u8>),
    /// Encoded as ISO-8601 text. Never reconstructed on decode.
    Timestamp(Timestamp),
    /// A mapping-like collaborator that is flattened to a plain object on encode.
    Mapping(Arc<dyn MappingLike>),
    Tainted(TaintedText),
    TaintedContainer(Box<dyn TaintedContainer>),
    Encrypted(EncryptedScalar),
}

impl Value {
    /// Converts plain JSON without looking for envelopes.
    pub fn from_plain(json: JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from_plain).collect()),
            JsonValue::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_plain(v)))
                    .collect(),
            ),
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_tainted(&self) -> Option<&TaintedText> {
        match self {
            Value::Tainted(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_encrypted(&self) -> Option<&EncryptedScalar> {
        match self {
            Value::Encrypted(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&(dyn TaintedContainer + 'static)> {
        match self {
            Value::TaintedContainer(c) => Some(c.as_ref()),
            _ => None,
        }
    }

    /// Converts back to plain JSON if the whole tree consists of plain
    /// values; `None` as soon as any extended kind is found.
    pub fn to_plain(&self) -> Option<JsonValue> {
        match self {
            Value::Null => Some(JsonValue::Null),
            Value::Bool(b) => Some(JsonValue::Bool(*b)),
            Value::Number(n) => Some(JsonValue::Number(n.clone())),
            Value::String(s) => Some(JsonValue::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Value::to_plain)
                .collect::<Option<Vec<_>>>()
                .map(JsonValue::Array),
            Value::Object(o) => o
                .iter()
                .map(|(k, v)| v.to_plain().map(|v| (k.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(JsonValue::Object),
            _ => None,
        }
    }

    /// Looks up `key` if this is a plain object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// True for tainted scalars and tainted containers.
    pub fn is_tainted(&self) -> bool {
        matches!(self, Value::Tainted(_) | Value::TaintedContainer(_))
    }

    /// JSON pointers and kind names of every extended value in the tree,
    /// in document order. Plain strings, numbers and containers are skipped.
    pub fn extended_paths(&self) -> Vec<(String, &'static str)> {
        let mut found = Vec::new();
        self.collect_extended(String::new(), &mut found);
        found
    }

    fn collect_extended(&self, pointer: String, found: &mut Vec<(String, &'static str)>) {
        match self {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.collect_extended(format!("{}/{}", pointer, i), found);
                }
            }
            Value::Object(o) => {
                for (key, item) in o {
                    let escaped = key.replace('~', "~0").replace('/', "~1");
                    item.collect_extended(format!("{}/{}", pointer, escaped), found);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
            other => found.push((pointer, other.kind_name())),
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Mapping(_) => "mapping",
            Value::Tainted(_) => "tainted-scalar",
            Value::TaintedContainer(_) => "tainted-object",
            Value::Encrypted(_) => "encrypted-scalar",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a.entries() == b.entries(),
            (Value::Tainted(a), Value::Tainted(b)) => a == b,
            (Value::TaintedContainer(a), Value::TaintedContainer(b)) => {
                a.type_tag() == b.type_tag() && a.reduce() == b.reduce()
            }
            (Value::Encrypted(a), Value::Encrypted(b)) => a.ciphertext() == b.ciphertext(),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_plain(json)
    }
}

impl From<TaintedText> for Value {
    fn from(t: TaintedText) -> Self {
        Value::Tainted(t)
    }
}

impl From<EncryptedScalar> for Value {
    fn from(e: EncryptedScalar) -> Self {
        Value::Encrypted(e)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

/// A scalar that downstream template evaluation must not expand.
///
/// Holds raw bytes because producers (command output, file reads) are not
/// obliged to hand over valid UTF-8; the encoder rejects such values rather
/// than substituting characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TaintedText {
    bytes: Vec<u8>,
}

impl TaintedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            bytes: text.into().into_bytes(),
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The text, if the underlying bytes are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

impl fmt::Debug for TaintedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaintedText({:?})", String::from_utf8_lossy(&self.bytes))
    }
}

/// Date and time values. Encoding is one-way: they come back as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Date(NaiveDate),
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl Timestamp {
    /// ISO-8601 rendering with a `T` separator. A non-zero sub-second part
    /// is always written as six digits of microseconds.
    pub fn isoformat(&self) -> String {
        match self {
            Timestamp::Date(d) => d.format("%Y-%m-%d").to_string(),
            Timestamp::Naive(dt) => dt.format(&time_format(dt.nanosecond(), "")).to_string(),
            Timestamp::Zoned(dt) => dt.format(&time_format(dt.nanosecond(), "%:z")).to_string(),
        }
    }
}

fn time_format(nanosecond: u32, offset: &str) -> String {
    let fraction = if nanosecond == 0 { "" } else { "%.6f" };
    format!("%Y-%m-%dT%H:%M:%S{}{}", fraction, offset)
}

/// A collaborator that behaves like a mapping without being a plain object,
/// such as a lazily-populated view over host variables.
pub trait MappingLike: fmt::Debug + Send + Sync {
    /// A shallow snapshot of the key/value pairs.
    fn entries(&self) -> Vec<(String, Value)>;
}
