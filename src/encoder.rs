//! Value tree to JSON text
//!
//! Plain values map onto their JSON counterparts. Extended values are
//! replaced by envelopes (see [`crate::envelope`]); timestamps become
//! ISO-8601 strings and mapping-like collaborators are flattened into
//! plain objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::trace;

use crate::envelope::{self, Sentinel};
use crate::error::{ErrorCategory, ErrorKind, Result, TaintboxError};
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Indent the output.
    pub pretty: bool,
}

impl EncodeOptions {
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Encoder {
    options: EncodeOptions,
}

impl Encoder {
    pub fn new(options: EncodeOptions) -> Self {
        Self { options }
    }

    /// Encodes `value` to JSON text.
    pub fn encode(&self, value: &Value) -> Result<String> {
        let json = self.to_json(value)?;
        let text = if self.options.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };
        text.map_err(|e| {
            TaintboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::NotSerializable,
                "failed to format JSON",
                e,
            )
        })
    }

    /// Lowers `value` to plain JSON, substituting envelopes for extended kinds.
    pub fn to_json(&self, value: &Value) -> Result<JsonValue> {
        Ok(match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => JsonValue::Number(n.clone()),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|v| self.to_json(v))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(object) => self.object(object.iter().map(|(k, v)| (k.as_str(), v)))?,
            Value::Encrypted(scalar) => envelope::wrap(
                Sentinel::EncryptedScalar,
                JsonValue::String(strict_text(scalar.ciphertext(), "ciphertext")?),
            ),
            Value::TaintedContainer(container) => {
                let reduction = container.reduce();
                envelope::wrap(
                    Sentinel::TaintedObject,
                    JsonValue::Array(vec![
                        JsonValue::String(container.type_tag().to_string()),
                        JsonValue::Array(reduction.args),
                        reduction.state,
                    ]),
                )
            }
            Value::Tainted(text) => envelope::wrap(
                Sentinel::TaintedScalar,
                JsonValue::String(strict_text(text.as_bytes(), "tainted text")?),
            ),
            Value::Mapping(mapping) => {
                let entries = mapping.entries();
                trace!(entries = entries.len(), "flattening mapping-like value");
                self.object(entries.iter().map(|(k, v)| (k.as_str(), v)))?
            }
            Value::Timestamp(ts) => JsonValue::String(ts.isoformat()),
            Value::Bytes(bytes) => {
                return Err(TaintboxError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::NotSerializable,
                    format!("raw bytes ({} bytes) are not JSON serializable", bytes.len()),
                ));
            }
        })
    }

    fn object<'a>(&self, entries: impl Iterator<Item = (&'a str, &'a Value)>) -> Result<JsonValue> {
        let mut map = Map::new();
        for (key, value) in entries {
            let json = self
                .to_json(value)
                .map_err(|e| e.with_context(format!("failed to encode key {:?}", key)))?;
            map.insert(key.to_string(), json);
        }
        Ok(JsonValue::Object(map))
    }
}

/// Converts bytes to text without replacement characters.
fn strict_text(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        TaintboxError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Encoding,
            format!("{} is not valid UTF-8", what),
            e,
        )
    })
}

/// Encodes with default options.
pub fn encode(value: &Value) -> Result<String> {
    Encoder::default().encode(value)
}
