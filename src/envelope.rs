//! Wire convention for extended values
//!
//! An envelope is a plain JSON object carrying one sentinel key:
//!
//! | key                | payload                                   |
//! |--------------------|-------------------------------------------|
//! | `tainted-scalar`   | text of a tainted scalar                  |
//! | `tainted-object`   | `[type-tag, constructor-args, state]`     |
//! | `encrypted-scalar` | armored ciphertext of an encrypted scalar |
//!
//! Sentinels are tested in the order above and the first match wins, so an
//! object carrying several of them is read as the highest-priority one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Sentinel key for a tainted scalar.
pub const TAINTED_SCALAR: &str = "tainted-scalar";

/// Sentinel key for a tainted container.
pub const TAINTED_OBJECT: &str = "tainted-object";

/// Sentinel key for an encrypted scalar.
pub const ENCRYPTED_SCALAR: &str = "encrypted-scalar";

/// How a decoder decides that a sentinel key is "set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SentinelCheck {
    /// The sentinel must be present and its payload truthy. `""`, `0`,
    /// `false`, `null`, `[]` and `{}` payloads leave the object untouched.
    #[default]
    Truthy,
    /// The sentinel only has to be present; any payload counts.
    Presence,
}

/// Which envelope an object turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    TaintedScalar,
    TaintedObject,
    EncryptedScalar,
}

impl Sentinel {
    /// All sentinels in priority order.
    pub const ALL: [Sentinel; 3] = [
        Sentinel::TaintedScalar,
        Sentinel::TaintedObject,
        Sentinel::EncryptedScalar,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Sentinel::TaintedScalar => TAINTED_SCALAR,
            Sentinel::TaintedObject => TAINTED_OBJECT,
            Sentinel::EncryptedScalar => ENCRYPTED_SCALAR,
        }
    }
}

/// Finds the first sentinel set on `object` under `check`.
pub fn detect(object: &Map<String, JsonValue>, check: SentinelCheck) -> Option<Sentinel> {
    Sentinel::ALL.into_iter().find(|s| match object.get(s.key()) {
        None => false,
        Some(payload) => match check {
            SentinelCheck::Truthy => is_truthy(payload),
            SentinelCheck::Presence => true,
        },
    })
}

/// Truthiness of a JSON value as dynamic languages see it.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

/// Builds a single-key envelope object.
pub(crate) fn wrap(sentinel: Sentinel, payload: JsonValue) -> JsonValue {
    let mut object = Map::with_capacity(1);
    object.insert(sentinel.key().to_string(), payload);
    JsonValue::Object(object)
}
