//! JSON text to value tree
//!
//! The text is parsed as plain JSON first. If the top-level value is an
//! object it is rewritten: an object carrying a sentinel is replaced by the
//! value it encodes, any other object has its object-valued entries
//! rewritten in turn. Arrays are left as parsed unless
//! [`DecodeOptions::recurse_into_arrays`] is set, so by default an envelope
//! inside an array comes back as a plain object.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::envelope::{self, ENCRYPTED_SCALAR, Sentinel, SentinelCheck, TAINTED_OBJECT};
use crate::error::{ErrorCategory, ErrorKind, Result, TaintboxError};
use crate::secrets::{DEFAULT_STORE, EncryptedScalar, SecretResolver, SecretStores, Secrets};
use crate::taint::{self, ContainerRegistry, json_kind};
use crate::value::{Object, TaintedText, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// How sentinel keys are recognized.
    pub sentinel_check: SentinelCheck,
    /// Also rewrite envelopes found inside arrays.
    pub recurse_into_arrays: bool,
}

impl DecodeOptions {
    pub fn sentinel_check(mut self, check: SentinelCheck) -> Self {
        self.sentinel_check = check;
        self
    }

    pub fn recurse_into_arrays(mut self, recurse: bool) -> Self {
        self.recurse_into_arrays = recurse;
        self
    }
}

/// Decodes JSON text, reconstructing extended values from envelopes.
///
/// Owns its container recipes and secret stores; configure those before
/// decoding. Registering a store does not affect values decoded earlier.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    options: DecodeOptions,
    containers: ContainerRegistry,
    stores: SecretStores,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecodeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Replaces the container recipes.
    pub fn with_registry(mut self, containers: ContainerRegistry) -> Self {
        self.containers = containers;
        self
    }

    /// Replaces the secret stores, for example to use another resolver factory.
    pub fn with_stores(mut self, stores: SecretStores) -> Self {
        self.stores = stores;
        self
    }

    pub fn containers_mut(&mut self) -> &mut ContainerRegistry {
        &mut self.containers
    }

    /// Builds a resolver from `secrets` and registers it under `identifier`,
    /// replacing any previous one.
    pub fn register_secret_store(&mut self, identifier: impl Into<String>, secrets: Secrets) {
        self.stores.register(identifier, secrets);
    }

    /// Registers `secrets` as the `default` store.
    pub fn configure(&mut self, secrets: Secrets) {
        self.register_secret_store(DEFAULT_STORE, secrets);
    }

    pub fn register_resolver(
        &mut self,
        identifier: impl Into<String>,
        resolver: Arc<dyn SecretResolver>,
    ) {
        self.stores.register_resolver(identifier, resolver);
    }

    /// Parses and rewrites `text`.
    pub fn decode(&self, text: &str) -> Result<Value> {
        let json: JsonValue = serde_json::from_str(text).map_err(|e| {
            let msg = format!(
                "malformed JSON at line {} column {}",
                e.line(),
                e.column()
            );
            TaintboxError::with_kind_and_source(ErrorCategory::User, ErrorKind::Parse, msg, e)
        })?;
        self.decode_json(json)
    }

    /// Rewrites an already parsed document.
    pub fn decode_json(&self, json: JsonValue) -> Result<Value> {
        match json {
            JsonValue::Object(map) => self.rewrite(map),
            JsonValue::Array(items) if self.options.recurse_into_arrays => {
                self.rewrite_array(items)
            }
            other => Ok(Value::from_plain(other)),
        }
    }

    fn rewrite(&self, mut map: Map<String, JsonValue>) -> Result<Value> {
        let sentinel = match envelope::detect(&map, self.options.sentinel_check) {
            Some(sentinel) => sentinel,
            None => {
                let mut object = Object::new();
                for (key, value) in map {
                    let value = self.rewrite_entry(value)?;
                    object.insert(key, value);
                }
                return Ok(Value::Object(object));
            }
        };

        let payload = map.remove(sentinel.key()).unwrap_or(JsonValue::Null);
        match sentinel {
            Sentinel::TaintedScalar => Ok(match payload {
                JsonValue::String(s) => Value::Tainted(TaintedText::new(s)),
                other => taint::wrap(Value::from_plain(other)),
            }),
            Sentinel::TaintedObject => self.rebuild_container(payload),
            Sentinel::EncryptedScalar => self.encrypted(payload),
        }
    }

    fn rewrite_entry(&self, value: JsonValue) -> Result<Value> {
        match value {
            JsonValue::Object(map) => self.rewrite(map),
            JsonValue::Array(items) if self.options.recurse_into_arrays => {
                self.rewrite_array(items)
            }
            other => Ok(Value::from_plain(other)),
        }
    }

    fn rewrite_array(&self, items: Vec<JsonValue>) -> Result<Value> {
        items
            .into_iter()
            .map(|item| self.rewrite_entry(item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    fn rebuild_container(&self, payload: JsonValue) -> Result<Value> {
        let parts = match payload {
            JsonValue::Array(parts) if parts.len() == 3 => parts,
            other => {
                return Err(TaintboxError::malformed(format!(
                    "{} payload must be [type-tag, constructor-args, state], got {}",
                    TAINTED_OBJECT,
                    describe(&other)
                )));
            }
        };
        let mut parts = parts.into_iter();
        let (tag, args, state) = match (parts.next(), parts.next(), parts.next()) {
            (Some(JsonValue::String(tag)), Some(JsonValue::Array(args)), Some(state)) => {
                (tag, args, state)
            }
            _ => {
                return Err(TaintboxError::malformed(format!(
                    "{} payload needs a string type tag and an array of constructor args",
                    TAINTED_OBJECT
                )));
            }
        };
        let container = self.containers.rebuild(&tag, args, state)?;
        Ok(Value::TaintedContainer(container))
    }

    fn encrypted(&self, payload: JsonValue) -> Result<Value> {
        let ciphertext = match payload {
            JsonValue::String(s) => s,
            other => {
                return Err(TaintboxError::malformed(format!(
                    "{} payload must be text, got {}",
                    ENCRYPTED_SCALAR,
                    json_kind(&other)
                )));
            }
        };
        let mut scalar = EncryptedScalar::new(ciphertext.into_bytes());
        match self.stores.get(DEFAULT_STORE) {
            Some(resolver) => {
                scalar.bind(resolver);
                debug!("decoded encrypted scalar bound to default store");
            }
            None => debug!("decoded encrypted scalar with no default secret store; left unbound"),
        }
        Ok(Value::Encrypted(scalar))
    }
}

fn describe(value: &JsonValue) -> String {
    match value {
        JsonValue::Array(items) => format!("an array of {}", items.len()),
        other => json_kind(other).to_string(),
    }
}

/// Decodes with default options, the built-in container recipes and no
/// secret stores.
pub fn decode(text: &str) -> Result<Value> {
    Decoder::new().decode(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taint::TaintedMap;

    #[test]
    fn test_nested_objects_are_rewritten() {
        let v = decode(r#"{"a": {"b": {"tainted-scalar": "x"}}, "n": 1}"#).unwrap();
        let b = v.get("a").unwrap().get("b").unwrap();
        assert_eq!(b, &Value::Tainted(TaintedText::new("x")));
        assert_eq!(v.get("n"), Some(&Value::from(1)));
    }

    #[test]
    fn test_top_level_envelope() {
        let v = decode(r#"{"tainted-scalar": "x"}"#).unwrap();
        assert_eq!(v, Value::Tainted(TaintedText::new("x")));
    }

    #[test]
    fn test_arrays_are_not_rewritten_by_default() {
        let v = decode(r#"{"a": [{"tainted-scalar": "x"}]}"#).unwrap();
        let element = &v.get("a").unwrap().as_array().unwrap()[0];
        assert_eq!(element.get("tainted-scalar"), Some(&Value::from("x")));

        let v = decode(r#"[{"tainted-scalar": "x"}]"#).unwrap();
        assert!(v.as_array().unwrap()[0].as_object().is_some());
    }

    #[test]
    fn test_array_recursion_option() {
        let decoder = Decoder::with_options(DecodeOptions::default().recurse_into_arrays(true));

        let v = decoder.decode(r#"{"a": [[{"tainted-scalar": "x"}], 2]}"#).unwrap();
        let inner = &v.get("a").unwrap().as_array().unwrap()[0].as_array().unwrap()[0];
        assert_eq!(inner, &Value::Tainted(TaintedText::new("x")));

        let v = decoder.decode(r#"[{"tainted-scalar": "y"}]"#).unwrap();
        assert_eq!(v.as_array().unwrap()[0], Value::Tainted(TaintedText::new("y")));
    }

    #[test]
    fn test_falsy_payload_truthy_mode() {
        let v = decode(r#"{"tainted-scalar": ""}"#).unwrap();
        assert_eq!(v.get("tainted-scalar"), Some(&Value::from("")));
    }

    #[test]
    fn test_falsy_payload_presence_mode() {
        let decoder =
            Decoder::with_options(DecodeOptions::default().sentinel_check(SentinelCheck::Presence));
        let v = decoder.decode(r#"{"tainted-scalar": ""}"#).unwrap();
        assert_eq!(v, Value::Tainted(TaintedText::new("")));
    }

    #[test]
    fn test_non_text_tainted_payload_is_wrapped() {
        let v = decode(r#"{"tainted-scalar": {"k": "v"}}"#).unwrap();
        let map = v.as_container().unwrap().downcast_ref::<TaintedMap>().unwrap();
        assert_eq!(map.get("k"), Some(Value::Tainted(TaintedText::new("v"))));

        let v = decode(r#"{"tainted-scalar": 5}"#).unwrap();
        assert_eq!(v, Value::from(5));
    }

    #[test]
    fn test_tainted_object() {
        let v = decode(r#"{"x": {"tainted-object": ["TaintedMap", [{"k": "v"}], {}]}}"#).unwrap();
        let container = v.get("x").unwrap().as_container().unwrap();
        assert_eq!(container.type_tag(), "TaintedMap");
    }

    #[test]
    fn test_unknown_type_tag() {
        let err = decode(r#"{"x": {"tainted-object": ["HostVars", [], {}]}}"#)
            .expect_err("expected unknown type");
        assert_eq!(err.kind, Some(ErrorKind::UnknownEnvelopeType));
    }

    #[test]
    fn test_malformed_tainted_object() {
        for text in [
            r#"{"tainted-object": ["TaintedMap", [{}]]}"#,
            r#"{"tainted-object": "TaintedMap"}"#,
            r#"{"tainted-object": [1, [], {}]}"#,
            r#"{"tainted-object": ["TaintedMap", {}, {}]}"#,
        ] {
            let err = decode(text).expect_err("expected malformed envelope");
            assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope), "{}", text);
        }
    }

    #[test]
    fn test_encrypted_without_store_is_unbound() {
        let v = decode(r#"{"pw": {"encrypted-scalar": "taintbox-vault1:AAAA"}}"#).unwrap();
        let scalar = v.get("pw").unwrap().as_encrypted().unwrap();
        assert!(!scalar.is_bound());
        assert_eq!(scalar.ciphertext(), b"taintbox-vault1:AAAA");
    }

    #[test]
    fn test_encrypted_non_text_payload() {
        let err = decode(r#"{"encrypted-scalar": [1]}"#).expect_err("expected malformed");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_non_default_store_is_not_bound() {
        let mut decoder = Decoder::new();
        decoder.register_secret_store("ops", Secrets::single("pw"));
        let v = decoder.decode(r#"{"encrypted-scalar": "c"}"#).unwrap();
        assert!(!v.as_encrypted().unwrap().is_bound());

        decoder.configure(Secrets::single("pw"));
        let v = decoder.decode(r#"{"encrypted-scalar": "c"}"#).unwrap();
        assert!(v.as_encrypted().unwrap().is_bound());
    }

    #[test]
    fn test_parse_error() {
        let err = decode("{\"a\": ").expect_err("expected parse error");
        assert_eq!(err.kind, Some(ErrorKind::Parse));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(decode("\"tainted-scalar\"").unwrap(), Value::from("tainted-scalar"));
        assert_eq!(decode("null").unwrap(), Value::Null);
    }

    #[test]
    fn test_options_from_json() {
        let options: DecodeOptions =
            serde_json::from_str(r#"{"sentinel_check": "presence"}"#).unwrap();
        assert_eq!(options.sentinel_check, SentinelCheck::Presence);
        assert!(!options.recurse_into_arrays);
    }
}
