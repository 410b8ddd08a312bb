//! Tainted containers and the recipes that rebuild them
//!
//! A tainted container is reduced to `(type-tag, constructor-args, state)`
//! for the wire. The decoder looks the tag up in a [`ContainerRegistry`],
//! calls the registered constructor with the args and then hands the state
//! back through [`TaintedContainer::restore_state`].
//!
//! Reads through a container mark what they return as tainted. Values that
//! were set directly through `insert`/`set` are remembered in a cache and
//! returned unaltered; that cache is the state that travels on the wire.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::error::{ErrorCategory, ErrorKind, Result, TaintboxError};
use crate::value::{Object, TaintedText, Value};

/// Constructor arguments plus saved state, both plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub args: Vec<JsonValue>,
    pub state: JsonValue,
}

/// A container whose elements are, by convention, tainted as well.
pub trait TaintedContainer: fmt::Debug + Send + Sync {
    /// Tag under which the type's recipe is registered.
    fn type_tag(&self) -> &'static str;

    /// Decomposes the container for reconstruction.
    fn reduce(&self) -> Reduction;

    /// Applies state saved by [`TaintedContainer::reduce`] to a freshly
    /// constructed container.
    fn restore_state(&mut self, state: JsonValue) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn clone_box(&self) -> Box<dyn TaintedContainer>;
}

impl Clone for Box<dyn TaintedContainer> {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}

impl dyn TaintedContainer {
    /// Downcasts to a concrete container type.
    pub fn downcast_ref<T: TaintedContainer + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Rebuilds a container from its constructor arguments.
pub type Constructor = fn(Vec<JsonValue>) -> Result<Box<dyn TaintedContainer>>;

/// Maps type tags to reconstruction recipes.
#[derive(Debug, Clone)]
pub struct ContainerRegistry {
    recipes: HashMap<String, Constructor>,
}

impl ContainerRegistry {
    /// A registry with no recipes at all.
    pub fn empty() -> Self {
        Self {
            recipes: HashMap::new(),
        }
    }

    /// Registers (or replaces) the recipe for `tag`.
    pub fn register(&mut self, tag: impl Into<String>, constructor: Constructor) {
        self.recipes.insert(tag.into(), constructor);
    }

    /// Constructs the container for `tag` from `args` and restores `state`.
    pub fn rebuild(
        &self,
        tag: &str,
        args: Vec<JsonValue>,
        state: JsonValue,
    ) -> Result<Box<dyn TaintedContainer>> {
        let constructor = self.recipes.get(tag).ok_or_else(|| {
            TaintboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnknownEnvelopeType,
                format!("no reconstruction recipe registered for type tag {:?}", tag),
            )
        })?;
        let mut container = constructor(args)?;
        if container.type_tag() != tag {
            return Err(TaintboxError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::RecipeMismatch,
                format!(
                    "recipe registered for type tag {:?} built a {:?} container",
                    tag,
                    container.type_tag()
                ),
            ));
        }
        container.restore_state(state)?;
        debug!(type_tag = tag, "rebuilt tainted container");
        Ok(container)
    }
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(TaintedMap::TYPE_TAG, TaintedMap::construct);
        registry.register(TaintedList::TYPE_TAG, TaintedList::construct);
        registry
    }
}

/// Marks a value as tainted.
///
/// Text becomes a tainted scalar. Plain objects and arrays become
/// [`TaintedMap`]/[`TaintedList`]; if they hold extended values they cannot be
/// wrapped whole, so their elements are wrapped one by one instead. Values
/// that are already tainted and non-text scalars are returned unchanged.
pub fn wrap(value: Value) -> Value {
    match value {
        Value::String(s) => Value::Tainted(TaintedText::new(s)),
        Value::Bytes(b) => Value::Tainted(TaintedText::from_bytes(b)),
        Value::Object(o) => match plain_object(&o) {
            Some(map) => Value::TaintedContainer(Box::new(TaintedMap::new(map))),
            None => Value::Object(o.into_iter().map(|(k, v)| (k, wrap(v))).collect()),
        },
        Value::Array(items) => match plain_array(&items) {
            Some(list) => Value::TaintedContainer(Box::new(TaintedList::new(list))),
            None => Value::Array(items.into_iter().map(wrap).collect()),
        },
        Value::Mapping(m) => wrap(Value::Object(m.entries().into_iter().collect())),
        other => other,
    }
}

fn plain_object(object: &Object) -> Option<Map<String, JsonValue>> {
    object
        .iter()
        .map(|(k, v)| v.to_plain().map(|v| (k.clone(), v)))
        .collect()
}

fn plain_array(items: &[Value]) -> Option<Vec<JsonValue>> {
    items.iter().map(Value::to_plain).collect()
}

fn single_arg(type_tag: &str, mut args: Vec<JsonValue>) -> Result<JsonValue> {
    if args.len() != 1 {
        return Err(TaintboxError::malformed(format!(
            "{} takes exactly one constructor argument, got {}",
            type_tag,
            args.len()
        )));
    }
    Ok(args.remove(0))
}

fn state_error(msg: impl Into<String>) -> TaintboxError {
    TaintboxError::with_kind(ErrorCategory::User, ErrorKind::StateRestore, msg)
}

/// A tainted JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaintedMap {
    wrapped: Map<String, JsonValue>,
    cache: Map<String, JsonValue>,
}

impl TaintedMap {
    pub const TYPE_TAG: &'static str = "TaintedMap";

    pub fn new(wrapped: Map<String, JsonValue>) -> Self {
        Self {
            wrapped,
            cache: Map::new(),
        }
    }

    pub fn construct(args: Vec<JsonValue>) -> Result<Box<dyn TaintedContainer>> {
        match single_arg(Self::TYPE_TAG, args)? {
            JsonValue::Object(wrapped) => Ok(Box::new(Self::new(wrapped))),
            other => Err(TaintboxError::malformed(format!(
                "TaintedMap expects an object argument, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Reads `key`. Directly set values come back as they were stored,
    /// everything else comes back tainted.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(cached) = self.cache.get(key) {
            return Some(Value::from_plain(cached.clone()));
        }
        self.wrapped
            .get(key)
            .map(|v| wrap(Value::from_plain(v.clone())))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        let key = key.into();
        self.wrapped.insert(key.clone(), value.clone());
        self.cache.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.cache.shift_remove(key);
        self.wrapped.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.wrapped.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.wrapped.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.wrapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrapped.is_empty()
    }

    /// The untransformed object.
    pub fn inner(&self) -> &Map<String, JsonValue> {
        &self.wrapped
    }
}

impl TaintedContainer for TaintedMap {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn reduce(&self) -> Reduction {
        Reduction {
            args: vec![JsonValue::Object(self.wrapped.clone())],
            state: JsonValue::Object(self.cache.clone()),
        }
    }

    fn restore_state(&mut self, state: JsonValue) -> Result<()> {
        match state {
            JsonValue::Object(cache) => {
                self.cache = cache;
                Ok(())
            }
            JsonValue::Null => {
                self.cache.clear();
                Ok(())
            }
            other => Err(state_error(format!(
                "TaintedMap state must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn TaintedContainer> {
        Box::new(self.clone())
    }
}

/// A tainted JSON array.
///
/// The cache holds one slot per element; `null` means "not set directly".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaintedList {
    wrapped: Vec<JsonValue>,
    cache: Vec<JsonValue>,
}

impl TaintedList {
    pub const TYPE_TAG: &'static str = "TaintedList";

    pub fn new(wrapped: Vec<JsonValue>) -> Self {
        let cache = vec![JsonValue::Null; wrapped.len()];
        Self { wrapped, cache }
    }

    pub fn construct(args: Vec<JsonValue>) -> Result<Box<dyn TaintedContainer>> {
        match single_arg(Self::TYPE_TAG, args)? {
            JsonValue::Array(wrapped) => Ok(Box::new(Self::new(wrapped))),
            other => Err(TaintboxError::malformed(format!(
                "TaintedList expects an array argument, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self.cache.get(index) {
            Some(JsonValue::Null) | None => self
                .wrapped
                .get(index)
                .map(|v| wrap(Value::from_plain(v.clone()))),
            Some(cached) => Some(Value::from_plain(cached.clone())),
        }
    }

    /// Overwrites the element at `index`. Returns `false` if out of range.
    pub fn set(&mut self, index: usize, value: JsonValue) -> bool {
        match self.wrapped.get_mut(index) {
            Some(slot) => {
                *slot = value.clone();
                self.cache[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&mut self, value: JsonValue) {
        self.wrapped.push(value.clone());
        self.cache.push(value);
    }

    pub fn len(&self) -> usize {
        self.wrapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrapped.is_empty()
    }

    pub fn inner(&self) -> &[JsonValue] {
        &self.wrapped
    }
}

impl TaintedContainer for TaintedList {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn reduce(&self) -> Reduction {
        Reduction {
            args: vec![JsonValue::Array(self.wrapped.clone())],
            state: JsonValue::Array(self.cache.clone()),
        }
    }

    fn restore_state(&mut self, state: JsonValue) -> Result<()> {
        match state {
            JsonValue::Array(cache) if cache.len() == self.wrapped.len() => {
                self.cache = cache;
                Ok(())
            }
            JsonValue::Array(cache) => Err(state_error(format!(
                "TaintedList state has {} slots for {} elements",
                cache.len(),
                self.wrapped.len()
            ))),
            JsonValue::Null => {
                self.cache = vec![JsonValue::Null; self.wrapped.len()];
                Ok(())
            }
            other => Err(state_error(format!(
                "TaintedList state must be an array, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn TaintedContainer> {
        Box::new(self.clone())
    }
}

pub(crate) fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
