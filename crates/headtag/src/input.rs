//! Entry input: the nested head description passed to [`Head::push`](crate::Head::push).
//!
//! Input is a JSON-shaped tree whose leaves may be [`Deferred`]: values that
//! become available later (a fetch, a translation lookup). Deferred leaves are
//! awaited during normalization, concurrently with every other field, so one
//! slow value never holds up unrelated tags.
//!
//! ```rust
//! use headtag::{Deferred, Input, InputValue};
//!
//! let input = Input::new()
//!     .with("title", "Home")
//!     .with("meta", InputValue::array([InputValue::object([
//!         ("name", InputValue::from("description")),
//!         ("content", InputValue::from(Deferred::ready("Loaded later"))),
//!     ])]));
//! assert!(input.get("title").is_some());
//! ```

use std::fmt;
use std::future::Future;

use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};

use crate::error::{FieldError, HeadError, Result};

/// Insertion-ordered object of input values.
pub type InputMap = IndexMap<String, InputValue>;

/// An entry's input once every deferred leaf has resolved.
pub type ResolvedInput = Map<String, Value>;

type SharedField = Shared<LocalBoxFuture<'static, std::result::Result<InputValue, FieldError>>>;

/// A field value that resolves later.
///
/// Cloning is cheap and every clone observes the same outcome, so repeated or
/// overlapping resolutions of one registry agree on the value.
#[derive(Clone)]
pub struct Deferred(SharedField);

impl Deferred {
    /// Wraps a future producing the value.
    pub fn new<F, V>(fut: F) -> Self
    where
        F: Future<Output = std::result::Result<V, FieldError>> + 'static,
        V: Into<InputValue>,
    {
        Deferred(fut.map(|r| r.map(Into::<InputValue>::into)).boxed_local().shared())
    }

    /// An already-available value.
    pub fn ready(value: impl Into<InputValue>) -> Self {
        let value = value.into();
        Deferred::new(async move { Ok::<_, FieldError>(value) })
    }

    /// A value that has already failed.
    pub fn rejected(message: impl Into<String>) -> Self {
        let err = FieldError::new(message);
        Deferred::new(async move { Err::<InputValue, _>(err) })
    }

    /// Awaits the value (not recursing into nested deferred leaves).
    pub async fn get(&self) -> std::result::Result<InputValue, FieldError> {
        self.0.clone().await
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.peek() {
            Some(Ok(v)) => f.debug_tuple("Deferred").field(v).finish(),
            Some(Err(e)) => f.debug_tuple("Deferred").field(e).finish(),
            None => f.write_str("Deferred(<pending>)"),
        }
    }
}

/// A node of the input tree.
#[derive(Debug, Clone)]
pub enum InputValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<InputValue>),
    Object(InputMap),
    Deferred(Deferred),
}

impl InputValue {
    /// Builds an array node.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<InputValue>,
    {
        InputValue::Array(items.into_iter().map(Into::into).collect())
    }

    /// Builds an object node from key/value pairs.
    pub fn object<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, InputValue)>,
        K: Into<String>,
    {
        InputValue::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true for deferred leaves.
    pub fn is_deferred(&self) -> bool {
        matches!(self, InputValue::Deferred(_))
    }

    /// Resolves every deferred leaf, concurrently, into a plain JSON value.
    ///
    /// Fails with the first rejection encountered. Callers that need
    /// per-element isolation resolve elements individually.
    pub fn resolve(&self) -> LocalBoxFuture<'_, std::result::Result<Value, FieldError>> {
        match self {
            InputValue::Null => future::ready(Ok(Value::Null)).boxed_local(),
            InputValue::Bool(b) => future::ready(Ok(Value::Bool(*b))).boxed_local(),
            InputValue::Number(n) => future::ready(Ok(Value::Number(n.clone()))).boxed_local(),
            InputValue::String(s) => future::ready(Ok(Value::String(s.clone()))).boxed_local(),
            InputValue::Array(items) => async move {
                let values = future::try_join_all(items.iter().map(InputValue::resolve)).await?;
                Ok(Value::Array(values))
            }
            .boxed_local(),
            InputValue::Object(map) => async move {
                let values = future::try_join_all(map.values().map(InputValue::resolve)).await?;
                Ok(Value::Object(map.keys().cloned().zip(values).collect()))
            }
            .boxed_local(),
            InputValue::Deferred(deferred) => {
                let pending = deferred.0.clone();
                async move {
                    let value = pending.await?;
                    value.resolve().await
                }
                .boxed_local()
            }
        }
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => InputValue::Null,
            Value::Bool(b) => InputValue::Bool(b),
            Value::Number(n) => InputValue::Number(n),
            Value::String(s) => InputValue::String(s),
            Value::Array(items) => InputValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                InputValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for InputValue {
    fn from(s: &str) -> Self {
        InputValue::String(s.to_string())
    }
}

impl From<String> for InputValue {
    fn from(s: String) -> Self {
        InputValue::String(s)
    }
}

impl From<bool> for InputValue {
    fn from(b: bool) -> Self {
        InputValue::Bool(b)
    }
}

impl From<i64> for InputValue {
    fn from(n: i64) -> Self {
        InputValue::Number(n.into())
    }
}

impl From<i32> for InputValue {
    fn from(n: i32) -> Self {
        InputValue::Number(n.into())
    }
}

impl From<u64> for InputValue {
    fn from(n: u64) -> Self {
        InputValue::Number(n.into())
    }
}

impl From<f64> for InputValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(InputValue::Null, InputValue::Number)
    }
}

impl From<Deferred> for InputValue {
    fn from(d: Deferred) -> Self {
        InputValue::Deferred(d)
    }
}

impl From<InputMap> for InputValue {
    fn from(map: InputMap) -> Self {
        InputValue::Object(map)
    }
}

impl<T: Into<InputValue>> From<Option<T>> for InputValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(InputValue::Null, Into::into)
    }
}

impl<'de> Deserialize<'de> for InputValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Into::into)
    }
}

/// The root object of one registration: `title`, `meta`, `link`, `script`,
/// `style`, `noscript`, `base`, `htmlAttrs`, `bodyAttrs`, `titleTemplate`
/// and `templateParams` fields.
#[derive(Debug, Clone, Default)]
pub struct Input(InputMap);

impl Input {
    /// Creates an empty input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, builder style.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Sets a field.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<InputValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Returns a field.
    pub fn get(&self, field: &str) -> Option<&InputValue> {
        self.0.get(field)
    }

    /// Iterates fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &InputValue)> {
        self.0.iter()
    }

    /// Returns true if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts a JSON object into input. Anything but an object is rejected.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into()),
            other => Err(HeadError::input(
                "<root>",
                format!("expected an object, got {}", json_kind(&other)),
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl TryFrom<Value> for Input {
    type Error = HeadError;

    fn try_from(value: Value) -> Result<Self> {
        Input::from_json(value)
    }
}

impl From<InputMap> for Input {
    fn from(map: InputMap) -> Self {
        Input(map)
    }
}

impl From<ResolvedInput> for Input {
    fn from(map: ResolvedInput) -> Self {
        Input(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<'de> Deserialize<'de> for Input {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Input::from_json(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_from_json_preserves_order() {
        let input = Input::from_json(json!({"title": "x", "meta": [], "base": {}})).unwrap();
        let keys: Vec<_> = input.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["title", "meta", "base"]);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = Input::from_json(json!(["title"])).unwrap_err();
        assert!(err.to_string().contains("expected an object, got an array"));
    }

    #[test]
    fn test_resolve_nested_deferred() {
        let inner = Deferred::ready(InputValue::object([(
            "content",
            InputValue::from(Deferred::ready("deep")),
        )]));
        let value = InputValue::array([InputValue::from(inner), InputValue::from(1)]);
        let resolved = block_on(value.resolve()).unwrap();
        assert_eq!(resolved, json!([{"content": "deep"}, 1]));
    }

    #[test]
    fn test_rejection_propagates() {
        let value = InputValue::object([("a", InputValue::from(Deferred::rejected("boom")))]);
        let err = block_on(value.resolve()).unwrap_err();
        assert_eq!(err, FieldError::new("boom"));
    }

    #[test]
    fn test_deferred_is_shared() {
        let d = Deferred::ready("once");
        let a = block_on(InputValue::from(d.clone()).resolve()).unwrap();
        let b = block_on(InputValue::from(d).resolve()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let input: Input = serde_yaml::from_str("title: Hello\nmeta:\n  - name: a\n").unwrap();
        assert!(matches!(input.get("title"), Some(InputValue::String(s)) if s == "Hello"));
        assert!(matches!(input.get("meta"), Some(InputValue::Array(items)) if items.len() == 1));
    }
}
