//! Registry entries and their options.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use indexmap::IndexMap;
use serde_json::Value;

use crate::input::{Input, ResolvedInput};
use crate::tag::{RuntimeMode, TagName};

/// Rewrites an entry's input after its deferred leaves resolve and before it
/// is expanded into tags.
pub type Transform = Rc<dyn Fn(ResolvedInput) -> LocalBoxFuture<'static, ResolvedInput>>;

/// Options accepted by [`Head::push_with_options`](crate::Head::push_with_options).
#[derive(Clone, Default)]
pub struct EntryOptions {
    /// Restricts where the entry's tags are emitted. Falls back to the head's
    /// mode.
    pub mode: Option<RuntimeMode>,
    /// Input rewrite applied before normalization.
    pub transform: Option<Transform>,
}

impl EntryOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime mode.
    pub fn mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets a synchronous transform.
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(ResolvedInput) -> ResolvedInput + 'static,
    {
        let f = Rc::new(f);
        self.transform = Some(Rc::new(
            move |input: ResolvedInput| -> LocalBoxFuture<'static, ResolvedInput> {
                let out = f(input);
                async move { out }.boxed_local()
            },
        ));
        self
    }

    /// Sets an asynchronous transform.
    pub fn transform_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ResolvedInput) -> Fut + 'static,
        Fut: Future<Output = ResolvedInput> + 'static,
    {
        self.transform = Some(Rc::new(
            move |input: ResolvedInput| -> LocalBoxFuture<'static, ResolvedInput> {
                f(input).boxed_local()
            },
        ));
        self
    }
}

impl fmt::Debug for EntryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryOptions")
            .field("mode", &self.mode)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// A cleanup marker recorded by a render target.
///
/// Executed when the owning entry is disposed, reversing what the render
/// target did on the entry's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Remove the live element correlated with this tag hash.
    RemoveElement { hash: String },
    /// Remove an attribute from the `<html>` or `<body>` element.
    RemoveAttribute { target: TagName, name: String },
}

impl SideEffect {
    /// Identity of the effect; recording the same effect twice keeps one.
    pub fn key(&self) -> String {
        match self {
            SideEffect::RemoveElement { hash } => format!("el:{}", hash),
            SideEffect::RemoveAttribute { target, name } => format!("attr:{}:{}", target, name),
        }
    }
}

/// Side effects keyed by [`SideEffect::key`].
pub type SideEffects = IndexMap<String, SideEffect>;

/// One registration.
#[derive(Clone)]
pub struct HeadEntry {
    /// Registration order identity, strictly increasing per head.
    pub id: usize,
    pub input: Input,
    pub transform: Option<Transform>,
    pub mode: Option<RuntimeMode>,
    /// Set on the working copy once normalization has resolved the input.
    pub resolved_input: Option<ResolvedInput>,
    pub side_effects: SideEffects,
}

impl HeadEntry {
    pub(crate) fn new(id: usize, input: Input, options: EntryOptions) -> Self {
        HeadEntry {
            id,
            input,
            transform: options.transform,
            mode: options.mode,
            resolved_input: None,
            side_effects: SideEffects::new(),
        }
    }

    /// The entry's resolved `templateParams` object, if any.
    pub fn template_params(&self) -> Option<&serde_json::Map<String, Value>> {
        self.resolved_input
            .as_ref()?
            .get("templateParams")?
            .as_object()
    }

    /// The entry's resolved `titleTemplate` string, if any.
    pub fn title_template(&self) -> Option<&str> {
        match self.resolved_input.as_ref()?.get("titleTemplate")? {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("textContent")?.as_str(),
            _ => None,
        }
    }
}

impl fmt::Debug for HeadEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadEntry")
            .field("id", &self.id)
            .field("input", &self.input)
            .field("mode", &self.mode)
            .field("transform", &self.transform.is_some())
            .field("side_effects", &self.side_effects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_side_effect_keys() {
        let el = SideEffect::RemoveElement { hash: "abc".into() };
        assert_eq!(el.key(), "el:abc");
        let attr = SideEffect::RemoveAttribute {
            target: TagName::BodyAttrs,
            name: "class".into(),
        };
        assert_eq!(attr.key(), "attr:bodyAttrs:class");
    }

    #[test]
    fn test_sync_transform_is_wrapped() {
        let opts = EntryOptions::new().transform(|mut input| {
            input.insert("title".into(), json!("rewritten"));
            input
        });
        let transform = opts.transform.unwrap();
        let out = block_on(transform(ResolvedInput::new()));
        assert_eq!(out.get("title"), Some(&json!("rewritten")));
    }

    #[test]
    fn test_template_params_accessor() {
        let mut entry = HeadEntry::new(0, Input::new(), EntryOptions::new());
        assert!(entry.template_params().is_none());
        let resolved = json!({"templateParams": {"site": "X"}, "titleTemplate": "%s | X"});
        entry.resolved_input = resolved.as_object().cloned();
        assert_eq!(entry.template_params().unwrap().get("site"), Some(&json!("X")));
        assert_eq!(entry.title_template(), Some("%s | X"));
    }
}
