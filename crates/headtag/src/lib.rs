//! Document head management: collect, resolve, deduplicate and order the tags
//! of a document's `<head>` (and its `<body>` boundaries).
//!
//! `headtag` gathers head descriptions from many independent call sites and
//! resolves them into one deterministic, deduplicated, ordered tag list. Render
//! targets (see the `headtag-render` crate) turn that list into server markup
//! or patch a live document with it.
//!
//! # Features
//!
//! - **Entry registry**: `push` / `patch` / `dispose` with stable identities
//! - **Hook bus**: every pipeline stage is a listener on a named point
//! - **Async values**: deferred fields resolve concurrently; a rejection drops
//!   only its own tag
//! - **Deduplication**: per-tag keys with replace or merge strategies
//! - **Ordering**: weights, priority categories, `before:`/`after:` anchors
//! - **Template params**: `%token` interpolation and title templates
//! - **Safe input**: a whitelist path for untrusted head descriptions
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use headtag::{Head, Input};
//! use serde_json::json;
//!
//! let head = Head::new();
//! head.push(Input::from_json(json!({
//!     "titleTemplate": "%s %separator %siteName",
//!     "templateParams": {"siteName": "Example"},
//!     "meta": [{"name": "description", "content": "First"}]
//! }))?);
//! head.push(Input::from_json(json!({
//!     "title": "Home",
//!     "meta": [{"name": "description", "content": "Second"}, {"charset": "utf-8"}]
//! }))?);
//!
//! let tags = block_on(head.resolve_tags())?;
//! assert_eq!(tags[0].attr("charset"), Some("utf-8"));
//! assert_eq!(tags[1].text_content.as_deref(), Some("Home | Example"));
//! assert_eq!(tags[2].attr("content"), Some("Second"));
//! # Ok::<(), headtag::HeadError>(())
//! ```

// Core modules
mod active;
mod config;
mod entry;
mod error;
mod head;
mod hooks;
mod input;
mod normalize;
mod payload;
mod plugin;
mod render;
mod tag;

// Pipeline stages
pub mod dedupe;
pub mod safe;
pub mod sort;
pub mod template;

pub use active::{
    active_head, clear_active_head, set_active_head, use_head, use_head_safe,
    use_head_with_options,
};
pub use config::HeadConfig;
pub use entry::{EntryOptions, HeadEntry, SideEffect, SideEffects, Transform};
pub use error::{FieldError, HeadError, Result};
pub use head::{ActiveHeadEntry, Head, HeadOptions, Resolved};
pub use hooks::{
    DomBeforeRenderContext, DomRenderTagContext, HookError, HookFn, HookPoint, Hooks,
    NotifyFn, ResolveContext, SsrRenderContext, SsrRenderedContext, TagContext,
};
pub use input::{Deferred, Input, InputMap, InputValue, ResolvedInput};
pub use normalize::{
    expand_input, normalize_entry, normalize_prop, normalize_tag, resolve_input, NormalizedEntry,
};
pub use payload::{HeadPayload, PAYLOAD_ID};
pub use plugin::{core_plugins, HeadPlugin, TagHashPlugin};
pub use render::{DomRenderStatus, SsrHead};
pub use tag::{
    AttrValue, DuplicateStrategy, HeadTag, Props, RuntimeMode, TagName, TagOrder, TagPosition,
    TagPriority,
};
