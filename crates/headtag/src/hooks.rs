//! The hook bus: named extension points driven by the resolution pipeline.
//!
//! Every behavioral rule of the engine (deduplication, sorting, template
//! params, title templates, hashing) is an ordinary listener on one of these
//! points, installed by a [`HeadPlugin`](crate::HeadPlugin). External
//! listeners compose with the built-in ones by registration order alone.
//!
//! # Pipeline Position
//!
//! ```text
//! push / patch / dispose
//!   → ENTRIES:UPDATED        (sync notification, schedules DOM patches)
//! resolve()
//!   → ENTRIES:RESOLVE        (mutate the working copy of entries)
//!   → normalize every entry  (concurrently)
//!   → TAG:NORMALISE          (per tag)
//!   → TAGS:BEFORERESOLVE
//!   → TAGS:RESOLVE           (dedupe → sort → template params → title → hash)
//! render targets
//!   → SSR:RENDER / SSR:RENDERED
//!   → DOM:BEFORERENDER / DOM:RENDERTAG
//! ```
//!
//! # Listeners
//!
//! Pipeline listeners receive a mutable context and may suspend. They run
//! strictly in registration order; each is awaited before the next starts.
//! Listeners that never suspend use the `_sync` builder variants.
//!
//! ```rust
//! use headtag::{HookError, Hooks};
//!
//! let hooks = Hooks::new()
//!     .tags_resolve(|ctx| {
//!         Box::pin(async move {
//!             ctx.tags.retain(|t| t.attr("name") != Some("generator"));
//!             Ok(())
//!         })
//!     })
//!     .tags_resolve_sync(|ctx| {
//!         if ctx.tags.is_empty() {
//!             return Err(HookError::new("nothing to render"));
//!         }
//!         Ok(())
//!     });
//! assert!(!hooks.is_empty());
//! ```

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use futures::future::{self, FutureExt, LocalBoxFuture};
use thiserror::Error;

use crate::entry::HeadEntry;
use crate::head::Head;
use crate::render::{DomRenderStatus, SsrHead};
use crate::tag::HeadTag;

/// A named extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    Init,
    EntriesUpdated,
    EntriesResolve,
    TagNormalise,
    TagsBeforeResolve,
    TagsResolve,
    SsrRender,
    SsrRendered,
    DomBeforeRender,
    DomRenderTag,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPoint::Init => "init",
            HookPoint::EntriesUpdated => "entries:updated",
            HookPoint::EntriesResolve => "entries:resolve",
            HookPoint::TagNormalise => "tag:normalise",
            HookPoint::TagsBeforeResolve => "tags:beforeResolve",
            HookPoint::TagsResolve => "tags:resolve",
            HookPoint::SsrRender => "ssr:render",
            HookPoint::SsrRendered => "ssr:rendered",
            HookPoint::DomBeforeRender => "dom:beforeRender",
            HookPoint::DomRenderTag => "dom:renderTag",
        };
        f.write_str(name)
    }
}

/// Error returned by a hook listener. Aborts the current resolution or
/// render.
#[derive(Debug, Error)]
#[error("hook error ({}): {message}", point_label(.point))]
pub struct HookError {
    /// Human-readable error message
    pub message: String,
    /// The point the failing listener was registered on. Filled in by the
    /// bus when the listener leaves it empty.
    pub point: Option<HookPoint>,
    /// The underlying error source, if any
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

fn point_label(point: &Option<HookPoint>) -> String {
    point.map_or_else(|| "unknown".to_string(), |p| p.to_string())
}

impl HookError {
    /// Creates a new hook error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            point: None,
            source: None,
        }
    }

    /// Sets the point explicitly.
    pub fn at(mut self, point: HookPoint) -> Self {
        self.point = Some(point);
        self
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        self.source = Some(source.into());
        self
    }
}

/// Context for `entries:resolve`, `tags:beforeResolve` and `tags:resolve`.
///
/// `entries` is the resolution's own working copy; mutating it never touches
/// the registry.
#[derive(Debug, Default)]
pub struct ResolveContext {
    pub entries: Vec<HeadEntry>,
    pub tags: Vec<HeadTag>,
}

/// Context for `tag:normalise`.
#[derive(Debug)]
pub struct TagContext {
    pub tag: HeadTag,
    /// The owning entry's working copy, with its resolved input set.
    pub entry: HeadEntry,
}

/// Context for `ssr:render`.
#[derive(Debug, Default)]
pub struct SsrRenderContext {
    pub tags: Vec<HeadTag>,
}

/// Context for `ssr:rendered`.
#[derive(Debug, Default)]
pub struct SsrRenderedContext {
    pub html: SsrHead,
}

/// Context for `dom:beforeRender`. Clearing `should_render` skips the patch.
#[derive(Debug)]
pub struct DomBeforeRenderContext {
    pub should_render: bool,
}

/// Context for `dom:renderTag`, one per managed element.
pub struct DomRenderTagContext {
    pub tag: HeadTag,
    pub status: DomRenderStatus,
    /// The render target's element handle; downcast to the document's
    /// element type.
    pub element: Rc<dyn Any>,
}

impl fmt::Debug for DomRenderTagContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomRenderTagContext")
            .field("tag", &self.tag)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// A pipeline listener.
pub type HookFn<C> =
    Rc<dyn for<'a> Fn(&'a mut C) -> LocalBoxFuture<'a, Result<(), HookError>>>;

/// A synchronous notification listener (`init`, `entries:updated`).
pub type NotifyFn = Rc<dyn Fn(&Head)>;

fn sync_hook<C, F>(f: F) -> HookFn<C>
where
    C: 'static,
    F: Fn(&mut C) -> Result<(), HookError> + 'static,
{
    async_hook(move |ctx| future::ready(f(ctx)).boxed_local())
}

fn async_hook<C, F>(f: F) -> HookFn<C>
where
    C: 'static,
    F: for<'a> Fn(&'a mut C) -> LocalBoxFuture<'a, Result<(), HookError>> + 'static,
{
    Rc::new(f)
}

async fn run_listeners<C>(
    listeners: &[HookFn<C>],
    point: HookPoint,
    ctx: &mut C,
) -> Result<(), HookError> {
    for listener in listeners {
        listener(&mut *ctx).await.map_err(|err| match err.point {
            Some(_) => err,
            None => err.at(point),
        })?;
    }
    Ok(())
}

macro_rules! pipeline_point {
    ($(#[$doc:meta])* $field:ident, $sync:ident, $run:ident, $ctx:ty, $point:expr) => {
        $(#[$doc])*
        pub fn $field<F>(mut self, f: F) -> Self
        where
            F: for<'a> Fn(&'a mut $ctx) -> LocalBoxFuture<'a, Result<(), HookError>> + 'static,
        {
            self.$field.push(async_hook(f));
            self
        }

        #[doc = concat!("Adds a synchronous `", stringify!($field), "` listener.")]
        pub fn $sync<F>(mut self, f: F) -> Self
        where
            F: Fn(&mut $ctx) -> Result<(), HookError> + 'static,
        {
            self.$field.push(sync_hook(f));
            self
        }

        #[doc = concat!("Runs all `", stringify!($field), "` listeners in order.")]
        pub async fn $run(&self, ctx: &mut $ctx) -> Result<(), HookError> {
            run_listeners(&self.$field, $point, ctx).await
        }
    };
}

/// Listeners for every hook point, in registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    init: Vec<NotifyFn>,
    entries_updated: Vec<NotifyFn>,
    entries_resolve: Vec<HookFn<ResolveContext>>,
    tag_normalise: Vec<HookFn<TagContext>>,
    tags_before_resolve: Vec<HookFn<ResolveContext>>,
    tags_resolve: Vec<HookFn<ResolveContext>>,
    ssr_render: Vec<HookFn<SsrRenderContext>>,
    ssr_rendered: Vec<HookFn<SsrRenderedContext>>,
    dom_before_render: Vec<HookFn<DomBeforeRenderContext>>,
    dom_render_tag: Vec<HookFn<DomRenderTagContext>>,
}

impl Hooks {
    /// Creates a new empty hooks configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.init.is_empty()
            && self.entries_updated.is_empty()
            && self.entries_resolve.is_empty()
            && self.tag_normalise.is_empty()
            && self.tags_before_resolve.is_empty()
            && self.tags_resolve.is_empty()
            && self.ssr_render.is_empty()
            && self.ssr_rendered.is_empty()
            && self.dom_before_render.is_empty()
            && self.dom_render_tag.is_empty()
    }

    /// Appends every listener of `other` after this set's listeners.
    pub fn extend(&mut self, other: Hooks) {
        self.init.extend(other.init);
        self.entries_updated.extend(other.entries_updated);
        self.entries_resolve.extend(other.entries_resolve);
        self.tag_normalise.extend(other.tag_normalise);
        self.tags_before_resolve.extend(other.tags_before_resolve);
        self.tags_resolve.extend(other.tags_resolve);
        self.ssr_render.extend(other.ssr_render);
        self.ssr_rendered.extend(other.ssr_rendered);
        self.dom_before_render.extend(other.dom_before_render);
        self.dom_render_tag.extend(other.dom_render_tag);
    }

    /// Adds an `init` listener, called once after the head is constructed.
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&Head) + 'static,
    {
        self.init.push(Rc::new(f));
        self
    }

    /// Adds an `entries:updated` listener, called synchronously after every
    /// push, patch and dispose.
    pub fn entries_updated<F>(mut self, f: F) -> Self
    where
        F: Fn(&Head) + 'static,
    {
        self.entries_updated.push(Rc::new(f));
        self
    }

    /// Calls every `init` listener.
    pub fn run_init(&self, head: &Head) {
        for listener in &self.init {
            listener(head);
        }
    }

    /// Calls every `entries:updated` listener.
    pub fn run_entries_updated(&self, head: &Head) {
        for listener in &self.entries_updated {
            listener(head);
        }
    }

    pipeline_point!(
        /// Adds an `entries:resolve` listener. Runs before normalization; may
        /// add, remove or rewrite working entries.
        entries_resolve,
        entries_resolve_sync,
        run_entries_resolve,
        ResolveContext,
        HookPoint::EntriesResolve
    );

    pipeline_point!(
        /// Adds a `tag:normalise` listener, called for each produced tag.
        tag_normalise,
        tag_normalise_sync,
        run_tag_normalise,
        TagContext,
        HookPoint::TagNormalise
    );

    pipeline_point!(
        /// Adds a `tags:beforeResolve` listener.
        tags_before_resolve,
        tags_before_resolve_sync,
        run_tags_before_resolve,
        ResolveContext,
        HookPoint::TagsBeforeResolve
    );

    pipeline_point!(
        /// Adds a `tags:resolve` listener. The built-in dedupe, sort and
        /// interpolation stages run here.
        tags_resolve,
        tags_resolve_sync,
        run_tags_resolve,
        ResolveContext,
        HookPoint::TagsResolve
    );

    pipeline_point!(
        /// Adds an `ssr:render` listener, run on the tag list before
        /// serialization.
        ssr_render,
        ssr_render_sync,
        run_ssr_render,
        SsrRenderContext,
        HookPoint::SsrRender
    );

    pipeline_point!(
        /// Adds an `ssr:rendered` listener, run on the serialized output.
        ssr_rendered,
        ssr_rendered_sync,
        run_ssr_rendered,
        SsrRenderedContext,
        HookPoint::SsrRendered
    );

    pipeline_point!(
        /// Adds a `dom:beforeRender` listener. May cancel the patch.
        dom_before_render,
        dom_before_render_sync,
        run_dom_before_render,
        DomBeforeRenderContext,
        HookPoint::DomBeforeRender
    );

    pipeline_point!(
        /// Adds a `dom:renderTag` listener, called per managed element after
        /// the patch is applied.
        dom_render_tag,
        dom_render_tag_sync,
        run_dom_render_tag,
        DomRenderTagContext,
        HookPoint::DomRenderTag
    );
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("init_count", &self.init.len())
            .field("entries_updated_count", &self.entries_updated.len())
            .field("entries_resolve_count", &self.entries_resolve.len())
            .field("tag_normalise_count", &self.tag_normalise.len())
            .field("tags_before_resolve_count", &self.tags_before_resolve.len())
            .field("tags_resolve_count", &self.tags_resolve.len())
            .field("ssr_render_count", &self.ssr_render.len())
            .field("ssr_rendered_count", &self.ssr_rendered.len())
            .field("dom_before_render_count", &self.dom_before_render.len())
            .field("dom_render_tag_count", &self.dom_render_tag.len())
            .finish()
    }
}
