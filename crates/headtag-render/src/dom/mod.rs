//! Incremental DOM reconciliation.
//!
//! A [`DomRenderer`] keeps a live document in sync with a [`Head`]. Each patch
//! resolves the head, correlates resolved tags with the elements rendered
//! last time by tag hash, and applies only the difference:
//!
//! - a tag whose hash is already rendered keeps its element
//! - a new tag first tries to adopt an equal element already in the document
//!   (server-rendered markup), otherwise a new element is created
//! - elements of tags that disappeared are removed
//! - `htmlAttrs` and `bodyAttrs` are patched attribute by attribute
//!
//! Elements the renderer did not create or adopt are never touched.
//!
//! The document is abstracted behind [`Document`], so the reconciler runs
//! against a browser binding or the in-memory [`MemoryDocument`] alike.
//!
//! ```rust
//! use futures::executor::block_on;
//! use headtag::{HeadOptions, Input};
//! use headtag_render::{create_dom_head, MemoryDocument};
//!
//! let (head, mut renderer) = create_dom_head(MemoryDocument::new(), HeadOptions::new());
//! head.push(Input::new().with("title", "Inbox"));
//! block_on(renderer.render(&head))?;
//!
//! assert_eq!(
//!     renderer.document().to_html(),
//!     "<html><head><title>Inbox</title></head><body></body></html>"
//! );
//! # Ok::<(), headtag_render::RenderError>(())
//! ```

mod memory;

use std::cell::Cell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use headtag::{
    DomBeforeRenderContext, DomRenderStatus, DomRenderTagContext, Head, HeadOptions, HeadPayload,
    HeadPlugin, HeadTag, Hooks, RuntimeMode, SideEffect, SideEffects, TagName, TagPosition,
    PAYLOAD_ID,
};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use crate::error::RenderError;

pub use memory::{MemoryDocument, MemoryElement};

/// A mutable element tree the reconciler can patch.
pub trait Document {
    /// Handle to one element. Handles of removed elements stay comparable.
    type Element: Clone + PartialEq + 'static;

    fn html_element(&self) -> Self::Element;
    fn head_element(&self) -> Self::Element;
    fn body_element(&self) -> Self::Element;

    /// Creates a detached element.
    fn create_element(&mut self, name: &str) -> Self::Element;

    /// Lowercase tag name.
    fn tag_name(&self, el: &Self::Element) -> String;
    fn attribute_names(&self, el: &Self::Element) -> Vec<String>;
    fn get_attribute(&self, el: &Self::Element, name: &str) -> Option<String>;
    fn set_attribute(&mut self, el: &Self::Element, name: &str, value: &str);
    fn remove_attribute(&mut self, el: &Self::Element, name: &str);

    fn text_content(&self, el: &Self::Element) -> Option<String>;
    fn set_text_content(&mut self, el: &Self::Element, text: &str);
    fn set_inner_html(&mut self, el: &Self::Element, html: &str);

    fn children(&self, parent: &Self::Element) -> Vec<Self::Element>;

    /// Moves `el` under `parent`, before `reference`, or last when `None`.
    fn insert_before(
        &mut self,
        parent: &Self::Element,
        el: &Self::Element,
        reference: Option<&Self::Element>,
    );

    /// Detaches `el` from its parent.
    fn remove(&mut self, el: &Self::Element);

    /// Returns true if `el` is attached under the root element.
    fn is_connected(&self, el: &Self::Element) -> bool;

    fn element_by_id(&self, id: &str) -> Option<Self::Element>;
}

/// Cleanup markers gathered during one patch, by entry id.
type EntryEffects = FxHashMap<usize, SideEffects>;

type Events<E> = Vec<(HeadTag, DomRenderStatus, E)>;

/// Awaited before every patch, e.g. to wait for the next animation frame.
pub type RenderDelay = Rc<dyn Fn() -> LocalBoxFuture<'static, ()>>;

#[derive(Debug, Clone)]
struct Rendered<E> {
    element: E,
    tag: HeadTag,
}

/// Keeps a [`Document`] in sync with a head.
pub struct DomRenderer<D: Document> {
    document: D,
    /// Live elements by tag hash.
    rendered: IndexMap<String, Rendered<D::Element>>,
    /// Attribute names last applied to `<html>` and `<body>`.
    bag_attrs: IndexMap<TagName, Vec<String>>,
    dirty: Rc<Cell<bool>>,
    delay: Option<RenderDelay>,
}

impl<D: Document> DomRenderer<D> {
    /// Creates a renderer over `document`. Starts dirty.
    pub fn new(document: D) -> Self {
        DomRenderer {
            document,
            rendered: IndexMap::new(),
            bag_attrs: IndexMap::new(),
            dirty: Rc::new(Cell::new(true)),
            delay: None,
        }
    }

    /// Awaits `delay` before every patch.
    pub fn with_delay(mut self, delay: RenderDelay) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A plugin that marks this renderer dirty whenever entries change.
    pub fn plugin(&self) -> DomPlugin {
        DomPlugin {
            dirty: self.dirty.clone(),
        }
    }

    /// Returns true if entries changed since the last patch.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    /// Patches only if entries changed since the last patch.
    pub async fn render_if_dirty(&mut self, head: &Head) -> Result<bool, RenderError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.render(head).await
    }

    /// Resolves `head` and patches the document.
    ///
    /// Returns false if a `dom:beforeRender` listener cancelled the patch.
    /// A failed patch leaves the renderer dirty.
    pub async fn render(&mut self, head: &Head) -> Result<bool, RenderError> {
        if let Some(delay) = &self.delay {
            delay().await;
        }
        let hooks = head.hooks();
        let mut before = DomBeforeRenderContext {
            should_render: true,
        };
        hooks.run_dom_before_render(&mut before).await?;
        if !before.should_render {
            debug!("dom render cancelled");
            return Ok(false);
        }
        self.dirty.set(false);
        if let Err(err) = self.patch(head, &hooks).await {
            self.dirty.set(true);
            return Err(err);
        }
        Ok(true)
    }

    async fn patch(&mut self, head: &Head, hooks: &Hooks) -> Result<(), RenderError> {
        let tags: Vec<HeadTag> = head
            .resolve_tags()
            .await?
            .into_iter()
            .filter(|t| t.mode != Some(RuntimeMode::Server) && t.tag != TagName::TitleTemplate)
            .collect();

        let (bags, elements): (Vec<HeadTag>, Vec<HeadTag>) =
            tags.into_iter().partition(|t| t.tag.is_attribute_bag());
        let desired = desired_attributes(&bags);
        let live: FxHashSet<String> = elements.iter().map(tag_hash).collect();

        let mut events = Vec::new();
        let mut effects = EntryEffects::default();
        self.apply_side_effects(head, &live, &desired, &mut events);
        self.patch_attributes(&bags, &desired, &mut effects);
        self.patch_elements(elements, &mut events, &mut effects);
        head.replace_side_effects(effects);

        let stale: Vec<String> = self
            .rendered
            .keys()
            .filter(|hash| !live.contains(*hash))
            .cloned()
            .collect();
        for hash in stale {
            if let Some(old) = self.rendered.shift_remove(&hash) {
                trace!(hash = %hash, tag = %old.tag.tag, "removing element");
                self.document.remove(&old.element);
                events.push((old.tag, DomRenderStatus::Removed, old.element));
            }
        }

        debug!(
            elements = self.rendered.len(),
            events = events.len(),
            "patched dom"
        );

        for (tag, status, element) in events {
            let mut ctx = DomRenderTagContext {
                tag,
                status,
                element: Rc::new(element),
            };
            hooks.run_dom_render_tag(&mut ctx).await?;
        }
        Ok(())
    }

    fn bag_element(&self, bag: TagName) -> D::Element {
        match bag {
            TagName::BodyAttrs => self.document.body_element(),
            _ => self.document.html_element(),
        }
    }

    fn apply_side_effects(
        &mut self,
        head: &Head,
        live: &FxHashSet<String>,
        desired: &IndexMap<TagName, IndexMap<String, String>>,
        events: &mut Events<D::Element>,
    ) {
        for effect in head.take_side_effects() {
            match effect {
                SideEffect::RemoveElement { hash } => {
                    if live.contains(&hash) {
                        continue;
                    }
                    if let Some(old) = self.rendered.shift_remove(&hash) {
                        trace!(hash = %hash, "side effect: removing element");
                        self.document.remove(&old.element);
                        events.push((old.tag, DomRenderStatus::Removed, old.element));
                    }
                }
                SideEffect::RemoveAttribute { target, name } => {
                    if desired.get(&target).is_some_and(|a| a.contains_key(&name)) {
                        continue;
                    }
                    trace!(bag = %target, attr = %name, "side effect: removing attribute");
                    let el = self.bag_element(target);
                    self.document.remove_attribute(&el, &name);
                    if let Some(names) = self.bag_attrs.get_mut(&target) {
                        names.retain(|n| n != &name);
                    }
                }
            }
        }
    }

    fn patch_attributes(
        &mut self,
        bags: &[HeadTag],
        desired: &IndexMap<TagName, IndexMap<String, String>>,
        effects: &mut EntryEffects,
    ) {
        for tag in bags {
            for name in tag.props.keys() {
                track(
                    effects,
                    tag.entry_id,
                    SideEffect::RemoveAttribute {
                        target: tag.tag,
                        name: name.clone(),
                    },
                );
            }
        }
        for bag in [TagName::HtmlAttrs, TagName::BodyAttrs] {
            let el = self.bag_element(bag);
            let wanted = desired.get(&bag).cloned().unwrap_or_default();
            for (name, value) in &wanted {
                if self.document.get_attribute(&el, name).as_deref() != Some(value.as_str()) {
                    trace!(bag = %bag, attr = %name, "setting attribute");
                    self.document.set_attribute(&el, name, value);
                }
            }
            let previous = self.bag_attrs.get(&bag).cloned().unwrap_or_default();
            for name in previous {
                if !wanted.contains_key(&name) {
                    trace!(bag = %bag, attr = %name, "removing attribute");
                    self.document.remove_attribute(&el, &name);
                }
            }
            self.bag_attrs.insert(bag, wanted.into_keys().collect());
        }
    }

    /// Walks each bucket backwards so every inserted element lands before
    /// its successor. Kept and adopted elements already under the bucket's
    /// parent are never moved.
    fn patch_elements(
        &mut self,
        tags: Vec<HeadTag>,
        events: &mut Events<D::Element>,
        effects: &mut EntryEffects,
    ) {
        let managed: Vec<D::Element> = self.rendered.values().map(|r| r.element.clone()).collect();
        let mut adopted: Vec<D::Element> = Vec::new();

        for position in TagPosition::ALL {
            let parent = match position {
                TagPosition::Head => self.document.head_element(),
                TagPosition::BodyOpen | TagPosition::BodyClose => self.document.body_element(),
            };
            let mut anchor = match position {
                TagPosition::BodyOpen => self.body_open_anchor(&parent),
                _ => None,
            };
            let bucket: Vec<&HeadTag> = tags.iter().filter(|t| t.position() == position).collect();

            for tag in bucket.into_iter().rev() {
                let hash = tag_hash(tag);
                let existing = self.rendered.get(&hash).map(|r| r.element.clone());
                // (element, status, needs insertion)
                let (element, status, insert) = match existing {
                    Some(el) if self.document.children(&parent).contains(&el) => {
                        (el, DomRenderStatus::Kept, false)
                    }
                    Some(el) if self.document.is_connected(&el) => {
                        trace!(hash = %hash, tag = %tag.tag, position = ?position, "moving element");
                        (el, DomRenderStatus::Kept, true)
                    }
                    Some(_) => {
                        warn!(hash = %hash, tag = %tag.tag, "rendered element was detached, recreating");
                        (self.create(tag), DomRenderStatus::Created, true)
                    }
                    None => match self.find_equal(&parent, tag, &managed, &adopted) {
                        Some(el) => {
                            trace!(hash = %hash, tag = %tag.tag, "adopting existing element");
                            adopted.push(el.clone());
                            (el, DomRenderStatus::Kept, false)
                        }
                        None => (self.create(tag), DomRenderStatus::Created, true),
                    },
                };
                if insert {
                    self.insert(&parent, &element, anchor.as_ref());
                }
                track(effects, tag.entry_id, SideEffect::RemoveElement { hash: hash.clone() });
                self.rendered.insert(
                    hash,
                    Rendered {
                        element: element.clone(),
                        tag: tag.clone(),
                    },
                );
                events.push((tag.clone(), status, element.clone()));
                anchor = Some(element);
            }
        }
    }

    /// First body child that is not a managed `bodyOpen` element.
    fn body_open_anchor(&self, body: &D::Element) -> Option<D::Element> {
        self.document.children(body).into_iter().find(|child| {
            !self
                .rendered
                .values()
                .any(|r| &r.element == child && r.tag.position() == TagPosition::BodyOpen)
        })
    }

    fn create(&mut self, tag: &HeadTag) -> D::Element {
        trace!(tag = %tag.tag, "creating element");
        let el = self.document.create_element(tag.tag.as_str());
        for (name, value) in &tag.props {
            if let Some(value) = value.to_dom_value() {
                self.document.set_attribute(&el, name, &value);
            }
        }
        match (&tag.text_content, &tag.inner_html) {
            (Some(text), _) => self.document.set_text_content(&el, text),
            (None, Some(html)) => self.document.set_inner_html(&el, html),
            (None, None) => {}
        }
        el
    }

    /// Inserts `el` before `anchor`, or last if the anchor left `parent`.
    fn insert(&mut self, parent: &D::Element, el: &D::Element, anchor: Option<&D::Element>) {
        let anchor = anchor.filter(|a| self.document.children(parent).contains(*a));
        self.document.insert_before(parent, el, anchor);
    }

    /// An unmanaged child equal to what `tag` would create.
    fn find_equal(
        &self,
        parent: &D::Element,
        tag: &HeadTag,
        managed: &[D::Element],
        adopted: &[D::Element],
    ) -> Option<D::Element> {
        let want: IndexMap<String, String> = tag
            .props
            .iter()
            .filter_map(|(k, v)| v.to_dom_value().map(|v| (k.clone(), v)))
            .collect();
        self.document.children(parent).into_iter().find(|child| {
            if managed.contains(child) || adopted.contains(child) {
                return false;
            }
            if !self.document.tag_name(child).eq_ignore_ascii_case(tag.tag.as_str()) {
                return false;
            }
            let names = self.document.attribute_names(child);
            if names.len() != want.len() {
                return false;
            }
            let attrs_match = want
                .iter()
                .all(|(k, v)| self.document.get_attribute(child, k).as_deref() == Some(v.as_str()));
            let content = self.document.text_content(child).unwrap_or_default();
            attrs_match && content == tag.content().unwrap_or_default()
        })
    }
}

impl<D: Document + std::fmt::Debug> std::fmt::Debug for DomRenderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomRenderer")
            .field("document", &self.document)
            .field("rendered", &self.rendered.len())
            .field("dirty", &self.dirty.get())
            .finish_non_exhaustive()
    }
}

fn track(effects: &mut EntryEffects, entry_id: usize, effect: SideEffect) {
    effects.entry(entry_id).or_default().insert(effect.key(), effect);
}

fn tag_hash(tag: &HeadTag) -> String {
    tag.hash.clone().unwrap_or_else(|| tag.compute_hash())
}

fn desired_attributes(bags: &[HeadTag]) -> IndexMap<TagName, IndexMap<String, String>> {
    let mut desired: IndexMap<TagName, IndexMap<String, String>> = IndexMap::new();
    for tag in bags {
        let attrs = desired.entry(tag.tag).or_default();
        for (name, value) in &tag.props {
            match value.to_dom_value() {
                Some(value) => {
                    attrs.insert(name.clone(), value);
                }
                None => {
                    attrs.shift_remove(name);
                }
            }
        }
    }
    desired
}

/// Marks a [`DomRenderer`] dirty on every entry change.
#[derive(Debug, Clone)]
pub struct DomPlugin {
    dirty: Rc<Cell<bool>>,
}

impl HeadPlugin for DomPlugin {
    fn key(&self) -> &str {
        "headtag:dom"
    }

    fn hooks(&self, _head: &Head) -> Hooks {
        let dirty = self.dirty.clone();
        Hooks::new().entries_updated(move |_| dirty.set(true))
    }
}

/// Reads the server payload embedded in the document, if any.
pub fn read_payload<D: Document>(document: &D) -> Result<Option<HeadPayload>, RenderError> {
    let Some(el) = document.element_by_id(PAYLOAD_ID) else {
        return Ok(None);
    };
    let text = document.text_content(&el).unwrap_or_default();
    HeadPayload::parse(&text)
        .map(Some)
        .map_err(RenderError::Payload)
}

/// Creates a client head wired to a renderer over `document`.
///
/// Entries default to client mode. An embedded server payload becomes the
/// first entry; an unreadable one is logged and skipped.
pub fn create_dom_head<D: Document>(document: D, mut options: HeadOptions) -> (Head, DomRenderer<D>) {
    if options.mode.is_none() {
        options.mode = Some(RuntimeMode::Client);
    }
    match read_payload(&document) {
        Ok(Some(payload)) => {
            debug!("hydrating from server payload");
            options.init.insert(0, payload.into_input());
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "ignoring head payload"),
    }
    let renderer = DomRenderer::new(document);
    options.plugins.push(Rc::new(renderer.plugin()));
    let head = Head::with_options(options);
    (head, renderer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use headtag::Input;

    #[test]
    fn test_desired_attributes_drop_false_and_null() {
        let bag = HeadTag::new(TagName::HtmlAttrs)
            .with_prop("lang", "en")
            .with_prop("hidden", false)
            .with_prop("data-ready", true);
        let desired = desired_attributes(&[bag]);
        let html = &desired[&TagName::HtmlAttrs];
        assert_eq!(html.get("lang").map(String::as_str), Some("en"));
        assert_eq!(html.get("data-ready").map(String::as_str), Some(""));
        assert!(!html.contains_key("hidden"));
    }

    #[test]
    fn test_dirty_flag_follows_entries() {
        let (head, mut renderer) = create_dom_head(MemoryDocument::new(), HeadOptions::new());
        assert!(renderer.is_dirty());
        assert!(block_on(renderer.render_if_dirty(&head)).unwrap());
        assert!(!renderer.is_dirty());
        assert!(!block_on(renderer.render_if_dirty(&head)).unwrap());

        head.push(Input::new().with("title", "x"));
        assert!(renderer.is_dirty());
    }

    #[test]
    fn test_server_mode_tags_are_skipped() {
        let (head, mut renderer) = create_dom_head(MemoryDocument::new(), HeadOptions::new());
        head.push_with_options(
            Input::new().with("title", "server only"),
            headtag::EntryOptions::new().mode(RuntimeMode::Server),
        );
        block_on(renderer.render(&head)).unwrap();
        assert!(renderer.document().query_all("title").is_empty());
    }

    #[test]
    fn test_read_payload_absent() {
        assert!(read_payload(&MemoryDocument::new()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_payload_is_an_error() {
        let mut doc = MemoryDocument::new();
        let head = doc.head_element();
        doc.append(head, "script", &[("id", PAYLOAD_ID)], Some("not json"));
        assert!(matches!(read_payload(&doc), Err(RenderError::Payload(_))));
    }
}
