//! The entry registry and resolution pipeline.
//!
//! A [`Head`] collects entries from any number of call sites and resolves
//! them into one ordered tag list:
//!
//! ```rust
//! use headtag::{Head, Input};
//! use futures::executor::block_on;
//!
//! let head = Head::new();
//! head.push(Input::new().with("title", "A"));
//! let entry = head.push(Input::new().with("title", "B"));
//!
//! let tags = block_on(head.resolve_tags()).unwrap();
//! assert_eq!(tags[0].text_content.as_deref(), Some("B"));
//!
//! entry.dispose();
//! let tags = block_on(head.resolve_tags()).unwrap();
//! assert_eq!(tags[0].text_content.as_deref(), Some("A"));
//! ```
//!
//! `push`, `patch` and `dispose` are synchronous and never wait on pending
//! resolutions. A resolution works on its own snapshot of the registry; tags
//! of an entry disposed while the resolution was suspended are dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use futures::future;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::config::HeadConfig;
use crate::entry::{EntryOptions, HeadEntry, SideEffect, SideEffects};
use crate::error::Result;
use crate::hooks::{Hooks, ResolveContext, TagContext};
use crate::input::Input;
use crate::normalize::normalize_entry;
use crate::plugin::{core_plugins, HeadPlugin};
use crate::safe::whitelist_safe_input;
use crate::tag::{HeadTag, RuntimeMode};
use crate::template::DEFAULT_SEPARATOR;

/// Construction options for a [`Head`].
#[derive(Clone, Default)]
pub struct HeadOptions {
    /// Default mode for entries pushed without one.
    pub mode: Option<RuntimeMode>,
    /// Separator used when no `separator` template param is set.
    pub separator: Option<String>,
    /// Entries pushed at construction, in order.
    pub init: Vec<Input>,
    /// Plugins installed after the core plugins.
    pub plugins: Vec<Rc<dyn HeadPlugin>>,
    /// Listeners installed after all plugins.
    pub hooks: Hooks,
}

impl HeadOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default entry mode.
    pub fn mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the default separator.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Adds an initial entry.
    pub fn init(mut self, input: Input) -> Self {
        self.init.push(input);
        self
    }

    /// Adds a plugin.
    pub fn plugin<P: HeadPlugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Rc::new(plugin));
        self
    }

    /// Adds listeners.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks.extend(hooks);
        self
    }

    /// Builds options from loaded configuration.
    pub fn from_config(config: &HeadConfig) -> Result<Self> {
        let init = config
            .init
            .iter()
            .cloned()
            .map(Input::from_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(HeadOptions {
            mode: config.mode,
            separator: config.separator.clone(),
            init,
            ..Default::default()
        })
    }
}

impl fmt::Debug for HeadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadOptions")
            .field("mode", &self.mode)
            .field("separator", &self.separator)
            .field("init", &self.init.len())
            .field("plugins", &self.plugins.iter().map(|p| p.key()).collect::<Vec<_>>())
            .field("hooks", &self.hooks)
            .finish()
    }
}

struct HeadInner {
    entries: RefCell<Vec<HeadEntry>>,
    next_id: Cell<usize>,
    side_effect_queue: RefCell<SideEffects>,
    hooks: RefCell<Hooks>,
    plugins: RefCell<Vec<String>>,
    mode: Option<RuntimeMode>,
    separator: String,
}

/// The output of one resolution.
#[derive(Debug, Default)]
pub struct Resolved {
    /// The working copy of entries, with resolved inputs set.
    pub entries: Vec<HeadEntry>,
    /// The final ordered tag sequence.
    pub tags: Vec<HeadTag>,
}

/// Handle to a registry of head entries.
///
/// Cloning is cheap; clones share the registry.
#[derive(Clone)]
pub struct Head {
    inner: Rc<HeadInner>,
}

impl Default for Head {
    fn default() -> Self {
        Head::new()
    }
}

impl Head {
    /// Creates a head with the core plugins and no default mode.
    pub fn new() -> Self {
        Head::with_options(HeadOptions::default())
    }

    /// Creates a head whose entries default to server mode.
    pub fn server() -> Self {
        Head::with_options(HeadOptions::new().mode(RuntimeMode::Server))
    }

    /// Creates a head from options.
    ///
    /// Installs core plugins, then option plugins and listeners, pushes the
    /// initial entries and finally calls `init` listeners.
    pub fn with_options(options: HeadOptions) -> Self {
        let head = Head {
            inner: Rc::new(HeadInner {
                entries: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                side_effect_queue: RefCell::new(SideEffects::new()),
                hooks: RefCell::new(Hooks::new()),
                plugins: RefCell::new(Vec::new()),
                mode: options.mode,
                separator: options
                    .separator
                    .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
            }),
        };
        for plugin in core_plugins().into_iter().chain(options.plugins) {
            head.install(plugin);
        }
        head.add_hooks(options.hooks);
        for input in options.init {
            head.push(input);
        }
        let hooks = head.hooks();
        hooks.run_init(&head);
        head
    }

    /// Default entry mode.
    pub fn mode(&self) -> Option<RuntimeMode> {
        self.inner.mode
    }

    /// Separator used when no `separator` template param is set.
    pub fn separator(&self) -> &str {
        &self.inner.separator
    }

    /// A snapshot of the registered listeners.
    pub fn hooks(&self) -> Hooks {
        self.inner.hooks.borrow().clone()
    }

    /// Appends listeners.
    pub fn add_hooks(&self, hooks: Hooks) {
        self.inner.hooks.borrow_mut().extend(hooks);
    }

    /// Installs a plugin unless one with the same key is installed.
    pub fn use_plugin<P: HeadPlugin + 'static>(&self, plugin: P) {
        self.install(Rc::new(plugin));
    }

    fn install(&self, plugin: Rc<dyn HeadPlugin>) {
        let key = plugin.key().to_string();
        if self.inner.plugins.borrow().contains(&key) {
            debug!(plugin = %key, "plugin already installed");
            return;
        }
        self.inner.plugins.borrow_mut().push(key);
        let hooks = plugin.hooks(self);
        self.add_hooks(hooks);
    }

    /// Returns true if a plugin with this key is installed.
    pub fn has_plugin(&self, key: &str) -> bool {
        self.inner.plugins.borrow().iter().any(|k| k == key)
    }

    /// Registers an entry.
    pub fn push(&self, input: Input) -> ActiveHeadEntry {
        self.push_with_options(input, EntryOptions::default())
    }

    /// Registers an entry with options.
    pub fn push_with_options(&self, input: Input, mut options: EntryOptions) -> ActiveHeadEntry {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        if options.mode.is_none() {
            options.mode = self.inner.mode;
        }
        self.inner
            .entries
            .borrow_mut()
            .push(HeadEntry::new(id, input, options));
        debug!(entry = id, "entry pushed");
        self.notify_updated();
        ActiveHeadEntry {
            id,
            head: Rc::downgrade(&self.inner),
        }
    }

    /// Registers an entry through the safe whitelist.
    ///
    /// Fields capable of script injection are dropped, never rejected.
    pub fn push_safe(&self, input: Input) -> ActiveHeadEntry {
        self.push_safe_with_options(input, EntryOptions::default())
    }

    /// Registers an entry through the safe whitelist, with options.
    ///
    /// The whitelist runs after any user transform.
    pub fn push_safe_with_options(&self, input: Input, options: EntryOptions) -> ActiveHeadEntry {
        let user = options.transform.clone();
        let options = EntryOptions {
            transform: None,
            ..options
        }
        .transform_async(move |resolved| {
            let user = user.clone();
            async move {
                let resolved = match user {
                    Some(transform) => transform(resolved).await,
                    None => resolved,
                };
                whitelist_safe_input(resolved)
            }
        });
        self.push_with_options(input, options)
    }

    /// A snapshot of the registered entries.
    pub fn entries(&self) -> Vec<HeadEntry> {
        self.inner.entries.borrow().clone()
    }

    fn live_ids(&self) -> FxHashSet<usize> {
        self.inner.entries.borrow().iter().map(|e| e.id).collect()
    }

    /// Attaches a cleanup marker to an entry.
    ///
    /// If the entry is already gone the marker goes straight to the pending
    /// queue.
    pub fn record_side_effect(&self, entry_id: usize, effect: SideEffect) {
        let key = effect.key();
        let mut entries = self.inner.entries.borrow_mut();
        match entries.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                entry.side_effects.insert(key, effect);
            }
            None => {
                self.inner.side_effect_queue.borrow_mut().insert(key, effect);
            }
        }
    }

    /// Replaces every entry's cleanup markers with those in `effects`.
    ///
    /// Entries without a set in `effects` are left with none. Sets for
    /// entries that are already gone go to the pending queue.
    pub fn replace_side_effects(&self, mut effects: FxHashMap<usize, SideEffects>) {
        for entry in self.inner.entries.borrow_mut().iter_mut() {
            entry.side_effects = effects.remove(&entry.id).unwrap_or_default();
        }
        let mut queue = self.inner.side_effect_queue.borrow_mut();
        for (_, orphaned) in effects {
            queue.extend(orphaned);
        }
    }

    /// Drains the cleanup markers handed over by disposed entries.
    pub fn take_side_effects(&self) -> Vec<SideEffect> {
        self.inner
            .side_effect_queue
            .borrow_mut()
            .drain(..)
            .map(|(_, effect)| effect)
            .collect()
    }

    /// Calls `entries:updated` listeners.
    pub fn notify_updated(&self) {
        let hooks = self.hooks();
        hooks.run_entries_updated(self);
    }

    /// Resolves the registry into the final tag sequence.
    pub async fn resolve_tags(&self) -> Result<Vec<HeadTag>> {
        Ok(self.resolve().await?.tags)
    }

    /// Resolves the registry, returning the working entries alongside the
    /// tags.
    pub async fn resolve(&self) -> Result<Resolved> {
        let hooks = self.hooks();
        let snapshot = self.entries();
        let snapshot_ids: FxHashSet<usize> = snapshot.iter().map(|e| e.id).collect();

        let mut ctx = ResolveContext {
            entries: snapshot,
            tags: Vec::new(),
        };
        hooks.run_entries_resolve(&mut ctx).await?;

        let normalized = future::join_all(ctx.entries.iter().map(normalize_entry)).await;

        let mut tags = Vec::new();
        for (entry, out) in ctx.entries.iter_mut().zip(normalized) {
            entry.resolved_input = Some(out.resolved_input);
            for tag in out.tags {
                let mut tag_ctx = TagContext {
                    tag,
                    entry: entry.clone(),
                };
                hooks.run_tag_normalise(&mut tag_ctx).await?;
                tags.push(tag_ctx.tag);
            }
        }

        let live = self.live_ids();
        let disposed: FxHashSet<usize> = snapshot_ids.difference(&live).copied().collect();
        let before = tags.len();
        if !disposed.is_empty() {
            tags.retain(|t| !disposed.contains(&t.entry_id));
            ctx.entries.retain(|e| !disposed.contains(&e.id));
        }
        let dropped = before - tags.len();

        ctx.tags = tags;
        hooks.run_tags_before_resolve(&mut ctx).await?;
        hooks.run_tags_resolve(&mut ctx).await?;

        debug!(
            entries = ctx.entries.len(),
            tags = ctx.tags.len(),
            dropped,
            "resolved head"
        );
        Ok(Resolved {
            entries: ctx.entries,
            tags: ctx.tags,
        })
    }
}

impl fmt::Debug for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Head")
            .field("entries", &self.inner.entries.borrow().len())
            .field("mode", &self.inner.mode)
            .field("plugins", &self.inner.plugins.borrow())
            .finish()
    }
}

/// Handle returned by [`Head::push`].
///
/// Holds a weak reference; once the head is dropped every operation is a
/// no-op.
#[derive(Debug, Clone)]
pub struct ActiveHeadEntry {
    id: usize,
    head: Weak<HeadInner>,
}

impl ActiveHeadEntry {
    /// The entry's identity.
    pub fn id(&self) -> usize {
        self.id
    }

    fn head(&self) -> Option<Head> {
        self.head.upgrade().map(|inner| Head { inner })
    }

    /// Replaces the entry's input, keeping its identity.
    ///
    /// Returns false if the entry is no longer registered.
    pub fn patch(&self, input: Input) -> bool {
        let Some(head) = self.head() else {
            return false;
        };
        let patched = {
            let mut entries = head.inner.entries.borrow_mut();
            match entries.iter_mut().find(|e| e.id == self.id) {
                Some(entry) => {
                    entry.input = input;
                    true
                }
                None => false,
            }
        };
        if patched {
            debug!(entry = self.id, "entry patched");
            head.notify_updated();
        }
        patched
    }

    /// Removes the entry, handing its side effects to the pending queue.
    ///
    /// Returns false if the entry was already disposed.
    pub fn dispose(&self) -> bool {
        let Some(head) = self.head() else {
            return false;
        };
        let removed = {
            let mut entries = head.inner.entries.borrow_mut();
            entries
                .iter()
                .position(|e| e.id == self.id)
                .map(|i| entries.remove(i))
        };
        let Some(entry) = removed else {
            return false;
        };
        head.inner
            .side_effect_queue
            .borrow_mut()
            .extend(entry.side_effects);
        debug!(entry = self.id, "entry disposed");
        head.notify_updated();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagName;
    use futures::executor::block_on;
    use serde_json::json;

    fn input(value: serde_json::Value) -> Input {
        Input::from_json(value).unwrap()
    }

    #[test]
    fn test_push_assigns_increasing_ids() {
        let head = Head::new();
        let a = head.push(Input::new());
        let b = head.push(Input::new());
        assert!(a.id() < b.id());
        assert_eq!(head.entries().len(), 2);
    }

    #[test]
    fn test_push_inherits_head_mode() {
        let head = Head::server();
        head.push(Input::new());
        head.push_with_options(Input::new(), EntryOptions::new().mode(RuntimeMode::Client));
        let modes: Vec<_> = head.entries().iter().map(|e| e.mode).collect();
        assert_eq!(modes, vec![Some(RuntimeMode::Server), Some(RuntimeMode::Client)]);
    }

    #[test]
    fn test_patch_keeps_identity() {
        let head = Head::new();
        let entry = head.push(input(json!({"title": "A"})));
        assert!(entry.patch(input(json!({"title": "B"}))));
        let entries = head.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, entry.id());
        let tags = block_on(head.resolve_tags()).unwrap();
        assert_eq!(tags[0].text_content.as_deref(), Some("B"));
    }

    #[test]
    fn test_dispose_moves_side_effects_to_queue() {
        let head = Head::new();
        let entry = head.push(Input::new());
        head.record_side_effect(
            entry.id(),
            SideEffect::RemoveElement { hash: "h".into() },
        );
        assert!(head.take_side_effects().is_empty());
        assert!(entry.dispose());
        assert!(!entry.dispose());
        assert_eq!(
            head.take_side_effects(),
            vec![SideEffect::RemoveElement { hash: "h".into() }]
        );
        assert!(head.take_side_effects().is_empty());
    }

    #[test]
    fn test_replace_side_effects_drops_old_markers() {
        let head = Head::new();
        let entry = head.push(Input::new().with("title", "a"));
        head.record_side_effect(entry.id(), SideEffect::RemoveElement { hash: "old".into() });

        let mut current = SideEffects::new();
        let effect = SideEffect::RemoveElement { hash: "new".into() };
        current.insert(effect.key(), effect.clone());
        let mut effects = FxHashMap::default();
        effects.insert(entry.id(), current);
        let orphan = SideEffect::RemoveElement { hash: "gone".into() };
        effects.insert(99, SideEffects::from([(orphan.key(), orphan)]));
        head.replace_side_effects(effects);

        let markers: Vec<_> = head.entries()[0].side_effects.values().cloned().collect();
        assert_eq!(markers, vec![effect]);
        assert_eq!(
            head.take_side_effects(),
            vec![SideEffect::RemoveElement { hash: "gone".into() }]
        );
    }

    #[test]
    fn test_side_effect_for_missing_entry_is_queued() {
        let head = Head::new();
        head.record_side_effect(
            99,
            SideEffect::RemoveAttribute {
                target: TagName::HtmlAttrs,
                name: "lang".into(),
            },
        );
        assert_eq!(head.take_side_effects().len(), 1);
    }

    #[test]
    fn test_entries_updated_fires_on_every_mutation() {
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let head = Head::with_options(
            HeadOptions::new().hooks(Hooks::new().entries_updated(move |_| seen.set(seen.get() + 1))),
        );
        let entry = head.push(Input::new());
        entry.patch(Input::new());
        entry.dispose();
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_init_runs_after_initial_entries() {
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let head = Head::with_options(
            HeadOptions::new()
                .init(input(json!({"title": "Initial"})))
                .hooks(Hooks::new().init(move |head| counter.set(head.entries().len()))),
        );
        assert_eq!(seen.get(), 1);
        assert_eq!(head.entries().len(), 1);
    }

    #[test]
    fn test_handle_outliving_head_is_inert() {
        let head = Head::new();
        let entry = head.push(Input::new());
        drop(head);
        assert!(!entry.patch(Input::new()));
        assert!(!entry.dispose());
    }

    #[test]
    fn test_entries_resolve_can_inject_entries() {
        let hooks = Hooks::new().entries_resolve_sync(|ctx| {
            ctx.entries.push(HeadEntry::new(
                1000,
                Input::new().with("title", "Injected"),
                EntryOptions::new(),
            ));
            Ok(())
        });
        let head = Head::with_options(HeadOptions::new().hooks(hooks));
        let tags = block_on(head.resolve_tags()).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].text_content.as_deref(), Some("Injected"));
        assert!(head.entries().is_empty());
    }

    #[test]
    fn test_hook_error_aborts_resolution() {
        let hooks = Hooks::new().tags_before_resolve_sync(|_| Err(crate::HookError::new("stop")));
        let head = Head::with_options(HeadOptions::new().hooks(hooks));
        head.push(input(json!({"title": "x"})));
        let err = block_on(head.resolve()).unwrap_err();
        assert_eq!(err.to_string(), "hook error (tags:beforeResolve): stop");
    }

    #[test]
    fn test_from_config() {
        let config = HeadConfig {
            mode: Some(RuntimeMode::Server),
            separator: Some("·".into()),
            init: vec![json!({"htmlAttrs": {"lang": "en"}})],
        };
        let head = Head::with_options(HeadOptions::from_config(&config).unwrap());
        assert_eq!(head.separator(), "·");
        assert_eq!(head.entries().len(), 1);
        assert_eq!(head.entries()[0].mode, Some(RuntimeMode::Server));
    }

    #[test]
    fn test_from_config_rejects_non_object_init() {
        let config = HeadConfig {
            init: vec![json!("title")],
            ..Default::default()
        };
        assert!(HeadOptions::from_config(&config).is_err());
    }
}
