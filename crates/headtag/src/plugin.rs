//! Plugins: named bundles of hook listeners.
//!
//! A plugin is installed at most once per head, keyed by [`HeadPlugin::key`].
//! The engine's own behavior ships as the [`core_plugins`], installed before
//! any user plugin so their `tags:resolve` listeners run first and in a fixed
//! order: dedupe, sort, template params, title template, hash.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::dedupe::DedupePlugin;
use crate::head::Head;
use crate::hooks::Hooks;
use crate::sort::SortPlugin;
use crate::template::{TemplateParamsPlugin, TitleTemplatePlugin};

/// A bundle of hook listeners installed into a [`Head`].
pub trait HeadPlugin {
    /// Unique identity; a second plugin with the same key is ignored.
    fn key(&self) -> &str;

    /// Builds the plugin's listeners. Called once, at installation.
    fn hooks(&self, head: &Head) -> Hooks;
}

/// The built-in pipeline stages, in installation order.
pub fn core_plugins() -> Vec<Rc<dyn HeadPlugin>> {
    vec![
        Rc::new(DedupePlugin),
        Rc::new(SortPlugin),
        Rc::new(TemplateParamsPlugin),
        Rc::new(TitleTemplatePlugin),
        Rc::new(TagHashPlugin),
    ]
}

/// Recomputes tag hashes once content is final.
///
/// Identical tags get a numeric suffix so each still maps to its own live
/// element.
pub struct TagHashPlugin;

impl HeadPlugin for TagHashPlugin {
    fn key(&self) -> &str {
        "headtag:hash"
    }

    fn hooks(&self, _head: &Head) -> Hooks {
        Hooks::new().tags_resolve_sync(|ctx| {
            let mut seen: FxHashMap<String, usize> = FxHashMap::default();
            for tag in &mut ctx.tags {
                let hash = tag.compute_hash();
                let count = seen.entry(hash.clone()).or_insert(0);
                tag.hash = Some(match *count {
                    0 => hash,
                    n => format!("{}:{}", hash, n),
                });
                *count += 1;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Input;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_core_plugin_keys_are_unique() {
        let plugins = core_plugins();
        let mut keys: Vec<_> = plugins.iter().map(|p| p.key().to_string()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), plugins.len());
    }

    #[test]
    fn test_identical_tags_get_distinct_hashes() {
        let head = Head::new();
        let link = json!({"link": [{"rel": "preload", "href": "/a.js", "as": "script"}]});
        head.push(Input::from_json(link.clone()).unwrap());
        head.push(Input::from_json(link).unwrap());

        let tags = block_on(head.resolve_tags()).unwrap();
        assert_eq!(tags.len(), 2);
        let a = tags[0].hash.clone().unwrap();
        let b = tags[1].hash.clone().unwrap();
        assert_ne!(a, b);
        assert!(b.starts_with(&a));
    }

    struct Counter;

    impl HeadPlugin for Counter {
        fn key(&self) -> &str {
            "test:counter"
        }

        fn hooks(&self, _head: &Head) -> Hooks {
            Hooks::new().tags_resolve_sync(|ctx| {
                let n = ctx.tags.len().to_string();
                ctx.tags.push(crate::tag::HeadTag::new(crate::tag::TagName::Meta)
                    .with_prop("name", "count")
                    .with_prop("content", n));
                Ok(())
            })
        }
    }

    #[test]
    fn test_plugin_installs_once() {
        let head = Head::new();
        head.use_plugin(Counter);
        head.use_plugin(Counter);
        let tags = block_on(head.resolve_tags()).unwrap();
        assert_eq!(tags.iter().filter(|t| t.attr("name") == Some("count")).count(), 1);
    }
}
