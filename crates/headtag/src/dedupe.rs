//! Deduplication.
//!
//! Each tag gets a dedupe key; tags sharing a key collapse into one. The
//! collision strategy comes from the tags themselves (`tagDuplicateStrategy`)
//! or, failing that, from [`TagName::default_strategy`].

use indexmap::IndexMap;
use tracing::trace;

use crate::head::Head;
use crate::hooks::Hooks;
use crate::plugin::HeadPlugin;
use crate::sort::tag_weight;
use crate::tag::{AttrValue, DuplicateStrategy, HeadTag, TagName};

const META_KEY_ATTRS: [&str; 3] = ["name", "property", "http-equiv"];

/// Computes the key that decides which tags collide.
///
/// Returns `None` for tags that are never deduplicated.
pub fn dedupe_key(tag: &HeadTag) -> Option<String> {
    let name = tag.tag;
    if name.is_unique() {
        return Some(name.as_str().to_string());
    }
    if name == TagName::Link && tag.attr("rel") == Some("canonical") {
        return Some("canonical".to_string());
    }
    if tag.has_attr("charset") {
        return Some("charset".to_string());
    }
    if name == TagName::Meta {
        if let Some(value) = META_KEY_ATTRS.iter().find_map(|a| tag.attr(a)) {
            return Some(format!("{}:{}", name, value));
        }
    }
    if let Some(key) = &tag.key {
        return Some(format!("{}:key:{}", name, key));
    }
    if let Some(id) = tag.attr("id") {
        return Some(format!("{}:id:{}", name, id));
    }
    if name.has_inner_content() {
        if let Some(content) = tag.content().filter(|c| !c.is_empty()) {
            return Some(format!("{}:content:{}", name, content));
        }
    }
    None
}

fn collision_strategy(existing: &HeadTag, incoming: &HeadTag) -> DuplicateStrategy {
    use DuplicateStrategy::*;
    match (existing.duplicate_strategy, incoming.duplicate_strategy) {
        (Some(Merge), _) | (_, Some(Merge)) => Merge,
        (Some(Replace), _) | (_, Some(Replace)) => Replace,
        _ => incoming.tag.default_strategy(),
    }
}

fn join_class(existing: &str, incoming: &str) -> String {
    let mut tokens: Vec<&str> = existing.split_whitespace().collect();
    for token in incoming.split_whitespace() {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.join(" ")
}

fn join_style(existing: &str, incoming: &str) -> String {
    let existing = existing.trim().trim_end_matches(';');
    let incoming = incoming.trim();
    match (existing.is_empty(), incoming.is_empty()) {
        (true, _) => incoming.to_string(),
        (_, true) => existing.to_string(),
        _ => format!("{}; {}", existing, incoming),
    }
}

/// Merges `incoming` into `existing`, which keeps its position.
fn merge_into(existing: &mut HeadTag, incoming: HeadTag) {
    for (name, value) in incoming.props {
        if value.is_null() {
            existing.props.shift_remove(&name);
            continue;
        }
        let joined = match (name.as_str(), existing.props.get(&name), &value) {
            ("class", Some(AttrValue::String(a)), AttrValue::String(b)) => Some(join_class(a, b)),
            ("style", Some(AttrValue::String(a)), AttrValue::String(b)) => Some(join_style(a, b)),
            _ => None,
        };
        existing
            .props
            .insert(name, joined.map(AttrValue::String).unwrap_or(value));
    }
    if incoming.text_content.is_some() {
        existing.text_content = incoming.text_content;
        existing.inner_html = None;
    }
    if incoming.inner_html.is_some() {
        existing.inner_html = incoming.inner_html;
        existing.text_content = None;
    }
    if incoming.tag_priority.is_some() {
        existing.tag_priority = incoming.tag_priority;
    }
    if incoming.tag_position.is_some() {
        existing.tag_position = incoming.tag_position;
    }
    if incoming.process_template_params.is_some() {
        existing.process_template_params = incoming.process_template_params;
    }
    existing.duplicate_strategy = existing.duplicate_strategy.or(incoming.duplicate_strategy);
    existing.entry_id = incoming.entry_id;
    existing.mode = incoming.mode;
}

/// Collapses colliding tags.
///
/// Tags are considered in registration order. With replace, the later tag
/// wins unless the earlier one carries a strictly lower weight; the survivor
/// keeps its own position. With merge, attribute maps are shallow-merged
/// (later wins, `null` deletes) and the earlier position is kept. `null`
/// attributes are stripped from every surviving tag.
pub fn dedupe_tags(mut tags: Vec<HeadTag>) -> Vec<HeadTag> {
    tags.sort_by_key(|t| t.order);

    let mut out: Vec<HeadTag> = Vec::with_capacity(tags.len());
    let mut seen: IndexMap<String, usize> = IndexMap::new();

    for mut tag in tags {
        tag.dedupe_key = dedupe_key(&tag);
        let Some(key) = tag.dedupe_key.clone() else {
            out.push(tag);
            continue;
        };
        let Some(&at) = seen.get(&key) else {
            seen.insert(key, out.len());
            out.push(tag);
            continue;
        };

        let existing = &mut out[at];
        match collision_strategy(existing, &tag) {
            DuplicateStrategy::Replace => {
                if tag_weight(existing) < tag_weight(&tag) {
                    trace!(key = %key, "kept stronger earlier tag");
                } else {
                    trace!(key = %key, "replaced tag");
                    *existing = tag;
                }
            }
            DuplicateStrategy::Merge => {
                trace!(key = %key, "merged tag");
                merge_into(existing, tag);
            }
        }
    }

    for tag in &mut out {
        tag.props.retain(|_, v| !v.is_null());
    }
    out
}

/// Installs [`dedupe_tags`] on `tags:resolve`.
pub struct DedupePlugin;

impl HeadPlugin for DedupePlugin {
    fn key(&self) -> &str {
        "headtag:dedupe"
    }

    fn hooks(&self, _head: &Head) -> Hooks {
        Hooks::new().tags_resolve_sync(|ctx| {
            ctx.tags = dedupe_tags(std::mem::take(&mut ctx.tags));
            Ok(())
        })
    }
}
