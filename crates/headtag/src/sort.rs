//! Priority ordering.
//!
//! Tags sort by weight (lower first), ties broken by owning entry then
//! position. Relative priorities (`before:<key>` / `after:<key>`) are spliced
//! in afterwards, next to their target; an unresolvable reference falls back
//! to the tag's base weight.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::head::Head;
use crate::hooks::Hooks;
use crate::plugin::HeadPlugin;
use crate::tag::{HeadTag, TagName, TagPriority};

/// Weight of a tag no rule classifies.
pub const DEFAULT_WEIGHT: i32 = 100;

/// An attribute-conditioned weight rule.
struct WeightRule {
    tag: TagName,
    attr: &'static str,
    /// Required value (ASCII case-insensitive); `None` matches presence.
    value: Option<&'static str>,
    weight: i32,
}

static WEIGHT_RULES: Lazy<Vec<WeightRule>> = Lazy::new(|| {
    vec![
        WeightRule {
            tag: TagName::Meta,
            attr: "charset",
            value: None,
            weight: -20,
        },
        WeightRule {
            tag: TagName::Meta,
            attr: "http-equiv",
            value: Some("content-security-policy"),
            weight: 0,
        },
        WeightRule {
            tag: TagName::Meta,
            attr: "name",
            value: Some("viewport"),
            weight: 5,
        },
        WeightRule {
            tag: TagName::Link,
            attr: "rel",
            value: Some("preconnect"),
            weight: 20,
        },
    ]
});

static TAG_WEIGHTS: Lazy<FxHashMap<TagName, i32>> =
    Lazy::new(|| [(TagName::Base, -10), (TagName::Title, 10)].into_iter().collect());

static PRIORITY_OFFSETS: Lazy<FxHashMap<&'static str, i32>> =
    Lazy::new(|| [("critical", -80), ("high", -10), ("low", 20)].into_iter().collect());

/// Weight from the tag name and attributes alone.
pub fn base_weight(tag: &HeadTag) -> i32 {
    WEIGHT_RULES
        .iter()
        .find(|rule| {
            rule.tag == tag.tag
                && match rule.value {
                    None => tag.has_attr(rule.attr),
                    Some(expected) => tag
                        .attr(rule.attr)
                        .is_some_and(|v| v.eq_ignore_ascii_case(expected)),
                }
        })
        .map(|rule| rule.weight)
        .or_else(|| TAG_WEIGHTS.get(&tag.tag).copied())
        .unwrap_or(DEFAULT_WEIGHT)
}

/// Effective sort weight; relative priorities use the base weight.
pub fn tag_weight(tag: &HeadTag) -> i32 {
    let base = base_weight(tag);
    match &tag.tag_priority {
        Some(TagPriority::Weight(n)) => *n,
        Some(p @ (TagPriority::Critical | TagPriority::High | TagPriority::Low)) => {
            base + PRIORITY_OFFSETS.get(p.to_string().as_str()).copied().unwrap_or(0)
        }
        _ => base,
    }
}

fn sort_key(tag: &HeadTag) -> (i32, crate::tag::TagOrder) {
    (tag_weight(tag), tag.order)
}

/// Returns true if `reference` names `tag`, either by dedupe key or by the
/// `<tagname>:<key>` shorthand.
pub fn matches_reference(tag: &HeadTag, reference: &str) -> bool {
    if tag.dedupe_key.as_deref() == Some(reference) {
        return true;
    }
    match (reference.split_once(':'), &tag.key) {
        (Some((name, key)), Some(tag_key)) => name == tag.tag.as_str() && key == tag_key,
        _ => false,
    }
}

/// Inserts a tag at its weight position in an already sorted list.
pub fn insert_sorted(tags: &mut Vec<HeadTag>, tag: HeadTag) {
    let key = sort_key(&tag);
    let at = tags
        .iter()
        .position(|t| !t.tag_priority.as_ref().is_some_and(TagPriority::is_relative) && sort_key(t) > key)
        .unwrap_or(tags.len());
    tags.insert(at, tag);
}

/// Orders tags by weight, then splices relative tags next to their targets.
pub fn sort_tags(mut tags: Vec<HeadTag>) -> Vec<HeadTag> {
    tags.sort_by_key(sort_key);

    let (mut pending, placed): (Vec<HeadTag>, Vec<HeadTag>) = tags
        .into_iter()
        .partition(|t| t.tag_priority.as_ref().is_some_and(TagPriority::is_relative));
    if pending.is_empty() {
        return placed;
    }

    // Each placed tag remembers which `after:` anchor put it there, so several
    // tags after one target keep their own relative order.
    let mut placed: Vec<(HeadTag, Option<String>)> = placed.into_iter().map(|t| (t, None)).collect();

    loop {
        let mut progressed = false;
        let mut unresolved = Vec::new();
        for tag in pending {
            let Some((before, reference)) = tag
                .tag_priority
                .as_ref()
                .and_then(TagPriority::relative_target)
                .map(|(b, r)| (b, r.to_string()))
            else {
                unresolved.push(tag);
                continue;
            };
            let target = placed
                .iter()
                .position(|(t, _)| matches_reference(t, &reference));
            match target {
                Some(i) if before => {
                    placed.insert(i, (tag, None));
                    progressed = true;
                }
                Some(i) => {
                    let mut at = i + 1;
                    while at < placed.len() && placed[at].1.as_deref() == Some(reference.as_str()) {
                        at += 1;
                    }
                    placed.insert(at, (tag, Some(reference)));
                    progressed = true;
                }
                None => unresolved.push(tag),
            }
        }
        pending = unresolved;
        if pending.is_empty() || !progressed {
            break;
        }
    }

    let mut sorted: Vec<HeadTag> = placed.into_iter().map(|(t, _)| t).collect();
    for tag in pending {
        tracing::debug!(
            priority = %tag.tag_priority.as_ref().map(ToString::to_string).unwrap_or_default(),
            "relative priority target missing, using base weight"
        );
        insert_sorted(&mut sorted, tag);
    }
    sorted
}

/// Installs [`sort_tags`] on `tags:resolve`.
pub struct SortPlugin;

impl HeadPlugin for SortPlugin {
    fn key(&self) -> &str {
        "headtag:sort"
    }

    fn hooks(&self, _head: &Head) -> Hooks {
        Hooks::new().tags_resolve_sync(|ctx| {
            ctx.tags = sort_tags(std::mem::take(&mut ctx.tags));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::dedupe_key;
    use proptest::prelude::*;

    fn tag(name: TagName, entry: usize, index: usize) -> HeadTag {
        let mut t = HeadTag::new(name).owned_by(entry, index);
        t.dedupe_key = dedupe_key(&t);
        t
    }

    fn keyed(name: TagName, key: &str, entry: usize, index: usize) -> HeadTag {
        let mut t = HeadTag::new(name).with_key(key).owned_by(entry, index);
        t.dedupe_key = dedupe_key(&t);
        t
    }

    fn labels(tags: &[HeadTag]) -> Vec<String> {
        tags.iter()
            .map(|t| t.key.clone().unwrap_or_else(|| t.tag.to_string()))
            .collect()
    }

    #[test]
    fn test_weight_table() {
        let charset = HeadTag::new(TagName::Meta).with_prop("charset", "utf-8");
        let csp = HeadTag::new(TagName::Meta).with_prop("http-equiv", "Content-Security-Policy");
        let viewport = HeadTag::new(TagName::Meta).with_prop("name", "viewport");
        let preconnect = HeadTag::new(TagName::Link).with_prop("rel", "preconnect");
        assert_eq!(tag_weight(&charset), -20);
        assert_eq!(tag_weight(&HeadTag::new(TagName::Base)), -10);
        assert_eq!(tag_weight(&csp), 0);
        assert_eq!(tag_weight(&viewport), 5);
        assert_eq!(tag_weight(&HeadTag::new(TagName::Title)), 10);
        assert_eq!(tag_weight(&preconnect), 20);
        assert_eq!(tag_weight(&HeadTag::new(TagName::Script)), DEFAULT_WEIGHT);
    }

    #[test]
    fn test_category_offsets() {
        let script = HeadTag::new(TagName::Script);
        assert_eq!(tag_weight(&script.clone().with_priority(TagPriority::Critical)), 20);
        assert_eq!(tag_weight(&script.clone().with_priority(TagPriority::High)), 90);
        assert_eq!(tag_weight(&script.clone().with_priority(TagPriority::Low)), 120);
        assert_eq!(tag_weight(&script.with_priority(TagPriority::Weight(-3))), -3);
    }

    #[test]
    fn test_critical_precedes_earlier_default() {
        let meta = tag(TagName::Meta, 0, 0);
        let script = tag(TagName::Script, 1, 0).with_priority(TagPriority::Critical);
        let sorted = sort_tags(vec![meta, script]);
        assert_eq!(sorted[0].tag, TagName::Script);
    }

    #[test]
    fn test_before_target_registered_later() {
        let a = keyed(TagName::Script, "a", 0, 0)
            .with_priority(TagPriority::Before("script:key:b".into()));
        let x = keyed(TagName::Script, "x", 1, 0);
        let b = keyed(TagName::Script, "b", 2, 0);
        let sorted = sort_tags(vec![a, x, b]);
        assert_eq!(labels(&sorted), vec!["x", "a", "b"]);
    }

    #[test]
    fn test_after_with_shorthand_and_multiple_anchored() {
        let first = keyed(TagName::Script, "first", 0, 0)
            .with_priority(TagPriority::After("script:target".into()));
        let second = keyed(TagName::Script, "second", 0, 1)
            .with_priority(TagPriority::After("script:target".into()));
        let target = keyed(TagName::Script, "target", 1, 0);
        let tail = keyed(TagName::Script, "tail", 1, 1);
        let sorted = sort_tags(vec![first, second, target, tail]);
        assert_eq!(labels(&sorted), vec!["target", "first", "second", "tail"]);
    }

    #[test]
    fn test_chained_relative_references() {
        let c = keyed(TagName::Script, "c", 0, 0)
            .with_priority(TagPriority::After("script:key:b".into()));
        let b = keyed(TagName::Script, "b", 0, 1)
            .with_priority(TagPriority::After("script:key:a".into()));
        let a = keyed(TagName::Script, "a", 0, 2);
        let sorted = sort_tags(vec![c, b, a]);
        assert_eq!(labels(&sorted), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_target_falls_back_to_weight() {
        let title = tag(TagName::Title, 0, 0);
        let orphan = keyed(TagName::Script, "o", 0, 1)
            .with_priority(TagPriority::Before("script:key:missing".into()));
        let base = tag(TagName::Base, 1, 0);
        let sorted = sort_tags(vec![orphan, title, base]);
        assert_eq!(labels(&sorted), vec!["base", "title", "o"]);
    }

    #[test]
    fn test_title_reference_by_name() {
        let title = tag(TagName::Title, 1, 0);
        let meta = HeadTag::new(TagName::Meta)
            .with_prop("name", "x")
            .with_priority(TagPriority::Before("title".into()))
            .owned_by(0, 0);
        let sorted = sort_tags(vec![title, meta]);
        assert_eq!(sorted[0].tag, TagName::Meta);
    }

    proptest! {
        #[test]
        fn prop_sort_is_order_insensitive(weights in prop::collection::vec(-50i32..150, 1..12), seed in any::<u64>()) {
            let tags: Vec<HeadTag> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| tag(TagName::Script, i / 3, i % 3).with_priority(TagPriority::Weight(*w)))
                .collect();
            let mut shuffled = tags.clone();
            // deterministic rotation by seed
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            prop_assert_eq!(sort_tags(tags), sort_tags(shuffled));
        }

        #[test]
        fn prop_sorted_weights_are_monotonic(weights in prop::collection::vec(-50i32..150, 0..12)) {
            let tags: Vec<HeadTag> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| tag(TagName::Meta, 0, i).with_priority(TagPriority::Weight(*w)))
                .collect();
            let sorted = sort_tags(tags);
            prop_assert!(sorted.windows(2).all(|w| sort_key(&w[0]) <= sort_key(&w[1])));
        }
    }
}
