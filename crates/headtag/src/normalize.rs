//! Expands entries into flat tag records.
//!
//! Every field of an entry resolves concurrently; array fields resolve per
//! element. A rejected deferred value drops only the smallest enclosing tag
//! (one array element, or the whole field for object-valued fields). Emission
//! order follows field and element order, never completion order.

use futures::future;
use serde_json::Value;
use tracing::debug;

use crate::entry::HeadEntry;
use crate::input::{Input, InputValue, ResolvedInput};
use crate::tag::{
    AttrValue, DuplicateStrategy, HeadTag, RuntimeMode, TagName, TagOrder, TagPosition,
    TagPriority,
};

/// An entry's resolved input and the tags it expands to.
#[derive(Debug, Default)]
pub struct NormalizedEntry {
    pub resolved_input: ResolvedInput,
    pub tags: Vec<HeadTag>,
}

/// Resolves an entry's input, applies its transform and expands it.
pub async fn normalize_entry(entry: &HeadEntry) -> NormalizedEntry {
    let mut resolved = resolve_input(entry.id, &entry.input).await;
    if let Some(transform) = &entry.transform {
        resolved = transform(resolved).await;
    }
    let tags = expand_input(&resolved, entry.id, entry.mode);
    NormalizedEntry {
        resolved_input: resolved,
        tags,
    }
}

/// Resolves every deferred leaf of an input, dropping rejected values.
pub async fn resolve_input(entry_id: usize, input: &Input) -> ResolvedInput {
    let fields = future::join_all(
        input
            .iter()
            .map(|(field, value)| resolve_field(entry_id, field, value)),
    )
    .await;

    input
        .iter()
        .zip(fields)
        .filter_map(|((field, _), value)| value.map(|v| (field.clone(), v)))
        .collect()
}

async fn resolve_field(entry_id: usize, field: &str, value: &InputValue) -> Option<Value> {
    match value {
        InputValue::Array(items) => {
            let results = future::join_all(items.iter().map(InputValue::resolve)).await;
            let values = results
                .into_iter()
                .filter_map(|r| match r {
                    Ok(v) => Some(v),
                    Err(err) => {
                        debug!(entry = entry_id, field, %err, "dropping rejected element");
                        None
                    }
                })
                .collect();
            Some(Value::Array(values))
        }
        other => match other.resolve().await {
            Ok(v) => Some(v),
            Err(err) => {
                debug!(entry = entry_id, field, %err, "dropping rejected field");
                None
            }
        },
    }
}

/// Expands a resolved input into tags owned by `entry_id`.
///
/// Position indices come from one counter shared by all fields of the entry.
pub fn expand_input(
    input: &ResolvedInput,
    entry_id: usize,
    mode: Option<RuntimeMode>,
) -> Vec<HeadTag> {
    let mut tags = Vec::new();
    let mut index = 0;

    for (field, value) in input {
        let Some(name) = TagName::from_field(field) else {
            if field != "templateParams" {
                debug!(entry = entry_id, field = %field, "skipping unknown field");
            }
            continue;
        };

        let values: Vec<&Value> = match value {
            Value::Array(items) if !name.is_unique() => items.iter().collect(),
            other => vec![other],
        };

        for value in values {
            if let Some(mut tag) = normalize_tag(name, value) {
                tag.entry_id = entry_id;
                tag.order = TagOrder::new(entry_id, index);
                tag.mode = mode;
                tag.hash = Some(tag.compute_hash());
                tags.push(tag);
            }
            index += 1;
        }
    }
    tags
}

/// Builds one tag from a field value.
pub fn normalize_tag(name: TagName, value: &Value) -> Option<HeadTag> {
    let mut tag = HeadTag::new(name);
    match value {
        Value::Null if name == TagName::TitleTemplate => Some(tag),
        Value::Null | Value::Array(_) => None,
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            let text = scalar_string(value)?;
            if name.takes_raw_content() {
                tag.inner_html = Some(text);
            } else if name.has_inner_content() {
                tag.text_content = Some(text);
            } else {
                return None;
            }
            Some(tag)
        }
        Value::Object(map) => {
            for (key, v) in map {
                match key.as_str() {
                    "tagPriority" => tag.tag_priority = TagPriority::from_value(v),
                    "tagPosition" => tag.tag_position = v.as_str().and_then(TagPosition::parse),
                    "tagDuplicateStrategy" => {
                        tag.duplicate_strategy = v.as_str().and_then(DuplicateStrategy::parse)
                    }
                    "key" | "hid" | "vmid" => tag.key = scalar_string(v),
                    "processTemplateParams" => tag.process_template_params = v.as_bool(),
                    "textContent" => tag.text_content = content_string(v),
                    "innerHTML" | "children" => tag.inner_html = content_string(v),
                    _ => {
                        tag.props.insert(key.clone(), normalize_prop(key, v));
                    }
                }
            }
            Some(tag)
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn content_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Object(_) | Value::Array(_) => Some(value.to_string()),
        other => scalar_string(other),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Normalizes one attribute value.
pub fn normalize_prop(name: &str, value: &Value) -> AttrValue {
    match value {
        Value::Null => AttrValue::Null,
        Value::Bool(b) => AttrValue::Bool(*b),
        Value::Number(n) => AttrValue::String(n.to_string()),
        Value::String(s) => AttrValue::String(s.clone()),
        Value::Array(items) => {
            let parts = items
                .iter()
                .filter_map(scalar_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            match name {
                "class" => AttrValue::String(parts.collect::<Vec<_>>().join(" ")),
                "style" => AttrValue::String(
                    parts
                        .map(|s| s.trim_end_matches(';').to_string())
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
                _ => AttrValue::String(value.to_string()),
            }
        }
        Value::Object(map) => match name {
            "class" => AttrValue::String(
                map.iter()
                    .filter(|(_, v)| is_truthy(v))
                    .map(|(k, _)| k.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            "style" => AttrValue::String(
                map.iter()
                    .filter_map(|(k, v)| scalar_string(v).map(|v| format!("{}:{}", k, v)))
                    .collect::<Vec<_>>()
                    .join(";"),
            ),
            _ => AttrValue::String(value.to_string()),
        },
    }
}
