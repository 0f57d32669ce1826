//! The safe registration path.
//!
//! [`whitelist_safe_input`] keeps only fields that cannot inject script:
//! attribute whitelists per tag, no event handlers, no script bodies other
//! than JSON, no `javascript:`/`data:` links. Anything else is dropped
//! silently.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::input::ResolvedInput;

static WHITELIST: Lazy<FxHashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut m: FxHashMap<&'static str, &'static [&'static str]> = FxHashMap::default();
    m.insert("htmlAttrs", &["id", "class", "lang", "dir"]);
    m.insert("bodyAttrs", &["id", "class"]);
    m.insert("meta", &["id", "name", "property", "charset", "content"]);
    m.insert("noscript", &["id", "textContent"]);
    m.insert("script", &["id", "type", "textContent"]);
    m.insert(
        "link",
        &[
            "id",
            "color",
            "crossorigin",
            "fetchpriority",
            "href",
            "hreflang",
            "imagesrcset",
            "imagesizes",
            "integrity",
            "media",
            "referrerpolicy",
            "rel",
            "sizes",
            "type",
        ],
    );
    m
});

const BLOCKED_REL: [&str; 6] = [
    "stylesheet",
    "canonical",
    "modulepreload",
    "prerender",
    "preload",
    "prefetch",
];

fn allowed(field: &str) -> &'static [&'static str] {
    WHITELIST.get(field).copied().unwrap_or(&[])
}

fn present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn is_data_attr(name: &str) -> bool {
    name.starts_with("data-")
}

/// Copies whitelisted attributes (in whitelist order), then `data-*` ones.
fn pick(field: &str, source: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for name in allowed(field) {
        if let Some(value) = source.get(*name).filter(|v| present(v)) {
            out.insert(name.to_string(), value.clone());
        }
    }
    for (name, value) in source {
        if is_data_attr(name) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

fn as_items(value: &Value) -> Vec<&Map<String, Value>> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(map) => vec![map],
        _ => Vec::new(),
    }
}

fn safe_meta(meta: &Map<String, Value>) -> Option<Map<String, Value>> {
    if meta.contains_key("http-equiv") {
        return None;
    }
    Some(pick("meta", meta)).filter(|m| !m.is_empty())
}

fn unsafe_url(href: &str) -> bool {
    let href = href.trim().to_ascii_lowercase();
    href.contains("javascript:") || href.contains("data:")
}

fn safe_link(link: &Map<String, Value>) -> Option<Map<String, Value>> {
    let mut out = Map::new();
    for name in allowed("link") {
        let Some(value) = link.get(*name).filter(|v| present(v)) else {
            continue;
        };
        match (*name, value.as_str()) {
            ("rel", Some(rel)) if BLOCKED_REL.contains(&rel.to_ascii_lowercase().as_str()) => continue,
            ("href", Some(href)) if unsafe_url(href) => continue,
            ("href", None) => continue,
            _ => {}
        }
        out.insert(name.to_string(), value.clone());
    }
    for (name, value) in link {
        if is_data_attr(name) {
            out.insert(name.clone(), value.clone());
        }
    }
    (out.len() > 1 && out.contains_key("rel")).then_some(out)
}

fn safe_script(script: &Map<String, Value>) -> Option<Map<String, Value>> {
    let json_type = script
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t.contains("json"));
    if !json_type {
        return None;
    }
    let body = match script.get("textContent")? {
        Value::String(s) => serde_json::from_str::<Value>(s).ok()?,
        other @ (Value::Object(_) | Value::Array(_)) => other.clone(),
        _ => return None,
    };
    let mut out = pick("script", script);
    out.insert("textContent".to_string(), Value::String(body.to_string()));
    Some(out)
}

fn safe_noscript(noscript: &Map<String, Value>) -> Option<Map<String, Value>> {
    Some(pick("noscript", noscript)).filter(|m| !m.is_empty())
}

fn filter_items(
    value: &Value,
    f: fn(&Map<String, Value>) -> Option<Map<String, Value>>,
) -> Value {
    Value::Array(as_items(value).into_iter().filter_map(f).map(Value::Object).collect())
}

/// Strips every field capable of script injection from a resolved input.
pub fn whitelist_safe_input(input: ResolvedInput) -> ResolvedInput {
    let mut out = ResolvedInput::new();
    for (field, value) in input {
        if !present(&value) {
            continue;
        }
        let filtered = match field.as_str() {
            "title" | "titleTemplate" | "templateParams" => value,
            "htmlAttrs" | "bodyAttrs" => match value.as_object() {
                Some(attrs) => Value::Object(pick(&field, attrs)),
                None => continue,
            },
            "meta" => filter_items(&value, safe_meta),
            "link" => filter_items(&value, safe_link),
            "script" => filter_items(&value, safe_script),
            "noscript" => filter_items(&value, safe_noscript),
            _ => continue,
        };
        out.insert(field, filtered);
    }
    out
}
