//! Markup escaping and attribute serialization.

use headtag::{AttrValue, Props};

/// Escapes text content: `&`, `<`, `>`, `"`, `'` and `/`.
pub fn encode_inner_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes a double-quoted attribute value.
pub fn encode_attribute(value: &str) -> String {
    value.replace('"', "&quot;")
}

/// Serializes attributes in insertion order, each with a leading space.
///
/// `true` renders as a bare name; `false` and `null` are omitted.
pub fn props_to_string(props: &Props) -> String {
    let mut out = String::new();
    for (name, value) in props {
        match value {
            AttrValue::String(s) => {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&encode_attribute(s));
                out.push('"');
            }
            AttrValue::Bool(true) => {
                out.push(' ');
                out.push_str(name);
            }
            AttrValue::Bool(false) | AttrValue::Null => {}
        }
    }
    out
}
