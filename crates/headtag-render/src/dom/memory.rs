//! An in-memory [`Document`] for tests and headless reconciliation.

use indexmap::IndexMap;

use super::Document;
use crate::escape::{encode_attribute, encode_inner_html};

/// Handle to a node of a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryElement(usize);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    attrs: IndexMap<String, String>,
    text: Option<String>,
    /// Content set as inner HTML, serialized without escaping.
    raw: bool,
    children: Vec<usize>,
    parent: Option<usize>,
}

impl Node {
    fn new(name: &str) -> Self {
        Node {
            name: name.to_ascii_lowercase(),
            attrs: IndexMap::new(),
            text: None,
            raw: false,
            children: Vec::new(),
            parent: None,
        }
    }
}

/// A minimal element tree: `<html>` with `<head>` and `<body>`.
///
/// Nodes are never freed; removed elements stay valid handles that are no
/// longer connected.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<Node>,
    html: usize,
    head: usize,
    body: usize,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        MemoryDocument::new()
    }
}

impl MemoryDocument {
    /// Creates an empty document skeleton.
    pub fn new() -> Self {
        let mut doc = MemoryDocument {
            nodes: vec![Node::new("html")],
            html: 0,
            head: 0,
            body: 0,
        };
        let html = MemoryElement(0);
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.insert_before(&html, &head, None);
        doc.insert_before(&html, &body, None);
        doc.head = head.0;
        doc.body = body.0;
        doc
    }

    /// Appends a new element, for building pre-existing markup.
    pub fn append(
        &mut self,
        parent: MemoryElement,
        name: &str,
        attrs: &[(&str, &str)],
        text: Option<&str>,
    ) -> MemoryElement {
        let el = self.create_element(name);
        for (k, v) in attrs {
            self.set_attribute(&el, k, v);
        }
        if let Some(text) = text {
            self.set_text_content(&el, text);
        }
        self.insert_before(&parent, &el, None);
        el
    }

    fn node(&self, el: &MemoryElement) -> Option<&Node> {
        self.nodes.get(el.0)
    }

    fn node_mut(&mut self, el: &MemoryElement) -> Option<&mut Node> {
        self.nodes.get_mut(el.0)
    }

    fn detach(&mut self, id: usize) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.retain(|c| *c != id);
        }
    }

    /// Connected elements with this tag name, in document order.
    pub fn query_all(&self, name: &str) -> Vec<MemoryElement> {
        let mut out = Vec::new();
        self.walk(self.html, &mut |id, node| {
            if node.name.eq_ignore_ascii_case(name) {
                out.push(MemoryElement(id));
            }
        });
        out
    }

    fn walk(&self, id: usize, f: &mut dyn FnMut(usize, &Node)) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        f(id, node);
        for child in &node.children {
            self.walk(*child, f);
        }
    }

    /// Serializes an element and its subtree.
    pub fn outer_html(&self, el: MemoryElement) -> String {
        let mut out = String::new();
        self.write_node(el.0, &mut out);
        out
    }

    /// Serializes the whole document.
    pub fn to_html(&self) -> String {
        self.outer_html(MemoryElement(self.html))
    }

    fn write_node(&self, id: usize, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        out.push('<');
        out.push_str(&node.name);
        for (k, v) in &node.attrs {
            if v.is_empty() {
                out.push_str(&format!(" {}", k));
            } else {
                out.push_str(&format!(" {}=\"{}\"", k, encode_attribute(v)));
            }
        }
        out.push('>');
        if matches!(node.name.as_str(), "meta" | "link" | "base") {
            return;
        }
        match (&node.text, node.raw) {
            (Some(text), true) => out.push_str(text),
            (Some(text), false) => out.push_str(&encode_inner_html(text)),
            (None, _) => {}
        }
        for child in &node.children {
            self.write_node(*child, out);
        }
        out.push_str(&format!("</{}>", node.name));
    }
}

impl Document for MemoryDocument {
    type Element = MemoryElement;

    fn html_element(&self) -> MemoryElement {
        MemoryElement(self.html)
    }

    fn head_element(&self) -> MemoryElement {
        MemoryElement(self.head)
    }

    fn body_element(&self) -> MemoryElement {
        MemoryElement(self.body)
    }

    fn create_element(&mut self, name: &str) -> MemoryElement {
        self.nodes.push(Node::new(name));
        MemoryElement(self.nodes.len() - 1)
    }

    fn tag_name(&self, el: &MemoryElement) -> String {
        self.node(el).map(|n| n.name.clone()).unwrap_or_default()
    }

    fn attribute_names(&self, el: &MemoryElement) -> Vec<String> {
        self.node(el)
            .map(|n| n.attrs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn get_attribute(&self, el: &MemoryElement, name: &str) -> Option<String> {
        self.node(el)?.attrs.get(name).cloned()
    }

    fn set_attribute(&mut self, el: &MemoryElement, name: &str, value: &str) {
        if let Some(node) = self.node_mut(el) {
            node.attrs.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&mut self, el: &MemoryElement, name: &str) {
        if let Some(node) = self.node_mut(el) {
            node.attrs.shift_remove(name);
        }
    }

    fn text_content(&self, el: &MemoryElement) -> Option<String> {
        self.node(el)?.text.clone()
    }

    fn set_text_content(&mut self, el: &MemoryElement, text: &str) {
        if let Some(node) = self.node_mut(el) {
            node.text = Some(text.to_string());
            node.raw = false;
        }
    }

    fn set_inner_html(&mut self, el: &MemoryElement, html: &str) {
        if let Some(node) = self.node_mut(el) {
            node.text = Some(html.to_string());
            node.raw = true;
        }
    }

    fn children(&self, parent: &MemoryElement) -> Vec<MemoryElement> {
        self.node(parent)
            .map(|n| n.children.iter().copied().map(MemoryElement).collect())
            .unwrap_or_default()
    }

    fn insert_before(
        &mut self,
        parent: &MemoryElement,
        el: &MemoryElement,
        reference: Option<&MemoryElement>,
    ) {
        if parent.0 >= self.nodes.len() || el.0 >= self.nodes.len() {
            return;
        }
        self.detach(el.0);
        let siblings = &mut self.nodes[parent.0].children;
        let at = reference
            .and_then(|r| siblings.iter().position(|c| *c == r.0))
            .unwrap_or(siblings.len());
        siblings.insert(at, el.0);
        self.nodes[el.0].parent = Some(parent.0);
    }

    fn remove(&mut self, el: &MemoryElement) {
        self.detach(el.0);
    }

    fn is_connected(&self, el: &MemoryElement) -> bool {
        let mut current = el.0;
        loop {
            if current == self.html {
                return true;
            }
            match self.nodes.get(current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn element_by_id(&self, id: &str) -> Option<MemoryElement> {
        let mut found = None;
        self.walk(self.html, &mut |index, node| {
            if found.is_none() && node.attrs.get("id").map(String::as_str) == Some(id) {
                found = Some(MemoryElement(index));
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton() {
        let doc = MemoryDocument::new();
        assert_eq!(doc.to_html(), "<html><head></head><body></body></html>");
        assert!(doc.is_connected(&doc.head_element()));
    }

    #[test]
    fn test_insert_before_and_remove() {
        let mut doc = MemoryDocument::new();
        let head = doc.head_element();
        let a = doc.append(head, "meta", &[("name", "a")], None);
        let b = doc.create_element("title");
        doc.set_text_content(&b, "T & U");
        doc.insert_before(&head, &b, Some(&a));
        assert_eq!(doc.children(&head), vec![b, a]);
        assert_eq!(
            doc.outer_html(head),
            r#"<head><title>T &amp; U</title><meta name="a"></head>"#
        );

        doc.remove(&a);
        assert!(!doc.is_connected(&a));
        assert_eq!(doc.children(&head), vec![b]);
    }

    #[test]
    fn test_element_by_id_ignores_detached() {
        let mut doc = MemoryDocument::new();
        let body = doc.body_element();
        let el = doc.append(body, "script", &[("id", "data")], Some("{}"));
        assert_eq!(doc.element_by_id("data"), Some(el));
        doc.remove(&el);
        assert_eq!(doc.element_by_id("data"), None);
    }

    #[test]
    fn test_boolean_attribute_serializes_bare() {
        let mut doc = MemoryDocument::new();
        let head = doc.head_element();
        doc.append(head, "script", &[("src", "/a.js"), ("async", "")], None);
        assert_eq!(
            doc.outer_html(head),
            r#"<head><script src="/a.js" async></script></head>"#
        );
    }
}
