//! The tag model.
//!
//! A [`HeadTag`] is one atomic renderable unit: a single `<meta>`, the
//! `<title>`, or one of the two attribute bags (`htmlAttrs`, `bodyAttrs`)
//! that describe attributes of the `<html>` and `<body>` elements.
//!
//! Tags are produced by normalization, then flow through the hook pipeline
//! (dedupe, sort, template params, title template, hashing) before a render
//! target consumes them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// Name of a tag, including the pseudo-tags that never render as elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagName {
    Title,
    /// Pseudo-tag consumed by title template expansion.
    TitleTemplate,
    Base,
    Meta,
    Link,
    Script,
    Style,
    Noscript,
    /// Attribute bag applied to the `<html>` element.
    HtmlAttrs,
    /// Attribute bag applied to the `<body>` element.
    BodyAttrs,
}

impl TagName {
    /// Every tag name, in input field order.
    pub const ALL: [TagName; 10] = [
        TagName::Title,
        TagName::TitleTemplate,
        TagName::Base,
        TagName::Meta,
        TagName::Link,
        TagName::Script,
        TagName::Style,
        TagName::Noscript,
        TagName::HtmlAttrs,
        TagName::BodyAttrs,
    ];

    /// Returns the name as used in input fields and dedupe keys.
    pub fn as_str(self) -> &'static str {
        match self {
            TagName::Title => "title",
            TagName::TitleTemplate => "titleTemplate",
            TagName::Base => "base",
            TagName::Meta => "meta",
            TagName::Link => "link",
            TagName::Script => "script",
            TagName::Style => "style",
            TagName::Noscript => "noscript",
            TagName::HtmlAttrs => "htmlAttrs",
            TagName::BodyAttrs => "bodyAttrs",
        }
    }

    /// Maps an input field name to the tag it produces.
    pub fn from_field(field: &str) -> Option<Self> {
        TagName::ALL.into_iter().find(|t| t.as_str() == field)
    }

    /// Tags of which a document holds at most one.
    pub fn is_unique(self) -> bool {
        matches!(
            self,
            TagName::Title
                | TagName::TitleTemplate
                | TagName::Base
                | TagName::HtmlAttrs
                | TagName::BodyAttrs
        )
    }

    /// Void elements: rendered without a closing tag.
    pub fn is_self_closing(self) -> bool {
        matches!(self, TagName::Meta | TagName::Link | TagName::Base)
    }

    /// Tags whose inner content (text or HTML) is meaningful.
    pub fn has_inner_content(self) -> bool {
        matches!(
            self,
            TagName::Title
                | TagName::TitleTemplate
                | TagName::Script
                | TagName::Style
                | TagName::Noscript
        )
    }

    /// `htmlAttrs` and `bodyAttrs`.
    pub fn is_attribute_bag(self) -> bool {
        matches!(self, TagName::HtmlAttrs | TagName::BodyAttrs)
    }

    /// Whether a string value given in place of an object is inner HTML
    /// (as opposed to text content).
    pub fn takes_raw_content(self) -> bool {
        matches!(self, TagName::Script | TagName::Style | TagName::Noscript)
    }

    /// Collision strategy used when neither colliding tag names one.
    ///
    /// Attribute bags merge so independent call sites can each contribute a
    /// class or a `lang`; every other tag is replaced wholesale.
    pub fn default_strategy(self) -> DuplicateStrategy {
        match self {
            TagName::HtmlAttrs | TagName::BodyAttrs => DuplicateStrategy::Merge,
            _ => DuplicateStrategy::Replace,
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized attribute value.
///
/// `Null` only survives until deduplication, where it deletes the key from a
/// merged attribute map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    String(String),
    Bool(bool),
    Null,
}

impl AttrValue {
    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for the deletion marker.
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// The value as a live DOM attribute would hold it, or `None` when the
    /// attribute must be absent.
    pub fn to_dom_value(&self) -> Option<String> {
        match self {
            AttrValue::String(s) => Some(s.clone()),
            AttrValue::Bool(true) => Some(String::new()),
            AttrValue::Bool(false) | AttrValue::Null => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// Insertion-ordered attribute map.
pub type Props = IndexMap<String, AttrValue>;

/// Sort priority of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagPriority {
    /// Explicit numeric weight; lower renders earlier.
    Weight(i32),
    Critical,
    High,
    Low,
    /// Render immediately before the tag with this dedupe key.
    Before(String),
    /// Render immediately after the tag with this dedupe key.
    After(String),
}

impl TagPriority {
    /// Reads a priority from an input value (number or string).
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .map(|n| TagPriority::Weight(n.clamp(i32::MIN as i64, i32::MAX as i64) as i32)),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the anchor key and whether the tag goes before it.
    pub fn relative_target(&self) -> Option<(bool, &str)> {
        match self {
            TagPriority::Before(key) => Some((true, key)),
            TagPriority::After(key) => Some((false, key)),
            _ => None,
        }
    }

    /// Returns true for `before:`/`after:` priorities.
    pub fn is_relative(&self) -> bool {
        self.relative_target().is_some()
    }
}

impl FromStr for TagPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(TagPriority::Critical),
            "high" => Ok(TagPriority::High),
            "low" => Ok(TagPriority::Low),
            _ => {
                if let Some(key) = s.strip_prefix("before:") {
                    Ok(TagPriority::Before(key.to_string()))
                } else if let Some(key) = s.strip_prefix("after:") {
                    Ok(TagPriority::After(key.to_string()))
                } else {
                    s.trim()
                        .parse::<i32>()
                        .map(TagPriority::Weight)
                        .map_err(|_| format!("unknown tag priority '{}'", s))
                }
            }
        }
    }
}

impl fmt::Display for TagPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagPriority::Weight(n) => write!(f, "{}", n),
            TagPriority::Critical => f.write_str("critical"),
            TagPriority::High => f.write_str("high"),
            TagPriority::Low => f.write_str("low"),
            TagPriority::Before(key) => write!(f, "before:{}", key),
            TagPriority::After(key) => write!(f, "after:{}", key),
        }
    }
}

/// Render bucket: which output section a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagPosition {
    #[default]
    Head,
    BodyOpen,
    BodyClose,
}

impl TagPosition {
    /// All buckets in document order.
    pub const ALL: [TagPosition; 3] = [
        TagPosition::Head,
        TagPosition::BodyOpen,
        TagPosition::BodyClose,
    ];

    /// Parses the input spelling (`head`, `bodyOpen`, `bodyClose`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "head" => Some(TagPosition::Head),
            "bodyOpen" => Some(TagPosition::BodyOpen),
            "bodyClose" => Some(TagPosition::BodyClose),
            _ => None,
        }
    }
}

/// What happens when two tags share a dedupe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicateStrategy {
    /// The later tag replaces the earlier one.
    Replace,
    /// Attribute maps are shallow-merged, later values winning.
    Merge,
}

impl DuplicateStrategy {
    /// Parses the input spelling (`replace`, `merge`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "replace" => Some(DuplicateStrategy::Replace),
            "merge" => Some(DuplicateStrategy::Merge),
            _ => None,
        }
    }
}

/// Where an entry's tags are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Server,
    Client,
}

impl FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(RuntimeMode::Server),
            "client" => Ok(RuntimeMode::Client),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Deterministic tie-break position of a tag.
///
/// Orders first by owning entry registration order, then by position within
/// the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TagOrder {
    /// Identity of the entry the position was assigned in.
    pub entry: usize,
    /// Index within that entry, shared across all of its fields.
    pub index: usize,
}

impl TagOrder {
    pub fn new(entry: usize, index: usize) -> Self {
        TagOrder { entry, index }
    }
}

/// One atomic renderable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadTag {
    pub tag: TagName,
    pub props: Props,
    /// Escaped on render.
    pub text_content: Option<String>,
    /// Emitted verbatim on render.
    pub inner_html: Option<String>,
    pub tag_priority: Option<TagPriority>,
    pub tag_position: Option<TagPosition>,
    /// Explicit dedupe key.
    pub key: Option<String>,
    pub duplicate_strategy: Option<DuplicateStrategy>,
    /// `Some(false)` opts out of interpolation, `Some(true)` opts inner
    /// content in.
    pub process_template_params: Option<bool>,
    pub mode: Option<RuntimeMode>,
    /// Identity of the owning entry.
    pub entry_id: usize,
    pub order: TagOrder,
    pub dedupe_key: Option<String>,
    /// Correlates the tag with a live element across renders.
    pub hash: Option<String>,
}

impl HeadTag {
    /// Creates an empty tag owned by entry 0.
    pub fn new(tag: TagName) -> Self {
        HeadTag {
            tag,
            props: Props::new(),
            text_content: None,
            inner_html: None,
            tag_priority: None,
            tag_position: None,
            key: None,
            duplicate_strategy: None,
            process_template_params: None,
            mode: None,
            entry_id: 0,
            order: TagOrder::default(),
            dedupe_key: None,
            hash: None,
        }
    }

    /// Sets an attribute.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Sets the text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Sets the raw inner HTML.
    pub fn with_inner_html(mut self, html: impl Into<String>) -> Self {
        self.inner_html = Some(html.into());
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: TagPriority) -> Self {
        self.tag_priority = Some(priority);
        self
    }

    /// Sets the explicit key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets owner and position.
    pub fn owned_by(mut self, entry_id: usize, index: usize) -> Self {
        self.entry_id = entry_id;
        self.order = TagOrder::new(entry_id, index);
        self
    }

    /// Returns a string attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(AttrValue::as_str)
    }

    /// Returns true if the attribute is present with a non-null value.
    pub fn has_attr(&self, name: &str) -> bool {
        self.props.get(name).is_some_and(|v| !v.is_null())
    }

    /// Text content, falling back to inner HTML.
    pub fn content(&self) -> Option<&str> {
        self.text_content.as_deref().or(self.inner_html.as_deref())
    }

    /// The render bucket, defaulting to `head`.
    pub fn position(&self) -> TagPosition {
        self.tag_position.unwrap_or_default()
    }

    /// Computes the correlation hash from tag name, sorted attributes,
    /// content and key.
    ///
    /// Owner and position are excluded, so an identical tag contributed by a
    /// different entry reuses the same live element.
    pub fn compute_hash(&self) -> String {
        let mut hasher = FxHasher::default();
        self.tag.as_str().hash(&mut hasher);
        let mut props: Vec<(&String, &AttrValue)> = self
            .props
            .iter()
            .filter(|(_, v)| !v.is_null())
            .collect();
        props.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in props {
            name.hash(&mut hasher);
            match value {
                AttrValue::String(s) => s.hash(&mut hasher),
                AttrValue::Bool(b) => b.hash(&mut hasher),
                AttrValue::Null => {}
            }
        }
        self.text_content.hash(&mut hasher);
        self.inner_html.hash(&mut hasher);
        self.key.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}
