//! Types shared between the engine and its render targets.

use serde::Serialize;

/// Server-rendered markup, ready to interpolate into a document skeleton.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SsrHead {
    /// Tags for the `head` bucket.
    pub head_tags: String,
    /// Tags placed right after `<body>`.
    pub body_tags_open: String,
    /// Tags placed right before `</body>`.
    pub body_tags: String,
    /// Attribute fragment for `<html>`, with a leading space when non-empty.
    pub html_attrs: String,
    /// Attribute fragment for `<body>`, with a leading space when non-empty.
    pub body_attrs: String,
}

/// What the DOM reconciler did with a tag's element during one patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomRenderStatus {
    /// A new element was created and inserted.
    Created,
    /// An existing element was left in place.
    Kept,
    /// The element was removed.
    Removed,
}
