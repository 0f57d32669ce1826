//! Server-side rendering to markup strings.
//!
//! [`render_ssr_head`] resolves a [`Head`] and serializes the result into an
//! [`SsrHead`] record: one string per render bucket plus the `<html>` and
//! `<body>` attribute fragments. Client-mode tags are skipped.
//!
//! ```rust
//! use futures::executor::block_on;
//! use headtag::{Head, Input};
//! use headtag_render::render_ssr_head;
//! use serde_json::json;
//!
//! let head = Head::server();
//! head.push(Input::from_json(json!({
//!     "title": "Home",
//!     "htmlAttrs": {"lang": "en"},
//!     "meta": [{"charset": "utf-8"}]
//! }))?);
//!
//! let html = block_on(render_ssr_head(&head))?;
//! assert_eq!(html.head_tags, "<meta charset=\"utf-8\">\n<title>Home</title>");
//! assert_eq!(html.html_attrs, " lang=\"en\"");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use headtag::{
    Head, HeadPayload, HeadTag, RuntimeMode, SsrHead, SsrRenderContext, SsrRenderedContext,
    TagName, TagPosition,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RenderError;
use crate::escape::{encode_inner_html, props_to_string};

/// Options for [`render_ssr_head_with`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrOptions {
    /// Embed the template payload script for the client to pick up.
    pub payload: bool,
    /// Joins tags within a bucket.
    pub separator: String,
}

impl Default for SsrOptions {
    fn default() -> Self {
        SsrOptions {
            payload: true,
            separator: "\n".to_string(),
        }
    }
}

/// Serializes one element tag.
///
/// Text content is escaped and takes precedence over inner HTML, which is
/// emitted verbatim. Void elements get no closing tag.
pub fn tag_to_string(tag: &HeadTag) -> String {
    let open = format!("<{}{}>", tag.tag, props_to_string(&tag.props));
    if tag.tag.is_self_closing() {
        return open;
    }
    let content = match (&tag.text_content, &tag.inner_html) {
        (Some(text), _) => encode_inner_html(text),
        (None, Some(html)) => html.clone(),
        (None, None) => String::new(),
    };
    format!("{}{}</{}>", open, content, tag.tag)
}

/// Renders with default options.
pub async fn render_ssr_head(head: &Head) -> Result<SsrHead, RenderError> {
    render_ssr_head_with(head, &SsrOptions::default()).await
}

/// Resolves `head` and renders it.
pub async fn render_ssr_head_with(head: &Head, options: &SsrOptions) -> Result<SsrHead, RenderError> {
    let hooks = head.hooks();
    let resolved = head.resolve().await?;

    let mut tags: Vec<HeadTag> = resolved
        .tags
        .into_iter()
        .filter(|t| t.mode != Some(RuntimeMode::Client) && t.tag != TagName::TitleTemplate)
        .collect();

    if options.payload {
        let payload = HeadPayload::from_entries(&resolved.entries);
        if !payload.is_empty() {
            tags.push(payload.to_tag()?);
        }
    }

    let mut ctx = SsrRenderContext { tags };
    hooks.run_ssr_render(&mut ctx).await?;

    let mut buckets: [Vec<String>; 3] = Default::default();
    let mut html = SsrHead::default();
    for tag in &ctx.tags {
        match tag.tag {
            TagName::HtmlAttrs => html.html_attrs.push_str(&props_to_string(&tag.props)),
            TagName::BodyAttrs => html.body_attrs.push_str(&props_to_string(&tag.props)),
            TagName::TitleTemplate => {}
            _ => {
                let bucket = match tag.position() {
                    TagPosition::Head => 0,
                    TagPosition::BodyOpen => 1,
                    TagPosition::BodyClose => 2,
                };
                buckets[bucket].push(tag_to_string(tag));
            }
        }
    }
    let [head_tags, body_open, body_close] = buckets;
    html.head_tags = head_tags.join(&options.separator);
    html.body_tags_open = body_open.join(&options.separator);
    html.body_tags = body_close.join(&options.separator);

    debug!(tags = ctx.tags.len(), "rendered ssr head");

    let mut rendered = SsrRenderedContext { html };
    hooks.run_ssr_rendered(&mut rendered).await?;
    Ok(rendered.html)
}
