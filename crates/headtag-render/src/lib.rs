//! Render targets for `headtag`.
//!
//! Two ways to turn a resolved [`Head`](headtag::Head) into a document:
//!
//! - **Server rendering**: [`render_ssr_head`] serializes the tags into markup
//!   fragments for the head, the body boundaries and the `<html>`/`<body>`
//!   attributes, and embeds the template payload for the client.
//! - **DOM reconciliation**: a [`DomRenderer`] patches a live [`Document`]
//!   incrementally, keeping element identity across renders and adopting
//!   server-rendered elements on first patch.
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use headtag::{Head, Input, InputValue};
//! use headtag_render::render_ssr_head;
//!
//! let head = Head::server();
//! head.push(
//!     Input::new()
//!         .with("title", "Docs")
//!         .with("bodyAttrs", InputValue::object([("class", InputValue::from("dark"))])),
//! );
//!
//! let html = block_on(render_ssr_head(&head))?;
//! assert_eq!(html.head_tags, "<title>Docs</title>");
//! assert_eq!(html.body_attrs, " class=\"dark\"");
//! # Ok::<(), headtag_render::RenderError>(())
//! ```

// Core modules
mod error;
mod escape;
mod ssr;

// Render targets
pub mod dom;

pub use dom::{
    create_dom_head, read_payload, Document, DomPlugin, DomRenderer, MemoryDocument,
    MemoryElement, RenderDelay,
};
pub use error::RenderError;
pub use escape::{encode_attribute, encode_inner_html, props_to_string};
pub use ssr::{render_ssr_head, render_ssr_head_with, tag_to_string, SsrOptions};
