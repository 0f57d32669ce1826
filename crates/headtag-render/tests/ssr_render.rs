//! Server rendering of resolved heads.

use futures::executor::block_on;
use headtag::{EntryOptions, Head, HeadPayload, Hooks, Input, RuntimeMode, SsrHead, PAYLOAD_ID};
use headtag_render::{render_ssr_head, render_ssr_head_with, SsrOptions};
use serde_json::{json, Value};

fn input(value: Value) -> Input {
    Input::from_json(value).unwrap()
}

fn render(head: &Head) -> SsrHead {
    block_on(render_ssr_head(head)).unwrap()
}

// ============================================================================
// Buckets
// ============================================================================

#[test]
fn full_document_fragments() {
    let head = Head::server();
    head.push(input(json!({
        "titleTemplate": "%s %separator %siteName",
        "templateParams": {"siteName": "Acme"},
        "title": "Pricing",
        "htmlAttrs": {"lang": "en"},
        "bodyAttrs": {"class": ["dark", "wide"]},
        "meta": [
            {"name": "description", "content": "Plans & pricing"},
            {"charset": "utf-8"}
        ],
        "script": [
            {"src": "/app.js", "async": true, "tagPosition": "bodyClose"},
            {"innerHTML": "window.x=1", "tagPosition": "bodyOpen"}
        ]
    })));

    let html = render(&head);
    insta::assert_snapshot!(html.head_tags, @r###"
    <meta charset="utf-8">
    <title>Pricing | Acme</title>
    <meta name="description" content="Plans & pricing">
    <script id="unhead:payload" type="application/json">{"titleTemplate":"%s %separator %siteName","templateParams":{"siteName":"Acme"}}</script>
    "###);
    insta::assert_snapshot!(html.body_tags_open, @"<script>window.x=1</script>");
    insta::assert_snapshot!(html.body_tags, @r###"<script src="/app.js" async></script>"###);
    assert_eq!(html.html_attrs, r#" lang="en""#);
    assert_eq!(html.body_attrs, r#" class="dark wide""#);
}

#[test]
fn empty_head_renders_empty_fragments() {
    let html = render(&Head::server());
    assert_eq!(html, SsrHead::default());
}

#[test]
fn custom_separator_and_no_payload() {
    let head = Head::server();
    head.push(input(json!({
        "title": "T",
        "templateParams": {"a": 1},
        "link": [{"rel": "icon", "href": "/favicon.ico"}]
    })));

    let options = SsrOptions {
        payload: false,
        separator: String::new(),
    };
    let html = block_on(render_ssr_head_with(&head, &options)).unwrap();
    insta::assert_snapshot!(html.head_tags, @r###"<title>T</title><link rel="icon" href="/favicon.ico">"###);
}

// ============================================================================
// Escaping
// ============================================================================

#[test]
fn text_is_escaped_and_inner_html_is_not() {
    let head = Head::server();
    head.push(input(json!({
        "title": "Tom & Jerry's <Show>",
        "style": [{"innerHTML": "a > b { color: red }"}],
        "meta": [{"property": "og:title", "content": "Say \"hi\""}]
    })));

    let html = render(&head);
    insta::assert_snapshot!(html.head_tags, @r###"
    <title>Tom &amp; Jerry&#x27;s &lt;Show&gt;</title>
    <style>a > b { color: red }</style>
    <meta property="og:title" content="Say &quot;hi&quot;">
    "###);
}

// ============================================================================
// Modes and payload
// ============================================================================

#[test]
fn client_entries_are_not_rendered_or_persisted() {
    let head = Head::server();
    head.push(input(json!({"title": "Server", "templateParams": {"site": "S"}})));
    head.push_with_options(
        input(json!({
            "script": [{"src": "/client.js"}],
            "templateParams": {"client": true}
        })),
        EntryOptions::new().mode(RuntimeMode::Client),
    );

    let html = render(&head);
    assert!(!html.head_tags.contains("/client.js"));

    let start = html.head_tags.find('{').unwrap();
    let end = html.head_tags.rfind('}').unwrap();
    let payload = HeadPayload::parse(&html.head_tags[start..=end]).unwrap();
    assert_eq!(payload.template_params.get("site"), Some(&json!("S")));
    assert!(payload.template_params.get("client").is_none());
    assert!(html.head_tags.contains(PAYLOAD_ID));
}

#[test]
fn payload_script_cannot_be_closed_early() {
    let head = Head::server();
    head.push(input(json!({"templateParams": {"evil": "</script><script>alert(1)"}})));

    let html = render(&head);
    assert_eq!(html.head_tags.matches("</script>").count(), 1);
}

// ============================================================================
// Hooks
// ============================================================================

#[test]
fn render_hooks_see_tags_and_output() {
    let head = Head::server();
    head.push(input(json!({"title": "Hooked", "meta": [{"name": "robots", "content": "none"}]})));
    head.add_hooks(
        Hooks::new()
            .ssr_render_sync(|ctx| {
                ctx.tags.retain(|t| t.attr("name") != Some("robots"));
                Ok(())
            })
            .ssr_rendered_sync(|ctx| {
                ctx.html.head_tags.push_str("\n<!-- end -->");
                Ok(())
            }),
    );

    let html = render(&head);
    assert_eq!(html.head_tags, "<title>Hooked</title>\n<!-- end -->");
}

#[test]
fn failing_hook_aborts_render() {
    let head = Head::server();
    head.push(input(json!({"title": "x"})));
    head.add_hooks(Hooks::new().ssr_rendered_sync(|_| Err(headtag::HookError::new("no"))));

    let err = block_on(render_ssr_head(&head)).unwrap_err();
    assert_eq!(err.to_string(), "hook error (ssr:rendered): no");
}

#[test]
fn output_serializes_camel_case() {
    let head = Head::server();
    head.push(input(json!({"title": "J"})));
    let value = serde_json::to_value(render(&head)).unwrap();
    assert_eq!(value["headTags"], json!("<title>J</title>"));
    assert_eq!(value["bodyTagsOpen"], json!(""));
}
