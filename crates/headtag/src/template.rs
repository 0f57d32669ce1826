//! Template params and title templates.
//!
//! Text fields may carry `%name` or `%dotted.path` tokens, substituted from
//! the `templateParams` of every live entry (shallow-merged, later entries
//! winning per top-level key). Parameters are re-merged on every resolution.
//!
//! A parameter set to `null` removes its token together with one adjacent
//! separator and the whitespace around it:
//!
//! ```rust
//! use headtag::template::Interpolator;
//! use serde_json::json;
//!
//! let params = json!({"separator": "-", "site": {"name": "X"}, "tagline": null});
//! let interp = Interpolator::new(params.as_object().unwrap(), "|");
//! assert_eq!(
//!     interp.apply_title_template("%s %separator %site.name", Some("Home")),
//!     "Home - X"
//! );
//! assert_eq!(interp.apply("%site.name %separator %tagline"), "X");
//! ```
//!
//! `%s` is only meaningful inside a title template, where it stands for the
//! resolved title. Everywhere else it is left alone.

use serde_json::{Map, Value};

use crate::entry::HeadEntry;
use crate::head::Head;
use crate::hooks::Hooks;
use crate::plugin::HeadPlugin;
use crate::sort::insert_sorted;
use crate::tag::{AttrValue, HeadTag, TagName};

/// Merged template parameters.
pub type TemplateParams = Map<String, Value>;

/// Separator used when neither the params nor the head set one.
pub const DEFAULT_SEPARATOR: &str = "|";

/// Shallow-merges the `templateParams` of every entry, in order.
pub fn merge_template_params(entries: &[HeadEntry]) -> TemplateParams {
    let mut merged = TemplateParams::new();
    for params in entries.iter().filter_map(HeadEntry::template_params) {
        for (key, value) in params {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

enum Token {
    Text(String),
    Remove,
    Verbatim,
}

/// Substitutes template tokens from a parameter map.
#[derive(Debug, Clone)]
pub struct Interpolator<'a> {
    params: &'a TemplateParams,
    separator: String,
}

impl<'a> Interpolator<'a> {
    /// Creates an interpolator; `default_separator` applies when the params
    /// carry no string `separator`.
    pub fn new(params: &'a TemplateParams, default_separator: &str) -> Self {
        let separator = params
            .get("separator")
            .and_then(Value::as_str)
            .unwrap_or(default_separator)
            .to_string();
        Interpolator { params, separator }
    }

    /// The effective separator.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Interpolates ordinary text; `%s` is left verbatim.
    pub fn apply(&self, text: &str) -> String {
        self.interpolate(text, None, false)
    }

    /// Interpolates a JSON body; substituted values have `"` escaped.
    pub fn apply_json(&self, text: &str) -> String {
        self.interpolate(text, None, true)
    }

    /// Expands a title template; `%s` is the title, or a `null` param when
    /// there is none.
    pub fn apply_title_template(&self, template: &str, title: Option<&str>) -> String {
        self.interpolate(template, Some(title), false).trim().to_string()
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.params.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    fn resolve_token(&self, ident: &str, title: Option<Option<&str>>) -> Token {
        if ident == "s" {
            return match title {
                Some(Some(t)) => Token::Text(t.to_string()),
                Some(None) => Token::Remove,
                None => Token::Verbatim,
            };
        }
        if ident == "separator" {
            return Token::Text(self.separator.clone());
        }
        match self.lookup(ident) {
            Some(Value::String(s)) => Token::Text(s.clone()),
            Some(Value::Number(n)) => Token::Text(n.to_string()),
            Some(Value::Bool(b)) => Token::Text(b.to_string()),
            Some(Value::Null) => Token::Remove,
            _ => Token::Verbatim,
        }
    }

    fn interpolate(&self, text: &str, title: Option<Option<&str>>, escape_quotes: bool) -> String {
        if !text.contains('%') {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut removals = Vec::new();
        let mut rest = text;

        while let Some(at) = rest.find('%') {
            out.push_str(&rest[..at]);
            let after = &rest[at + 1..];
            let len = token_len(after);
            if len == 0 {
                out.push('%');
                rest = after;
                continue;
            }
            let ident = &after[..len];
            match self.resolve_token(ident, title) {
                Token::Text(value) if escape_quotes => out.push_str(&value.replace('"', "\\\"")),
                Token::Text(value) => out.push_str(&value),
                Token::Remove => removals.push(out.len()),
                Token::Verbatim => {
                    out.push('%');
                    out.push_str(ident);
                }
            }
            rest = &after[len..];
        }
        out.push_str(rest);

        if removals.is_empty() {
            return out;
        }
        for at in removals.into_iter().rev() {
            let mut at = at.min(out.len());
            while !out.is_char_boundary(at) {
                at -= 1;
            }
            out = remove_at(&out, at, &self.separator);
        }
        out.trim().to_string()
    }
}

/// Length of the identifier (with `.segment` parts) at the start of `s`.
fn token_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return 0,
    }
    let is_ident = |b: &u8| b.is_ascii_alphanumeric() || *b == b'_';
    let mut len = 1 + bytes[1..].iter().take_while(|b| is_ident(b)).count();
    while bytes.get(len) == Some(&b'.') {
        let segment = bytes[len + 1..].iter().take_while(|b| is_ident(b)).count();
        if segment == 0 {
            break;
        }
        len += 1 + segment;
    }
    len
}

/// Removes the gap left by a `null` token at byte `at`, together with one
/// adjacent separator and its surrounding whitespace.
fn remove_at(text: &str, at: usize, separator: &str) -> String {
    let (left, right) = text.split_at(at);
    let left_trimmed = left.trim_end();

    if !separator.is_empty() {
        if let Some(stripped) = left_trimmed.strip_suffix(separator) {
            let right = if right.starts_with(char::is_whitespace) || right.is_empty() {
                right.to_string()
            } else {
                format!(" {}", right)
            };
            return format!("{}{}", stripped.trim_end(), right);
        }
        let right_trimmed = right.trim_start();
        if left_trimmed.is_empty() {
            if let Some(stripped) = right_trimmed.strip_prefix(separator) {
                return stripped.trim_start().to_string();
            }
        }
    }

    if left.ends_with(char::is_whitespace) {
        format!("{}{}", left, right.trim_start())
    } else {
        format!("{}{}", left, right)
    }
}

fn interpolate_tag(tag: &mut HeadTag, interp: &Interpolator<'_>) {
    for value in tag.props.values_mut() {
        if let AttrValue::String(s) = value {
            if s.contains('%') {
                *s = interp.apply(s);
            }
        }
    }
    let content_in_scope = tag.tag == TagName::Title || tag.process_template_params == Some(true);
    if !content_in_scope {
        return;
    }
    let json = tag.attr("type").is_some_and(|t| t.contains("json"));
    if let Some(text) = tag.text_content.take() {
        tag.text_content = Some(interp.apply(&text));
    }
    if let Some(html) = tag.inner_html.take() {
        tag.inner_html = Some(if json {
            interp.apply_json(&html)
        } else {
            interp.apply(&html)
        });
    }
}

/// Interpolates every tag on `tags:resolve`.
///
/// Attributes of every tag are in scope; inner content only for `title` and
/// for tags setting `processTemplateParams: true`. Tags setting it to `false`
/// are skipped entirely. The title template is left for
/// [`TitleTemplatePlugin`].
pub struct TemplateParamsPlugin;

impl HeadPlugin for TemplateParamsPlugin {
    fn key(&self) -> &str {
        "headtag:template-params"
    }

    fn hooks(&self, head: &Head) -> Hooks {
        let default_separator = head.separator().to_string();
        Hooks::new().tags_resolve_sync(move |ctx| {
            let params = merge_template_params(&ctx.entries);
            let interp = Interpolator::new(&params, &default_separator);
            for tag in &mut ctx.tags {
                if tag.tag == TagName::TitleTemplate || tag.process_template_params == Some(false) {
                    continue;
                }
                interpolate_tag(tag, &interp);
            }
            Ok(())
        })
    }
}

/// Applies the winning title template to the title, then drops the template
/// pseudo-tag.
///
/// Without a title, a non-empty expansion becomes the title. A template with
/// no content (`titleTemplate: null`) leaves the title untouched.
pub struct TitleTemplatePlugin;

impl HeadPlugin for TitleTemplatePlugin {
    fn key(&self) -> &str {
        "headtag:title-template"
    }

    fn hooks(&self, head: &Head) -> Hooks {
        let default_separator = head.separator().to_string();
        Hooks::new().tags_resolve_sync(move |ctx| {
            let Some(at) = ctx.tags.iter().position(|t| t.tag == TagName::TitleTemplate) else {
                return Ok(());
            };
            let template_tag = ctx.tags.remove(at);
            let Some(template) = template_tag.content() else {
                return Ok(());
            };
            if template_tag.process_template_params == Some(false) {
                return Ok(());
            }

            let params = merge_template_params(&ctx.entries);
            let interp = Interpolator::new(&params, &default_separator);
            let title_at = ctx.tags.iter().position(|t| t.tag == TagName::Title);
            let title = title_at.and_then(|i| ctx.tags[i].text_content.clone());
            let expanded = interp.apply_title_template(template, title.as_deref());
            if expanded.is_empty() {
                return Ok(());
            }

            match title_at {
                Some(i) => ctx.tags[i].text_content = Some(expanded),
                None => {
                    let mut title = HeadTag::new(TagName::Title).with_text(expanded);
                    title.entry_id = template_tag.entry_id;
                    title.order = template_tag.order;
                    title.mode = template_tag.mode;
                    title.dedupe_key = Some(TagName::Title.as_str().to_string());
                    insert_sorted(&mut ctx.tags, title);
                }
            }
            Ok(())
        })
    }
}
