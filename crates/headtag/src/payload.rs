//! The persisted server payload.
//!
//! A server render embeds the merged `templateParams` and the winning
//! `titleTemplate` of its server-mode entries as a JSON script element. The
//! client reads it back and registers it as its first entry, so title
//! expansion stays consistent across the boundary.

use serde::{Deserialize, Serialize};

use crate::entry::HeadEntry;
use crate::error::Result;
use crate::input::Input;
use crate::tag::{HeadTag, RuntimeMode, TagName, TagPosition};
use crate::template::{merge_template_params, TemplateParams};

/// `id` of the payload script element.
pub const PAYLOAD_ID: &str = "unhead:payload";

/// Template state carried from server to client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_template: Option<String>,
    #[serde(default, skip_serializing_if = "TemplateParams::is_empty")]
    pub template_params: TemplateParams,
}

impl HeadPayload {
    /// Collects the payload from server-mode entries.
    pub fn from_entries(entries: &[HeadEntry]) -> Self {
        let server: Vec<HeadEntry> = entries
            .iter()
            .filter(|e| e.mode == Some(RuntimeMode::Server))
            .cloned()
            .collect();
        HeadPayload {
            title_template: server
                .iter()
                .rev()
                .find_map(|e| e.title_template().map(str::to_string)),
            template_params: merge_template_params(&server),
        }
    }

    /// Returns true if there is nothing to persist.
    pub fn is_empty(&self) -> bool {
        self.title_template.is_none() && self.template_params.is_empty()
    }

    /// Serializes for embedding; `<` is escaped so the body cannot close
    /// the script element.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?.replace('<', "\\u003c"))
    }

    /// Parses an embedded payload.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The payload as a registrable entry input.
    pub fn into_input(self) -> Input {
        let mut input = Input::new();
        if let Some(template) = self.title_template {
            input.insert("titleTemplate", template);
        }
        if !self.template_params.is_empty() {
            input.insert("templateParams", serde_json::Value::Object(self.template_params));
        }
        input
    }

    /// The script element carrying the payload.
    pub fn to_tag(&self) -> Result<HeadTag> {
        let mut tag = HeadTag::new(TagName::Script)
            .with_prop("id", PAYLOAD_ID)
            .with_prop("type", "application/json")
            .with_inner_html(self.to_json()?);
        tag.tag_position = Some(TagPosition::Head);
        tag.process_template_params = Some(false);
        tag.hash = Some(tag.compute_hash());
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryOptions;
    use serde_json::json;

    fn entry(id: usize, mode: RuntimeMode, resolved: serde_json::Value) -> HeadEntry {
        let mut e = HeadEntry::new(id, Input::new(), EntryOptions::new().mode(mode));
        e.resolved_input = resolved.as_object().cloned();
        e
    }

    #[test]
    fn test_from_entries_uses_server_entries_only() {
        let entries = vec![
            entry(0, RuntimeMode::Server, json!({"titleTemplate": "%s | A", "templateParams": {"a": 1}})),
            entry(1, RuntimeMode::Client, json!({"titleTemplate": "%s | B", "templateParams": {"b": 2}})),
            entry(2, RuntimeMode::Server, json!({"templateParams": {"a": 3}})),
        ];
        let payload = HeadPayload::from_entries(&entries);
        assert_eq!(payload.title_template.as_deref(), Some("%s | A"));
        assert_eq!(payload.template_params.get("a"), Some(&json!(3)));
        assert!(payload.template_params.get("b").is_none());
    }

    #[test]
    fn test_json_escapes_angle_bracket() {
        let mut payload = HeadPayload::default();
        payload.template_params.insert("x".into(), json!("</script>"));
        let text = payload.to_json().unwrap();
        assert!(!text.contains('<'));
        assert_eq!(HeadPayload::parse(&text).unwrap(), payload);
    }

    #[test]
    fn test_empty_payload() {
        let payload = HeadPayload::from_entries(&[]);
        assert!(payload.is_empty());
        assert_eq!(payload.to_json().unwrap(), "{}");
        assert!(payload.into_input().is_empty());
    }

    #[test]
    fn test_tag_shape() {
        let payload = HeadPayload {
            title_template: Some("%s - X".into()),
            ..Default::default()
        };
        let tag = payload.to_tag().unwrap();
        assert_eq!(tag.attr("id"), Some(PAYLOAD_ID));
        assert_eq!(tag.inner_html.as_deref(), Some(r#"{"titleTemplate":"%s - X"}"#));
    }
}
