//! Head configuration loaded from YAML or JSON.
//!
//! ```yaml
//! mode: server
//! separator: "·"
//! init:
//!   - htmlAttrs: { lang: en }
//!     meta:
//!       - charset: utf-8
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HeadError, Result};
use crate::tag::RuntimeMode;

/// Serializable construction settings; see
/// [`HeadOptions::from_config`](crate::HeadOptions::from_config).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct HeadConfig {
    /// Default entry mode.
    pub mode: Option<RuntimeMode>,
    /// Default title separator.
    pub separator: Option<String>,
    /// Head descriptions pushed at construction.
    pub init: Vec<serde_json::Value>,
}

impl HeadConfig {
    /// Parses YAML.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parses JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| HeadError::Config(e.to_string()))
    }

    /// Loads a file, choosing the format by extension (`.json`, otherwise
    /// YAML).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HeadError::Config(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_yaml() {
        let config = HeadConfig::from_yaml(
            "mode: client\nseparator: '-'\ninit:\n  - title: Hello\n",
        )
        .unwrap();
        assert_eq!(config.mode, Some(RuntimeMode::Client));
        assert_eq!(config.separator.as_deref(), Some("-"));
        assert_eq!(config.init, vec![serde_json::json!({"title": "Hello"})]);
    }

    #[test]
    fn test_defaults() {
        let config = HeadConfig::from_json("{}").unwrap();
        assert_eq!(config, HeadConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = HeadConfig::from_json(r#"{"seperator": "|"}"#).unwrap_err();
        assert!(matches!(err, HeadError::Config(_)));
    }

    #[test]
    fn test_from_path_dispatches_on_extension() {
        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"mode": "server"}}"#).unwrap();
        assert_eq!(
            HeadConfig::from_path(json.path()).unwrap().mode,
            Some(RuntimeMode::Server)
        );

        let mut yaml = NamedTempFile::new().unwrap();
        writeln!(yaml, "separator: '~'").unwrap();
        assert_eq!(
            HeadConfig::from_path(yaml.path()).unwrap().separator.as_deref(),
            Some("~")
        );
    }

    #[test]
    fn test_missing_file() {
        let err = HeadConfig::from_path("/nonexistent/headtag.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/headtag.yaml"));
    }
}
