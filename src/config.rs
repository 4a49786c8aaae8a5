//! Configuration management for esapi.
//!
//! Two files are involved:
//! - the plugin settings (`plugin.setting.json` by default), owned by us
//! - the host's `api.json`, which tells us where the host is listening

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application directory of the host.
pub const APP_NAME: &str = "electron-spirit";

/// Default location of the plugin settings, relative to the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "plugin.setting.json";

/// Plugin settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Input hook registered with the host (default: "api").
    pub input_hook: String,
    /// Keys we do not recognize, preserved as written.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_hook: "api".to_string(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Defaults as a JSON object, used for the field-by-field merge.
    fn defaults() -> Value {
        json!(Settings::default())
    }

    /// Merge a parsed settings document over the defaults.
    ///
    /// Every known field that is missing or has the wrong JSON type takes its
    /// default value. Anything that is not an object yields the defaults.
    pub fn merge(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self::default();
        };
        if let Value::Object(defaults) = Self::defaults() {
            for (key, default) in defaults {
                let keep = fields
                    .get(&key)
                    .is_some_and(|current| same_type(current, &default));
                if !keep {
                    fields.insert(key, default);
                }
            }
        }
        serde_json::from_value(Value::Object(fields)).unwrap_or_default()
    }

    /// Load settings from `path`. Unreadable or unparsable files yield the
    /// defaults.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("No settings at {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str::<Value>(&contents) {
            Ok(value) => Self::merge(value),
            Err(e) => {
                warn!("Ignoring invalid settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }
        let contents = serde_json::to_string(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    /// Load, merge and write the result back.
    pub fn load_and_persist(path: &Path) -> Result<Self> {
        let settings = Self::load(path);
        settings.save(path)?;
        Ok(settings)
    }
}

fn same_type(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Null, Value::Null)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
    )
}

/// Connection details published by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    /// Port of the host's Socket.IO server.
    #[serde(rename = "apiPort")]
    pub api_port: u16,
}

impl HostConfig {
    /// Get the host's data directory (roaming on Windows).
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|p| p.join(APP_NAME))
            .context("Could not determine data directory")
    }

    /// Get the host's API config path.
    pub fn path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("api.json"))
    }

    /// Load the host config from its default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read host config {}. Is electron-spirit installed?",
                path.display()
            )
        })?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse host config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.input_hook, "api");
        assert!(settings.extra.is_empty());
    }

    #[test]
    fn test_merge_keeps_valid_fields() {
        let settings = Settings::merge(json!({"input_hook": "g"}));
        assert_eq!(settings.input_hook, "g");
    }

    #[test]
    fn test_merge_replaces_mismatched_type() {
        let settings = Settings::merge(json!({"input_hook": 3}));
        assert_eq!(settings.input_hook, "api");
    }

    #[test]
    fn test_merge_preserves_unknown_keys() {
        let settings = Settings::merge(json!({"theme": "dark"}));
        assert_eq!(settings.input_hook, "api");
        assert_eq!(settings.extra.get("theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_merge_non_object() {
        assert_eq!(Settings::merge(json!([1, 2])), Settings::default());
    }

    #[test]
    fn test_load_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.setting.json");
        std::fs::write(&path, r#"{"input_hook": false, "note": 1}"#).unwrap();

        let settings = Settings::load_and_persist(&path).unwrap();
        assert_eq!(settings.input_hook, "api");

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"input_hook": "api", "note": 1}));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.setting.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(&dir.path().join("absent.json")), Settings::default());
    }

    #[test]
    fn test_host_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.json");
        std::fs::write(&path, r#"{"apiPort": 10002, "other": true}"#).unwrap();
        assert_eq!(HostConfig::load_from(&path).unwrap().api_port, 10002);

        std::fs::write(&path, r#"{"port": 1}"#).unwrap();
        assert!(HostConfig::load_from(&path).is_err());
    }
}
