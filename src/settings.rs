use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Rendering settings loaded from ~/.config/chat-render/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    /// URL for a generated image, `{id}` is replaced with the image id
    pub image_url_template: String,
    pub image_max_retries: u32,
    pub image_retry_delay_ms: u64,
    /// Display cap (in characters) for tool results
    pub default_result_cap: usize,
    /// Display cap for tools known to return long prose or search results
    pub long_result_cap: usize,
    pub long_result_tools: Vec<String>,
    /// Display cap for the echoed tool input arguments
    pub input_echo_cap: usize,
    /// How long the copy button shows "Copied!" or "Failed"
    pub copy_feedback_ms: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            image_url_template: "/api/images/{id}".to_string(),
            image_max_retries: 3,
            image_retry_delay_ms: 1000,
            default_result_cap: 500,
            long_result_cap: 3000,
            long_result_tools: [
                "web_search",
                "search",
                "web_fetch",
                "fetch_url",
                "read_url",
                "perplexity_ask",
                "read_files",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            input_echo_cap: 1000,
            copy_feedback_ms: 2000,
        }
    }
}

impl RenderSettings {
    pub fn image_url(&self, image_id: &str) -> String {
        self.image_url_template.replace("{id}", image_id)
    }

    /// Display cap for the result of the named tool
    pub fn result_cap(&self, tool_name: &str) -> usize {
        if self.long_result_tools.iter().any(|name| name == tool_name) {
            self.long_result_cap
        } else {
            self.default_result_cap
        }
    }

    /// Load settings from an explicit file. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;
        Ok(settings)
    }
}

pub fn settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("chat-render").join("settings.json"))
}

static SETTINGS: OnceLock<RenderSettings> = OnceLock::new();

/// Get the loaded settings, initializing them lazily on first use.
pub fn get_settings() -> &'static RenderSettings {
    SETTINGS.get_or_init(|| {
        match settings_path().and_then(|path| RenderSettings::load_from_path(&path)) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!("Failed to load settings: {err:#}");
                RenderSettings::default()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RenderSettings::load_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, RenderSettings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_result_cap": 42, "image_url_template": "/img/{{id}}.png"}}"#)
            .unwrap();

        let settings = RenderSettings::load_from_path(file.path()).unwrap();
        assert_eq!(settings.default_result_cap, 42);
        assert_eq!(settings.image_url("abc"), "/img/abc.png");
        assert_eq!(settings.image_max_retries, 3);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(RenderSettings::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_result_cap_depends_on_tool() {
        let settings = RenderSettings::default();
        assert_eq!(settings.result_cap("web_search"), settings.long_result_cap);
        assert_eq!(settings.result_cap("calculator"), settings.default_result_cap);
    }
}
