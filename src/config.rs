//! Sandbox configuration.
//!
//! Loaded from a JSON file (camelCase keys). Every field has a default so an
//! empty object, or no file at all, gives a working sandbox.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Default debounce quiet period in milliseconds.
fn default_debounce_ms() -> u64 {
    300
}

/// Default chart width in CSS pixels.
fn default_chart_width() -> u32 {
    800
}

/// Default chart height in CSS pixels.
fn default_chart_height() -> u32 {
    600
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Quiet period after the last edit before the script runs.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_chart_width")]
    pub chart_width: u32,

    #[serde(default = "default_chart_height")]
    pub chart_height: u32,

    /// Directory exported images are written to.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Command (argv) that receives copied script text on stdin,
    /// e.g. `["wl-copy"]` or `["xclip", "-selection", "clipboard"]`.
    #[serde(default)]
    pub clipboard_command: Option<Vec<String>>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            chart_width: default_chart_width(),
            chart_height: default_chart_height(),
            export_dir: default_export_dir(),
            clipboard_command: None,
        }
    }
}

impl SandboxConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SandboxConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chart_width == 0 || self.chart_height == 0 {
            return Err(ConfigError::Invalid(
                "chartWidth and chartHeight must be positive".to_string(),
            ));
        }
        if let Some(argv) = &self.clipboard_command {
            if argv.is_empty() {
                return Err(ConfigError::Invalid(
                    "clipboardCommand must name a program".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = SandboxConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SandboxConfig::default());
        assert_eq!(config.quiet_period(), Duration::from_millis(300));
    }

    #[test]
    fn test_camel_case_fields() {
        let config = SandboxConfig::from_json_str(
            r#"{ "debounceMs": 50, "chartWidth": 400, "clipboardCommand": ["wl-copy"] }"#,
        )
        .unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.chart_width, 400);
        assert_eq!(config.chart_height, 600);
        assert_eq!(config.clipboard_command, Some(vec!["wl-copy".to_string()]));
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = SandboxConfig::from_json_str(r#"{ "chartHeight": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_empty_clipboard_command_rejected() {
        let err = SandboxConfig::from_json_str(r#"{ "clipboardCommand": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbox.json");
        std::fs::write(&path, r#"{ "exportDir": "/tmp/charts" }"#).unwrap();

        let config = SandboxConfig::load(&path).unwrap();
        assert_eq!(config.export_dir, PathBuf::from("/tmp/charts"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SandboxConfig::load(Path::new("/nonexistent/sandbox.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
