//! Configuration loading and validation for Veilwright.
//!
//! Loads configuration from `~/.veilwright/config.toml` with environment
//! variable overrides (`API_KEY`, `API_URL`, `MODEL`). The provider
//! credentials are validated before any request is issued: a missing key,
//! URL, or model is a configuration error, not a provider error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.veilwright/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// API key for the LLM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint (without `/chat/completions`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model to use for narration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature for the narrator
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum request/stream/tool-execute rounds per player turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_temperature() -> f32 {
    0.8
}
fn default_max_rounds() -> u32 {
    8
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Environment variables take priority over the config file:
    /// - `API_KEY` — provider API key
    /// - `API_URL` — provider base URL
    /// - `MODEL`   — narration model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(key) = std::env::var("API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("API_URL") {
            config.api_url = Some(url);
        }
        if let Ok(model) = std::env::var("MODEL") {
            config.model = Some(model);
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".veilwright")
    }

    /// Validate value ranges. Credential presence is checked separately by
    /// [`Config::credentials`], since a config file without credentials is
    /// fine as long as the environment supplies them.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "max_rounds must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Resolve the provider credentials, failing if any is missing.
    ///
    /// Called before the first request; the returned triple is
    /// `(api_key, api_url, model)`.
    pub fn credentials(&self) -> Result<(&str, &str, &str), ConfigError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSetting("API_KEY".into()))?;
        let api_url = self
            .api_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSetting("API_URL".into()))?;
        let model = self
            .model
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSetting("MODEL".into()))?;
        Ok((api_key, api_url, model))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: None,
            temperature: default_temperature(),
            max_rounds: default_max_rounds(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_rounds, 8);
        assert!((config.temperature - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn credentials_fail_when_absent() {
        let config = Config::default();
        let err = config.credentials().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting(ref s) if s == "API_KEY"));
    }

    #[test]
    fn credentials_resolve_when_present() {
        let config = Config {
            api_key: Some("sk-test".into()),
            api_url: Some("https://nano-gpt.com/api/v1".into()),
            model: Some("glm-4.6".into()),
            ..Config::default()
        };
        let (key, url, model) = config.credentials().unwrap();
        assert_eq!(key, "sk-test");
        assert_eq!(url, "https://nano-gpt.com/api/v1");
        assert_eq!(model, "glm-4.6");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            api_key: Some("sk-test".into()),
            ..Config::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.api_key.as_deref(), Some("sk-test"));
        assert_eq!(parsed.max_rounds, config.max_rounds);
    }

    #[test]
    fn file_parse_and_validate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "api_url = \"https://nano-gpt.com/api/v1\"\nmodel = \"glm-4.6\"\ntemperature = 0.5"
        )
        .unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.model.as_deref(), Some("glm-4.6"));
        assert!((config.temperature - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn out_of_range_temperature_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "temperature = 3.0").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn zero_max_rounds_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_rounds = 0").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = Config {
            api_key: Some("sk-secret".into()),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
