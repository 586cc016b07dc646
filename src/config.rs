//! Config file handling

use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{Result, StepError};

/// Environment variable that overrides the configured base URL
pub const BASE_URL_ENV: &str = "API_BASE_URL";

/// On-disk shape of `config.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    command_timeout: Option<String>,
    verbose: bool,
    headers: IndexMap<String, String>,
}

/// Stepwise configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix for relative request endpoints
    pub base_url: String,
    /// Header templates installed in every new scenario
    pub default_headers: IndexMap<String, String>,
    /// Bound for commands run without an explicit timeout
    pub command_timeout: Option<Duration>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_headers: Self::builtin_headers(),
            command_timeout: None,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from the config file (TOML format), then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file();

        let mut config = if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .map_err(|e| StepError::Config(format!("Failed to read config: {}", e)))?;
            debug!(path = %config_file.display(), "Loaded config file");
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };

        config.override_base_url(std::env::var(BASE_URL_ENV).ok());
        Ok(config)
    }

    /// Parse a `config.toml` document. Environment overrides are not applied.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| StepError::Config(format!("Invalid config TOML: {}", e)))?;

        let command_timeout = file
            .command_timeout
            .as_deref()
            .map(|s| {
                humantime::parse_duration(s)
                    .map_err(|e| StepError::Config(format!("Invalid command_timeout '{}': {}", s, e)))
            })
            .transpose()?;

        let mut default_headers = Self::builtin_headers();
        default_headers.extend(file.headers);

        Ok(Self {
            base_url: file.base_url.unwrap_or_default(),
            default_headers,
            command_timeout,
            verbose: file.verbose,
        })
    }

    /// Builder-style base URL setter
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn override_base_url(&mut self, value: Option<String>) {
        if let Some(url) = value.filter(|v| !v.is_empty()) {
            debug!(base_url = %url, "Base URL taken from {}", BASE_URL_ENV);
            self.base_url = url;
        }
    }

    fn builtin_headers() -> IndexMap<String, String> {
        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers
    }

    /// Get the default config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("stepwise"))
            .unwrap_or_else(|| PathBuf::from(".stepwise"))
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.base_url.is_empty());
        assert_eq!(
            config.default_headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert!(config.command_timeout.is_none());
    }

    #[test]
    fn test_from_toml_str() {
        let config = Config::from_toml_str(
            r#"
            base_url = "http://localhost:8080"
            command_timeout = "1m 30s"
            verbose = true

            [headers]
            Authorization = "Bearer ${token}"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.command_timeout, Some(Duration::from_secs(90)));
        assert!(config.verbose);
        let names: Vec<&str> = config.default_headers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Content-Type", "Authorization"]);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(Config::from_toml_str("base_url = ["), Err(StepError::Config(_))));
        assert!(matches!(
            Config::from_toml_str(r#"command_timeout = "soon""#),
            Err(StepError::Config(_))
        ));
        assert!(matches!(Config::from_toml_str("colour = true"), Err(StepError::Config(_))));
    }

    #[test]
    fn test_base_url_override() {
        let mut config = Config::default().with_base_url("http://from-file");
        config.override_base_url(None);
        assert_eq!(config.base_url, "http://from-file");
        config.override_base_url(Some(String::new()));
        assert_eq!(config.base_url, "http://from-file");
        config.override_base_url(Some("http://from-env".to_string()));
        assert_eq!(config.base_url, "http://from-env");
    }
}
