//! Configuration management for Switchboard
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/switchboard/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::core::error::{Result, SwitchboardError};
use crate::core::types::AgentId;

/// Main configuration for Switchboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gemini API configuration
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// Agent behaviour configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Car search tool configuration
    #[serde(default)]
    pub car_search: CarSearchConfig,
    /// Streaming configuration
    #[serde(default)]
    pub streaming: StreamingConfig,
}

/// Gemini API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key (default: $GEMINI_API_KEY, then $API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// REST base URL, without the trailing `/models`
    pub base_url: String,
    /// Model used for agent sessions
    pub model: String,
    /// Model used for the routing classification
    pub router_model: String,
    /// Request timeout in seconds for non-streaming calls
    pub timeout_secs: u64,
}

/// Agent behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent used when routing fails or after a reset
    /// Default: generalist
    pub default_agent: AgentId,
    /// Fixed agent that bypasses routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_agent: Option<AgentId>,
    /// Maximum tool rounds in a single turn
    /// Default: 8
    pub max_rounds: usize,
    /// Wall-clock budget for one round (stream + tools)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_timeout_secs: Option<u64>,
    /// Whether to show debug output
    pub debug: bool,
}

/// Car search tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarSearchConfig {
    /// Listing search endpoint
    pub endpoint: String,
    /// Listings requested per search
    pub page_size: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Print tokens as they arrive (vs printing the finished turn)
    pub print_tokens: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        let model = env::var("SWITCHBOARD_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        Self {
            api_key: env::var("GEMINI_API_KEY").or_else(|_| env::var("API_KEY")).ok(),
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            router_model: env::var("SWITCHBOARD_ROUTER_MODEL").unwrap_or_else(|_| model.clone()),
            model,
            timeout_secs: 60,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_agent: AgentId::Generalist,
            manual_agent: env::var("SWITCHBOARD_AGENT")
                .ok()
                .and_then(|v| v.parse().ok()),
            max_rounds: 8,
            round_timeout_secs: env::var("SWITCHBOARD_ROUND_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok()),
            debug: env::var("SWITCHBOARD_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl Default for CarSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: env::var("SWITCHBOARD_CAR_SEARCH_URL")
                .unwrap_or_else(|_| "https://api.iautos.fr/api/v1/cars/search".to_string()),
            page_size: 12,
            timeout_secs: 15,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            print_tokens: env::var("SWITCHBOARD_STREAMING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("switchboard")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > config file > env vars > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(error = %e, "using default configuration");
                Self::default()
            }
        }
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(SwitchboardError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| SwitchboardError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; missing sections use defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SwitchboardError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                SwitchboardError::config(format!("Failed to create config dir: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SwitchboardError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| SwitchboardError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// API key, or a configuration error naming the variables to set
    pub fn require_api_key(&self) -> Result<&str> {
        self.gemini
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                SwitchboardError::config(
                    "No Gemini API key. Set GEMINI_API_KEY (or API_KEY) or gemini.api_key in the config file",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.default_agent, AgentId::Generalist);
        assert_eq!(config.agent.max_rounds, 8);
        assert_eq!(config.car_search.page_size, 12);
        assert!(config.gemini.base_url.starts_with("http"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [agent]
            default_agent = "coder"
            manual_agent = "carSpecialist"
            max_rounds = 3
            debug = true
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.default_agent, AgentId::Coder);
        assert_eq!(config.agent.manual_agent, Some(AgentId::CarSpecialist));
        assert_eq!(config.agent.max_rounds, 3);
        assert_eq!(config.car_search.page_size, 12);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[agent\nmax_rounds = ").unwrap_err();
        assert!(matches!(err, SwitchboardError::Config(_)));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("default_agent"));
        assert!(toml_str.contains("router_model"));
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("switchboard"));
    }
}
