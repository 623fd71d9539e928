//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use crate::Result;
use crate::agent::ProviderRegistry;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application (client) ID of the Entra public client registration
    #[serde(default)]
    pub client_id: String,

    /// Identity authority, e.g. `https://login.microsoftonline.com/common`
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Delegated scopes requested during sign-in
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Microsoft Graph base URL
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,

    /// Where the serialized token cache lives
    #[serde(default = "default_token_cache_path")]
    pub token_cache_path: PathBuf,

    /// Maximum tool-calling iterations per request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// How far back `list_emails` looks, in days
    #[serde(default = "default_mail_lookback_days")]
    pub mail_lookback_days: i64,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Language model configuration shared by the executor and the planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "groq" or "openai"
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub api_key: String,

    /// Overrides the provider's default endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model used by the tool-calling loop
    #[serde(default = "default_executor_model")]
    pub executor_model: String,

    #[serde(default)]
    pub executor_temperature: f32,

    /// Model used to write the final schedule
    #[serde(default = "default_planner_model")]
    pub planner_model: String,

    #[serde(default = "default_planner_temperature")]
    pub planner_temperature: f32,
}

fn default_authority() -> String {
    "https://login.microsoftonline.com/common".to_string()
}

fn default_scopes() -> Vec<String> {
    ["offline_access", "User.Read", "Mail.ReadWrite", "Mail.Send", "Calendars.Read"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_token_cache_path() -> PathBuf {
    config_dir().join("token_cache.json")
}

fn default_max_iterations() -> usize {
    10
}

fn default_mail_lookback_days() -> i64 {
    5
}

fn default_provider() -> String {
    "groq".to_string()
}

fn default_executor_model() -> String {
    "openai/gpt-oss-120b".to_string()
}

fn default_planner_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_planner_temperature() -> f32 {
    0.3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            base_url: None,
            executor_model: default_executor_model(),
            executor_temperature: 0.0,
            planner_model: default_planner_model(),
            planner_temperature: default_planner_temperature(),
        }
    }
}

impl LlmConfig {
    /// Environment variable holding the key for the configured provider.
    pub fn api_key_env(&self) -> &'static str {
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GROQ_API_KEY",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            authority: default_authority(),
            scopes: default_scopes(),
            graph_base_url: default_graph_base_url(),
            token_cache_path: default_token_cache_path(),
            max_iterations: default_max_iterations(),
            mail_lookback_days: default_mail_lookback_days(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Apply environment overrides using the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MICROSOFT_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = lookup("MICROSOFT_AUTHORITY") {
            self.authority = v;
        }
        if let Some(v) = lookup("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = lookup(self.llm.api_key_env()) {
            self.llm.api_key = v;
        }
        if let Some(v) = lookup("M365_MAX_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.max_iterations = v;
        }
    }

    /// Check that the identity and model settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("MICROSOFT_CLIENT_ID not configured".to_string()));
        }
        if self.llm.api_key.trim().is_empty() {
            return Err(Error::Config(format!("{} not configured", self.llm.api_key_env())));
        }
        if !ProviderRegistry::available().contains(&self.llm.provider.as_str()) {
            return Err(Error::Config(format!(
                "Unknown provider '{}' (available: {})",
                self.llm.provider,
                ProviderRegistry::available().join(", ")
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".to_string()));
        }
        url::Url::parse(&self.authority)
            .map_err(|e| Error::Config(format!("Invalid authority {}: {}", self.authority, e)))?;
        Ok(())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".m365-assistant")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration: config file (if any), then `.env` and environment overrides.
pub fn load() -> Result<Config> {
    let path = config_path();

    let mut config = if path.exists() {
        debug!("Loading config from {:?}", path);
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)?
    } else {
        Config::default()
    };

    let _ = dotenv::dotenv();
    config.apply_overrides(|key| std::env::var(key).ok());

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.graph_base_url, "https://graph.microsoft.com/v1.0");
        assert!(config.scopes.contains(&"offline_access".to_string()));
        assert_eq!(config.llm.planner_model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"client_id": "abc"}"#).unwrap();
        assert_eq!(config.client_id, "abc");
        assert_eq!(config.authority, "https://login.microsoftonline.com/common");
        assert_eq!(config.llm.provider, "groq");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MICROSOFT_CLIENT_ID", "client-123"),
            ("GROQ_API_KEY", "gsk_test"),
            ("M365_MAX_ITERATIONS", "4"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.client_id, "client-123");
        assert_eq!(config.llm.api_key, "gsk_test");
        assert_eq!(config.max_iterations, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_openai_provider_reads_openai_key() {
        let env: HashMap<&str, &str> = [
            ("MICROSOFT_CLIENT_ID", "client-123"),
            ("LLM_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
            ("GROQ_API_KEY", "gsk_ignored"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.api_key, "sk-test");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_key_names_provider_variable() {
        let mut config = Config::default();
        config.client_id = "client-123".to_string();
        config.apply_overrides(|k| (k == "LLM_PROVIDER").then(|| "openai".to_string()));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = Config::default();
        config.client_id = "client-123".to_string();
        config.llm.provider = "anthropic".to_string();
        config.llm.api_key = "key".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("available: groq, openai"));
    }

    #[test]
    fn test_missing_client_id_is_rejected() {
        let mut config = Config::default();
        config.llm.api_key = "key".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("MICROSOFT_CLIENT_ID"));
    }
}
