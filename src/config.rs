//! Configuration management for Horizon
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{HorizonError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Horizon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Chat behaviour configuration
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Conversation storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// OpenAI-compatible completion API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Bearer token; the client refuses to call out without one
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL; `/chat/completions` is appended
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Name shown to users for answers from this model
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// System instruction prepended to every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Hard deadline for one completion call (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Most recent history entries included in a request
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Value of the `HTTP-Referer` header
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Value of the `X-Title` header
    #[serde(default = "default_app_title")]
    pub app_title: String,

    /// Sampling parameters
    #[serde(default)]
    pub sampling: SamplingConfig,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "deepseek/deepseek-r1-distill-llama-70b".to_string()
}

fn default_display_name() -> String {
    "DeepSeek R1".to_string()
}

fn default_system_prompt() -> String {
    "You are a highly knowledgeable physics AI assistant specializing in quantum mechanics, \
relativity, black holes, particle physics, and astrophysics.

Your expertise includes:
- Quantum mechanics and quantum field theory
- Einstein's theories of special and general relativity
- Black hole physics and cosmology
- Particle physics and the Standard Model
- Mathematical physics and advanced equations
- Current research and recent discoveries

Guidelines for responses:
1. Provide accurate, detailed explanations
2. Include relevant mathematical formulations when appropriate
3. Use proper physics terminology and notation
4. Explain complex concepts in an accessible way
5. When unsure, acknowledge limitations and suggest authoritative sources
6. Always maintain scientific accuracy over speculation
7. Reference previous parts of our conversation when relevant

Format equations using standard mathematical notation and explain their significance."
        .to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_history_limit() -> usize {
    20
}

fn default_referer() -> String {
    "http://localhost:5000".to_string()
}

fn default_app_title() -> String {
    "Horizon Physics AI Assistant".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            display_name: default_display_name(),
            system_prompt: default_system_prompt(),
            timeout_seconds: default_timeout_seconds(),
            history_limit: default_history_limit(),
            referer: default_referer(),
            app_title: default_app_title(),
            sampling: SamplingConfig::default(),
        }
    }
}

/// Fixed sampling parameters sent with every completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_penalty")]
    pub frequency_penalty: f32,
    #[serde(default = "default_penalty")]
    pub presence_penalty: f32,
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_penalty() -> f32 {
    0.1
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            frequency_penalty: default_penalty(),
            presence_penalty: default_penalty(),
        }
    }
}

/// Chat behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Maximum chat message length in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Chat requests allowed per user per minute (0 disables the limiter)
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Run a live provider check on every health check
    #[serde(default = "default_check_on_health")]
    pub check_on_health: bool,
}

fn default_max_message_length() -> usize {
    2000
}

fn default_rate_limit_per_minute() -> u32 {
    60
}

fn default_check_on_health() -> bool {
    true
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            check_on_health: default_check_on_health(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Path prefix under which the routes are mounted (empty for root)
    #[serde(default)]
    pub base_path: String,

    /// Header carrying the authenticated user id, set by the session proxy
    #[serde(default = "default_user_id_header")]
    pub user_id_header: String,

    /// Header carrying the authenticated username
    #[serde(default = "default_username_header")]
    pub username_header: String,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_user_id_header() -> String {
    "x-user-id".to_string()
}

fn default_username_header() -> String {
    "x-username".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_path: String::new(),
            user_id_header: default_user_id_header(),
            username_header: default_username_header(),
        }
    }
}

/// Conversation storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; the platform data directory is used when unset
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "horizon=info,tower_http=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(HorizonError::Io)
            .with_context(|| format!("Failed to read config file {}", path))?;
        serde_yaml::from_str(&contents)
            .map_err(HorizonError::Yaml)
            .with_context(|| format!("Failed to parse config file {}", path))
    }

    fn apply_env_vars(&mut self) {
        // Provider overrides; the un-prefixed names are kept for existing deployments
        if let Some(api_key) = env_first(&["HORIZON_API_KEY", "OPENROUTER_API_KEY"]) {
            self.provider.api_key = Some(api_key);
        }

        if let Some(base_url) = env_first(&["HORIZON_BASE_URL", "OPENROUTER_BASE_URL"]) {
            self.provider.base_url = base_url;
        }

        if let Some(model) = env_first(&["HORIZON_MODEL", "OPENROUTER_MODEL"]) {
            self.provider.model = model;
        }

        if let Some(prompt) = env_first(&["HORIZON_SYSTEM_PROMPT", "AI_SYSTEM_PROMPT"]) {
            self.provider.system_prompt = prompt;
        }

        if let Some(timeout) = env_first(&["HORIZON_TIMEOUT_SECONDS"]) {
            match timeout.parse() {
                Ok(value) => self.provider.timeout_seconds = value,
                Err(_) => tracing::warn!("Invalid HORIZON_TIMEOUT_SECONDS: {}", timeout),
            }
        }

        // Assistant overrides
        if let Some(max_len) = env_first(&[
            "HORIZON_MAX_MESSAGE_LENGTH",
            "AI_ASSISTANT_MAX_MESSAGE_LENGTH",
        ]) {
            match max_len.parse() {
                Ok(value) => self.assistant.max_message_length = value,
                Err(_) => tracing::warn!("Invalid max message length: {}", max_len),
            }
        }

        if let Some(limit) = env_first(&["HORIZON_RATE_LIMIT", "AI_ASSISTANT_RATE_LIMIT"]) {
            match limit.parse() {
                Ok(value) => self.assistant.rate_limit_per_minute = value,
                Err(_) => tracing::warn!("Invalid rate limit: {}", limit),
            }
        }

        if let Some(check) = env_first(&["HORIZON_CHECK_ON_HEALTH"]) {
            match check.parse::<bool>() {
                Ok(value) => self.assistant.check_on_health = value,
                Err(_) => tracing::warn!("Invalid HORIZON_CHECK_ON_HEALTH: {}", check),
            }
        }

        // Server and storage overrides
        if let Some(bind) = env_first(&["HORIZON_BIND"]) {
            self.server.bind = bind;
        }

        if let Some(db_path) = env_first(&["HORIZON_DB_PATH"]) {
            self.storage.db_path = Some(PathBuf::from(db_path));
        }

        if let Some(json_logs) = env_first(&["HORIZON_JSON_LOGS"]) {
            match json_logs.parse::<bool>() {
                Ok(value) => self.logging.json = value,
                Err(_) => tracing::warn!("Invalid HORIZON_JSON_LOGS: {}", json_logs),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(db_path) = &cli.db {
            tracing::debug!("Using storage DB override from CLI: {}", db_path.display());
            self.storage.db_path = Some(db_path.clone());
        }

        if let crate::cli::Commands::Serve {
            bind: Some(bind), ..
        } = &cli.command
        {
            self.server.bind = bind.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.provider.base_url.trim().is_empty() {
            return Err(HorizonError::Config("provider.base_url cannot be empty".to_string()).into());
        }

        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            return Err(HorizonError::Config(format!(
                "provider.base_url must be an http(s) URL: {}",
                self.provider.base_url
            ))
            .into());
        }

        if self.provider.model.trim().is_empty() {
            return Err(HorizonError::Config("provider.model cannot be empty".to_string()).into());
        }

        if self.provider.timeout_seconds == 0 {
            return Err(HorizonError::Config(
                "provider.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.provider.history_limit == 0 {
            return Err(HorizonError::Config(
                "provider.history_limit must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.provider.sampling.temperature) {
            return Err(HorizonError::Config(
                "provider.sampling.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.assistant.max_message_length == 0 {
            return Err(HorizonError::Config(
                "assistant.max_message_length must be greater than 0".to_string(),
            )
            .into());
        }

        if !self.server.base_path.is_empty() && !self.server.base_path.starts_with('/') {
            return Err(HorizonError::Config(
                "server.base_path must start with '/'".to_string(),
            )
            .into());
        }

        if self.provider.api_key.is_none() {
            tracing::warn!("No provider API key configured; every chat will use the local fallback");
        }

        Ok(())
    }
}

/// First non-empty value among the given environment variables
fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}
