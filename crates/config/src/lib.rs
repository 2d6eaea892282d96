//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use parley_core::PersonaSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the language-model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Language-model provider endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Model routes per generation profile
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Token budget and summarization policy
    #[serde(default)]
    pub context: ContextConfig,

    /// Branch timeouts and the fallback reply
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Session registry bounds
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Conversation store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Knowledge enrichment service
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Persona files and overrides
    #[serde(default)]
    pub persona: PersonaConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("generation", &self.generation)
            .field("context", &self.context)
            .field("orchestrator", &self.orchestrator)
            .field("sessions", &self.sessions)
            .field("store", &self.store)
            .field("knowledge", &self.knowledge)
            .field("persona", &self.persona)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name used in logs
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_provider_name() -> String {
    "openrouter".into()
}
fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_url: default_api_url(),
        }
    }
}

/// One model route: which model, how hot, how long.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Used when no tool produced a result
    #[serde(default = "default_persona_chat")]
    pub persona_chat: ProfileConfig,

    /// Used when a tool result is part of the prompt
    #[serde(default = "default_tool_aware")]
    pub tool_aware: ProfileConfig,

    /// Used to fold old messages into a summary
    #[serde(default = "default_summarizer")]
    pub summarizer: ProfileConfig,

    /// Upper bound on a single model call
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_persona_chat() -> ProfileConfig {
    ProfileConfig {
        model: "sao10k/l3.1-euryale-70b".into(),
        temperature: 0.8,
        max_tokens: Some(512),
    }
}
fn default_tool_aware() -> ProfileConfig {
    ProfileConfig {
        model: "anthropic/claude-3.5-sonnet".into(),
        temperature: 0.7,
        max_tokens: Some(512),
    }
}
fn default_summarizer() -> ProfileConfig {
    ProfileConfig {
        model: "openai/gpt-4-turbo".into(),
        temperature: 0.3,
        max_tokens: Some(400),
    }
}
fn default_generation_timeout() -> u64 {
    60
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            persona_chat: default_persona_chat(),
            tool_aware: default_tool_aware(),
            summarizer: default_summarizer(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Estimated tokens above which the conversation is summarized
    #[serde(default = "default_token_threshold")]
    pub token_threshold: usize,

    /// Most recent messages kept verbatim by a summarization (K)
    #[serde(default = "default_retain_recent")]
    pub retain_recent: usize,

    /// Active messages required before summarization does anything
    #[serde(default = "default_min_messages")]
    pub min_messages_to_summarize: usize,

    /// Messages rendered into the prompt transcript
    #[serde(default = "default_display_window")]
    pub display_window: usize,
}

fn default_token_threshold() -> usize {
    3000
}
fn default_retain_recent() -> usize {
    20
}
fn default_min_messages() -> usize {
    21
}
fn default_display_window() -> usize {
    20
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_threshold: default_token_threshold(),
            retain_recent: default_retain_recent(),
            min_messages_to_summarize: default_min_messages(),
            display_window: default_display_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_context_timeout")]
    pub context_timeout_ms: u64,

    #[serde(default = "default_enrichment_timeout")]
    pub enrichment_timeout_ms: u64,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_ms: u64,

    /// Returned to the user whenever a turn fails
    #[serde(default = "default_apology")]
    pub apology: String,
}

fn default_context_timeout() -> u64 {
    5_000
}
fn default_enrichment_timeout() -> u64 {
    3_000
}
fn default_tool_timeout() -> u64 {
    10_000
}
fn default_apology() -> String {
    "Gomen ne~ I had a little technical difficulty! (⌒_⌒;)".into()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_timeout_ms: default_context_timeout(),
            enrichment_timeout_ms: default_enrichment_timeout(),
            tool_timeout_ms: default_tool_timeout(),
            apology: default_apology(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Active sessions kept in memory before the least recent is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle time after which a session is dropped from memory
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,

    /// Recent messages mirrored per session
    #[serde(default = "default_mirror_limit")]
    pub mirror_limit: usize,
}

fn default_max_sessions() -> usize {
    10_000
}
fn default_idle_ttl() -> u64 {
    3_600
}
fn default_mirror_limit() -> usize {
    40
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_ttl_secs: default_idle_ttl(),
            mirror_limit: default_mirror_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Database file; defaults to `~/.parley/parley.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Connection retry policy used at startup
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay() -> u64 {
    50
}
fn default_max_delay() -> u64 {
    2_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Graph-RAG query endpoint
    #[serde(default = "default_knowledge_endpoint")]
    pub endpoint: String,

    /// Messages with fewer words skip enrichment
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

fn default_knowledge_endpoint() -> String {
    "http://127.0.0.1:8765/query".into()
}
fn default_min_words() -> usize {
    3
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_knowledge_endpoint(),
            min_words: default_min_words(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Directory holding PERSONA.md / STYLE.md; defaults to `~/.parley/persona`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Inline system prompt, replaces persona files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PARLEY_API_KEY` (highest priority), `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    /// - `PARLEY_STORE_PATH`
    /// - `PARLEY_KNOWLEDGE_URL` (also enables enrichment)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        config.validate()?;
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

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("PARLEY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(path) = std::env::var("PARLEY_STORE_PATH") {
            self.store.path = Some(path);
        }

        if let Ok(url) = std::env::var("PARLEY_KNOWLEDGE_URL") {
            self.knowledge.endpoint = url;
            self.knowledge.enabled = true;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Resolved database file path.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("parley.db"))
    }

    /// Where the persona comes from, with the default directory filled in.
    pub fn persona_source(&self) -> PersonaSource {
        PersonaSource {
            dir: Some(
                self.persona
                    .dir
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| Self::config_dir().join("persona")),
            ),
            system_prompt_override: self.persona.system_prompt.clone(),
            welcome_override: self.persona.welcome_message.clone(),
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, profile) in [
            ("persona_chat", &self.generation.persona_chat),
            ("tool_aware", &self.generation.tool_aware),
            ("summarizer", &self.generation.summarizer),
        ] {
            if profile.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "generation.{name}.model must not be empty"
                )));
            }
            if !(0.0..=2.0).contains(&profile.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "generation.{name}.temperature must be between 0.0 and 2.0"
                )));
            }
        }

        if self.context.retain_recent == 0 {
            return Err(ConfigError::ValidationError(
                "context.retain_recent must be > 0".into(),
            ));
        }

        if self.context.min_messages_to_summarize <= self.context.retain_recent {
            return Err(ConfigError::ValidationError(
                "context.min_messages_to_summarize must be greater than context.retain_recent".into(),
            ));
        }

        if self.context.token_threshold == 0 || self.context.display_window == 0 {
            return Err(ConfigError::ValidationError(
                "context.token_threshold and context.display_window must be > 0".into(),
            ));
        }

        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "sessions.max_sessions must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "in_memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"in_memory\", got \"{}\"",
                self.store.backend
            )));
        }

        if self.store.retry.max_attempts == 0 || self.store.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "store.retry needs max_attempts >= 1 and backoff_multiplier >= 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            generation: GenerationConfig::default(),
            context: ContextConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            sessions: SessionsConfig::default(),
            store: StoreConfig::default(),
            knowledge: KnowledgeConfig::default(),
            persona: PersonaConfig::default(),
            gateway: GatewayConfig::default(),
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
}
