//! Configuration loading, validation, and management for agentrun.
//!
//! Loads configuration from `~/.agentrun/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentrun/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider credentials, keyed by provider id
    #[serde(default)]
    pub providers: CredentialSet,

    /// Orchestrator limits and defaults
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Pricing source and fallback rates
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Trace sink configuration
    #[serde(default)]
    pub tracing: TraceConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// Credentials for one provider.
///
/// Which fields are required depends on the vendor: most need `api_key`,
/// Bedrock needs `region` plus an access key pair.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the vendor base URL (proxies, self-hosted endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl ProviderCredentials {
    /// Credentials holding only an API key.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("region", &self.region)
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("session_token", &redact(&self.session_token))
            .finish()
    }
}

/// The credential set handed to the adapter factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet {
    providers: HashMap<String, ProviderCredentials>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials for a provider id.
    pub fn get(&self, provider: &str) -> Option<&ProviderCredentials> {
        self.providers.get(provider)
    }

    /// Add or replace credentials for a provider id.
    pub fn insert(&mut self, provider: impl Into<String>, credentials: ProviderCredentials) {
        self.providers.insert(provider.into(), credentials);
    }

    /// Builder-style insert.
    pub fn with(mut self, provider: impl Into<String>, credentials: ProviderCredentials) -> Self {
        self.insert(provider, credentials);
        self
    }

    fn entry(&mut self, provider: &str) -> &mut ProviderCredentials {
        self.providers.entry(provider.to_string()).or_default()
    }

    /// Configured provider ids, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Message-stack ceiling; reaching it aborts the run
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Consecutive failures after which a tool error becomes fatal
    #[serde(default = "default_max_tool_failures")]
    pub max_tool_failures: u32,

    /// Nesting ceiling for block expansion
    #[serde(default = "default_max_block_depth")]
    pub max_block_depth: usize,

    /// Name of the terminating tool
    #[serde(default = "default_finish_tool")]
    pub finish_tool: String,

    /// Tool choice for each turn: "auto", "required", "none" or a tool name
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,
}

fn default_max_messages() -> usize {
    50
}
fn default_max_tool_failures() -> u32 {
    3
}
fn default_max_block_depth() -> usize {
    50
}
fn default_finish_tool() -> String {
    "finish_agent_run".into()
}
fn default_tool_choice() -> String {
    "required".into()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_tool_failures: default_max_tool_failures(),
            max_block_depth: default_max_block_depth(),
            finish_tool: default_finish_tool(),
            tool_choice: default_tool_choice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// URL of the pricing catalog; pricing lookups are skipped when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Freshness window for cached entries
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// Fallback USD price per 1M input tokens
    #[serde(default = "default_input_per_m")]
    pub default_input_per_m: f64,

    /// Fallback USD price per 1M output tokens
    #[serde(default = "default_output_per_m")]
    pub default_output_per_m: f64,
}

fn default_ttl_hours() -> u64 {
    24
}
fn default_input_per_m() -> f64 {
    3.0
}
fn default_output_per_m() -> f64 {
    15.0
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            ttl_hours: default_ttl_hours(),
            default_input_per_m: default_input_per_m(),
            default_output_per_m: default_output_per_m(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    /// HTTP endpoint receiving trace records; tracing is off when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for TraceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

/// Environment variables holding API keys, by provider id.
const API_KEY_VARS: &[(&str, &[&str])] = &[
    ("openai", &["OPENAI_API_KEY"]),
    ("anthropic", &["ANTHROPIC_API_KEY"]),
    ("gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
    ("openrouter", &["OPENROUTER_API_KEY"]),
    ("groq", &["GROQ_API_KEY"]),
    ("deepseek", &["DEEPSEEK_API_KEY"]),
    ("mistral", &["MISTRAL_API_KEY"]),
    ("xai", &["XAI_API_KEY"]),
];

impl AppConfig {
    /// Load configuration from the default path (~/.agentrun/config.toml).
    ///
    /// Environment variables fill in anything the file leaves unset:
    /// - `<VENDOR>_API_KEY` for each API-key provider
    /// - `AWS_REGION`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`
    /// - `AGENTRUN_PRICING_URL`, `AGENTRUN_TRACE_ENDPOINT`, `AGENTRUN_TRACE_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from a specific file path, then apply the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Fill unset values from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (provider, vars) in API_KEY_VARS {
            let key = vars.iter().find_map(|var| lookup(var));
            if let Some(key) = key {
                let creds = self.providers.entry(provider);
                if creds.api_key.is_none() {
                    creds.api_key = Some(key);
                }
            }
        }

        let region = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION"));
        let access_key_id = lookup("AWS_ACCESS_KEY_ID");
        let secret_access_key = lookup("AWS_SECRET_ACCESS_KEY");
        let session_token = lookup("AWS_SESSION_TOKEN");
        if region.is_some() || access_key_id.is_some() {
            let creds = self.providers.entry("bedrock");
            creds.region = creds.region.take().or(region);
            creds.access_key_id = creds.access_key_id.take().or(access_key_id);
            creds.secret_access_key = creds.secret_access_key.take().or(secret_access_key);
            creds.session_token = creds.session_token.take().or(session_token);
        }

        if self.pricing.source_url.is_none() {
            self.pricing.source_url = lookup("AGENTRUN_PRICING_URL");
        }
        if self.tracing.endpoint.is_none() {
            self.tracing.endpoint = lookup("AGENTRUN_TRACE_ENDPOINT");
        }
        if self.tracing.api_key.is_none() {
            self.tracing.api_key = lookup("AGENTRUN_TRACE_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentrun")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.max_messages < 3 {
            return Err(ConfigError::ValidationError(
                "execution.max_messages must be at least 3".into(),
            ));
        }
        if self.execution.max_tool_failures == 0 {
            return Err(ConfigError::ValidationError(
                "execution.max_tool_failures must be at least 1".into(),
            ));
        }
        if self.execution.finish_tool.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "execution.finish_tool must not be empty".into(),
            ));
        }
        if self.pricing.ttl_hours == 0 {
            return Err(ConfigError::ValidationError(
                "pricing.ttl_hours must be > 0".into(),
            ));
        }
        if self.pricing.default_input_per_m < 0.0 || self.pricing.default_output_per_m < 0.0 {
            return Err(ConfigError::ValidationError(
                "pricing defaults must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.max_messages, 50);
        assert_eq!(config.execution.max_tool_failures, 3);
        assert_eq!(config.execution.finish_tool, "finish_agent_run");
        assert_eq!(config.pricing.ttl_hours, 24);
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = AppConfig::default_toml();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.execution.max_messages, 50);
        assert!(toml_str.contains("finish_agent_run"));
    }

    #[test]
    fn tiny_message_ceiling_rejected() {
        let mut config = AppConfig::default();
        config.execution.max_messages = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::read_file(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.execution.tool_choice, "required");
    }

    #[test]
    fn parse_provider_sections() {
        let toml_str = r#"
[providers.openai]
api_key = "sk-file"

[providers.bedrock]
region = "us-east-1"
access_key_id = "AKIA"
secret_access_key = "secret"

[execution]
max_messages = 20

[tracing]
endpoint = "https://traces.example.com/v1/records"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.get("openai").unwrap().api_key.as_deref(), Some("sk-file"));
        assert_eq!(config.providers.get("bedrock").unwrap().region.as_deref(), Some("us-east-1"));
        assert_eq!(config.execution.max_messages, 20);
        assert_eq!(config.execution.max_tool_failures, 3);
        assert!(config.tracing.endpoint.is_some());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pricing]\nttl_hours = 6").unwrap();
        let config = AppConfig::read_file(file.path()).unwrap();
        assert_eq!(config.pricing.ttl_hours, 6);
        assert!((config.pricing.default_input_per_m - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[execution\nmax_messages = ").unwrap();
        let err = AppConfig::read_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_fills_unset_keys_only() {
        let mut config = AppConfig::default();
        config
            .providers
            .insert("openai", ProviderCredentials::api_key("sk-file"));
        config.apply_env(env(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("GOOGLE_API_KEY", "g-env"),
            ("AGENTRUN_TRACE_ENDPOINT", "http://localhost:9000/traces"),
        ]));

        assert_eq!(config.providers.get("openai").unwrap().api_key.as_deref(), Some("sk-file"));
        assert_eq!(config.providers.get("gemini").unwrap().api_key.as_deref(), Some("g-env"));
        assert!(config.providers.get("anthropic").is_none());
        assert_eq!(
            config.tracing.endpoint.as_deref(),
            Some("http://localhost:9000/traces")
        );
    }

    #[test]
    fn env_populates_bedrock() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("AWS_DEFAULT_REGION", "eu-west-1"),
            ("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "shh"),
        ]));
        let bedrock = config.providers.get("bedrock").unwrap();
        assert_eq!(bedrock.region.as_deref(), Some("eu-west-1"));
        assert_eq!(bedrock.secret_access_key.as_deref(), Some("shh"));
        assert!(bedrock.session_token.is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = ProviderCredentials::api_key("sk-very-secret");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
