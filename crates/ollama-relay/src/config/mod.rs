use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{RelayAppError, Result};

/// Environment variable naming the upstream base URL
pub const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";
/// Environment variable holding the request timeout in milliseconds
pub const ENV_API_TIMEOUT_DURATION: &str = "API_TIMEOUT_DURATION";
/// Environment variable enabling NDJSON streaming from the upstream ("true")
pub const ENV_OLLAMA_STREAM: &str = "OLLAMA_STREAM";
/// Environment variable overriding the default system prompt
pub const ENV_DEFAULT_SYSTEM_PROMPT: &str = "DEFAULT_SYSTEM_PROMPT";
/// Environment variable overriding the default temperature
pub const ENV_DEFAULT_TEMPERATURE: &str = "DEFAULT_TEMPERATURE";

/// Main configuration structure for Ollama Relay
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Upstream generation service
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Outbound forwarding behaviour
    #[serde(default)]
    pub relay: RelayConfig,
    /// Request defaults applied when the caller leaves a field out
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// HTTP front end
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream generation service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the Ollama instance (e.g., "http://127.0.0.1:11434")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Maximum lifetime of one upstream call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Ask the upstream for newline-delimited JSON instead of a single object
    #[serde(default)]
    pub stream: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            stream: false,
        }
    }
}

impl UpstreamConfig {
    /// Full URL of the generate endpoint
    pub fn generate_url(&self) -> Result<Url> {
        let raw = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let url = Url::parse(&raw)
            .map_err(|e| RelayAppError::Config(format!("Invalid upstream URL '{raw}': {e}")))?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(RelayAppError::Config(format!(
                "Unsupported upstream scheme '{scheme}': only http and https are allowed"
            )));
        }

        Ok(url)
    }

    /// Host as shown to users in connection errors
    pub fn display_host(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_timeout_ms() -> u64 {
    600_000
}

/// How fragments are written to the outbound stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingMode {
    /// One write per fragment
    Whole,
    /// One write per whitespace/non-whitespace token, rate limited
    #[default]
    Paced,
}

impl ForwardingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardingMode::Whole => "whole",
            ForwardingMode::Paced => "paced",
        }
    }
}

/// Outbound forwarding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Forwarding mode for fragments
    #[serde(default)]
    pub forwarding: ForwardingMode,
    /// Minimum delay between token writes in paced mode
    #[serde(default = "default_token_delay_ms")]
    pub token_delay_ms: u64,
    /// Number of pending writes buffered before the producer suspends
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            forwarding: ForwardingMode::default(),
            token_delay_ms: default_token_delay_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RelayConfig {
    pub fn token_delay(&self) -> Duration {
        Duration::from_millis(self.token_delay_ms)
    }
}

fn default_token_delay_ms() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    32
}

/// Defaults for optional request fields
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    /// System prompt used when the caller sends none (or an empty one)
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Sampling temperature used when the caller sends none
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are a helpful AI assistant. Follow the user's instructions carefully. Respond using markdown.".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

/// HTTP front end configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Config {
    /// Load configuration from an explicit path, or the first default location that exists
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for path in Self::default_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayAppError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| RelayAppError::Config(format!("Failed to parse config: {e}")))
    }

    fn default_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|h| h.join(".ollama-relay").join("config.toml")),
            dirs::config_dir().map(|c| c.join("ollama-relay").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_OLLAMA_HOST) {
            if !host.trim().is_empty() {
                self.upstream.base_url = host.trim().to_string();
            }
        }

        if let Some(timeout) = lookup(ENV_API_TIMEOUT_DURATION) {
            self.upstream.timeout_ms = timeout.trim().parse().map_err(|e| {
                RelayAppError::Config(format!(
                    "{ENV_API_TIMEOUT_DURATION} must be an integer number of milliseconds: {e}"
                ))
            })?;
        }

        // Only the literal "true" enables streaming
        if let Some(stream) = lookup(ENV_OLLAMA_STREAM) {
            self.upstream.stream = stream.trim() == "true";
        }

        if let Some(prompt) = lookup(ENV_DEFAULT_SYSTEM_PROMPT) {
            if !prompt.is_empty() {
                self.defaults.system_prompt = prompt;
            }
        }

        if let Some(temperature) = lookup(ENV_DEFAULT_TEMPERATURE) {
            self.defaults.temperature = temperature.trim().parse().map_err(|e| {
                RelayAppError::Config(format!("{ENV_DEFAULT_TEMPERATURE} must be a number: {e}"))
            })?;
        }

        Ok(())
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.upstream.generate_url()?;

        if self.upstream.timeout_ms == 0 {
            return Err(RelayAppError::Config(
                "upstream.timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.relay.channel_capacity == 0 {
            return Err(RelayAppError::Config(
                "relay.channel_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:11434");
        assert_eq!(config.upstream.timeout_ms, 600_000);
        assert!(!config.upstream.stream);
        assert_eq!(config.relay.forwarding, ForwardingMode::Paced);
        assert_eq!(config.relay.token_delay_ms, 10);
        assert_eq!(config.relay.channel_capacity, 32);
        assert_eq!(config.defaults.temperature, 1.0);
        assert!(!config.defaults.system_prompt.is_empty());
        assert_eq!(config.server.listen_addr, "127.0.0.1:3000");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[upstream]
base_url = "http://gpu-box:11434"
timeout_ms = 30000
stream = true

[relay]
forwarding = "whole"
token_delay_ms = 25
channel_capacity = 8

[defaults]
system_prompt = "Be terse."
temperature = 0.2

[server]
listen_addr = "0.0.0.0:8080"
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.upstream.base_url, "http://gpu-box:11434");
        assert_eq!(config.upstream.timeout_ms, 30000);
        assert!(config.upstream.stream);
        assert_eq!(config.relay.forwarding, ForwardingMode::Whole);
        assert_eq!(config.relay.token_delay_ms, 25);
        assert_eq!(config.relay.channel_capacity, 8);
        assert_eq!(config.defaults.system_prompt, "Be terse.");
        assert!((config.defaults.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[upstream]
stream = true
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse partial TOML");

        assert!(config.upstream.stream);
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:11434");
        assert_eq!(config.relay.forwarding, ForwardingMode::Paced);
        assert_eq!(config.server.listen_addr, "127.0.0.1:3000");
    }

    #[test]
    fn test_unknown_forwarding_mode_rejected() {
        let toml_str = r#"
[relay]
forwarding = "bursty"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_generate_url() {
        let mut upstream = UpstreamConfig::default();
        assert_eq!(
            upstream.generate_url().unwrap().as_str(),
            "http://127.0.0.1:11434/api/generate"
        );

        upstream.base_url = "https://ollama.internal/".to_string();
        assert_eq!(
            upstream.generate_url().unwrap().as_str(),
            "https://ollama.internal/api/generate"
        );
        assert_eq!(upstream.display_host(), "https://ollama.internal");
    }

    #[test]
    fn test_generate_url_rejects_bad_values() {
        let upstream = UpstreamConfig {
            base_url: "not a url".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(upstream.generate_url().is_err());

        let upstream = UpstreamConfig {
            base_url: "ftp://example.com".to_string(),
            ..UpstreamConfig::default()
        };
        let err = upstream.generate_url().unwrap_err().to_string();
        assert!(err.contains("ftp"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                (ENV_OLLAMA_HOST, "http://10.1.1.1:11434"),
                (ENV_API_TIMEOUT_DURATION, "1500"),
                (ENV_OLLAMA_STREAM, "true"),
                (ENV_DEFAULT_SYSTEM_PROMPT, "Answer in French."),
                (ENV_DEFAULT_TEMPERATURE, "0.5"),
            ]))
            .unwrap();

        assert_eq!(config.upstream.base_url, "http://10.1.1.1:11434");
        assert_eq!(config.upstream.timeout_ms, 1500);
        assert!(config.upstream.stream);
        assert_eq!(config.defaults.system_prompt, "Answer in French.");
        assert!((config.defaults.temperature - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_stream_override_requires_literal_true() {
        let mut config = Config::default();
        config.upstream.stream = true;
        config
            .apply_overrides(lookup_from(&[(ENV_OLLAMA_STREAM, "yes")]))
            .unwrap();
        assert!(!config.upstream.stream);
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                (ENV_OLLAMA_HOST, "  "),
                (ENV_DEFAULT_SYSTEM_PROMPT, ""),
            ]))
            .unwrap();
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:11434");
        assert_eq!(
            config.defaults.system_prompt,
            DefaultsConfig::default().system_prompt
        );
    }

    #[test]
    fn test_invalid_timeout_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(lookup_from(&[(ENV_API_TIMEOUT_DURATION, "soon")]));
        assert!(matches!(result, Err(RelayAppError::Config(_))));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.upstream.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[upstream]\nbase_url = \"http://localhost:9999\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.upstream.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let result = Config::load(Some(&path));
        assert!(matches!(result, Err(RelayAppError::Config(_))));
    }
}
