use crate::error::{ProxyError, Result};
use crate::translate::request::DEFAULT_SYSTEM_PROMPT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://api.inference.wandb.ai/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Inline key; takes precedence over `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Client keys accepted by the proxy. Empty (together with the env var) means open.
    #[serde(default, skip_serializing)]
    pub allowed_keys: Vec<String>,
    #[serde(default = "default_allowed_keys_env")]
    pub allowed_keys_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
}

fn default_port() -> u16 {
    8000
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    "WANDB_API_KEY".to_string()
}

fn default_user_agent() -> String {
    format!("wandb-openai-proxy/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_allowed_keys_env() -> String {
    "APIKEYS".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_cache_max_age_secs() -> u64 {
    3600
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            upstream: UpstreamConfig::default(),
            auth: AuthConfig::default(),
            translation: TranslationConfig::default(),
            models: ModelsConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            api_key: None,
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allowed_keys: Vec::new(),
            allowed_keys_env: default_allowed_keys_env(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: default_system_prompt(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            cache_max_age_secs: default_cache_max_age_secs(),
        }
    }
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Apply process environment overrides (`PORT`).
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ProxyError::config(format!("Invalid PORT value '{port}'")))?;
        }
        Ok(())
    }

    /// The upstream URL for an endpoint path such as `/chat/completions`.
    pub fn upstream_url(&self, path: &str) -> String {
        format!("{}{}", self.upstream.base_url.trim_end_matches('/'), path)
    }

    /// Resolve the W&B API key from inline config or the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.upstream.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }

        std::env::var(&self.upstream.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ProxyError::config(format!(
                    "Environment variable '{}' not set. Set it with your W&B API key.",
                    self.upstream.api_key_env
                ))
            })
    }

    /// Client keys the proxy accepts: the configured list plus the comma-separated env var.
    pub fn allowed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .auth
            .allowed_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if let Ok(raw) = std::env::var(&self.auth.allowed_keys_env) {
            keys.extend(parse_key_list(&raw));
        }
        keys
    }
}

/// Split a comma-separated key list, trimming blanks.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("wandb-proxy.toml")];

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("wandb-proxy").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("wandb-proxy").join("config.toml"));
        paths.push(home.join(".wandb-proxy.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
