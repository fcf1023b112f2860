// Server configuration: TOML file, then TOOLBRIDGE_* environment overrides

use crate::filter::{parse_patterns, FilterError, ToolFilter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment variables that override file settings
pub const ENV_PREFIX: &str = "TOOLBRIDGE_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Filter(#[from] FilterError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Namespaces loaded from the descriptor source
    #[serde(default)]
    pub namespaces: Vec<String>,

    #[serde(default)]
    pub allow_dangerous: bool,

    #[serde(default = "default_true")]
    pub redact_secrets: bool,

    #[serde(default)]
    pub dry_run: bool,

    /// Total attempts per call, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    #[serde(default = "default_max_pagination_items")]
    pub max_pagination_items: usize,

    #[serde(default)]
    pub collect_all_pages: bool,

    #[serde(default)]
    pub enable_cache: bool,

    /// Seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Upper bound on cached results; least recently used entries are evicted
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    #[serde(default)]
    pub enable_rate_limit: bool,

    #[serde(default = "default_rate_limit_calls")]
    pub rate_limit_calls: usize,

    /// Seconds
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window: u64,

    #[serde(default)]
    pub tool_allowlist: Vec<String>,

    #[serde(default)]
    pub tool_denylist: Vec<String>,

    #[serde(default)]
    pub max_tools: Option<usize>,

    /// Reject calls that omit required arguments
    #[serde(default)]
    pub strict_arguments: bool,

    #[serde(default)]
    pub use_llm: bool,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Manifest describing namespaces and their HTTP bindings
    #[serde(default)]
    pub manifest: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_max_pagination_items() -> usize {
    100
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    1024
}

fn default_rate_limit_calls() -> usize {
    100
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            allow_dangerous: false,
            redact_secrets: default_true(),
            dry_run: false,
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            backoff_base: default_backoff_base(),
            max_pagination_items: default_max_pagination_items(),
            collect_all_pages: false,
            enable_cache: false,
            cache_ttl: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
            enable_rate_limit: false,
            rate_limit_calls: default_rate_limit_calls(),
            rate_limit_window: default_rate_limit_window(),
            tool_allowlist: Vec::new(),
            tool_denylist: Vec::new(),
            max_tools: None,
            strict_arguments: false,
            use_llm: false,
            llm_model: default_llm_model(),
            llm_base_url: default_llm_base_url(),
            log_level: default_log_level(),
            manifest: None,
        }
    }
}

impl ServerConfig {
    /// Load the file if it exists, otherwise defaults, then apply process environment overrides
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `TOOLBRIDGE_<FIELD>` variables found through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| {
            let key = format!("{}{}", ENV_PREFIX, field.to_uppercase());
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, v)) = get("namespaces") {
            self.namespaces = parse_patterns(&v);
        }
        if let Some((_, v)) = get("tool_allowlist") {
            self.tool_allowlist = parse_patterns(&v);
        }
        if let Some((_, v)) = get("tool_denylist") {
            self.tool_denylist = parse_patterns(&v);
        }

        for (field, target) in [
            ("allow_dangerous", &mut self.allow_dangerous),
            ("redact_secrets", &mut self.redact_secrets),
            ("dry_run", &mut self.dry_run),
            ("collect_all_pages", &mut self.collect_all_pages),
            ("enable_cache", &mut self.enable_cache),
            ("enable_rate_limit", &mut self.enable_rate_limit),
            ("strict_arguments", &mut self.strict_arguments),
            ("use_llm", &mut self.use_llm),
        ] {
            if let Some((_, v)) = get(field) {
                *target = parse_bool(&v);
            }
        }

        if let Some((key, v)) = get("max_retries") {
            self.max_retries = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = get("timeout_seconds") {
            self.timeout_seconds = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = get("backoff_base") {
            self.backoff_base = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = get("max_pagination_items") {
            self.max_pagination_items = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = get("cache_ttl") {
            self.cache_ttl = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = get("cache_max_entries") {
            self.cache_max_entries = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = get("rate_limit_calls") {
            self.rate_limit_calls = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = get("rate_limit_window") {
            self.rate_limit_window = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = get("max_tools") {
            self.max_tools = Some(parse_number(&key, &v)?);
        }

        if let Some((_, v)) = get("llm_model") {
            self.llm_model = v;
        }
        if let Some((_, v)) = get("llm_base_url") {
            self.llm_base_url = v;
        }
        if let Some((_, v)) = get("log_level") {
            self.log_level = v;
        }
        if let Some((_, v)) = get("manifest") {
            self.manifest = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Build the tool filter, rejecting malformed patterns
    pub fn tool_filter(&self) -> Result<ToolFilter, ConfigError> {
        Ok(ToolFilter::new(
            self.tool_allowlist.iter(),
            self.tool_denylist.iter(),
        )?)
    }

    /// Attempts per call, never less than one
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
