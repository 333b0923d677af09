//! Runtime configuration.
//!
//! Loaded from YAML with human-readable durations (`"150ms"`, `"30s"`).
//! Every numeric threshold lives here; nothing in the cascade is hardcoded.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use triage_core::ModelTier;

use crate::resilience::CircuitBreakerConfig;

/// Environment variable overriding the request deadline.
pub const ENV_REQUEST_DEADLINE: &str = "TRIAGE_REQUEST_DEADLINE";

/// Environment variable overriding the cache TTL.
pub const ENV_CACHE_TTL: &str = "TRIAGE_CACHE_TTL";

/// Environment variable re-pointing every HTTP tier at one base URL.
pub const ENV_BACKEND_URL: &str = "TRIAGE_BACKEND_URL";

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid duration in {var}: {message}")]
    Duration { var: String, message: String },

    #[error("Config validation failed: {0}")]
    Invalid(String),
}

pub(crate) mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Where a tier's backend lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointConfig {
    /// In-process rules engine
    Local,

    /// Remote inference server
    Http {
        base_url: String,
        model_name: String,

        /// Environment variable holding a bearer token, if the server needs one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_token_env: Option<String>,
    },
}

impl EndpointConfig {
    pub fn http(base_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self::Http {
            base_url: base_url.into(),
            model_name: model_name.into(),
            auth_token_env: None,
        }
    }

    /// Backend factory that serves this endpoint.
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointConfig::Local => "local",
            EndpointConfig::Http { .. } => "http",
        }
    }
}

/// Static configuration for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Confidence at or above which the cascade stops at this tier
    pub stop_confidence: f64,

    /// Per-attempt timeout
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// p95 latency target, reported in events only
    #[serde(with = "humantime_duration")]
    pub latency_target: Duration,

    pub endpoint: EndpointConfig,
}

/// Per-tier configuration for the three backend tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfigs {
    pub rules: TierConfig,
    pub zero_shot: TierConfig,
    pub distilbert: TierConfig,
}

impl TierConfigs {
    /// Configuration for a backend tier. `Hybrid` has none and maps to the
    /// terminal tier.
    pub fn get(&self, tier: ModelTier) -> &TierConfig {
        match tier {
            ModelTier::Rules => &self.rules,
            ModelTier::ZeroShot => &self.zero_shot,
            ModelTier::DistilBert | ModelTier::Hybrid => &self.distilbert,
        }
    }

    fn get_mut(&mut self, tier: ModelTier) -> &mut TierConfig {
        match tier {
            ModelTier::Rules => &mut self.rules,
            ModelTier::ZeroShot => &mut self.zero_shot,
            ModelTier::DistilBert | ModelTier::Hybrid => &mut self.distilbert,
        }
    }
}

impl Default for TierConfigs {
    fn default() -> Self {
        let base_url = "http://localhost:8080";
        Self {
            rules: TierConfig {
                stop_confidence: 0.90,
                timeout: Duration::from_millis(150),
                latency_target: Duration::from_millis(50),
                endpoint: EndpointConfig::Local,
            },
            zero_shot: TierConfig {
                stop_confidence: 0.80,
                timeout: Duration::from_millis(150),
                latency_target: Duration::from_millis(200),
                endpoint: EndpointConfig::http(base_url, "zero_shot"),
            },
            distilbert: TierConfig {
                // Terminal tier: always accepted.
                stop_confidence: 0.0,
                timeout: Duration::from_millis(400),
                latency_target: Duration::from_millis(100),
                endpoint: EndpointConfig::http(base_url, "distilbert"),
            },
        }
    }
}

/// Retry policy for transient inference failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first
    pub max_retries: u32,

    #[serde(with = "humantime_duration")]
    pub base_delay: Duration,

    #[serde(with = "humantime_duration")]
    pub max_delay: Duration,

    pub factor: f32,

    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            factor: 2.0,
            jitter: true,
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    #[serde(with = "humantime_duration")]
    pub ttl: Duration,

    pub max_entries: u64,

    /// Explicit version tag; defaults to a fingerprint of the tier config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Take a set-if-not-exists lock on the backend before computing
    pub distributed_lock: bool,

    #[serde(with = "humantime_duration")]
    pub lock_ttl: Duration,

    #[serde(with = "humantime_duration")]
    pub lock_poll_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            version: None,
            distributed_lock: false,
            lock_ttl: Duration::from_secs(2),
            lock_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Strategy router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Texts with at most this many tokens get a rules-only plan
    pub fast_path_max_tokens: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { fast_path_max_tokens: 1 }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Overall per-request SLA ceiling
    #[serde(with = "humantime_duration")]
    pub request_deadline: Duration,

    /// Longer input is rejected as a bad request
    pub max_text_chars: usize,

    pub tiers: TierConfigs,

    pub retry: RetryConfig,

    pub circuit_breaker: CircuitBreakerConfig,

    pub cache: CacheConfig,

    pub router: RouterConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_millis(200),
            max_text_chars: 10_000,
            tiers: TierConfigs::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse from a YAML string. Missing sections take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file, then apply environment overrides.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Apply `TRIAGE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_REQUEST_DEADLINE) {
            self.request_deadline = parse_env_duration(ENV_REQUEST_DEADLINE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CACHE_TTL) {
            self.cache.ttl = parse_env_duration(ENV_CACHE_TTL, &raw)?;
        }
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            for tier in ModelTier::CASCADE {
                if let EndpointConfig::Http { base_url, .. } = &mut self.tiers.get_mut(tier).endpoint {
                    *base_url = url.clone();
                }
            }
        }
        Ok(())
    }

    /// Reject configurations the cascade cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_deadline.is_zero() {
            return Err(ConfigError::Invalid("request_deadline must be positive".into()));
        }
        if self.max_text_chars == 0 {
            return Err(ConfigError::Invalid("max_text_chars must be positive".into()));
        }

        for tier in ModelTier::CASCADE {
            let tc = self.tiers.get(tier);
            if !(0.0..=1.0).contains(&tc.stop_confidence) {
                return Err(ConfigError::Invalid(format!(
                    "{tier}: stop_confidence {} outside [0, 1]",
                    tc.stop_confidence
                )));
            }
            if tc.timeout.is_zero() {
                return Err(ConfigError::Invalid(format!("{tier}: timeout must be positive")));
            }
            if let EndpointConfig::Http { base_url, model_name, .. } = &tc.endpoint {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(ConfigError::Invalid(format!(
                        "{tier}: base_url must start with http:// or https://"
                    )));
                }
                if model_name.is_empty() {
                    return Err(ConfigError::Invalid(format!("{tier}: model_name is empty")));
                }
            }
            if tc.timeout > self.request_deadline {
                tracing::warn!(
                    tier = %tier,
                    timeout = ?tc.timeout,
                    deadline = ?self.request_deadline,
                    "Tier timeout exceeds request deadline; attempts will be clamped"
                );
            }
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid("circuit_breaker.failure_threshold must be positive".into()));
        }
        if !(self.retry.factor > 0.0) {
            return Err(ConfigError::Invalid("retry.factor must be positive".into()));
        }
        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(ConfigError::Invalid("cache.ttl must be positive".into()));
        }

        Ok(())
    }

    /// Fingerprint of everything that affects a classification.
    ///
    /// Used as the cache version tag so a config change invalidates old
    /// entries. An explicit `cache.version` wins.
    pub fn version_tag(&self) -> String {
        if let Some(version) = &self.cache.version {
            return version.clone();
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        for tier in ModelTier::CASCADE {
            let tc = self.tiers.get(tier);
            hasher.update(tier.as_str().as_bytes());
            hasher.update(&tc.stop_confidence.to_le_bytes());
            match &tc.endpoint {
                EndpointConfig::Local => {
                    hasher.update(b"local");
                }
                EndpointConfig::Http { model_name, .. } => {
                    hasher.update(b"http");
                    hasher.update(model_name.as_bytes());
                }
            }
        }
        hasher.update(&(self.router.fast_path_max_tokens as u64).to_le_bytes());

        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

fn parse_env_duration(var: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw).map_err(|e| ConfigError::Duration {
        var: var.to_string(),
        message: e.to_string(),
    })
}
