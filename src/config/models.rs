use crate::store::ProviderRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub headers: HeaderConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub include_headers: bool,
    #[serde(default)]
    pub include_body: bool,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_headers: false,
            include_body: false,
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Bearer tokens for the client and admin route groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_freeze_base_ms")]
    pub freeze_base_ms: u64,
    #[serde(default = "default_max_freeze_ms")]
    pub max_freeze_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_seconds: default_attempt_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            freeze_base_ms: default_freeze_base_ms(),
            max_freeze_ms: default_max_freeze_ms(),
        }
    }
}

impl RetryConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.freeze_base_ms),
            max: Duration::from_millis(self.max_freeze_ms),
        }
    }
}

fn default_max_attempts() -> usize {
    3
}

fn default_attempt_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_freeze_base_ms() -> u64 {
    1000
}

// 3 days
fn default_max_freeze_ms() -> u64 {
    3 * 24 * 60 * 60 * 1000
}

/// Quarantine duration after the n-th consecutive failure is
/// `min(2^n * base, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        RetryConfig::default().backoff()
    }
}

impl BackoffPolicy {
    pub fn duration_for(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
            capacity: default_cache_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

// 7 days
fn default_cache_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_cache_capacity() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderConfig {
    #[serde(default)]
    pub mode: HeaderMode,
    #[serde(default = "default_forced_headers")]
    pub force: HashMap<String, String>,
    #[serde(default)]
    pub add: HashMap<String, String>,
    #[serde(default = "default_dropped_headers")]
    pub drop: Vec<String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            mode: HeaderMode::Passthrough,
            force: default_forced_headers(),
            add: HashMap::new(),
            drop: default_dropped_headers(),
        }
    }
}

fn default_forced_headers() -> HashMap<String, String> {
    HashMap::from([(
        "accept".to_string(),
        "application/json, text/event-stream".to_string(),
    )])
}

fn default_dropped_headers() -> Vec<String> {
    [
        "x-forwarded-for",
        "x-real-ip",
        "cf-connecting-ip",
        "cf-ipcountry",
        "cf-ray",
        "cf-visitor",
        "cf-worker",
        "cf-device-type",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    Whitelist,
    Blacklist,
    #[default]
    Passthrough,
}

/// Seed records for the provider store and the optional snapshot file the
/// store persists to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
    #[serde(default)]
    pub providers: BTreeMap<String, Vec<ProviderRecord>>,
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.retry.max_attempts == 0 {
            return Err("retry max_attempts must be > 0".to_string());
        }

        if self.retry.attempt_timeout_seconds == 0 {
            return Err("retry attempt_timeout_seconds must be > 0".to_string());
        }

        if self.retry.freeze_base_ms == 0 {
            return Err("retry freeze_base_ms must be > 0".to_string());
        }

        if self.retry.max_freeze_ms < self.retry.freeze_base_ms {
            return Err("retry max_freeze_ms must not be smaller than freeze_base_ms".to_string());
        }

        if self.cache.capacity == 0 {
            return Err("cache capacity must be > 0".to_string());
        }

        if self.cache.ttl_seconds == 0 {
            return Err("cache ttl_seconds must be > 0".to_string());
        }

        if self.routing.default_model.trim().is_empty() {
            return Err("routing default_model cannot be empty".to_string());
        }

        for (model, records) in &self.store.providers {
            if model.trim().is_empty() {
                return Err("Provider list registered under an empty model name".to_string());
            }

            for (idx, record) in records.iter().enumerate() {
                record
                    .validate()
                    .map_err(|e| format!("Invalid provider {} for model '{}': {}", idx, model, e))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_freeze_ms, 259_200_000);
        assert_eq!(config.cache.capacity, 10_000);
        assert_eq!(config.cache.ttl(), Duration::from_secs(604_800));
        assert_eq!(config.routing.default_model, "gpt-4o");
        assert_eq!(config.headers.mode, HeaderMode::Passthrough);
        assert!(config.headers.drop.contains(&"x-forwarded-for".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = BackoffPolicy::default();
        for k in 1..=10u32 {
            let expected = Duration::from_millis((1u64 << k) * 1000).min(policy.max);
            assert_eq!(policy.duration_for(k), expected);
        }
        assert_eq!(policy.duration_for(1), Duration::from_secs(2));
        assert_eq!(policy.duration_for(40), Duration::from_secs(3 * 24 * 60 * 60));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config: Config = serde_yaml::from_str("{}").unwrap();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config: Config = serde_yaml::from_str("{}").unwrap();
        config.retry.freeze_base_ms = 10_000;
        config.retry.max_freeze_ms = 5_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_seed_record() {
        let yaml = r#"
store:
  providers:
    gpt-4o:
      - url: "ftp://example.com"
        token: "sk-1"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("gpt-4o"));
    }
}
