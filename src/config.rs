//! Configuration management for Turnstile.
//!
//! Configuration comes either from the process environment (optionally seeded
//! from a `.env` file) or from a YAML file. Environment loading never fails:
//! malformed numbers fall back to built-in defaults and malformed token
//! overrides are dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Result, TurnstileError};

/// Default requests per window for IP keys.
pub const DEFAULT_IP_RATE_LIMIT: u64 = 10;
/// Default block duration in seconds for IP keys.
pub const DEFAULT_IP_BLOCK_TIME_SECS: u64 = 300;
/// Default HTTP port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

const TOKEN_PREFIX: &str = "TOKEN_";
const TOKEN_LIMIT_SUFFIX: &str = "_LIMIT";
const TOKEN_BLOCK_TIME_SUFFIX: &str = "_BLOCK_TIME";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting policy configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
        }
    }
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

/// Rate limiting policy configuration.
///
/// Token overrides for the limit and the block time are independent: a token
/// that only overrides one of them inherits the other from the IP tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests per window for IP keys
    #[serde(default = "default_ip_rate_limit")]
    pub ip_rate_limit: u64,

    /// Block duration in seconds for IP keys
    #[serde(default = "default_ip_block_time")]
    pub ip_block_time_secs: u64,

    /// Per-token request limits, keyed by token value
    #[serde(default)]
    pub token_limits: HashMap<String, u64>,

    /// Per-token block durations in seconds, keyed by token value
    #[serde(default)]
    pub token_block_times: HashMap<String, u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            ip_rate_limit: default_ip_rate_limit(),
            ip_block_time_secs: default_ip_block_time(),
            token_limits: HashMap::new(),
            token_block_times: HashMap::new(),
        }
    }
}

fn default_ip_rate_limit() -> u64 {
    DEFAULT_IP_RATE_LIMIT
}

fn default_ip_block_time() -> u64 {
    DEFAULT_IP_BLOCK_TIME_SECS
}

/// Which storage backend holds rate limit records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process map, lost on restart
    #[default]
    Memory,
    /// External Redis server
    Redis,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "redis" => Ok(StorageBackend::Redis),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => f.write_str("memory"),
            StorageBackend::Redis => f.write_str("redis"),
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: StorageBackend,

    /// Redis host
    #[serde(default = "default_redis_host")]
    pub host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Redis password
    #[serde(default)]
    pub password: Option<String>,

    /// Redis logical database
    #[serde(default)]
    pub db: i64,

    /// Per-command deadline in milliseconds
    #[serde(default = "default_redis_timeout")]
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            timeout_ms: default_redis_timeout(),
        }
    }
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_timeout() -> u64 {
    1000
}

impl StorageConfig {
    /// Build the `redis://` connection URL.
    pub fn redis_url(&self) -> String {
        match self.password.as_deref() {
            Some(password) if !password.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Deadline applied to every backend command.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl TurnstileConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of environment variables.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let mut config = TurnstileConfig::default();

        config.rate_limiting.ip_rate_limit =
            parse_var(&vars, "IP_RATE_LIMIT", DEFAULT_IP_RATE_LIMIT, |v| *v > 0);
        config.rate_limiting.ip_block_time_secs =
            parse_var(&vars, "IP_BLOCK_TIME", DEFAULT_IP_BLOCK_TIME_SECS, |_| true);
        config.server.port = parse_var(&vars, "SERVER_PORT", DEFAULT_SERVER_PORT, |_| true);

        if let Some(backend) = non_empty(&vars, "STORAGE_BACKEND") {
            match backend.parse() {
                Ok(backend) => config.storage.backend = backend,
                Err(e) => warn!(error = %e, "Ignoring STORAGE_BACKEND, using memory"),
            }
        }
        if let Some(host) = non_empty(&vars, "REDIS_HOST") {
            config.storage.host = host.to_string();
        }
        config.storage.port = parse_var(&vars, "REDIS_PORT", default_redis_port(), |_| true);
        config.storage.password = non_empty(&vars, "REDIS_PASSWORD").map(str::to_string);
        config.storage.db = parse_var(&vars, "REDIS_DB", 0, |_| true);
        config.storage.timeout_ms =
            parse_var(&vars, "REDIS_TIMEOUT_MS", default_redis_timeout(), |v| *v > 0);

        for (name, value) in &vars {
            let Some(rest) = name.strip_prefix(TOKEN_PREFIX) else {
                continue;
            };

            if let Some(token) = rest.strip_suffix(TOKEN_BLOCK_TIME_SUFFIX) {
                match value.trim().parse::<u64>() {
                    Ok(secs) => {
                        config
                            .rate_limiting
                            .token_block_times
                            .insert(token.to_string(), secs);
                    }
                    Err(_) => warn!(variable = %name, "Dropping malformed token block time"),
                }
            } else if let Some(token) = rest.strip_suffix(TOKEN_LIMIT_SUFFIX) {
                match value.trim().parse::<u64>() {
                    Ok(limit) if limit > 0 => {
                        config
                            .rate_limiting
                            .token_limits
                            .insert(token.to_string(), limit);
                    }
                    _ => warn!(variable = %name, "Dropping malformed token limit"),
                }
            }
        }

        config
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration file");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits that can never admit a request.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.ip_rate_limit == 0 {
            return Err(TurnstileError::Config(
                "ip_rate_limit must be greater than zero".to_string(),
            ));
        }
        if let Some((token, _)) = self
            .rate_limiting
            .token_limits
            .iter()
            .find(|(_, limit)| **limit == 0)
        {
            return Err(TurnstileError::Config(format!(
                "token limit for '{}' must be greater than zero",
                token
            )));
        }
        Ok(())
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Parse a numeric variable, substituting `default` when it is missing,
/// unparseable or rejected by `accept`.
fn parse_var<T, F>(vars: &HashMap<String, String>, name: &str, default: T, accept: F) -> T
where
    T: FromStr + fmt::Display + Copy,
    F: Fn(&T) -> bool,
{
    let Some(raw) = non_empty(vars, name) else {
        return default;
    };

    match raw.parse::<T>() {
        Ok(value) if accept(&value) => value,
        _ => {
            warn!(variable = name, value = raw, default = %default, "Malformed value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::from_vars(Vec::new());

        assert_eq!(config.rate_limiting.ip_rate_limit, 10);
        assert_eq!(config.rate_limiting.ip_block_time_secs, 300);
        assert_eq!(config.server.port, 8080);
        assert!(config.rate_limiting.token_limits.is_empty());
        assert!(config.rate_limiting.token_block_times.is_empty());
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.host, "localhost");
        assert_eq!(config.storage.port, 6379);
        assert_eq!(config.storage.db, 0);
    }

    #[test]
    fn test_env_overrides() {
        let config = TurnstileConfig::from_vars(vars(&[
            ("IP_RATE_LIMIT", "20"),
            ("IP_BLOCK_TIME", "600"),
            ("SERVER_PORT", "9000"),
            ("TOKEN_TEST_LIMIT", "50"),
            ("TOKEN_TEST_BLOCK_TIME", "120"),
            ("TOKEN_PROD_LIMIT", "200"),
            ("TOKEN_PROD_BLOCK_TIME", "900"),
            ("STORAGE_BACKEND", "redis"),
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_DB", "3"),
        ]));

        assert_eq!(config.rate_limiting.ip_rate_limit, 20);
        assert_eq!(config.rate_limiting.ip_block_time_secs, 600);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.rate_limiting.token_limits["TEST"], 50);
        assert_eq!(config.rate_limiting.token_block_times["TEST"], 120);
        assert_eq!(config.rate_limiting.token_limits["PROD"], 200);
        assert_eq!(config.rate_limiting.token_block_times["PROD"], 900);
        assert_eq!(config.storage.backend, StorageBackend::Redis);
        assert_eq!(config.storage.host, "cache.internal");
        assert_eq!(config.storage.db, 3);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = TurnstileConfig::from_vars(vars(&[
            ("IP_RATE_LIMIT", "invalid"),
            ("IP_BLOCK_TIME", "not-a-number"),
            ("SERVER_PORT", "99999"),
            ("TOKEN_INVALID_LIMIT", "abc"),
            ("TOKEN_INVALID_BLOCK_TIME", "-5"),
        ]));

        assert_eq!(config.rate_limiting.ip_rate_limit, 10);
        assert_eq!(config.rate_limiting.ip_block_time_secs, 300);
        assert_eq!(config.server.port, 8080);
        assert!(!config.rate_limiting.token_limits.contains_key("INVALID"));
        assert!(!config.rate_limiting.token_block_times.contains_key("INVALID"));
    }

    #[test]
    fn test_zero_limit_is_malformed() {
        let config = TurnstileConfig::from_vars(vars(&[
            ("IP_RATE_LIMIT", "0"),
            ("TOKEN_ZERO_LIMIT", "0"),
        ]));

        assert_eq!(config.rate_limiting.ip_rate_limit, 10);
        assert!(!config.rate_limiting.token_limits.contains_key("ZERO"));
    }

    #[test]
    fn test_unknown_backend_keeps_memory() {
        let config = TurnstileConfig::from_vars(vars(&[("STORAGE_BACKEND", "etcd")]));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_redis_url() {
        let mut storage = StorageConfig::default();
        assert_eq!(storage.redis_url(), "redis://localhost:6379/0");

        storage.password = Some("p@ss word".to_string());
        storage.db = 2;
        assert_eq!(storage.redis_url(), "redis://:p%40ss%20word@localhost:6379/2");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  port: 9100
rate_limiting:
  ip_rate_limit: 2
  ip_block_time_secs: 60
  token_limits:
    ABC123: 5
storage:
  backend: redis
  timeout_ms: 250
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.rate_limiting.ip_rate_limit, 2);
        assert_eq!(config.rate_limiting.token_limits["ABC123"], 5);
        assert!(config.rate_limiting.token_block_times.is_empty());
        assert_eq!(config.storage.backend, StorageBackend::Redis);
        assert_eq!(config.storage.command_timeout(), Duration::from_millis(250));
        assert_eq!(config.storage.host, "localhost");
    }

    #[test]
    fn test_example_file_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/turnstile.example.yaml");
        let config = TurnstileConfig::from_file(path).unwrap();

        assert_eq!(config.rate_limiting.ip_rate_limit, DEFAULT_IP_RATE_LIMIT);
        assert_eq!(config.rate_limiting.token_block_times["ABC123"], 60);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_yaml_rejects_zero_limit() {
        let yaml = r#"
rate_limiting:
  ip_rate_limit: 0
"#;
        let result = TurnstileConfig::from_yaml(yaml);
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }
}
