//! Invocation configuration.
//!
//! Loaded from TOML (every key optional, defaults below) and then overlaid
//! with `FLOWGUARD_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{ConfigError, NetworkError, NetworkException};

pub const DEFAULT_FEED_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";
pub const DEFAULT_TOPIC: &str = "arn:aws:sns:us-east-1:012345678901:instanceKiller";

/// A static allow-rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionConfig {
    pub cidr: String,
    /// Accepts `"123"` or `123`.
    #[serde(deserialize_with = "port_from_str_or_int")]
    pub port: String,
}

impl ExceptionConfig {
    pub fn new(cidr: &str, port: &str) -> Self {
        Self {
            cidr: cidr.to_string(),
            port: port.to_string(),
        }
    }

    pub fn to_exception(&self) -> Result<NetworkException, NetworkError> {
        NetworkException::new(&self.cidr, &self.port)
    }
}

fn port_from_str_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Text(String),
        Number(u64),
    }

    Ok(match PortRepr::deserialize(deserializer)? {
        PortRepr::Text(s) => s,
        PortRepr::Number(n) => n.to_string(),
    })
}

/// Configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run every mutating provider call simulate-only.
    pub dry_run: bool,
    /// Add provider-published ranges to the whitelist.
    pub allow_provider_enrichment: bool,
    pub static_exceptions: Vec<ExceptionConfig>,
    pub notification_topic: String,
    pub enrichment_feed_url: String,
    pub enrichment_service_name: String,
    pub enrichment_ports: Vec<String>,
    pub enrichment_include_ipv6: bool,
    /// Treat a range feed failure as fatal instead of degrading.
    pub fail_closed: bool,
    pub call_timeout_secs: u64,
    pub invocation_deadline_secs: u64,
    pub max_concurrent_remediations: usize,
    pub classify_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dry_run: false,
            allow_provider_enrichment: true,
            static_exceptions: vec![ExceptionConfig::new("0.0.0.0/0", "123")],
            notification_topic: DEFAULT_TOPIC.to_string(),
            enrichment_feed_url: DEFAULT_FEED_URL.to_string(),
            enrichment_service_name: "AMAZON".to_string(),
            enrichment_ports: vec!["80".to_string(), "443".to_string()],
            enrichment_include_ipv6: false,
            fail_closed: false,
            call_timeout_secs: 10,
            invocation_deadline_secs: 840,
            max_concurrent_remediations: 4,
            classify_concurrency: 16,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::default().with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `FLOWGUARD_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(v) = lookup("FLOWGUARD_DRY_RUN") {
            self.dry_run = parse_bool("FLOWGUARD_DRY_RUN", &v)?;
        }
        if let Some(v) = lookup("FLOWGUARD_ALLOW_ENRICHMENT") {
            self.allow_provider_enrichment = parse_bool("FLOWGUARD_ALLOW_ENRICHMENT", &v)?;
        }
        if let Some(v) = lookup("FLOWGUARD_TOPIC") {
            self.notification_topic = v;
        }
        if let Some(v) = lookup("FLOWGUARD_FEED_URL") {
            self.enrichment_feed_url = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("call_timeout_secs must be > 0".into()));
        }
        if self.invocation_deadline_secs == 0 {
            return Err(ConfigError::Invalid(
                "invocation_deadline_secs must be > 0".into(),
            ));
        }
        if self.max_concurrent_remediations == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_remediations must be > 0".into(),
            ));
        }
        if self.classify_concurrency == 0 {
            return Err(ConfigError::Invalid("classify_concurrency must be > 0".into()));
        }
        if self.notification_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("notification_topic must be set".into()));
        }
        if self.allow_provider_enrichment && self.enrichment_ports.is_empty() {
            return Err(ConfigError::Invalid(
                "enrichment_ports must not be empty when enrichment is enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn invocation_deadline(&self) -> Duration {
        Duration::from_secs(self.invocation_deadline_secs)
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        }),
    }
}
