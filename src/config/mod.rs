//! Configuration Module
//!
//! Provides TOML-based configuration for the gateway with support for:
//! - Broker connection settings (URL, credentials, reconnect pacing)
//! - Publication settings (topic root, per-path overrides)
//! - Subscription settings (path root, per-topic overrides)
//! - Environment variable overrides (MQTTGW_* prefix)
//!
//! The structures in this module are the *raw* configuration surface as the
//! user wrote it. They carry optional fields and section-level defaults only;
//! turning them into a consistent mapping table is the job of
//! [`crate::mapping::resolve`], which never mutates its input.

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Logging configuration
    pub log: LogConfig,
    /// Broker connection configuration
    pub broker: BrokerConfig,
    /// Publication settings (bus → broker)
    pub publication: PublicationConfig,
    /// Subscription settings (broker → bus)
    pub subscription: SubscriptionConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Broker connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker URL, e.g. "mqtt://192.168.1.203:1883"
    pub url: Option<String>,
    /// Client credentials as a single "username:password" string
    pub credentials: Option<String>,
    /// Username (alternative to the combined `credentials` string)
    pub username: Option<String>,
    /// Password (alternative to the combined `credentials` string)
    pub password: Option<String>,
    /// Accepted for schema compatibility with older configuration
    /// generations; transport security is not handled by the gateway.
    #[serde(default = "default_true", alias = "rejectUnauthorised")]
    pub reject_unauthorised: bool,
    /// Client ID to use when connecting (default: "mqttgw-{pid}")
    pub client_id: Option<String>,
    /// Fixed delay between reconnect attempts, in seconds
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive: u16,
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval() -> u64 {
    60
}

fn default_keepalive() -> u16 {
    60
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            credentials: None,
            username: None,
            password: None,
            reject_unauthorised: default_true(),
            client_id: None,
            reconnect_interval: default_reconnect_interval(),
            keepalive: default_keepalive(),
        }
    }
}

/// Publication settings: which bus paths are republished to the broker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublicationConfig {
    /// Prefix applied to all published topic names
    #[serde(default = "default_publication_root")]
    pub root: String,
    /// Default retain setting for published topics
    #[serde(default = "default_true", alias = "retainDefault")]
    pub retain: bool,
    /// Default minimum interval between topic updates, in seconds
    #[serde(default = "default_interval", alias = "intervalDefault")]
    pub interval: u64,
    /// Default setting for metadata publication
    #[serde(default, alias = "metaDefault")]
    pub meta: bool,
    /// Bus paths to publish
    #[serde(default)]
    pub paths: Vec<PublicationPathConfig>,
}

fn default_publication_root() -> String {
    "signalk/".to_string()
}

fn default_interval() -> u64 {
    60
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            root: default_publication_root(),
            retain: default_true(),
            interval: default_interval(),
            meta: false,
            paths: Vec::new(),
        }
    }
}

/// A single bus path selected for publication
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublicationPathConfig {
    /// Bus path to observe (required)
    pub path: Option<String>,
    /// Override the topic name automatically generated from the path
    pub topic: Option<String>,
    /// Override the default retain setting for this path
    pub retain: Option<bool>,
    /// Override the default publication interval for this path, in seconds
    pub interval: Option<u64>,
    /// Override the default metadata publication setting for this path
    pub meta: Option<bool>,
}

/// Subscription settings: which broker topics are written back to the bus
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Prefix applied to all received subscription paths
    #[serde(default = "default_subscription_root")]
    pub root: String,
    /// Drop inbound messages whose topic matches no configured entry,
    /// instead of synthesizing a fallback path
    #[serde(default)]
    pub strict: bool,
    /// Broker topics to receive
    #[serde(default)]
    pub topics: Vec<SubscriptionTopicConfig>,
}

fn default_subscription_root() -> String {
    "mqtt.".to_string()
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            root: default_subscription_root(),
            strict: false,
            topics: Vec::new(),
        }
    }
}

/// A single broker topic selected for subscription
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscriptionTopicConfig {
    /// Broker topic to subscribe to (required)
    pub topic: Option<String>,
    /// Override the path name automatically generated from the topic
    pub path: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `MQTTGW__` prefix with double underscores for nesting:
    ///    - `MQTTGW__BROKER__URL=mqtt://10.0.0.1` overrides `broker.url`
    ///    - `MQTTGW__PUBLICATION__ROOT=vessel/` overrides `publication.root`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (MQTTGW__BROKER__URL, etc.)
        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("MQTTGW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}
