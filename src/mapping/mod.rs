//! Mapping Resolution
//!
//! Turns the raw, partially-specified user configuration into a fully
//! resolved, internally consistent mapping table: one [`PublicationEntry`]
//! per bus path republished to the broker and one [`SubscriptionEntry`] per
//! broker topic written back onto the bus.
//!
//! Resolution is a pure function: same input, same output, no I/O. Invalid
//! entries are rejected outright rather than dropped, so the gateway either
//! starts with the complete mapping the user asked for or stays inert.

use std::time::Duration;

use crate::config::GatewayConfig;

/// Error produced when the raw configuration cannot be resolved.
///
/// Any of these aborts gateway startup entirely; there is no partial start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No broker URL was configured
    MissingBrokerUrl,
    /// The broker URL could not be parsed or uses an unsupported scheme
    InvalidBrokerUrl(String),
    /// A publication entry lacks its mandatory `path` property
    MissingPublicationPath { index: usize },
    /// A subscription entry lacks its mandatory `topic` property
    MissingSubscriptionTopic { index: usize },
    /// The credentials string is not a usable "username:password" pair
    MalformedCredentials(String),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::MissingBrokerUrl => {
                write!(f, "configuration does not specify the MQTT broker URL")
            }
            ConfigurationError::InvalidBrokerUrl(msg) => {
                write!(f, "invalid broker URL: {}", msg)
            }
            ConfigurationError::MissingPublicationPath { index } => {
                write!(
                    f,
                    "publication entry {} is missing its 'path' property",
                    index
                )
            }
            ConfigurationError::MissingSubscriptionTopic { index } => {
                write!(
                    f,
                    "subscription entry {} is missing its 'topic' property",
                    index
                )
            }
            ConfigurationError::MalformedCredentials(msg) => {
                write!(f, "malformed broker credentials: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Parsed broker connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// Broker hostname or IP address
    pub host: String,
    /// Broker port
    pub port: u16,
}

impl BrokerAddress {
    /// Parse a broker URL of the form `[mqtt://|tcp://]host[:port]`.
    ///
    /// The port defaults to 1883. TLS and WebSocket schemes are rejected:
    /// transport security is outside the gateway's remit.
    pub fn parse(url: &str) -> Result<Self, ConfigurationError> {
        let rest = match url.split_once("://") {
            Some(("mqtt" | "tcp", rest)) => rest,
            Some((scheme, _)) => {
                return Err(ConfigurationError::InvalidBrokerUrl(format!(
                    "unsupported scheme '{}'",
                    scheme
                )));
            }
            None => url,
        };

        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(ConfigurationError::InvalidBrokerUrl(
                "empty host".to_string(),
            ));
        }

        if let Some((host, port_str)) = rest.rsplit_once(':') {
            let port = port_str.parse::<u16>().map_err(|_| {
                ConfigurationError::InvalidBrokerUrl(format!("invalid port '{}'", port_str))
            })?;
            if host.is_empty() {
                return Err(ConfigurationError::InvalidBrokerUrl(
                    "empty host".to_string(),
                ));
            }
            Ok(Self {
                host: host.to_string(),
                port,
            })
        } else {
            Ok(Self {
                host: rest.to_string(),
                port: 1883,
            })
        }
    }
}

/// Broker authentication pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Split a `"username:password"` string on the first `:`, trimming
    /// surrounding whitespace from both halves.
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let Some((username, password)) = raw.split_once(':') else {
            return Err(ConfigurationError::MalformedCredentials(
                "expected 'username:password'".to_string(),
            ));
        };
        let username = username.trim();
        if username.is_empty() {
            return Err(ConfigurationError::MalformedCredentials(
                "empty username".to_string(),
            ));
        }
        Ok(Self {
            username: username.to_string(),
            password: password.trim().to_string(),
        })
    }
}

/// A resolved bus-to-broker publication rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationEntry {
    /// Bus path to observe
    pub path: String,
    /// Fully-qualified outbound topic name
    pub topic: String,
    /// Minimum time between republications of this path's value
    pub interval: Duration,
    /// Whether the broker should retain the last value for this topic
    pub retain: bool,
    /// Whether to also publish the path's static metadata once
    pub meta: bool,
}

impl PublicationEntry {
    /// Topic the path's metadata is published to
    pub fn meta_topic(&self) -> String {
        format!("{}/meta", self.topic)
    }
}

/// A resolved broker-to-bus subscription rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntry {
    /// Exact inbound broker topic to subscribe to
    pub topic: String,
    /// Bus path received values are written to
    pub path: String,
}

/// The fully resolved mapping table, immutable after resolution.
///
/// Consumed by the broker session (what to connect to and subscribe to) and
/// by both dispatchers (what to translate and where).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingConfiguration {
    /// Broker connection target
    pub broker: BrokerAddress,
    /// Optional broker authentication
    pub credentials: Option<Credentials>,
    /// MQTT client ID
    pub client_id: String,
    /// Keep-alive interval
    pub keepalive: Duration,
    /// Fixed delay between reconnect attempts
    pub reconnect_interval: Duration,
    /// Bus paths republished to the broker
    pub publication_entries: Vec<PublicationEntry>,
    /// Broker topics written back onto the bus
    pub subscription_entries: Vec<SubscriptionEntry>,
    /// Prefix for paths synthesized from unmatched inbound topics
    pub subscription_root: String,
    /// Drop unmatched inbound messages instead of synthesizing a path
    pub strict_inbound: bool,
}

/// Treat absent, empty, and whitespace-only strings alike.
fn nonempty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Resolve the raw configuration into a [`MappingConfiguration`].
///
/// Defaulting precedence for each per-entry attribute is entry-level
/// explicit value, then section-level default, then the hard-coded system
/// default already baked into [`GatewayConfig`]'s serde defaults. Intervals
/// are user-facing seconds, stored internally as a [`Duration`] to drive the
/// sampling clock.
pub fn resolve(config: &GatewayConfig) -> Result<MappingConfiguration, ConfigurationError> {
    let url = nonempty(config.broker.url.as_ref()).ok_or(ConfigurationError::MissingBrokerUrl)?;
    let broker = BrokerAddress::parse(url)?;

    // A combined "username:password" string takes precedence over the
    // discrete username/password pair.
    let credentials = match (&config.broker.credentials, &config.broker.username) {
        (Some(raw), _) => Some(Credentials::parse(raw)?),
        (None, Some(username)) => {
            let username = username.trim();
            if username.is_empty() {
                return Err(ConfigurationError::MalformedCredentials(
                    "empty username".to_string(),
                ));
            }
            Some(Credentials {
                username: username.to_string(),
                password: config
                    .broker
                    .password
                    .as_deref()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            })
        }
        (None, None) => None,
    };

    let client_id = nonempty(config.broker.client_id.as_ref())
        .map(str::to_string)
        .unwrap_or_else(|| format!("mqttgw-{}", std::process::id()));

    let publication = &config.publication;
    let mut publication_entries = Vec::with_capacity(publication.paths.len());
    for (index, raw) in publication.paths.iter().enumerate() {
        let Some(path) = nonempty(raw.path.as_ref()) else {
            return Err(ConfigurationError::MissingPublicationPath { index });
        };

        // Topic = root + (explicit override, or the path with every '.'
        // turned into a topic separator).
        let suffix = match nonempty(raw.topic.as_ref()) {
            Some(topic) => topic.to_string(),
            None => path.replace('.', "/"),
        };

        publication_entries.push(PublicationEntry {
            path: path.to_string(),
            topic: format!("{}{}", publication.root, suffix),
            interval: Duration::from_secs(raw.interval.unwrap_or(publication.interval)),
            retain: raw.retain.unwrap_or(publication.retain),
            meta: raw.meta.unwrap_or(publication.meta),
        });
    }

    let subscription = &config.subscription;
    let mut subscription_entries = Vec::with_capacity(subscription.topics.len());
    for (index, raw) in subscription.topics.iter().enumerate() {
        let Some(topic) = nonempty(raw.topic.as_ref()) else {
            return Err(ConfigurationError::MissingSubscriptionTopic { index });
        };

        // Path = root + (explicit override, or the topic itself), with every
        // topic separator turned into a path separator.
        let suffix = nonempty(raw.path.as_ref()).unwrap_or(topic);
        let path = format!("{}{}", subscription.root, suffix).replace('/', ".");

        subscription_entries.push(SubscriptionEntry {
            topic: topic.to_string(),
            path,
        });
    }

    Ok(MappingConfiguration {
        broker,
        credentials,
        client_id,
        keepalive: Duration::from_secs(u64::from(config.broker.keepalive)),
        reconnect_interval: Duration::from_secs(config.broker.reconnect_interval),
        publication_entries,
        subscription_entries,
        subscription_root: subscription.root.clone(),
        strict_inbound: subscription.strict,
    })
}

impl MappingConfiguration {
    /// Find the subscription entry whose topic exactly matches `topic`.
    pub fn subscription_for(&self, topic: &str) -> Option<&SubscriptionEntry> {
        self.subscription_entries.iter().find(|e| e.topic == topic)
    }

    /// Synthesize a bus path for an inbound topic with no configured entry.
    pub fn fallback_path(&self, topic: &str) -> String {
        format!("{}{}", self.subscription_root, topic.replace('/', "."))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{
        GatewayConfig, PublicationPathConfig, SubscriptionTopicConfig,
    };

    fn base_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.broker.url = Some("mqtt://broker.local".to_string());
        config
    }

    fn publication_path(path: &str) -> PublicationPathConfig {
        PublicationPathConfig {
            path: Some(path.to_string()),
            ..Default::default()
        }
    }

    fn subscription_topic(topic: &str) -> SubscriptionTopicConfig {
        SubscriptionTopicConfig {
            topic: Some(topic.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_topic_derivation_from_path() {
        let mut config = base_config();
        config.publication.root = "signalk/".to_string();
        config.publication.paths = vec![publication_path("a.b.c")];

        let mapping = resolve(&config).unwrap();
        assert_eq!(mapping.publication_entries[0].topic, "signalk/a/b/c");
        assert_eq!(mapping.publication_entries[0].path, "a.b.c");
    }

    #[test]
    fn test_topic_override_wins_over_derivation() {
        let mut config = base_config();
        config.publication.paths = vec![PublicationPathConfig {
            path: Some("environment.wind.speedApparent".to_string()),
            topic: Some("wind/apparent".to_string()),
            ..Default::default()
        }];

        let mapping = resolve(&config).unwrap();
        assert_eq!(mapping.publication_entries[0].topic, "signalk/wind/apparent");
    }

    #[test]
    fn test_empty_topic_override_falls_back_to_path() {
        let mut config = base_config();
        config.publication.paths = vec![PublicationPathConfig {
            path: Some("a.b".to_string()),
            topic: Some("".to_string()),
            ..Default::default()
        }];

        let mapping = resolve(&config).unwrap();
        assert_eq!(mapping.publication_entries[0].topic, "signalk/a/b");
    }

    #[test]
    fn test_interval_defaulting_and_scaling() {
        let mut config = base_config();
        config.publication.interval = 5;
        config.publication.paths = vec![
            publication_path("a.b"),
            PublicationPathConfig {
                path: Some("c.d".to_string()),
                interval: Some(1),
                ..Default::default()
            },
        ];

        let mapping = resolve(&config).unwrap();
        // Section default, stored as a duration (5 s = 5000 ms).
        assert_eq!(
            mapping.publication_entries[0].interval,
            Duration::from_millis(5000)
        );
        // Entry-level override beats the section default.
        assert_eq!(
            mapping.publication_entries[1].interval,
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_retain_and_meta_defaulting() {
        let mut config = base_config();
        config.publication.retain = false;
        config.publication.meta = true;
        config.publication.paths = vec![
            publication_path("a.b"),
            PublicationPathConfig {
                path: Some("c.d".to_string()),
                retain: Some(true),
                meta: Some(false),
                ..Default::default()
            },
        ];

        let mapping = resolve(&config).unwrap();
        assert!(!mapping.publication_entries[0].retain);
        assert!(mapping.publication_entries[0].meta);
        assert!(mapping.publication_entries[1].retain);
        assert!(!mapping.publication_entries[1].meta);
    }

    #[test]
    fn test_subscription_path_derivation_replaces_all_separators() {
        let mut config = base_config();
        config.subscription.root = "mqtt.".to_string();
        config.subscription.topics = vec![subscription_topic("x/y")];

        let mapping = resolve(&config).unwrap();
        // Every separator converted, not just the first.
        assert_eq!(mapping.subscription_entries[0].path, "mqtt.x.y");
        assert_eq!(mapping.subscription_entries[0].topic, "x/y");

        config.subscription.topics = vec![subscription_topic("a/b/c/d")];
        let mapping = resolve(&config).unwrap();
        assert_eq!(mapping.subscription_entries[0].path, "mqtt.a.b.c.d");
    }

    #[test]
    fn test_subscription_path_override() {
        let mut config = base_config();
        config.subscription.topics = vec![SubscriptionTopicConfig {
            topic: Some("commands/autopilot".to_string()),
            path: Some("steering/autopilot/command".to_string()),
        }];

        let mapping = resolve(&config).unwrap();
        assert_eq!(
            mapping.subscription_entries[0].path,
            "mqtt.steering.autopilot.command"
        );
    }

    #[test]
    fn test_missing_broker_url_fails() {
        let config = GatewayConfig::default();
        assert_eq!(
            resolve(&config).unwrap_err(),
            ConfigurationError::MissingBrokerUrl
        );

        let mut config = GatewayConfig::default();
        config.broker.url = Some("   ".to_string());
        assert_eq!(
            resolve(&config).unwrap_err(),
            ConfigurationError::MissingBrokerUrl
        );
    }

    #[test]
    fn test_missing_publication_path_fails() {
        let mut config = base_config();
        config.publication.paths = vec![PublicationPathConfig::default()];
        assert_eq!(
            resolve(&config).unwrap_err(),
            ConfigurationError::MissingPublicationPath { index: 0 }
        );

        // Empty string counts as missing.
        config.publication.paths = vec![publication_path("a.b"), publication_path("")];
        assert_eq!(
            resolve(&config).unwrap_err(),
            ConfigurationError::MissingPublicationPath { index: 1 }
        );
    }

    #[test]
    fn test_missing_subscription_topic_fails() {
        let mut config = base_config();
        config.subscription.topics = vec![SubscriptionTopicConfig::default()];
        assert_eq!(
            resolve(&config).unwrap_err(),
            ConfigurationError::MissingSubscriptionTopic { index: 0 }
        );
    }

    #[test]
    fn test_credentials_split_on_first_colon_and_trimmed() {
        let creds = Credentials::parse(" skipper : pa:ss ").unwrap();
        assert_eq!(creds.username, "skipper");
        assert_eq!(creds.password, "pa:ss");
    }

    #[test]
    fn test_malformed_credentials_fail() {
        assert!(matches!(
            Credentials::parse("no-separator"),
            Err(ConfigurationError::MalformedCredentials(_))
        ));
        assert!(matches!(
            Credentials::parse(":password-only"),
            Err(ConfigurationError::MalformedCredentials(_))
        ));
    }

    #[test]
    fn test_discrete_username_password_pair() {
        let mut config = base_config();
        config.broker.username = Some("skipper".to_string());
        config.broker.password = Some("secret".to_string());

        let mapping = resolve(&config).unwrap();
        assert_eq!(
            mapping.credentials,
            Some(Credentials {
                username: "skipper".to_string(),
                password: "secret".to_string(),
            })
        );
    }

    #[test]
    fn test_broker_address_parsing() {
        let addr = BrokerAddress::parse("mqtt://192.168.1.203").unwrap();
        assert_eq!(addr.host, "192.168.1.203");
        assert_eq!(addr.port, 1883);

        let addr = BrokerAddress::parse("tcp://broker.local:11883").unwrap();
        assert_eq!(addr.host, "broker.local");
        assert_eq!(addr.port, 11883);

        let addr = BrokerAddress::parse("broker.local").unwrap();
        assert_eq!(addr.port, 1883);

        assert!(matches!(
            BrokerAddress::parse("mqtts://broker.local"),
            Err(ConfigurationError::InvalidBrokerUrl(_))
        ));
        assert!(matches!(
            BrokerAddress::parse("mqtt://broker.local:notaport"),
            Err(ConfigurationError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut config = base_config();
        config.broker.credentials = Some("user:pass".to_string());
        config.publication.paths = vec![publication_path("a.b"), publication_path("c.d.e")];
        config.subscription.topics = vec![subscription_topic("x/y"), subscription_topic("z")];

        let first = resolve(&config).unwrap();
        let second = resolve(&config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_subscription_fallback_path() {
        let mapping = resolve(&base_config()).unwrap();
        assert_eq!(mapping.fallback_path("some/odd/topic"), "mqtt.some.odd.topic");
    }

    #[test]
    fn test_meta_topic() {
        let mut config = base_config();
        config.publication.paths = vec![publication_path("a.b")];
        let mapping = resolve(&config).unwrap();
        assert_eq!(mapping.publication_entries[0].meta_topic(), "signalk/a/b/meta");
    }
}
