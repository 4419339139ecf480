//! mqttgw - Bidirectional gateway between a vessel data bus and an MQTT broker
//!
//! Republishes selected bus paths as MQTT topics on a configurable sampling
//! schedule, and converts selected inbound MQTT topics back into bus updates.
//! The mapping between the two data spaces is resolved once from user
//! configuration; the broker session and the two dispatchers run against
//! that immutable table.

pub mod bus;
pub mod config;
pub mod gateway;
pub mod mapping;

pub use bus::{Bus, LogReporter, MemoryBus, PathSnapshot, StatusReporter};
pub use config::{ConfigError, GatewayConfig};
pub use gateway::{Gateway, InboundDispatcher, MqttPublisher, Session, SessionError};
pub use mapping::{
    ConfigurationError, MappingConfiguration, PublicationEntry, SubscriptionEntry,
};
