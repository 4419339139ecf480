//! Broker Session
//!
//! Owns the single connection to the external MQTT broker: connect,
//! subscribe, reconnect, and teardown. The session drives the rumqttc event
//! loop on its own task; inbound publishes are handed to the
//! [`InboundDispatcher`](super::InboundDispatcher) in delivery order, and the
//! shared `connected` signal tells the outbound dispatcher when to start
//! sending.
//!
//! Reconnection is a fixed-interval retry with no cap: this is a long-lived
//! background service, not a bounded operation. Transport errors are
//! reported to the host and never crash the process.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::StatusReporter;
use crate::mapping::MappingConfiguration;

use super::inbound::InboundDispatcher;

/// Error type for broker session operations
#[derive(Debug)]
pub enum SessionError {
    /// The request could not be handed to the client
    Client(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Client(msg) => write!(f, "client error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// Sink for outbound publishes.
///
/// Every publish goes out at QoS 1; the retain flag is per-message. The
/// broker session implements this over its live connection; tests substitute
/// a recorder.
#[async_trait]
pub trait MqttPublisher: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: Bytes, retain: bool)
        -> Result<(), SessionError>;
}

/// Live connection to the external broker
pub struct Session {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl Session {
    /// Open the broker connection and start the session loop.
    ///
    /// Returns immediately; the connection is established (and re-established
    /// after failures) in the background. Publishes issued while disconnected
    /// are queued by the client.
    pub fn connect(
        mapping: Arc<MappingConfiguration>,
        inbound: InboundDispatcher,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let mut options = MqttOptions::new(
            mapping.client_id.clone(),
            mapping.broker.host.clone(),
            mapping.broker.port,
        );
        options.set_keep_alive(mapping.keepalive);
        if let Some(credentials) = &mapping.credentials {
            options.set_credentials(credentials.username.as_str(), credentials.password.as_str());
        }

        let (client, event_loop) = AsyncClient::new(options, 100);
        let (connected_tx, connected_rx) = watch::channel(false);

        let task = tokio::spawn(Self::session_loop(
            mapping,
            client.clone(),
            event_loop,
            connected_tx,
            inbound,
            reporter,
        ));

        Self {
            client,
            connected: connected_rx,
            task,
        }
    }

    /// Signal that flips true once the broker has acknowledged the
    /// connection and the subscribe burst has been issued.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Disconnect from the broker and end the session loop.
    pub async fn close(&self) {
        let _ = self.client.disconnect().await;
        self.task.abort();
    }

    async fn session_loop(
        mapping: Arc<MappingConfiguration>,
        client: AsyncClient,
        mut event_loop: EventLoop,
        connected: watch::Sender<bool>,
        inbound: InboundDispatcher,
        reporter: Arc<dyn StatusReporter>,
    ) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(
                        "Session: connected to broker {}:{}",
                        mapping.broker.host, mapping.broker.port
                    );

                    // (Re)issue the subscribe burst in configuration order.
                    // Duplicate topics are harmless; the broker de-dupes.
                    for entry in &mapping.subscription_entries {
                        debug!("Session: subscribing to topic '{}'", entry.topic);
                        if let Err(e) =
                            client.subscribe(entry.topic.as_str(), QoS::AtLeastOnce).await
                        {
                            warn!("Session: subscribe to '{}' failed: {}", entry.topic, e);
                        }
                    }

                    connected.send_replace(true);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    inbound.handle(&publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    connected.send_replace(false);
                    reporter.report_error(&format!("MQTT broker connection error ({})", e));

                    // Fixed retry pacing; the next poll reconnects.
                    tokio::time::sleep(mapping.reconnect_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl MqttPublisher for Session {
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        retain: bool,
    ) -> Result<(), SessionError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| SessionError::Client(e.to_string()))
    }
}
