//! Gateway Orchestration
//!
//! Wires the resolved mapping table, the broker session, and the two
//! dispatchers together. The mapping is resolved once at start and passed by
//! reference into every component; a configuration error leaves the gateway
//! entirely inert (no publications, no subscriptions, no connection).

mod inbound;
pub mod outbound;
mod session;


pub use inbound::InboundDispatcher;
pub use session::{MqttPublisher, Session, SessionError};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{Bus, StatusReporter};
use crate::config::GatewayConfig;
use crate::mapping::{self, ConfigurationError, MappingConfiguration};

/// A running bus ↔ broker bridge
pub struct Gateway {
    mapping: Arc<MappingConfiguration>,
    session: Arc<Session>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    reporter: Arc<dyn StatusReporter>,
}

impl Gateway {
    /// Resolve the configuration and start the bridge.
    ///
    /// On success reports exactly one status message and returns the running
    /// gateway. On a configuration error the error is reported, nothing is
    /// started, and the caller gets the error back.
    pub fn start(
        config: &GatewayConfig,
        bus: Arc<dyn Bus>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Result<Self, ConfigurationError> {
        let mapping = match mapping::resolve(config) {
            Ok(mapping) => Arc::new(mapping),
            Err(e) => {
                reporter.report_error(&e.to_string());
                return Err(e);
            }
        };

        let inbound = InboundDispatcher::new(mapping.clone(), bus.clone());
        let session = Arc::new(Session::connect(
            mapping.clone(),
            inbound,
            reporter.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = outbound::spawn(
            &mapping,
            &bus,
            session.clone() as Arc<dyn MqttPublisher>,
            session.connected(),
            shutdown_rx,
        );

        reporter.report_status(&format!(
            "Started: publishing {} paths; receiving {} topics",
            mapping.publication_entries.len(),
            mapping.subscription_entries.len()
        ));

        Ok(Self {
            mapping,
            session,
            shutdown: shutdown_tx,
            tasks,
            reporter,
        })
    }

    /// The resolved mapping table this gateway runs with.
    pub fn mapping(&self) -> &MappingConfiguration {
        &self.mapping
    }

    /// Stop the bridge: end every sampling task (releasing its bus
    /// observation) and close the broker connection.
    pub async fn stop(self, reason: &str) {
        self.shutdown.send_replace(true);
        self.session.close().await;
        for task in self.tasks {
            let _ = task.await;
        }
        self.reporter.report_status(&format!("Stopped: {}", reason));
    }
}
