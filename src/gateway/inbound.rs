//! Inbound Dispatch
//!
//! Converts raw broker messages back into bus updates: resolve the
//! originating subscription entry (or synthesize a path for unmatched
//! topics), coerce the payload text, and commit exactly one bus write per
//! message.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::bus::Bus;
use crate::mapping::MappingConfiguration;

/// Translates inbound broker messages into bus updates
pub struct InboundDispatcher {
    mapping: Arc<MappingConfiguration>,
    bus: Arc<dyn Bus>,
}

impl InboundDispatcher {
    pub fn new(mapping: Arc<MappingConfiguration>, bus: Arc<dyn Bus>) -> Self {
        Self { mapping, bus }
    }

    /// Handle one raw broker message.
    ///
    /// Topics with no configured entry get a path synthesized from the topic
    /// itself so no inbound message is silently lost, unless the mapping was
    /// resolved with strict inbound matching.
    pub fn handle(&self, topic: &str, payload: &[u8]) {
        let path = match self.mapping.subscription_for(topic) {
            Some(entry) => entry.path.clone(),
            None if self.mapping.strict_inbound => {
                warn!("Inbound: no entry for topic '{}', dropping message", topic);
                return;
            }
            None => self.mapping.fallback_path(topic),
        };

        let text = String::from_utf8_lossy(payload);
        let value = coerce(&text);
        debug!("Inbound: received '{}' for path '{}'", value, path);

        self.bus.write_update(&path, value);
    }
}

/// Coerce a payload to a number when it parses as one, otherwise keep the
/// text. Integer-valued numerals become integers, any other parseable
/// numeral a float.
pub fn coerce(text: &str) -> Value {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(f) {
            return Value::Number(number);
        }
    }
    Value::from(text)
}
