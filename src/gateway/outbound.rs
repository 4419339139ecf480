//! Outbound Dispatch
//!
//! One sampling task per publication entry. Each task is a small explicit
//! state machine composed of three stages: a live-value source (the bus
//! observation), a periodic sampler (one timer per entry, so samples for an
//! entry are strictly ordered), and a duplicate filter holding exactly the
//! last published value.
//!
//! Sampling decouples the publish rate from the bus's native update rate: a
//! path that changes every 10 ms with a 5 s interval publishes at most once
//! every 5 seconds, carrying the most recent value at sample time.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::bus::Bus;
use crate::mapping::{MappingConfiguration, PublicationEntry};

use super::session::MqttPublisher;

/// Spawn one sampling task per publication entry.
///
/// Tasks hold their publishes until `connected` first flips true, then
/// sample at their entry's fixed period until `shutdown` flips true (which
/// also releases each entry's bus observation).
pub fn spawn(
    mapping: &Arc<MappingConfiguration>,
    bus: &Arc<dyn Bus>,
    publisher: Arc<dyn MqttPublisher>,
    connected: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    mapping
        .publication_entries
        .iter()
        .cloned()
        .map(|entry| {
            tokio::spawn(sample_entry(
                entry,
                bus.clone(),
                publisher.clone(),
                connected.clone(),
                shutdown.clone(),
            ))
        })
        .collect()
}

/// Two consecutive samples are duplicates when their identity markers match
/// or, for values without markers, when the values themselves are equal.
fn same_sample(prev: &Value, next: &Value) -> bool {
    match (prev.get("id"), next.get("id")) {
        (Some(a), Some(b)) => a == b,
        _ => prev == next,
    }
}

async fn sample_entry(
    entry: PublicationEntry,
    bus: Arc<dyn Bus>,
    publisher: Arc<dyn MqttPublisher>,
    mut connected: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let property = bus.observe(&entry.path);

    // Hold off until the session signals the first successful connect.
    while !*connected.borrow() {
        tokio::select! {
            changed = connected.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }

    debug!(
        "Outbound: sampling '{}' every {:?} for topic '{}'",
        entry.path, entry.interval, entry.topic
    );

    let mut ticker = tokio::time::interval(entry.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Last value actually published; the duplicate filter's entire state.
    let mut last_sent: Option<Value> = None;
    let mut meta_published = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }

        // A path that never produces a value never publishes.
        let Some(sample) = property.borrow().clone() else {
            continue;
        };

        if last_sent
            .as_ref()
            .is_some_and(|prev| same_sample(prev, &sample))
        {
            continue;
        }

        let payload = match serde_json::to_vec(&sample) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!("Outbound: cannot serialize value for '{}': {}", entry.path, e);
                continue;
            }
        };

        debug!("Outbound: updating topic '{}'", entry.topic);
        if let Err(e) = publisher.publish(&entry.topic, payload, entry.retain).await {
            // Keep the filter state unchanged so the sample is retried on
            // the next tick.
            warn!("Outbound: publish to '{}' failed: {}", entry.topic, e);
            continue;
        }
        last_sent = Some(sample);

        // Publish any selected and available metadata just once, the first
        // time it can be fetched. If the path has no metadata yet, the fetch
        // is retried on every surviving sample.
        if entry.meta && !meta_published {
            if let Some(meta) = bus.read_current(&entry.path).and_then(|s| s.meta) {
                match serde_json::to_vec(&meta) {
                    Ok(payload) => {
                        let meta_topic = entry.meta_topic();
                        debug!("Outbound: updating topic '{}'", meta_topic);
                        match publisher.publish(&meta_topic, Bytes::from(payload), true).await {
                            Ok(()) => meta_published = true,
                            Err(e) => {
                                warn!("Outbound: publish to '{}' failed: {}", meta_topic, e)
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Outbound: cannot serialize meta for '{}': {}", entry.path, e)
                    }
                }
            }
        }
    }
}
