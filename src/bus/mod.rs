//! Bus Abstraction
//!
//! The gateway's view of the vessel data bus: a path-keyed store whose
//! values can be observed as continuously-updated properties, snapshot-read
//! together with their static metadata, and written to one update at a time.
//!
//! The [`Bus`] trait is the seam between the gateway and the host system.
//! [`MemoryBus`] is a self-contained implementation backing the binary and
//! the test suite; a host embedding the gateway supplies its own.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info};

/// Snapshot of a path's current state
#[derive(Debug, Clone)]
pub struct PathSnapshot {
    /// Latest value committed to the path
    pub value: Value,
    /// Static descriptive metadata, if any has been attached
    pub meta: Option<Value>,
}

/// The vessel data bus consumed by the gateway
pub trait Bus: Send + Sync + 'static {
    /// Observe a path as a continuously-updated property.
    ///
    /// The receiver always reflects the latest known value, not individual
    /// change events; `None` until the path first produces a value.
    /// Dropping the receiver releases the observation.
    fn observe(&self, path: &str) -> watch::Receiver<Option<Value>>;

    /// Synchronous snapshot read of a path's current value and metadata.
    fn read_current(&self, path: &str) -> Option<PathSnapshot>;

    /// Commit a single value to a path as one discrete update.
    fn write_update(&self, path: &str, value: Value);
}

/// Host-facing status and error reporting hooks
pub trait StatusReporter: Send + Sync + 'static {
    /// Report a normal status change (start, stop, connect)
    fn report_status(&self, message: &str);

    /// Report an error condition
    fn report_error(&self, message: &str);
}

/// Reporter that forwards status and errors to the tracing subscriber
#[derive(Debug, Default)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report_status(&self, message: &str) {
        info!("Gateway: {}", message);
    }

    fn report_error(&self, message: &str) {
        error!("Gateway: {}", message);
    }
}

struct PathState {
    notify: watch::Sender<Option<Value>>,
    meta: Option<Value>,
}

impl Default for PathState {
    fn default() -> Self {
        Self {
            notify: watch::channel(None).0,
            meta: None,
        }
    }
}

/// In-memory path-keyed store implementing [`Bus`]
#[derive(Default)]
pub struct MemoryBus {
    paths: DashMap<String, PathState>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach static metadata to a path.
    pub fn set_meta(&self, path: &str, meta: Value) {
        self.paths.entry(path.to_string()).or_default().meta = Some(meta);
    }

    /// Number of paths that have been observed or written
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }
}

impl Bus for MemoryBus {
    fn observe(&self, path: &str) -> watch::Receiver<Option<Value>> {
        self.paths
            .entry(path.to_string())
            .or_default()
            .notify
            .subscribe()
    }

    fn read_current(&self, path: &str) -> Option<PathSnapshot> {
        let state = self.paths.get(path)?;
        let value = state.notify.borrow().clone()?;
        Some(PathSnapshot {
            value,
            meta: state.meta.clone(),
        })
    }

    fn write_update(&self, path: &str, value: Value) {
        // send_replace delivers even when nothing is currently observing,
        // so late observers still see the latest value.
        self.paths
            .entry(path.to_string())
            .or_default()
            .notify
            .send_replace(Some(value));
    }
}
