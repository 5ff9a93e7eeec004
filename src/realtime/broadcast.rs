//! Broadcast fan-out to connected displays.
//!
//! The [`Broadcaster`] owns the registry of live display connections. A
//! broadcast serializes the event once and hands the text to every connection
//! that is currently open. Delivery is best effort: nothing is queued for
//! connections in other states, nothing is retried, and a client that missed
//! an event catches up by re-fetching the dashboard.

use crate::{
    errors::{Error, Result},
    realtime::events::{BoardEvent, RawEnvelope},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Registry key of a display connection.
pub type ConnectionId = u64;

/// Lifecycle state of a display connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ready to receive messages
    Open,
    /// Close handshake in progress
    Closing,
    /// Gone; will be dropped from the registry on the next broadcast
    Closed,
}

impl ConnectionState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closing => 1,
            Self::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Anything a broadcast can be delivered to.
pub trait DisplaySink: Send + Sync {
    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Hands one serialized envelope to the transport.
    fn send_text(&self, text: &str) -> Result<()>;
}

/// Sink backed by an unbounded channel drained by the WebSocket writer task.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
    state: AtomicU8,
}

impl ChannelSink {
    /// Creates an open sink and the receiver its writer task should drain.
    #[must_use]
    pub fn open() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            tx,
            state: AtomicU8::new(ConnectionState::Open.to_u8()),
        });
        (sink, rx)
    }

    /// Records a state transition reported by the transport.
    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }
}

impl DisplaySink for ChannelSink {
    fn state(&self) -> ConnectionState {
        if self.tx.is_closed() {
            return ConnectionState::Closed;
        }
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn send_text(&self, text: &str) -> Result<()> {
        self.tx.send(text.to_owned()).map_err(|_| Error::Delivery {
            message: "display writer has shut down".to_string(),
        })
    }
}

/// Process-wide set of display connections.
pub struct Broadcaster {
    connections: Mutex<HashMap<ConnectionId, Arc<dyn DisplaySink>>>,
    next_id: AtomicU64,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl Broadcaster {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a newly opened connection.
    pub fn register(&self, sink: Arc<dyn DisplaySink>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, sink);
        debug!("Display connection {} registered", id);
        id
    }

    /// Removes a connection after close or error. Unknown ids are ignored.
    pub fn deregister(&self, id: ConnectionId) {
        if self.lock().remove(&id).is_some() {
            debug!("Display connection {} deregistered", id);
        }
    }

    /// Number of registered connections, whatever their state.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    /// Sends an event to every open connection and returns how many accepted it.
    pub fn broadcast(&self, event: &BoardEvent) -> usize {
        match serde_json::to_string(event) {
            Ok(text) => self.fan_out(event.event_type(), &text),
            Err(e) => {
                warn!("Failed to serialize '{}' event: {}", event.event_type(), e);
                0
            }
        }
    }

    /// Sends an event built from a type name and an arbitrary JSON payload.
    pub fn broadcast_raw(&self, event_type: &str, data: &serde_json::Value) -> usize {
        let envelope = RawEnvelope { event_type, data };
        match serde_json::to_string(&envelope) {
            Ok(text) => self.fan_out(event_type, &text),
            Err(e) => {
                warn!("Failed to serialize '{}' event: {}", event_type, e);
                0
            }
        }
    }

    fn fan_out(&self, event_type: &str, text: &str) -> usize {
        // Snapshot under the lock, deliver outside it
        let targets: Vec<(ConnectionId, Arc<dyn DisplaySink>)> = self
            .lock()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sink) in targets {
            match sink.state() {
                ConnectionState::Open => match sink.send_text(text) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        debug!("Dropping display connection {}: {}", id, e);
                        dead.push(id);
                    }
                },
                ConnectionState::Closing => {}
                ConnectionState::Closed => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut connections = self.lock();
            for id in &dead {
                connections.remove(id);
            }
        }

        debug!(
            "Broadcast '{}' delivered to {} display(s), {} dropped",
            event_type,
            delivered,
            dead.len()
        );
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, Arc<dyn DisplaySink>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
