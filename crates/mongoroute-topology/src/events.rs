//! Topology event fan-out.
//!
//! Membership changes, lifecycle transitions, and server-discovery events are
//! published on a broadcast channel; anyone holding a [`Mongos`](crate::Mongos)
//! handle can subscribe. Emission never blocks and a send with no subscribers
//! is not an error.

use bson::Document;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a topology announces to the outside world.
#[derive(Debug, Clone)]
pub enum TopologyEvent {
    /// The topology started connecting its seed list.
    TopologyOpening { topology_id: u64 },
    /// The topology was destroyed. Emitted exactly once per lifetime.
    TopologyClosed { topology_id: u64 },
    /// First transition into the connected state. Emitted exactly once.
    Connect,
    /// Every seed of the initial batch has settled. Emitted exactly once,
    /// directly after `Connect`.
    FullSetup,
    /// Alias companion of `FullSetup` kept for driver compatibility.
    All,
    /// A rehabilitation pass promoted at least one proxy while connected.
    Reconnect,
    /// A proxy joined the connected set.
    Joined { kind: &'static str, name: String },
    /// A proxy left the connected set.
    Left { kind: &'static str, name: String },
    /// A connect attempt failed or was discarded as a duplicate.
    Failed { name: String },
    /// Result of a `get_server` call; only emitted when `debug` is set.
    PickedServer { name: Option<String> },
    /// A proxy handle was constructed and is being connected.
    ServerOpening { address: String },
    /// A proxy handle was destroyed.
    ServerClosed { address: String },
    /// A proxy recorded a fresh ismaster description.
    ServerDescriptionChanged { address: String },
    ServerHeartbeatStarted {
        connection_id: String,
    },
    ServerHeartbeatSucceeded {
        duration_ms: u64,
        reply: Document,
        connection_id: String,
    },
    ServerHeartbeatFailed {
        duration_ms: u64,
        failure: String,
        connection_id: String,
    },
    /// A fatal condition the monitor cannot recover from.
    Error { message: String },
}

/// Broadcast fan-out for [`TopologyEvent`]s.
pub(crate) struct EventBus {
    sender: broadcast::Sender<TopologyEvent>,
}

impl EventBus {
    pub(crate) fn new() -> EventBus {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn emit(&self, event: TopologyEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}
