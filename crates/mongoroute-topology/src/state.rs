//! Topology state: the lifecycle state machine and the three proxy sets.

use std::fmt;
use std::sync::Arc;

use mongoroute_common::proxy::Proxy;
use tracing::warn;

/// Lifecycle state of a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyState {
    Disconnected,
    Connecting,
    Connected,
    Destroyed,
}

impl TopologyState {
    /// Whether the transition `self -> to` is legal.
    ///
    /// Destroyed is terminal; everything else may always re-enter itself or
    /// fall back to Disconnected, and only Connecting may reach Connected.
    pub fn can_transition(self, to: TopologyState) -> bool {
        use TopologyState::*;
        match (self, to) {
            (Disconnected, Connecting) | (Disconnected, Disconnected) => true,
            (Connecting, Connecting)
            | (Connecting, Connected)
            | (Connecting, Disconnected) => true,
            (Connected, Connected) | (Connected, Disconnected) => true,
            (Destroyed, Destroyed) => true,
            (_, Destroyed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TopologyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TopologyState::Disconnected => "disconnected",
            TopologyState::Connecting => "connecting",
            TopologyState::Connected => "connected",
            TopologyState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Identifies one of the three proxy sets for the move primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetId {
    Connecting,
    Connected,
    Disconnected,
}

/// An insertion-ordered set of proxy handles keyed by `name()`.
///
/// Insertion order matters: it is the implicit tie-break of the selector's
/// rotation.
#[derive(Default)]
pub(crate) struct ProxySet {
    entries: Vec<Arc<dyn Proxy>>,
}

impl ProxySet {
    pub(crate) fn new() -> ProxySet {
        ProxySet {
            entries: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn Proxy>> {
        self.entries.iter()
    }

    pub(crate) fn contains_name(&self, name: &str) -> bool {
        self.entries.iter().any(|p| p.name() == name)
    }

    pub(crate) fn push(&mut self, proxy: Arc<dyn Proxy>) {
        self.entries.push(proxy);
    }

    /// Removes every entry with the given name and returns them.
    pub(crate) fn remove_name(&mut self, name: &str) -> Vec<Arc<dyn Proxy>> {
        let mut removed = Vec::new();
        self.entries.retain(|p| {
            if p.name() == name {
                removed.push(p.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Removes exactly this handle, leaving other entries with the same name.
    pub(crate) fn remove_handle(&mut self, proxy: &Arc<dyn Proxy>) {
        self.entries.retain(|p| !Arc::ptr_eq(p, proxy));
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Proxy>> {
        self.entries.clone()
    }

    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn Proxy>> {
        std::mem::take(&mut self.entries)
    }
}

/// The serialized heart of a topology.
///
/// Every field here is mutated only while holding the topology's write lock;
/// see the concurrency notes on [`Mongos`](crate::Mongos).
pub(crate) struct TopologyCore {
    pub(crate) state: TopologyState,
    pub(crate) connecting: ProxySet,
    pub(crate) connected: ProxySet,
    pub(crate) disconnected: ProxySet,
    /// Smallest ismaster round-trip observed across all proxies ever seen,
    /// in milliseconds. `u64::MAX` until the first sample.
    pub(crate) min_latency_ms: u64,
    /// True only while an authentication fan-out is in flight.
    pub(crate) authenticating: bool,
    /// Rotating selection cursor.
    pub(crate) index: usize,
    /// Guards the once-only `Connect`/`FullSetup`/`All` emission.
    pub(crate) connect_emitted: bool,
    /// Set when the initial seed batch has settled for the first time.
    pub(crate) initial_batch_settled: bool,
}

impl TopologyCore {
    pub(crate) fn new() -> TopologyCore {
        TopologyCore {
            state: TopologyState::Disconnected,
            connecting: ProxySet::new(),
            connected: ProxySet::new(),
            disconnected: ProxySet::new(),
            min_latency_ms: u64::MAX,
            authenticating: false,
            index: 0,
            connect_emitted: false,
            initial_batch_settled: false,
        }
    }

    /// Applies a state transition if the table allows it.
    ///
    /// An illegal transition is logged and rejected without mutating the
    /// state.
    pub(crate) fn transition(&mut self, to: TopologyState) -> bool {
        if !self.state.can_transition(to) {
            warn!(from = %self.state, to = %to, "illegal topology state transition rejected");
            return false;
        }
        self.state = to;
        true
    }

    pub(crate) fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.state == TopologyState::Destroyed
    }

    /// Folds a latency sample into the lower bound. The bound only ever
    /// decreases, and never moves once the topology is destroyed.
    pub(crate) fn observe_latency(&mut self, sample_ms: u64) {
        if self.is_destroyed() {
            return;
        }
        if sample_ms < self.min_latency_ms {
            self.min_latency_ms = sample_ms;
        }
    }

    fn set_mut(&mut self, id: SetId) -> &mut ProxySet {
        match id {
            SetId::Connecting => &mut self.connecting,
            SetId::Connected => &mut self.connected,
            SetId::Disconnected => &mut self.disconnected,
        }
    }

    /// Atomically transfers `proxy` from one set to another.
    ///
    /// Every same-name entry is first removed from both sets, so the
    /// disjointness invariant holds even when a duplicate handle exists. The
    /// displaced handles (same name, different object) are returned so the
    /// caller can destroy them outside the lock.
    pub(crate) fn move_proxy(
        &mut self,
        from: SetId,
        to: SetId,
        proxy: Arc<dyn Proxy>,
    ) -> Vec<Arc<dyn Proxy>> {
        let name = proxy.name().to_string();
        let mut displaced = self.set_mut(from).remove_name(&name);
        displaced.extend(self.set_mut(to).remove_name(&name));
        displaced.retain(|p| !Arc::ptr_eq(p, &proxy));
        self.set_mut(to).push(proxy);
        displaced
    }
}
