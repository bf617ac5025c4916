//! Topology configuration.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mongoroute_common::proxy::{ProxyOptions, TlsOptions};
use mongoroute_common::Host;

use crate::buffer::DisconnectHandler;
use crate::cursor::CursorFactory;

/// Default interval between health monitor ticks.
pub const DEFAULT_HA_INTERVAL: Duration = Duration::from_millis(10_000);

/// Default width of the latency eligibility window, in milliseconds.
pub const DEFAULT_LOCAL_THRESHOLD_MS: u64 = 15;

/// Default per-proxy connection pool size.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Configuration for a [`Mongos`](crate::Mongos) topology.
///
/// Constructed with [`TopologyOptions::default`] and adjusted through the
/// `with_*` builders; connection and TLS parameters are passed through
/// verbatim to every proxy handle the topology constructs.
#[derive(Clone)]
pub struct TopologyOptions {
    /// Interval between health monitor ticks.
    pub ha_interval: Duration,
    /// Width of the latency eligibility window in milliseconds.
    ///
    /// `None` falls back to [`acceptable_latency_ms`](Self::acceptable_latency_ms),
    /// then to [`DEFAULT_LOCAL_THRESHOLD_MS`].
    pub local_threshold_ms: Option<u64>,
    /// Legacy synonym for `local_threshold_ms`, consulted only when the
    /// latter is unset.
    pub acceptable_latency_ms: Option<u64>,
    /// Connection pool size of each proxy handle.
    pub pool_size: usize,
    pub keep_alive: bool,
    pub keep_alive_initial_delay: Duration,
    pub no_delay: bool,
    pub connection_timeout: Duration,
    /// `None` disables the socket timeout.
    pub socket_timeout: Option<Duration>,
    pub tls: Option<TlsOptions>,
    pub promote_longs: bool,
    /// Serialize each wire message into one contiguous buffer.
    pub single_buffer_serialization: bool,
    /// Emit `PickedServer` events from `get_server`.
    pub debug: bool,
    /// Whether monitor-detected fatal conditions surface as `Error` events.
    pub emit_error: bool,
    /// Emit a fatal `Error` event when a rehabilitation pass ends with no
    /// connected proxies. Off by default.
    pub fatal_when_unavailable: bool,
    /// Fold the freshly measured probe round-trip into the latency lower
    /// bound instead of the handle's previous sample. Off by default.
    pub latency_sample_from_probe: bool,
    /// Factory for cursors returned by `Mongos::cursor`.
    pub cursor_factory: Option<Arc<dyn CursorFactory>>,
    /// Buffer for operations submitted while no proxy is connected.
    pub disconnect_handler: Option<Arc<dyn DisconnectHandler>>,
    /// Authentication mechanisms the driver has registered providers for.
    /// The `"default"` mechanism is always accepted.
    pub auth_providers: HashSet<String>,
}

impl Default for TopologyOptions {
    fn default() -> TopologyOptions {
        TopologyOptions {
            ha_interval: DEFAULT_HA_INTERVAL,
            local_threshold_ms: None,
            acceptable_latency_ms: None,
            pool_size: DEFAULT_POOL_SIZE,
            keep_alive: true,
            keep_alive_initial_delay: Duration::from_secs(300),
            no_delay: true,
            connection_timeout: Duration::from_secs(10),
            socket_timeout: None,
            tls: None,
            promote_longs: true,
            single_buffer_serialization: false,
            debug: false,
            emit_error: true,
            fatal_when_unavailable: false,
            latency_sample_from_probe: false,
            cursor_factory: None,
            disconnect_handler: None,
            auth_providers: HashSet::new(),
        }
    }
}

impl TopologyOptions {
    /// The effective eligibility window width in milliseconds.
    pub fn local_threshold(&self) -> u64 {
        self.local_threshold_ms
            .or(self.acceptable_latency_ms)
            .unwrap_or(DEFAULT_LOCAL_THRESHOLD_MS)
    }

    pub fn with_ha_interval(mut self, interval: Duration) -> Self {
        self.ha_interval = interval;
        self
    }

    pub fn with_local_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.local_threshold_ms = Some(threshold_ms);
        self
    }

    pub fn with_disconnect_handler(mut self, handler: Arc<dyn DisconnectHandler>) -> Self {
        self.disconnect_handler = Some(handler);
        self
    }

    pub fn with_cursor_factory(mut self, factory: Arc<dyn CursorFactory>) -> Self {
        self.cursor_factory = Some(factory);
        self
    }

    pub fn with_auth_provider(mut self, mechanism: impl Into<String>) -> Self {
        self.auth_providers.insert(mechanism.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_fatal_when_unavailable(mut self, fatal: bool) -> Self {
        self.fatal_when_unavailable = fatal;
        self
    }

    /// The options a proxy handle for `host` is constructed with: the
    /// topology's base connection parameters, the per-connect overrides
    /// recorded by `connect`, and the flags pinned on every topology-owned
    /// handle.
    pub(crate) fn proxy_options(
        &self,
        host: Host,
        connect: Option<&ConnectOptions>,
    ) -> ProxyOptions {
        let connection_timeout = connect
            .and_then(|c| c.connection_timeout)
            .unwrap_or(self.connection_timeout);
        let socket_timeout = connect
            .and_then(|c| c.socket_timeout)
            .or(self.socket_timeout)
            .unwrap_or(Duration::ZERO);
        ProxyOptions {
            host,
            pool_size: self.pool_size,
            keep_alive: self.keep_alive,
            keep_alive_initial_delay: self.keep_alive_initial_delay,
            no_delay: self.no_delay,
            connection_timeout,
            socket_timeout,
            promote_longs: self.promote_longs,
            single_buffer_serialization: self.single_buffer_serialization,
            tls: self.tls.clone(),
            reconnect: false,
            monitoring: false,
            in_topology: true,
        }
    }
}

impl fmt::Debug for TopologyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyOptions")
            .field("ha_interval", &self.ha_interval)
            .field("local_threshold_ms", &self.local_threshold())
            .field("pool_size", &self.pool_size)
            .field("connection_timeout", &self.connection_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("tls", &self.tls.is_some())
            .field("debug", &self.debug)
            .field("fatal_when_unavailable", &self.fatal_when_unavailable)
            .field("disconnect_handler", &self.disconnect_handler.is_some())
            .field("auth_providers", &self.auth_providers)
            .finish()
    }
}

/// Per-connect overrides recorded by [`Mongos::connect`](crate::Mongos::connect)
/// and merged into every proxy handle constructed afterwards, including
/// rehabilitation attempts.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub connection_timeout: Option<Duration>,
    pub socket_timeout: Option<Duration>,
}
