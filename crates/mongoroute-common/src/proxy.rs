//! The proxy collaborator interface.
//!
//! A [`Proxy`] is one mongos router connection owned by the topology manager:
//! it hides the TCP transport, wire framing, and authentication handshakes and
//! exposes only the operations the topology needs to coordinate. Concrete
//! implementations live with the driver's connection layer; tests script their
//! own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::host::Host;
use crate::ismaster::IsMaster;
use crate::ops::{CommandOptions, Credentials, WriteOptions};

/// Failure events a proxy surfaces after its connection is established.
///
/// Connect-time success and failure are the return value of [`Proxy::connect`];
/// these events cover the stable state that follows, where the topology
/// demotes the proxy on any of them.
#[derive(Debug, Clone)]
pub enum ProxyEvent {
    Close,
    Timeout,
    Error(String),
    ParseError(String),
}

/// One live wire connection held by a proxy handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// The remote `host:port` the connection is bound to.
    pub address: String,
}

/// TLS parameters passed through to the proxy transport.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub ca: Option<Vec<u8>>,
    pub cert: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
    pub passphrase: Option<String>,
    pub reject_unauthorized: bool,
    pub check_server_identity: bool,
}

/// Options a proxy handle is constructed with: the topology's base connection
/// parameters merged with one endpoint, plus the flags the topology pins on
/// every handle it owns.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub host: Host,
    /// Per-proxy connection pool size.
    pub pool_size: usize,
    pub keep_alive: bool,
    pub keep_alive_initial_delay: Duration,
    pub no_delay: bool,
    pub connection_timeout: Duration,
    pub socket_timeout: Duration,
    pub promote_longs: bool,
    /// Serialize each wire message into one contiguous buffer.
    pub single_buffer_serialization: bool,
    pub tls: Option<TlsOptions>,
    /// Always `false` for topology-owned handles; the topology performs its
    /// own rehabilitation instead of relying on the handle reconnecting.
    pub reconnect: bool,
    /// Always `false`; monitoring is driven by the topology's health monitor.
    pub monitoring: bool,
    /// Always `true`: the handle is owned by a topology, not used standalone.
    pub in_topology: bool,
}

/// A single mongos router connection, as seen by the topology manager.
#[async_trait]
pub trait Proxy: Send + Sync {
    /// The `host:port` name that keys this handle in the proxy sets.
    fn name(&self) -> &str;

    /// Establishes the connection and performs the ismaster handshake.
    ///
    /// On success the handle records its handshake ismaster reply and latency,
    /// readable through [`last_ismaster`](Proxy::last_ismaster) and
    /// [`last_ismaster_ms`](Proxy::last_ismaster_ms).
    async fn connect(&self) -> Result<()>;

    /// Runs a database command against this proxy.
    async fn command(&self, ns: &str, cmd: Document, options: CommandOptions) -> Result<Document>;

    async fn insert(&self, ns: &str, docs: Vec<Document>, options: WriteOptions)
        -> Result<Document>;

    async fn update(
        &self,
        ns: &str,
        updates: Vec<Document>,
        options: WriteOptions,
    ) -> Result<Document>;

    async fn remove(
        &self,
        ns: &str,
        deletes: Vec<Document>,
        options: WriteOptions,
    ) -> Result<Document>;

    /// Authenticates every connection of this proxy against `db`.
    async fn auth(&self, mechanism: &str, db: &str, credentials: &Credentials) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// The last ismaster reply received from this proxy, if any.
    fn last_ismaster(&self) -> Option<IsMaster>;

    /// Round-trip time of the last successful ismaster, in milliseconds.
    fn last_ismaster_ms(&self) -> Option<u64>;

    /// Records a fresh ismaster sample; called by the health monitor after a
    /// successful probe.
    fn set_ismaster(&self, reply: IsMaster, latency_ms: u64);

    /// The live wire connections this handle currently holds.
    fn connections(&self) -> Vec<ConnectionInfo>;

    /// Subscribes to stable-state failure events.
    fn subscribe(&self) -> broadcast::Receiver<ProxyEvent>;

    /// Tears down every connection. Safe to call more than once.
    async fn destroy(&self);

    /// Releases the handle's hold on the process without tearing it down.
    fn unref(&self);
}

/// Constructs proxy handles for the topology.
///
/// The initial-connect orchestrator builds one handle per seed; the
/// rehabilitator builds a fresh handle for every disconnected entry it
/// retries. Both go through this factory, which is the seam test suites use to
/// substitute scripted proxies.
pub trait ProxyFactory: Send + Sync {
    fn create(&self, options: ProxyOptions) -> Arc<dyn Proxy>;
}
