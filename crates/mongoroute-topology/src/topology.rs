//! The mongos proxy topology.
//!
//! [`Mongos`] owns a set of router proxies and coordinates everything that
//! happens to them: the initial seed-list connect, periodic health
//! monitoring, latency-windowed selection, operation dispatch, and the
//! authenticate-everything fan-out. It is a cheap-clone handle; every clone
//! sees the same topology.
//!
//! # Concurrency
//!
//! All topology state (the three proxy sets, the lifecycle state, the
//! latency lower bound, the auth latch, the selection index) lives behind a
//! single `RwLock`. Connect callbacks, probe callbacks, rehabilitation
//! callbacks, and public operations each take the write lock for their
//! state step and release it before any proxy I/O, so mutations are
//! serialized while the wire work runs concurrently. Destroying the
//! topology is the universal cancellation: every resumed callback re-checks
//! the destroyed state before touching the sets.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bson::{doc, Document};
use mongoroute_common::ops::{CommandOptions, WriteOptions};
use mongoroute_common::proxy::{ConnectionInfo, Proxy, ProxyEvent, ProxyFactory};
use mongoroute_common::{Error, Host, Result};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::buffer::{BufferedOperation, BufferedRequest};
use crate::cursor::{Cursor, CursorFactory, CursorOptions, DefaultCursorFactory};
use crate::events::{EventBus, TopologyEvent};
use crate::options::{ConnectOptions, TopologyOptions};
use crate::state::{SetId, TopologyCore, TopologyState};

static TOPOLOGY_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) struct Inner {
    pub(crate) id: u64,
    pub(crate) seeds: Vec<Host>,
    pub(crate) options: TopologyOptions,
    pub(crate) core: RwLock<TopologyCore>,
    pub(crate) events: EventBus,
    pub(crate) factory: Arc<dyn ProxyFactory>,
    /// Fired once on destroy; cancels the monitor and every proxy watcher.
    pub(crate) shutdown: broadcast::Sender<()>,
    pub(crate) monitor_started: AtomicBool,
    /// The options recorded by `connect`, reused for rehabilitation.
    pub(crate) connect_options: StdMutex<Option<ConnectOptions>>,
}

/// A sharded-cluster router topology.
#[derive(Clone)]
pub struct Mongos {
    pub(crate) inner: Arc<Inner>,
}

impl Mongos {
    /// The topology type this manager implements.
    pub const TOPOLOGY_TYPE: &'static str = "mongos";

    /// Creates a topology over a non-empty seed list.
    ///
    /// Nothing connects until [`connect`](Mongos::connect) is called.
    pub fn new(
        seeds: Vec<Host>,
        options: TopologyOptions,
        factory: Arc<dyn ProxyFactory>,
    ) -> Result<Mongos> {
        if seeds.is_empty() {
            return Err(Error::InvalidSeedList("seed list is empty".to_string()));
        }
        let (shutdown, _) = broadcast::channel(1);
        Ok(Mongos {
            inner: Arc::new(Inner {
                id: TOPOLOGY_ID.fetch_add(1, Ordering::SeqCst),
                seeds,
                options,
                core: RwLock::new(TopologyCore::new()),
                events: EventBus::new(),
                factory,
                shutdown,
                monitor_started: AtomicBool::new(false),
                connect_options: StdMutex::new(None),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn topology_type(&self) -> &'static str {
        Self::TOPOLOGY_TYPE
    }

    pub fn seeds(&self) -> &[Host] {
        &self.inner.seeds
    }

    pub fn options(&self) -> &TopologyOptions {
        &self.inner.options
    }

    /// Subscribes to the topology's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> TopologyState {
        self.inner.core.read().await.state
    }

    /// True while at least one proxy is connected.
    pub async fn is_connected(&self) -> bool {
        self.inner.core.read().await.is_connected()
    }

    pub async fn is_destroyed(&self) -> bool {
        self.inner.core.read().await.is_destroyed()
    }

    /// The smallest ismaster round-trip observed so far, if any.
    pub async fn lower_bound_latency_ms(&self) -> Option<u64> {
        let ms = self.inner.core.read().await.min_latency_ms;
        (ms != u64::MAX).then_some(ms)
    }

    pub(crate) fn emit(&self, event: TopologyEvent) {
        self.inner.events.emit(event);
    }

    // ---- dispatch -------------------------------------------------------

    pub async fn insert(
        &self,
        ns: &str,
        docs: Vec<Document>,
        options: WriteOptions,
    ) -> Result<Document> {
        self.run_request(BufferedRequest::Insert {
            ns: ns.to_string(),
            docs,
            options,
        })
        .await
    }

    pub async fn update(
        &self,
        ns: &str,
        updates: Vec<Document>,
        options: WriteOptions,
    ) -> Result<Document> {
        self.run_request(BufferedRequest::Update {
            ns: ns.to_string(),
            updates,
            options,
        })
        .await
    }

    pub async fn remove(
        &self,
        ns: &str,
        deletes: Vec<Document>,
        options: WriteOptions,
    ) -> Result<Document> {
        self.run_request(BufferedRequest::Remove {
            ns: ns.to_string(),
            deletes,
            options,
        })
        .await
    }

    /// Runs a command against one eligible proxy. The read preference in
    /// `options` is passed through unchanged; every mongos is a peer, so it
    /// never influences which proxy is selected.
    pub async fn command(
        &self,
        ns: &str,
        cmd: Document,
        options: CommandOptions,
    ) -> Result<Document> {
        self.run_request(BufferedRequest::Command {
            ns: ns.to_string(),
            cmd,
            options,
        })
        .await
    }

    /// Dispatches one operation through the common gate: destroyed check,
    /// buffered-offline handoff, then latency-windowed selection.
    pub(crate) async fn run_request(&self, request: BufferedRequest) -> Result<Document> {
        // Auth re-enters through the auth coordinator, which has its own gate.
        let request = match request {
            BufferedRequest::Auth {
                mechanism,
                db,
                credentials,
            } => {
                return self
                    .auth(&mechanism, &db, &credentials)
                    .await
                    .map(|_| doc! { "ok": 1 })
            }
            other => other,
        };

        let proxy = {
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                return Err(Error::TopologyDestroyed);
            }
            if !core.is_connected() {
                if let Some(handler) = &self.inner.options.disconnect_handler {
                    let (op, rx) = BufferedOperation::new(request);
                    handler.add(op);
                    drop(core);
                    // The buffer owns completion now; this resolves when the
                    // monitor flushes after a reconnect.
                    return rx.await.map_err(|_| Error::TopologyDestroyed)?;
                }
                return Err(Error::NoProxyAvailable);
            }
            core.pick_proxy(self.inner.options.local_threshold())
                .ok_or(Error::NoProxyAvailable)?
        };

        match request {
            BufferedRequest::Insert { ns, docs, options } => proxy.insert(&ns, docs, options).await,
            BufferedRequest::Update {
                ns,
                updates,
                options,
            } => proxy.update(&ns, updates, options).await,
            BufferedRequest::Remove {
                ns,
                deletes,
                options,
            } => proxy.remove(&ns, deletes, options).await,
            BufferedRequest::Command { ns, cmd, options } => proxy.command(&ns, cmd, options).await,
            BufferedRequest::Auth { .. } => unreachable!("auth returned above"),
        }
    }

    /// Replays everything the disconnect handler buffered while offline.
    ///
    /// Each operation runs on its own task so a replay that buffers again
    /// (the topology dropped offline mid-flush) cannot stall the monitor.
    pub(crate) async fn flush_buffered(&self) {
        let Some(handler) = self.inner.options.disconnect_handler.clone() else {
            return;
        };
        let ops = handler.drain();
        if ops.is_empty() {
            return;
        }
        debug!(count = ops.len(), "replaying operations buffered while disconnected");
        for BufferedOperation { request, responder } in ops {
            let topology = self.clone();
            tokio::spawn(async move {
                let result = topology.run_request(request).await;
                let _ = responder.send(result);
            });
        }
    }

    // ---- selection and introspection ------------------------------------

    /// Constructs a cursor synchronously; no I/O happens until it is driven.
    pub fn cursor(&self, ns: &str, cmd: Document, options: CursorOptions) -> Cursor {
        match &self.inner.options.cursor_factory {
            Some(factory) => factory.create(self.clone(), ns.to_string(), cmd, options),
            None => DefaultCursorFactory.create(self.clone(), ns.to_string(), cmd, options),
        }
    }

    /// Picks one eligible proxy, or `None` when the window is empty.
    pub async fn get_server(&self) -> Option<Arc<dyn Proxy>> {
        let picked = {
            let mut core = self.inner.core.write().await;
            core.pick_proxy(self.inner.options.local_threshold())
        };
        if self.inner.options.debug {
            self.emit(TopologyEvent::PickedServer {
                name: picked.as_ref().map(|p| p.name().to_string()),
            });
        }
        picked
    }

    /// Every live wire connection across the connected proxies.
    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        let core = self.inner.core.read().await;
        core.connected.iter().flat_map(|p| p.connections()).collect()
    }

    // ---- teardown -------------------------------------------------------

    /// Releases the topology's hold on the process without tearing down the
    /// proxies: transitions to Destroyed, unrefs every connecting and
    /// connected handle, and cancels the monitor.
    pub async fn unref(&self) {
        let handles = {
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                return;
            }
            core.transition(TopologyState::Destroyed);
            let mut handles = core.connecting.snapshot();
            handles.extend(core.connected.snapshot());
            handles
        };
        let _ = self.inner.shutdown.send(());
        for proxy in &handles {
            proxy.unref();
        }
        debug!(topology_id = self.inner.id, "mongos topology unreferenced");
    }

    /// Destroys the topology: cancels the monitor, destroys every connecting
    /// and connected proxy, fails any buffered operations, and emits
    /// `TopologyClosed`. Idempotent.
    pub async fn destroy(&self) {
        let handles = {
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                return;
            }
            core.transition(TopologyState::Destroyed);
            let mut handles = core.connecting.drain();
            handles.extend(core.connected.drain());
            handles
        };
        let _ = self.inner.shutdown.send(());
        if let Some(handler) = &self.inner.options.disconnect_handler {
            // Dropping the buffered operations resolves their callers with a
            // destroyed-topology error.
            drop(handler.drain());
        }
        for proxy in &handles {
            proxy.destroy().await;
            self.emit(TopologyEvent::ServerClosed {
                address: proxy.name().to_string(),
            });
        }
        self.emit(TopologyEvent::TopologyClosed {
            topology_id: self.inner.id,
        });
        info!(topology_id = self.inner.id, "mongos topology destroyed");
    }

    // ---- stable-state failure handling ----------------------------------

    /// Watches an established proxy for failure events and demotes it when
    /// one arrives. The watcher dies with the topology's shutdown signal.
    pub(crate) fn attach_stable_watcher(&self, proxy: &Arc<dyn Proxy>) {
        let mut events = proxy.subscribe();
        let mut shutdown = self.inner.shutdown.subscribe();
        let topology = self.clone();
        let proxy = proxy.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    event = events.recv() => match event {
                        Ok(event) => {
                            topology.demote(&proxy, event).await;
                            return;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                }
            }
        });
    }

    pub(crate) async fn demote(&self, proxy: &Arc<dyn Proxy>, event: ProxyEvent) {
        let mut core = self.inner.core.write().await;
        if core.is_destroyed() {
            return;
        }
        if !core.connected.iter().any(|p| Arc::ptr_eq(p, proxy)) {
            return;
        }
        warn!(proxy = proxy.name(), event = ?event, "mongos proxy connection lost");
        core.move_proxy(SetId::Connected, SetId::Disconnected, proxy.clone());
        self.emit(TopologyEvent::Left {
            kind: "mongos",
            name: proxy.name().to_string(),
        });
    }
}
