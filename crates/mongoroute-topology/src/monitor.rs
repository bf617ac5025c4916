//! Periodic health monitoring and proxy rehabilitation.
//!
//! A single task per topology: sleep `ha_interval`, run one tick, repeat.
//! The tick pings every connected proxy concurrently, demotes the ones that
//! fail their ismaster, and then gives every disconnected entry a fresh
//! connect attempt. The sleep is rescheduled only after the tick completes,
//! so at most one tick is ever in flight.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use bson::doc;
use futures::future::join_all;
use mongoroute_common::ismaster::IsMaster;
use mongoroute_common::ops::CommandOptions;
use mongoroute_common::proxy::Proxy;
use mongoroute_common::Host;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::events::TopologyEvent;
use crate::state::{SetId, TopologyState};
use crate::topology::Mongos;

impl Mongos {
    /// Starts the health monitor task. Only the first call does anything.
    pub(crate) fn start_monitor(&self, first_connect: bool) {
        if self.inner.monitor_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let topology = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let mut first = first_connect;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!(topology_id = topology.inner.id, "health monitor stopped");
                        return;
                    }
                    _ = sleep(topology.inner.options.ha_interval) => {}
                }
                if topology.monitor_tick(first).await {
                    debug!(topology_id = topology.inner.id, "health monitor stopped");
                    return;
                }
                first = false;
            }
        });
    }

    /// One monitor tick. Returns `true` when the topology is destroyed and
    /// the monitor must stop.
    async fn monitor_tick(&self, first_connect: bool) -> bool {
        {
            let core = self.inner.core.read().await;
            if core.is_destroyed() {
                return true;
            }
        }

        if self.is_connected().await {
            self.flush_buffered().await;
        }

        let proxies = { self.inner.core.read().await.connected.snapshot() };

        if proxies.is_empty() {
            // Nothing to ping; try to bring the disconnected entries back.
            let promoted = self.rehabilitate().await;
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                return true;
            }
            let connected_now = core.is_connected();
            if core.state == TopologyState::Connecting
                && first_connect
                && connected_now
                && !core.connect_emitted
            {
                if core.transition(TopologyState::Connected) {
                    core.connect_emitted = true;
                    self.emit(TopologyEvent::Connect);
                    self.emit(TopologyEvent::FullSetup);
                    self.emit(TopologyEvent::All);
                }
            } else if connected_now && promoted > 0 {
                self.emit(TopologyEvent::Reconnect);
            } else if !connected_now && self.inner.options.fatal_when_unavailable {
                warn!(topology_id = self.inner.id, "no valid mongos proxies found");
                if self.inner.options.emit_error {
                    self.emit(TopologyEvent::Error {
                        message: "no valid mongos proxies found".to_string(),
                    });
                }
            }
            return false;
        }

        join_all(proxies.iter().map(|p| self.ping_proxy(p))).await;

        let promoted = self.rehabilitate().await;
        {
            let core = self.inner.core.read().await;
            if core.is_destroyed() {
                return true;
            }
            if promoted > 0 && core.is_connected() {
                self.emit(TopologyEvent::Reconnect);
            }
        }
        false
    }

    /// Probes one connected proxy with ismaster and applies the outcome.
    async fn ping_proxy(&self, proxy: &Arc<dyn Proxy>) {
        let name = proxy.name().to_string();
        self.emit(TopologyEvent::ServerHeartbeatStarted {
            connection_id: name.clone(),
        });

        let start = Instant::now();
        let reply = proxy
            .command("admin.$cmd", doc! { "ismaster": true }, CommandOptions::monitoring())
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let mut to_destroy = false;
        {
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                drop(core);
                proxy.destroy().await;
                return;
            }

            // The lower bound is fed from the handle's previous sample, not
            // the round-trip just measured, unless the probe-sample option
            // is set.
            let sample = if self.inner.options.latency_sample_from_probe {
                Some(latency_ms)
            } else {
                proxy.last_ismaster_ms()
            };
            if let Some(ms) = sample {
                core.observe_latency(ms);
            }

            match reply {
                Ok(reply) => {
                    proxy.set_ismaster(IsMaster::from_document(reply.clone()), latency_ms);
                    self.emit(TopologyEvent::ServerDescriptionChanged {
                        address: name.clone(),
                    });
                    self.emit(TopologyEvent::ServerHeartbeatSucceeded {
                        duration_ms: latency_ms,
                        reply,
                        connection_id: name,
                    });
                }
                Err(err) => {
                    self.emit(TopologyEvent::ServerHeartbeatFailed {
                        duration_ms: latency_ms,
                        failure: err.to_string(),
                        connection_id: name.clone(),
                    });
                    let still_connected =
                        core.connected.iter().any(|p| Arc::ptr_eq(p, proxy));
                    if still_connected {
                        warn!(proxy = %name, error = %err, "mongos proxy failed its heartbeat");
                        core.move_proxy(SetId::Connected, SetId::Disconnected, proxy.clone());
                        self.emit(TopologyEvent::Left {
                            kind: "mongos",
                            name: name.clone(),
                        });
                    }
                    to_destroy = true;
                }
            }
        }
        if to_destroy {
            proxy.destroy().await;
            self.emit(TopologyEvent::ServerClosed { address: proxy.name().to_string() });
        }
    }

    /// Gives every disconnected entry a fresh connect attempt, staggered
    /// 1 ms per index. Returns how many were promoted back to connected.
    pub(crate) async fn rehabilitate(&self) -> usize {
        let entries = { self.inner.core.read().await.disconnected.snapshot() };
        if entries.is_empty() {
            return 0;
        }
        debug!(
            count = entries.len(),
            "attempting to rehabilitate disconnected mongos proxies"
        );
        let attempts = entries
            .iter()
            .enumerate()
            .map(|(i, dead)| self.rehab_attempt(dead, i as u64));
        join_all(attempts).await.into_iter().filter(|ok| *ok).count()
    }

    /// One rehabilitation attempt: reconstruct a fresh handle for the dead
    /// entry's endpoint and try to promote it.
    async fn rehab_attempt(&self, dead: &Arc<dyn Proxy>, stagger_ms: u64) -> bool {
        sleep(std::time::Duration::from_millis(stagger_ms)).await;

        let host: Host = match dead.name().parse() {
            Ok(host) => host,
            Err(_) => {
                warn!(name = dead.name(), "disconnected entry has an unparsable name");
                return false;
            }
        };
        let connect_options = self.inner.connect_options.lock().unwrap().clone();
        let proxy_options = self
            .inner
            .options
            .proxy_options(host, connect_options.as_ref());
        let proxy = self.inner.factory.create(proxy_options);
        self.emit(TopologyEvent::ServerOpening {
            address: proxy.name().to_string(),
        });

        let outcome = proxy.connect().await;

        let mut to_destroy: Vec<Arc<dyn Proxy>> = Vec::new();
        let promoted;
        {
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                drop(core);
                proxy.destroy().await;
                return false;
            }
            match outcome {
                Ok(()) if core.authenticating => {
                    // This handle missed the auth fan-out; promoting it would
                    // leave an unauthenticated proxy in the connected set.
                    debug!(proxy = proxy.name(), "discarding proxy connected during auth");
                    to_destroy.push(proxy.clone());
                    promoted = false;
                }
                Ok(()) => {
                    self.attach_stable_watcher(&proxy);
                    let displaced =
                        core.move_proxy(SetId::Disconnected, SetId::Connected, proxy.clone());
                    to_destroy.extend(displaced);
                    debug!(proxy = proxy.name(), "mongos proxy rehabilitated");
                    self.emit(TopologyEvent::Joined {
                        kind: "mongos",
                        name: proxy.name().to_string(),
                    });
                    promoted = true;
                }
                Err(err) => {
                    // The entry stays in `disconnected` for the next pass.
                    debug!(proxy = proxy.name(), error = %err, "rehabilitation attempt failed");
                    to_destroy.push(proxy.clone());
                    promoted = false;
                }
            }
        }
        for stale in to_destroy {
            stale.destroy().await;
        }
        promoted
    }
}
