//! Initial seed-list connect orchestration.

use std::sync::Arc;
use std::time::Duration;

use mongoroute_common::proxy::Proxy;
use mongoroute_common::{Error, Result};
use tracing::debug;

use crate::events::TopologyEvent;
use crate::options::ConnectOptions;
use crate::state::{SetId, TopologyState};
use crate::topology::Mongos;

impl Mongos {
    /// Starts connecting the seed list.
    ///
    /// This is the single entry out of the disconnected state. It returns as
    /// soon as every attempt is underway; completion is announced on the
    /// event stream (`Joined` per promoted seed, then `Connect`/`FullSetup`/
    /// `All` once the whole batch has settled with at least one success).
    /// Calling it in any state but Disconnected is a no-op.
    pub async fn connect(&self, options: Option<ConnectOptions>) -> Result<()> {
        let handles = {
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                return Err(Error::TopologyDestroyed);
            }
            if core.state != TopologyState::Disconnected {
                debug!(state = %core.state, "connect ignored; topology is not disconnected");
                return Ok(());
            }
            core.transition(TopologyState::Connecting);
            *self.inner.connect_options.lock().unwrap() = options.clone();
            self.emit(TopologyEvent::TopologyOpening {
                topology_id: self.inner.id,
            });

            let mut handles = Vec::with_capacity(self.inner.seeds.len());
            for seed in &self.inner.seeds {
                let proxy_options = self
                    .inner
                    .options
                    .proxy_options(seed.clone(), options.as_ref());
                let proxy = self.inner.factory.create(proxy_options);
                core.connecting.push(proxy.clone());
                self.emit(TopologyEvent::ServerOpening {
                    address: proxy.name().to_string(),
                });
                handles.push(proxy);
            }
            handles
        };

        for (i, proxy) in handles.into_iter().enumerate() {
            let topology = self.clone();
            tokio::spawn(async move {
                topology.initial_connect_attempt(proxy, i as u64).await;
            });
        }
        Ok(())
    }

    /// One seed's connect attempt and its one-shot completion handling.
    async fn initial_connect_attempt(self, proxy: Arc<dyn Proxy>, stagger_ms: u64) {
        // 1 ms per seed index sheds the thundering herd on constrained hosts.
        tokio::time::sleep(Duration::from_millis(stagger_ms)).await;

        let outcome = proxy.connect().await;

        let mut to_destroy: Vec<Arc<dyn Proxy>> = Vec::new();
        let mut start_monitor = false;
        {
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                drop(core);
                proxy.destroy().await;
                return;
            }

            let name = proxy.name().to_string();
            match outcome {
                Ok(()) => {
                    // The handshake ismaster is the topology's first latency
                    // sample for this proxy.
                    if let Some(ms) = proxy.last_ismaster_ms() {
                        core.observe_latency(ms);
                    }
                    if core.connected.contains_name(&name) {
                        // Another handle with this name won the race; this
                        // one is discarded, not moved.
                        core.connecting.remove_handle(&proxy);
                        to_destroy.push(proxy.clone());
                        self.emit(TopologyEvent::Failed { name });
                    } else {
                        self.attach_stable_watcher(&proxy);
                        let displaced =
                            core.move_proxy(SetId::Connecting, SetId::Connected, proxy.clone());
                        to_destroy.extend(displaced);
                        debug!(proxy = proxy.name(), "mongos proxy connected");
                        self.emit(TopologyEvent::Joined {
                            kind: "mongos",
                            name,
                        });
                    }
                }
                Err(err) => {
                    debug!(proxy = proxy.name(), error = %err, "mongos seed connect failed");
                    let displaced =
                        core.move_proxy(SetId::Connecting, SetId::Disconnected, proxy.clone());
                    to_destroy.extend(displaced);
                    // The dead handle stays in `disconnected` as the record
                    // the rehabilitator reconnects from.
                    to_destroy.push(proxy.clone());
                    self.emit(TopologyEvent::Left {
                        kind: "mongos",
                        name: name.clone(),
                    });
                    self.emit(TopologyEvent::Failed { name });
                }
            }

            if core.connecting.is_empty() && !core.initial_batch_settled {
                core.initial_batch_settled = true;
                if core.is_connected()
                    && !core.connect_emitted
                    && core.transition(TopologyState::Connected)
                {
                    core.connect_emitted = true;
                    self.emit(TopologyEvent::Connect);
                    self.emit(TopologyEvent::FullSetup);
                    self.emit(TopologyEvent::All);
                }
                start_monitor = true;
            }
        }

        for stale in to_destroy {
            stale.destroy().await;
        }
        if start_monitor {
            self.start_monitor(true);
        }
    }
}
