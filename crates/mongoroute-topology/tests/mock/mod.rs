//! Scripted mock proxies for driving the topology manager in tests.
//!
//! A [`MockCluster`] scripts per-endpoint behavior (connect outcome and
//! latency, probe failures, auth behavior) and records everything the
//! topology does to its proxies.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Document};
use mongoroute_common::ismaster::IsMaster;
use mongoroute_common::ops::{CommandOptions, Credentials, WriteOptions};
use mongoroute_common::proxy::{ConnectionInfo, Proxy, ProxyEvent, ProxyFactory, ProxyOptions};
use mongoroute_common::{Error, Result};
use mongoroute_topology::TopologyEvent;
use tokio::sync::broadcast;
use tokio::time::timeout;

#[derive(Clone)]
struct HostScript {
    connect_ok: bool,
    connect_delay: Duration,
    latency_ms: u64,
    arbiter_only: bool,
    fail_pings: u32,
    auth_error: Option<String>,
    auth_delay: Duration,
}

impl Default for HostScript {
    fn default() -> HostScript {
        HostScript {
            connect_ok: true,
            connect_delay: Duration::ZERO,
            latency_ms: 5,
            arbiter_only: false,
            fail_pings: 0,
            auth_error: None,
            auth_delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct HostStats {
    created: u32,
    destroyed: u32,
    unrefed: u32,
    auth_calls: u32,
    event_senders: Vec<broadcast::Sender<ProxyEvent>>,
}

#[derive(Default)]
pub struct MockCluster {
    scripts: Mutex<HashMap<String, HostScript>>,
    stats: Mutex<HashMap<String, HostStats>>,
    ops: Mutex<Vec<String>>,
}

impl MockCluster {
    pub fn new() -> Arc<MockCluster> {
        Arc::new(MockCluster::default())
    }

    fn script(&self, name: &str) -> HostScript {
        self.scripts
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn edit(&self, name: &str, f: impl FnOnce(&mut HostScript)) {
        f(self
            .scripts
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default())
    }

    pub fn proxy_up(&self, name: &str, latency_ms: u64) {
        self.edit(name, |s| {
            s.connect_ok = true;
            s.latency_ms = latency_ms;
        });
    }

    pub fn proxy_down(&self, name: &str) {
        self.edit(name, |s| s.connect_ok = false);
    }

    pub fn set_connect_delay(&self, name: &str, delay: Duration) {
        self.edit(name, |s| s.connect_delay = delay);
    }

    pub fn set_arbiter(&self, name: &str) {
        self.edit(name, |s| s.arbiter_only = true);
    }

    pub fn fail_next_ping(&self, name: &str) {
        self.edit(name, |s| s.fail_pings += 1);
    }

    pub fn set_auth_error(&self, name: &str, message: &str) {
        self.edit(name, |s| s.auth_error = Some(message.to_string()));
    }

    pub fn set_auth_delay(&self, name: &str, delay: Duration) {
        self.edit(name, |s| s.auth_delay = delay);
    }

    /// Emits a stable-state failure event on every live handle for `name`.
    pub fn emit_close(&self, name: &str) {
        if let Some(stats) = self.stats.lock().unwrap().get(name) {
            for sender in &stats.event_senders {
                let _ = sender.send(ProxyEvent::Close);
            }
        }
    }

    pub fn created(&self, name: &str) -> u32 {
        self.stats.lock().unwrap().get(name).map_or(0, |s| s.created)
    }

    pub fn destroyed(&self, name: &str) -> u32 {
        self.stats.lock().unwrap().get(name).map_or(0, |s| s.destroyed)
    }

    pub fn unrefed(&self, name: &str) -> u32 {
        self.stats.lock().unwrap().get(name).map_or(0, |s| s.unrefed)
    }

    pub fn auth_calls(&self, name: &str) -> u32 {
        self.stats.lock().unwrap().get(name).map_or(0, |s| s.auth_calls)
    }

    /// Every data operation any proxy has served, as `"op name ns"` lines.
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn record_op(&self, op: &str, name: &str, ns: &str) {
        self.ops
            .lock()
            .unwrap()
            .push(format!("{} {} {}", op, name, ns));
    }
}

pub struct MockFactory {
    cluster: Arc<MockCluster>,
}

impl MockFactory {
    pub fn new(cluster: Arc<MockCluster>) -> Arc<MockFactory> {
        Arc::new(MockFactory { cluster })
    }
}

impl ProxyFactory for MockFactory {
    fn create(&self, options: ProxyOptions) -> Arc<dyn Proxy> {
        assert!(options.in_topology);
        assert!(!options.reconnect);
        assert!(!options.monitoring);

        let name = options.host.name();
        let (events, _) = broadcast::channel(16);
        {
            let mut stats = self.cluster.stats.lock().unwrap();
            let entry = stats.entry(name.clone()).or_default();
            entry.created += 1;
            entry.event_senders.push(events.clone());
        }
        Arc::new(MockProxy {
            name,
            cluster: self.cluster.clone(),
            connected: AtomicBool::new(false),
            ismaster: Mutex::new(None),
            events,
        })
    }
}

pub struct MockProxy {
    name: String,
    cluster: Arc<MockCluster>,
    connected: AtomicBool,
    ismaster: Mutex<Option<(IsMaster, u64)>>,
    events: broadcast::Sender<ProxyEvent>,
}

impl MockProxy {
    fn handshake_document(&self, script: &HostScript) -> Document {
        doc! {
            "ismaster": true,
            "msg": "isdbgrid",
            "arbiterOnly": script.arbiter_only,
            "minWireVersion": 0,
            "maxWireVersion": 6,
            "ok": 1.0,
        }
    }
}

#[async_trait]
impl Proxy for MockProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let script = self.cluster.script(&self.name);
        if !script.connect_delay.is_zero() {
            tokio::time::sleep(script.connect_delay).await;
        }
        if !script.connect_ok {
            return Err(Error::Connection(format!("{}: connection refused", self.name)));
        }
        let reply = IsMaster::from_document(self.handshake_document(&script));
        *self.ismaster.lock().unwrap() = Some((reply, script.latency_ms));
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn command(&self, ns: &str, cmd: Document, options: CommandOptions) -> Result<Document> {
        if options.monitoring && cmd.contains_key("ismaster") {
            let mut failed = false;
            self.cluster.edit(&self.name, |s| {
                if s.fail_pings > 0 {
                    s.fail_pings -= 1;
                    failed = true;
                }
            });
            if failed {
                self.connected.store(false, Ordering::SeqCst);
                return Err(Error::Connection(format!("{}: ismaster failed", self.name)));
            }
            let script = self.cluster.script(&self.name);
            return Ok(self.handshake_document(&script));
        }
        self.cluster.record_op("command", &self.name, ns);
        Ok(doc! { "ok": 1, "via": self.name.clone() })
    }

    async fn insert(&self, ns: &str, docs: Vec<Document>, _options: WriteOptions) -> Result<Document> {
        self.cluster.record_op("insert", &self.name, ns);
        Ok(doc! { "ok": 1, "n": docs.len() as i32 })
    }

    async fn update(
        &self,
        ns: &str,
        updates: Vec<Document>,
        _options: WriteOptions,
    ) -> Result<Document> {
        self.cluster.record_op("update", &self.name, ns);
        Ok(doc! { "ok": 1, "n": updates.len() as i32 })
    }

    async fn remove(
        &self,
        ns: &str,
        deletes: Vec<Document>,
        _options: WriteOptions,
    ) -> Result<Document> {
        self.cluster.record_op("remove", &self.name, ns);
        Ok(doc! { "ok": 1, "n": deletes.len() as i32 })
    }

    async fn auth(&self, _mechanism: &str, _db: &str, _credentials: &Credentials) -> Result<()> {
        let script = self.cluster.script(&self.name);
        {
            let mut stats = self.cluster.stats.lock().unwrap();
            stats.entry(self.name.clone()).or_default().auth_calls += 1;
        }
        if !script.auth_delay.is_zero() {
            tokio::time::sleep(script.auth_delay).await;
        }
        match script.auth_error {
            Some(message) => Err(Error::Connection(message)),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn last_ismaster(&self) -> Option<IsMaster> {
        self.ismaster.lock().unwrap().as_ref().map(|(im, _)| im.clone())
    }

    fn last_ismaster_ms(&self) -> Option<u64> {
        self.ismaster.lock().unwrap().as_ref().map(|(_, ms)| *ms)
    }

    fn set_ismaster(&self, reply: IsMaster, latency_ms: u64) {
        *self.ismaster.lock().unwrap() = Some((reply, latency_ms));
    }

    fn connections(&self) -> Vec<ConnectionInfo> {
        if self.is_connected() {
            vec![ConnectionInfo {
                address: self.name.clone(),
            }]
        } else {
            Vec::new()
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    async fn destroy(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut stats = self.cluster.stats.lock().unwrap();
        stats.entry(self.name.clone()).or_default().destroyed += 1;
    }

    fn unref(&self) {
        let mut stats = self.cluster.stats.lock().unwrap();
        stats.entry(self.name.clone()).or_default().unrefed += 1;
    }
}

/// Collects events until `pred` matches, returning everything collected
/// including the match. Panics after 30 (virtual) seconds.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<TopologyEvent>,
    pred: impl Fn(&TopologyEvent) -> bool,
) -> Vec<TopologyEvent> {
    let mut seen = Vec::new();
    timeout(Duration::from_secs(30), async {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            let done = pred(&event);
            seen.push(event);
            if done {
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for topology event");
    seen
}

/// The `Joined`/`Left`/lifecycle core of an event stream, as compact strings
/// for order assertions.
pub fn membership_trace(events: &[TopologyEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            TopologyEvent::TopologyOpening { .. } => Some("opening".to_string()),
            TopologyEvent::TopologyClosed { .. } => Some("closed".to_string()),
            TopologyEvent::Joined { name, .. } => Some(format!("joined {}", name)),
            TopologyEvent::Left { name, .. } => Some(format!("left {}", name)),
            TopologyEvent::Failed { name } => Some(format!("failed {}", name)),
            TopologyEvent::Connect => Some("connect".to_string()),
            TopologyEvent::FullSetup => Some("fullsetup".to_string()),
            TopologyEvent::All => Some("all".to_string()),
            TopologyEvent::Reconnect => Some("reconnect".to_string()),
            _ => None,
        })
        .collect()
}
