//! Scriptable proxy stub shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::Document;
use mongoroute_common::ismaster::IsMaster;
use mongoroute_common::ops::{CommandOptions, Credentials, WriteOptions};
use mongoroute_common::proxy::{ConnectionInfo, Proxy, ProxyEvent};
use mongoroute_common::Result;
use tokio::sync::broadcast;

pub(crate) struct StubProxy {
    name: String,
    connected: AtomicBool,
    ismaster: Mutex<Option<(IsMaster, u64)>>,
    events: broadcast::Sender<ProxyEvent>,
}

impl StubProxy {
    pub(crate) fn named(name: &str) -> Arc<dyn Proxy> {
        Arc::new(StubProxy {
            name: name.to_string(),
            connected: AtomicBool::new(true),
            ismaster: Mutex::new(None),
            events: broadcast::channel(16).0,
        })
    }

    pub(crate) fn with_latency(name: &str, latency_ms: u64) -> Arc<dyn Proxy> {
        let stub = StubProxy {
            name: name.to_string(),
            connected: AtomicBool::new(true),
            ismaster: Mutex::new(None),
            events: broadcast::channel(16).0,
        };
        stub.set_ismaster(IsMaster::from_document(bson::doc! { "ok": 1 }), latency_ms);
        Arc::new(stub)
    }

    pub(crate) fn disconnected(name: &str, latency_ms: u64) -> Arc<dyn Proxy> {
        let stub = StubProxy {
            name: name.to_string(),
            connected: AtomicBool::new(false),
            ismaster: Mutex::new(None),
            events: broadcast::channel(16).0,
        };
        stub.set_ismaster(IsMaster::from_document(bson::doc! { "ok": 1 }), latency_ms);
        Arc::new(stub)
    }
}

#[async_trait]
impl Proxy for StubProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn command(&self, _ns: &str, _cmd: Document, _options: CommandOptions) -> Result<Document> {
        Ok(Document::new())
    }

    async fn insert(&self, _ns: &str, _docs: Vec<Document>, _options: WriteOptions) -> Result<Document> {
        Ok(Document::new())
    }

    async fn update(
        &self,
        _ns: &str,
        _updates: Vec<Document>,
        _options: WriteOptions,
    ) -> Result<Document> {
        Ok(Document::new())
    }

    async fn remove(
        &self,
        _ns: &str,
        _deletes: Vec<Document>,
        _options: WriteOptions,
    ) -> Result<Document> {
        Ok(Document::new())
    }

    async fn auth(&self, _mechanism: &str, _db: &str, _credentials: &Credentials) -> Result<()> {
        Ok(())
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
        vec![ConnectionInfo {
            address: self.name.clone(),
        }]
    }

    fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    async fn destroy(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn unref(&self) {}
}
