//! Buffering of operations submitted while no proxy is connected.
//!
//! When a topology has a disconnect handler configured, the dispatcher hands
//! it every operation that arrives while the connected set is empty instead
//! of failing the caller. The health monitor flushes the buffer through the
//! dispatcher at the top of the first tick that finds the topology connected
//! again; each operation carries its caller's responder, so the caller's
//! future resolves when its operation finally runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use bson::Document;
use mongoroute_common::ops::{CommandOptions, Credentials, WriteOptions};
use mongoroute_common::Result;
use tokio::sync::oneshot;

/// One deferred operation, ready to be re-dispatched.
#[derive(Debug)]
pub enum BufferedRequest {
    Insert {
        ns: String,
        docs: Vec<Document>,
        options: WriteOptions,
    },
    Update {
        ns: String,
        updates: Vec<Document>,
        options: WriteOptions,
    },
    Remove {
        ns: String,
        deletes: Vec<Document>,
        options: WriteOptions,
    },
    Command {
        ns: String,
        cmd: Document,
        options: CommandOptions,
    },
    Auth {
        mechanism: String,
        db: String,
        credentials: Credentials,
    },
}

impl BufferedRequest {
    /// The namespace the operation targets; auth fans out topology-wide.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            BufferedRequest::Insert { ns, .. }
            | BufferedRequest::Update { ns, .. }
            | BufferedRequest::Remove { ns, .. }
            | BufferedRequest::Command { ns, .. } => Some(ns),
            BufferedRequest::Auth { .. } => None,
        }
    }
}

/// A buffered operation together with its caller's responder.
///
/// Dropping the operation without sending resolves the caller's future to a
/// destroyed-topology error, which is exactly what happens when the topology
/// is torn down with work still buffered.
pub struct BufferedOperation {
    pub request: BufferedRequest,
    pub(crate) responder: oneshot::Sender<Result<Document>>,
}

impl BufferedOperation {
    pub(crate) fn new(request: BufferedRequest) -> (BufferedOperation, oneshot::Receiver<Result<Document>>) {
        let (responder, rx) = oneshot::channel();
        (BufferedOperation { request, responder }, rx)
    }
}

/// Receives operations submitted while the topology is disconnected.
pub trait DisconnectHandler: Send + Sync {
    /// Accepts one operation. Called with the topology lock held; must not
    /// block.
    fn add(&self, op: BufferedOperation);

    /// Removes and returns everything buffered so far, oldest first.
    fn drain(&self) -> Vec<BufferedOperation>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The default FIFO disconnect handler.
#[derive(Default)]
pub struct OperationBuffer {
    queue: Mutex<VecDeque<BufferedOperation>>,
}

impl OperationBuffer {
    pub fn new() -> OperationBuffer {
        OperationBuffer::default()
    }
}

impl DisconnectHandler for OperationBuffer {
    fn add(&self, op: BufferedOperation) {
        self.queue.lock().unwrap().push_back(op);
    }

    fn drain(&self) -> Vec<BufferedOperation> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}
