//! Cursor construction.
//!
//! `Mongos::cursor` builds a [`Cursor`] synchronously and performs no I/O;
//! the cursor carries everything needed to issue its command through the
//! topology when the caller drives it. Iteration (getMore, killCursors) is
//! the connection layer's concern, not the topology's.

use bson::Document;
use mongoroute_common::ops::{CommandOptions, ReadPreference};
use mongoroute_common::Result;

use crate::topology::Mongos;

/// Options a cursor is constructed with.
#[derive(Debug, Clone, Default)]
pub struct CursorOptions {
    pub batch_size: i32,
    pub limit: i32,
    pub skip: i32,
    pub read_preference: ReadPreference,
}

/// A command cursor wired to a topology.
pub struct Cursor {
    topology: Mongos,
    ns: String,
    cmd: Document,
    options: CursorOptions,
}

impl Cursor {
    pub fn new(topology: Mongos, ns: String, cmd: Document, options: CursorOptions) -> Cursor {
        Cursor {
            topology,
            ns,
            cmd,
            options,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.ns
    }

    pub fn command(&self) -> &Document {
        &self.cmd
    }

    pub fn options(&self) -> &CursorOptions {
        &self.options
    }

    /// Issues the cursor's initial command through the topology's dispatcher.
    pub async fn run(&self) -> Result<Document> {
        let options = CommandOptions {
            read_preference: self.options.read_preference,
            monitoring: false,
        };
        self.topology.command(&self.ns, self.cmd.clone(), options).await
    }
}

/// Builds cursors for `Mongos::cursor`.
///
/// The default factory constructs a plain [`Cursor`]; drivers substitute
/// their own to adjust the command or options before construction.
pub trait CursorFactory: Send + Sync {
    fn create(&self, topology: Mongos, ns: String, cmd: Document, options: CursorOptions)
        -> Cursor;
}

pub struct DefaultCursorFactory;

impl CursorFactory for DefaultCursorFactory {
    fn create(
        &self,
        topology: Mongos,
        ns: String,
        cmd: Document,
        options: CursorOptions,
    ) -> Cursor {
        Cursor::new(topology, ns, cmd, options)
    }
}
