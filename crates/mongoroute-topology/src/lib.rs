//! Mongos proxy topology manager.
//!
//! This crate is the coordination core of a sharded-cluster driver. It owns a
//! pool of mongos router proxies, brings an arbitrary seed list to a
//! known-good connected set without blocking callers, keeps the set healthy
//! with periodic ismaster probes, and dispatches application operations to
//! one eligible proxy per call using latency-windowed round-robin selection.
//!
//! # Architecture
//!
//! - **State store** - three insertion-ordered proxy sets (connecting,
//!   connected, disconnected) plus the lifecycle state, latency lower bound,
//!   auth latch, and rotation index, all behind one lock
//! - **Initial connect orchestrator** - staggered per-seed connect attempts,
//!   promotion on success, quarantine on failure
//! - **Health monitor** - one periodic task that pings the connected set,
//!   demotes failures, and rehabilitates disconnected entries
//! - **Selector** - round-robin over the proxies inside the latency window
//! - **Dispatcher** - the destroyed/disconnected gate in front of every
//!   operation, with the buffered-while-offline handoff
//! - **Auth coordinator** - the authenticate-everything fan-out, mutually
//!   exclusive with rehabilitation promotions
//! - **Event fan-out** - membership and server-discovery events on a
//!   broadcast channel
//!
//! The per-proxy connection machinery (TCP, wire framing, auth mechanisms)
//! is deliberately not here: it lives behind the `Proxy` trait in
//! `mongoroute-common`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mongoroute_common::{Host, ProxyFactory};
//! use mongoroute_topology::{Mongos, TopologyOptions};
//!
//! # async fn demo(factory: Arc<dyn ProxyFactory>) -> mongoroute_common::Result<()> {
//! let topology = Mongos::new(
//!     vec![Host::new("router-a", 27017), Host::new("router-b", 27017)],
//!     TopologyOptions::default(),
//!     factory,
//! )?;
//!
//! let events = topology.subscribe();
//! topology.connect(None).await?;
//! // ... wait for TopologyEvent::Connect, then dispatch operations
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cursor;
pub mod events;
pub mod options;
pub mod state;

mod auth;
mod connect;
mod monitor;
mod selector;
mod topology;

#[cfg(test)]
pub(crate) mod test_support;

pub use buffer::{BufferedOperation, BufferedRequest, DisconnectHandler, OperationBuffer};
pub use cursor::{Cursor, CursorFactory, CursorOptions, DefaultCursorFactory};
pub use events::TopologyEvent;
pub use options::{ConnectOptions, TopologyOptions};
pub use state::TopologyState;
pub use topology::Mongos;
