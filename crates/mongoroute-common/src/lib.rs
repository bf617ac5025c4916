//! Shared types for the mongoroute driver core.
//!
//! This crate carries everything the topology manager and a driver's
//! connection layer need to agree on:
//!
//! - [`error`] - The crate-wide error enum and `Result` alias
//! - [`host`] - `host:port` endpoints
//! - [`ismaster`] - The projected view of an ismaster reply
//! - [`ops`] - Per-operation option types (read preference, write options,
//!   credentials)
//! - [`proxy`] - The [`Proxy`]/[`ProxyFactory`] collaborator traits the
//!   topology consumes
//!
//! # Boundary
//!
//! mongoroute coordinates a set of mongos routers; it does not speak the wire
//! protocol itself. Everything connection-shaped (TCP, framing, BSON
//! encode/decode, auth mechanisms) sits behind the [`Proxy`] trait, so the
//! topology crate can be tested against scripted proxies and the production
//! connection layer can evolve independently.

pub mod error;
pub mod host;
pub mod ismaster;
pub mod ops;
pub mod proxy;

pub use error::{AuthFailure, Error, Result};
pub use host::Host;
pub use ismaster::IsMaster;
pub use ops::{CommandOptions, Credentials, ReadPreference, WriteOptions};
pub use proxy::{ConnectionInfo, Proxy, ProxyEvent, ProxyFactory, ProxyOptions, TlsOptions};
