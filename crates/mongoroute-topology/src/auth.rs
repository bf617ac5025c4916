//! Topology-wide authentication.
//!
//! Authentication has to land on every connected proxy or the pool would
//! silently serve a mix of authenticated and unauthenticated connections.
//! The coordinator snapshots the connected set, fans the credential handshake
//! out to every non-arbiter member concurrently, and holds the
//! `authenticating` latch for the duration; while the latch is up, the
//! rehabilitator discards any proxy that finishes connecting instead of
//! promoting it.

use std::sync::Arc;

use futures::future::join_all;
use mongoroute_common::ops::Credentials;
use mongoroute_common::proxy::Proxy;
use mongoroute_common::{AuthFailure, Error, Result};
use tracing::{debug, warn};

use crate::buffer::{BufferedOperation, BufferedRequest};
use crate::topology::Mongos;

impl Mongos {
    /// Authenticates against every connected proxy.
    ///
    /// Fails fast when the mechanism has no registered provider (the
    /// `"default"` mechanism is always accepted) or when another auth
    /// fan-out is already in flight. While disconnected with a disconnect
    /// handler configured, the request is buffered like any other operation.
    /// Per-proxy failures are collected and surfaced together as
    /// [`Error::AuthFailed`].
    pub async fn auth(&self, mechanism: &str, db: &str, credentials: &Credentials) -> Result<()> {
        if mechanism != "default" && !self.inner.options.auth_providers.contains(mechanism) {
            return Err(Error::AuthProviderMissing(mechanism.to_string()));
        }

        let snapshot = {
            let mut core = self.inner.core.write().await;
            if core.is_destroyed() {
                return Err(Error::TopologyDestroyed);
            }
            if core.authenticating {
                return Err(Error::AuthInProgress);
            }
            if !core.is_connected() {
                if let Some(handler) = &self.inner.options.disconnect_handler {
                    let (op, rx) = BufferedOperation::new(BufferedRequest::Auth {
                        mechanism: mechanism.to_string(),
                        db: db.to_string(),
                        credentials: credentials.clone(),
                    });
                    handler.add(op);
                    drop(core);
                    return rx.await.map_err(|_| Error::TopologyDestroyed)?.map(|_| ());
                }
            }
            let snapshot = core.connected.snapshot();
            if snapshot.is_empty() {
                return Ok(());
            }
            core.authenticating = true;
            snapshot
        };

        // Arbiters take no client traffic and are skipped. A proxy without
        // an ismaster on record is treated as a regular member.
        let targets: Vec<Arc<dyn Proxy>> = snapshot
            .into_iter()
            .filter(|p| !p.last_ismaster().map_or(false, |im| im.arbiter_only))
            .collect();

        let failures: Vec<AuthFailure> = join_all(targets.iter().map(|proxy| async move {
            proxy
                .auth(mechanism, db, credentials)
                .await
                .err()
                .map(|err| AuthFailure {
                    name: proxy.name().to_string(),
                    message: err.to_string(),
                })
        }))
        .await
        .into_iter()
        .flatten()
        .collect();

        {
            let mut core = self.inner.core.write().await;
            core.authenticating = false;
        }

        if failures.is_empty() {
            debug!(mechanism, db, "authenticated against all mongos proxies");
            Ok(())
        } else {
            warn!(
                mechanism,
                db,
                failed = failures.len(),
                "authentication failed on some mongos proxies"
            );
            Err(Error::AuthFailed { failures })
        }
    }
}
