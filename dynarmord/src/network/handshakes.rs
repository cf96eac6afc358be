use crate::network::Config;
use dynarmor_network::{
    net::{Accepting, Connection},
    ServerIdentity,
};
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::sync::{mpsc, Semaphore};

/// the identity used for the new handshakes, swapped on reload
pub(super) type SharedIdentity = Arc<RwLock<Arc<ServerIdentity>>>;

/// spawn one task per inbound connection to run its handshake
///
/// the number of handshakes running at the same time is bounded, inbound
/// connections arriving while the limit is reached are closed right away.
/// Established sessions are queued in the `sessions` channel.
pub(super) struct Handshakes {
    permits: Arc<Semaphore>,
    identity: SharedIdentity,
    idle_timeout: Duration,
    sessions: mpsc::Sender<Connection>,
}

impl Handshakes {
    pub fn new(
        identity: SharedIdentity,
        config: &Config,
        sessions: mpsc::Sender<Connection>,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_handshakes)),
            identity,
            idle_timeout: config.idle_timeout,
            sessions,
        }
    }

    pub fn accept(&self, accepting: Accepting) {
        let peer = accepting.remote_address();

        let permit = if let Ok(permit) = self.permits.clone().try_acquire_owned() {
            permit
        } else {
            tracing::warn!(peer = %peer, "too many handshakes in progress, closing connection");
            return;
        };

        // the handshake keeps the identity it started with even if
        // the server's identity is reloaded in the meantime
        let identity = current(&self.identity);
        let sessions = self.sessions.clone();
        let idle_timeout = self.idle_timeout;
        let accepting = accepting.with_idle_timeout(idle_timeout);

        let _ = tokio::spawn(async move {
            let result = accepting.handshake(&identity).await;
            drop(permit);

            match result {
                Err(error) => {
                    tracing::warn!(
                        peer = %peer,
                        kind = %error.kind(),
                        reason = %error,
                        "handshake aborted"
                    );
                }
                Ok(connection) => {
                    tracing::info!(peer = %peer, "session established");
                    match tokio::time::timeout(idle_timeout, sessions.send(connection)).await {
                        Ok(Ok(())) => (),
                        Ok(Err(_)) => {
                            tracing::debug!(peer = %peer, "no more session consumer, closing connection")
                        }
                        Err(_) => {
                            tracing::warn!(peer = %peer, "session queue is full, closing connection")
                        }
                    }
                }
            }
        });
    }
}

pub(super) fn current(identity: &SharedIdentity) -> Arc<ServerIdentity> {
    identity
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
