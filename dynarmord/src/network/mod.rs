pub mod config;
mod handshakes;

pub use self::config::Config;
use self::handshakes::{Handshakes, SharedIdentity};
use anyhow::{Context as _, Result};
use dynarmor_network::{
    net::{Connection, Listener},
    ServerIdentity,
};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// the server's network task
///
/// accepts inbound connections and runs the handshake of each of them in
/// its own task. The established sessions are retrieved with
/// [`Network::next_session`].
pub struct Network {
    local_address: SocketAddr,
    identity: SharedIdentity,
    sessions: mpsc::Receiver<Connection>,
    stop: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct Runner {
    listener: Listener,
    handshakes: Handshakes,
    stop: CancellationToken,
}

impl Network {
    pub async fn new(identity: Arc<ServerIdentity>, config: Config) -> Result<Self> {
        config.check().context("Invalid network configuration")?;

        let (session_sender, session_receiver) = mpsc::channel(config.session_queue_size);

        let listener = Listener::new(config.listen_address, config.backlog)
            .await
            .context("Cannot start listening for inbound connections")?;
        let local_address = listener.local_address()?;

        tracing::info!(
            listen_address = %local_address,
            fingerprint = %identity.fingerprint(),
            "listening for inbound connections"
        );

        let identity = Arc::new(RwLock::new(identity));
        let stop = CancellationToken::new();

        let runner = Runner {
            listener,
            handshakes: Handshakes::new(identity.clone(), &config, session_sender),
            stop: stop.clone(),
        };

        let handle = tokio::spawn(runner.run());

        Ok(Self {
            local_address,
            identity,
            sessions: session_receiver,
            stop,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// the address the server is actually listening to
    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// the identity new handshakes are performed with
    pub fn identity(&self) -> Arc<ServerIdentity> {
        handshakes::current(&self.identity)
    }

    /// wait for the next established session
    ///
    /// returns `None` once the network is stopped and every handshake
    /// that was in progress is finished.
    pub async fn next_session(&mut self) -> Option<Connection> {
        self.sessions.recv().await
    }

    /// replace the identity used for the new handshakes
    ///
    /// the handshakes already in progress are not affected.
    pub fn reload(&self, identity: Arc<ServerIdentity>) {
        tracing::info!(fingerprint = %identity.fingerprint(), "reloading server identity");
        *self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = identity;
    }

    /// stop accepting new connections
    ///
    /// once this function returns the listening socket is closed. The
    /// handshakes in progress are not interrupted. Calling it more than
    /// once is harmless.
    pub async fn stop(&self) {
        self.stop.cancel();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                tracing::error!(reason = %error, "network task did not terminate properly");
            }
        }
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl Runner {
    #[tracing::instrument(skip(self), level = "info")]
    async fn run(self) {
        loop {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => break,

                // new connections handshake will run within another task
                accepting = self.listener.accept() => {
                    match accepting {
                        Ok(accepting) => self.handshakes.accept(accepting),
                        Err(_) if self.stop.is_cancelled() => break,
                        Err(error) => {
                            tracing::warn!(reason = ?error, "failed to accept a new connection");
                            if backoff(&self.stop).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        tracing::info!("stopped accepting inbound connections");
    }
}

/// wait a little before accepting again, returns `true` if the network
/// was stopped in the meantime
///
/// errors such as running out of file descriptors tend to repeat
/// until some connections are closed.
async fn backoff(stop: &CancellationToken) -> bool {
    tokio::select! {
        _ = stop.cancelled() => true,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => false,
    }
}
