/*!
Wrapper/helpers of the handshake on top of TCP

While it still possible to use the low level [`Handle`] for the implementation
of the protocol. The `net` module provides the necessary toolbox for a simple
to use network implementation
*/

use crate::{
    accept, deadline::IDLE_TIMEOUT, opening::Opening, Error, Fingerprint, Handle,
    ServerIdentity, SessionKeyMaterial,
};
use anyhow::{bail, Context as _, Result};
use rand_core::{CryptoRng, RngCore};
use rsa::RsaPublicKey;
use std::{
    fmt::{self, Display},
    net::SocketAddr,
    time::Duration,
};
use tokio::net::{
    lookup_host,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpListener, TcpSocket, TcpStream, ToSocketAddrs,
};

/// object that will listen to inbound connections
///
/// The handshake is not performed by the listener: every accepted
/// connection is returned as an [`Accepting`] so the handshake can run
/// in its own task while the listener goes back to accepting.
pub struct Listener {
    listener: TcpListener,
}

/// An established session with a remote peer
///
/// the connection is closed when dropped.
pub struct Connection {
    handle: Handle<OwnedReadHalf, OwnedWriteHalf>,
    peer_addr: SocketAddr,
}

/// an accepted inbound connection, waiting for its handshake
pub struct Accepting {
    handle: accept::Accepting<OwnedReadHalf, OwnedWriteHalf>,
    peer_addr: SocketAddr,
}

impl Listener {
    /// create a new listener object
    ///
    /// will listen for incoming connection at the given address, with
    /// a queue of `backlog` pending connections.
    pub async fn new(addr: SocketAddr, backlog: u32) -> Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .with_context(|| format!("Cannot create socket for {}", addr))?;

        #[cfg(unix)]
        socket
            .set_reuseaddr(true)
            .with_context(|| format!("Cannot set SO_REUSEADDR for {}", addr))?;

        socket
            .bind(addr)
            .with_context(|| format!("Cannot bind to {}", addr))?;
        let listener = socket
            .listen(backlog)
            .with_context(|| format!("Cannot listen to {}", addr))?;

        Ok(Self { listener })
    }

    /// the address the listener is bound to
    pub fn local_address(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Cannot retrieve the listener's address")
    }

    /// start accepting a new incoming connection
    ///
    /// this function _blocks_ until a new inbound connection happens. This function
    /// does not perform any part of the handshake.
    pub async fn accept(&self) -> Result<Accepting> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .context("Cannot accept new peer from the listener")?;

        let (reader, writer) = stream.into_split();

        let handle = Handle::accept(reader, writer);

        Ok(Accepting { handle, peer_addr })
    }
}

impl Accepting {
    /// the inbound new connection's remote address
    ///
    /// beware that this may not reflect the peer's actual address as they may be
    /// behind routers.
    pub fn remote_address(&self) -> SocketAddr {
        self.peer_addr
    }

    /// bound every read and write of the handshake by `idle`
    pub fn with_idle_timeout(self, idle: Duration) -> Self {
        let Self { handle, peer_addr } = self;
        Self {
            handle: handle.with_idle_timeout(idle),
            peer_addr,
        }
    }

    /// perform the server side of the handshake with the inbound peer
    ///
    /// on failure the connection is closed before returning.
    #[tracing::instrument(skip(self, identity), fields(peer = %self.peer_addr), level = "debug")]
    pub async fn handshake(self, identity: &ServerIdentity) -> Result<Connection, Error> {
        let Self { handle, peer_addr } = self;

        tracing::debug!("processing remote's handshake");

        let handle = handle.accept(identity).await?;

        tracing::debug!("handshake succeed");

        Ok(Connection { handle, peer_addr })
    }
}

impl Connection {
    /// the remote address we are sending/receiving messages to/from
    pub fn remote_address(&self) -> SocketAddr {
        self.peer_addr
    }

    /// the key material negotiated during the handshake
    pub fn session_key(&self) -> &SessionKeyMaterial {
        self.handle.session_key()
    }

    /// connect to the given socket address and perform the client side
    /// of the handshake
    ///
    /// `check_key` is given the server's public key and its fingerprint, the
    /// handshake is aborted if it returns `false`.
    #[tracing::instrument(skip(rng, check_key), level = "info")]
    pub async fn connect_to<RNG, F>(rng: RNG, peer_addr: SocketAddr, check_key: F) -> Result<Self>
    where
        RNG: CryptoRng + RngCore,
        F: FnOnce(&RsaPublicKey, &Fingerprint) -> bool,
    {
        let stream = tokio::time::timeout(IDLE_TIMEOUT, TcpStream::connect(peer_addr))
            .await
            .with_context(|| format!("Timed out connecting to {}", peer_addr))?
            .with_context(|| format!("Cannot connect to {}", peer_addr))?;

        let (reader, writer) = stream.into_split();

        let handle = Opening::new(reader, writer, IDLE_TIMEOUT)
            .open(rng, check_key)
            .await
            .with_context(|| format!("Failed to handshake with {}", peer_addr))?;

        tracing::debug!("handshake succeed");

        Ok(Self { handle, peer_addr })
    }

    /// attempt to connect to any resolved [`lookup_host`] result of the given [`ToSocketAddrs`].
    ///
    /// The function will returns at the first successful attempt or once all the possible options
    /// have been tried and failed. `check_key` is called for every attempt
    /// reaching the public key exchange.
    #[tracing::instrument(skip(rng, check_key), level = "info")]
    pub async fn connect<RNG, F, A>(mut rng: RNG, peer_addr: A, check_key: F) -> Result<Self>
    where
        RNG: RngCore + CryptoRng,
        F: Fn(&RsaPublicKey, &Fingerprint) -> bool,
        A: ToSocketAddrs + Display + fmt::Debug,
    {
        let peer_addrs = lookup_host(&peer_addr)
            .await
            .context("Cannot resolve the remote address")?;

        for socket_addr in peer_addrs {
            match Self::connect_to(&mut rng, socket_addr, &check_key).await {
                Ok(connection) => return Ok(connection),
                Err(error) => {
                    tracing::info!(reason = ?error, "Failed to connect to {} with {}", peer_addr, socket_addr);
                    continue;
                }
            }
        }

        bail!("Cannot connect to {}", peer_addr)
    }

    /// split the connection into its reading half, writing half and the
    /// session key material
    pub fn into_parts(self) -> (OwnedReadHalf, OwnedWriteHalf, SessionKeyMaterial) {
        self.handle.into_parts()
    }
}

impl fmt::Debug for Accepting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accepting")
            .field("remote_address", &self.peer_addr)
            .field("state", &self.handle.state())
            .finish()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("remote_address", &self.remote_address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing;
    use rand::rngs::OsRng;

    #[tokio::test]
    async fn handshake_over_tcp() {
        let identity = testing::identity();
        let listener = Listener::new("127.0.0.1:0".parse().unwrap(), 10)
            .await
            .unwrap();
        let address = listener.local_address().unwrap();

        let server = {
            let identity = identity.clone();
            tokio::spawn(async move {
                let accepting = listener.accept().await.unwrap();
                accepting.handshake(&identity).await
            })
        };

        let expected = *identity.fingerprint();
        let client = Connection::connect(OsRng, address, |_, fingerprint| *fingerprint == expected)
            .await
            .unwrap();
        let server = server.await.unwrap().unwrap();

        assert_eq!(client.session_key(), server.session_key());
        assert_eq!(server.remote_address(), {
            let (reader, _, _) = client.into_parts();
            reader.local_addr().unwrap()
        });
    }
}
