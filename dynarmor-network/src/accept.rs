use crate::{
    codec::{check_frame_length, encode_frame, MagicHeader, SessionKeyEnvelope, VersionReply},
    deadline::timed,
    Error, Handle, ServerIdentity, SessionKeyMaterial, Version,
};
use std::{
    fmt::{self, Formatter},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use zeroize::Zeroizing;

/// progress of the server side of the handshake
///
/// the states are only ever visited in increasing order, [`Established`]
/// and [`Aborted`] are terminal.
///
/// [`Established`]: HandshakeState::Established
/// [`Aborted`]: HandshakeState::Aborted
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum HandshakeState {
    Start,
    MagicSent,
    VersionChecked,
    PublicKeySent,
    BlobReceived,
    Decrypted,
    DigestVerified,
    Established,
    Aborted,
}

/// accept incoming handshake
///
/// upon connecting to our server, the client expects the magic header,
/// answers with its version and, if accepted, sends the session key
/// encrypted with our public key.
///
/// This object drives the server side of the handshake, see
/// [`Accepting::accept`].
pub struct Accepting<I, O> {
    reader: I,
    writer: O,
    idle: Duration,
    state: HandshakeState,
}

impl<I, O> Accepting<I, O> {
    pub(crate) fn new(reader: I, writer: O, idle: Duration) -> Self {
        Self {
            reader,
            writer,
            idle,
            state: HandshakeState::Start,
        }
    }

    /// bound every read and write of the handshake by `idle`
    pub fn with_idle_timeout(self, idle: Duration) -> Self {
        Self { idle, ..self }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    fn advance(&mut self, next: HandshakeState) {
        debug_assert!(self.state < next, "{} -> {}", self.state, next);
        tracing::trace!(from = %self.state, to = %next, "handshake progress");
        self.state = next;
    }
}

impl<I, O> Accepting<I, O>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    /// perform the handshake with the client
    ///
    /// On success the connection is handed over, still opened, in the
    /// returned [`Handle`] along with the session key material.
    ///
    /// # Errors
    ///
    /// Any IO error, timeout, protocol violation or crypto failure aborts
    /// the handshake. The stream is dropped (and therefore closed) before
    /// this function returns. The only explicit answer the client ever
    /// receives is the rejection of an unsupported version.
    pub async fn accept(mut self, identity: &ServerIdentity) -> Result<Handle<I, O>, Error> {
        match self.run(identity).await {
            Ok(session_key) => {
                self.advance(HandshakeState::Established);
                let Self { reader, writer, .. } = self;
                Ok(Handle::new(reader, writer, session_key))
            }
            Err(error) => {
                tracing::debug!(
                    state = %self.state,
                    kind = %error.kind(),
                    reason = %error,
                    "handshake aborted"
                );
                self.advance(HandshakeState::Aborted);
                Err(error)
            }
        }
    }

    async fn run(&mut self, identity: &ServerIdentity) -> Result<SessionKeyMaterial, Error> {
        self.send("send the magic header", MagicHeader::DEFAULT.as_ref())
            .await?;
        self.advance(HandshakeState::MagicSent);

        let version = timed(
            self.idle,
            "receive the protocol version",
            self.reader.read_i32(),
        )
        .await
        .map(Version::from_i32)?;
        self.advance(HandshakeState::VersionChecked);

        if !version.is_supported() {
            self.send(
                "send the version rejection",
                &[VersionReply::Rejected.to_u8()],
            )
            .await?;
            return Err(Error::UnsupportedVersion(version));
        }
        self.send(
            "send the version acceptance",
            &[VersionReply::Accepted.to_u8()],
        )
        .await?;

        let frame = encode_frame(identity.encoded_public_key());
        self.send("send the public key", &frame).await?;
        self.advance(HandshakeState::PublicKeySent);

        let length = timed(
            self.idle,
            "receive the session blob length",
            self.reader.read_i32(),
        )
        .await?;
        let length = check_frame_length(length as i64)?;

        let mut blob = vec![0; length];
        timed(
            self.idle,
            "receive the session blob",
            self.reader.read_exact(&mut blob),
        )
        .await?;
        self.advance(HandshakeState::BlobReceived);

        let plaintext = identity
            .decrypt(&blob)
            .map(Zeroizing::new)
            .map_err(Error::Decryption)?;
        self.advance(HandshakeState::Decrypted);

        let session_key = SessionKeyEnvelope::try_from_slice(&plaintext)?.open()?;
        self.advance(HandshakeState::DigestVerified);

        Ok(session_key)
    }

    async fn send(&mut self, operation: &'static str, bytes: &[u8]) -> Result<(), Error> {
        let writer = &mut self.writer;
        timed(self.idle, operation, async move {
            writer.write_all(bytes).await?;
            writer.flush().await
        })
        .await
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
