use crate::{
    accept::Accepting, deadline::IDLE_TIMEOUT, opening::Opening, Error, Fingerprint,
    SessionKeyMaterial,
};
use rand_core::{CryptoRng, RngCore};
use rsa::RsaPublicKey;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// bidirectional handle of an established session
///
/// this is what remains once the handshake completed: the two halves of the
/// byte stream and the [`SessionKeyMaterial`] both ends agreed on. There is
/// no acknowledgement of the session key on the wire, the next phase of the
/// protocol starts with the next byte.
///
/// Dropping the handle closes the stream.
pub struct Handle<I, O> {
    reader: I,
    writer: O,
    session_key: SessionKeyMaterial,
}

impl<I, O> Handle<I, O> {
    pub(crate) fn new(reader: I, writer: O, session_key: SessionKeyMaterial) -> Self {
        Self {
            reader,
            writer,
            session_key,
        }
    }

    /// the key material negotiated for this session
    pub fn session_key(&self) -> &SessionKeyMaterial {
        &self.session_key
    }

    /// split the handle into its reading half, writing half and
    /// the session key material
    pub fn into_parts(self) -> (I, O, SessionKeyMaterial) {
        let Self {
            reader,
            writer,
            session_key,
        } = self;
        (reader, writer, session_key)
    }
}

impl<I, O> Handle<I, O>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    /// prepare accepting the new request from the given stream
    ///
    /// every read and write of the handshake will be bounded by the
    /// default idle timeout, see [`Accepting::with_idle_timeout`] to
    /// change it.
    pub fn accept(reader: I, writer: O) -> Accepting<I, O> {
        Accepting::new(reader, writer, IDLE_TIMEOUT)
    }

    /// open a new session with the server connected to the stream
    ///
    /// `check_key` is called with the server's public key before the
    /// session key is sent, returning `false` aborts the handshake.
    ///
    /// The `rng` is used to generate the session key material and for
    /// the RSA encryption padding.
    pub async fn open<RNG, F>(rng: RNG, reader: I, writer: O, check_key: F) -> Result<Self, Error>
    where
        RNG: RngCore + CryptoRng,
        F: FnOnce(&RsaPublicKey, &Fingerprint) -> bool,
    {
        Opening::new(reader, writer, IDLE_TIMEOUT)
            .open(rng, check_key)
            .await
    }
}

impl<I, O> AsyncRead for Handle<I, O>
where
    I: AsyncRead + Unpin,
    O: Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let handle = self.get_mut();
        Pin::new(&mut handle.reader).poll_read(cx, buf)
    }
}

impl<I, O> AsyncWrite for Handle<I, O>
where
    I: Unpin,
    O: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let handle = self.get_mut();
        Pin::new(&mut handle.writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let handle = self.get_mut();
        Pin::new(&mut handle.writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let handle = self.get_mut();
        Pin::new(&mut handle.writer).poll_shutdown(cx)
    }
}
