use crate::{
    codec::{check_frame_length, encode_frame, MagicHeader, SessionKeyEnvelope, VersionReply},
    deadline::timed,
    params::RSA_TRANSFORM,
    Error, Fingerprint, Handle, SessionKeyMaterial, Version,
};
use rand_core::{CryptoRng, RngCore};
use rsa::{pkcs8::DecodePublicKey as _, RsaPublicKey};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// client side of the handshake
pub struct Opening<I, O> {
    reader: I,
    writer: O,
    idle: Duration,
    version: Version,
}

impl<I, O> Opening<I, O> {
    pub(crate) fn new(reader: I, writer: O, idle: Duration) -> Self {
        Self {
            reader,
            writer,
            idle,
            version: Version::CURRENT,
        }
    }

    /// announce another version than [`Version::CURRENT`]
    pub fn with_version(self, version: Version) -> Self {
        Self { version, ..self }
    }

    pub fn with_idle_timeout(self, idle: Duration) -> Self {
        Self { idle, ..self }
    }
}

impl<I, O> Opening<I, O>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    /// perform the handshake with the server
    ///
    /// `check_key` decides whether the server's public key is trusted
    /// before anything secret is sent to it.
    pub async fn open<RNG, F>(mut self, mut rng: RNG, check_key: F) -> Result<Handle<I, O>, Error>
    where
        RNG: RngCore + CryptoRng,
        F: FnOnce(&RsaPublicKey, &Fingerprint) -> bool,
    {
        let mut magic = [0; MagicHeader::SIZE];
        timed(
            self.idle,
            "receive the magic header",
            self.reader.read_exact(&mut magic),
        )
        .await?;
        if !MagicHeader::from_bytes(magic).is_valid() {
            return Err(Error::InvalidMagicHeader);
        }

        self.send(
            "send the protocol version",
            &self.version.to_i32().to_be_bytes(),
        )
        .await?;

        let reply = timed(self.idle, "receive the version reply", self.reader.read_u8()).await?;
        match VersionReply::try_from_u8(reply) {
            Some(VersionReply::Accepted) => (),
            Some(VersionReply::Rejected) => return Err(Error::VersionRejected(self.version)),
            None => return Err(Error::InvalidVersionReply(reply)),
        }

        let encoded_public_key = self.receive_frame("receive the public key").await?;
        let public_key =
            RsaPublicKey::from_public_key_der(&encoded_public_key).map_err(Error::InvalidPublicKey)?;
        let fingerprint = Fingerprint::of(&encoded_public_key);
        tracing::debug!(fingerprint = %fingerprint, "received server public key");

        if !check_key(&public_key, &fingerprint) {
            return Err(Error::PublicKeyRejected);
        }

        let session_key = SessionKeyMaterial::generate(&mut rng);
        let envelope = SessionKeyEnvelope::seal(&session_key);
        let blob = public_key
            .encrypt(&mut rng, RSA_TRANSFORM, envelope.as_ref())
            .map_err(Error::Encryption)?;
        self.send("send the session blob", &encode_frame(&blob))
            .await?;

        let Self { reader, writer, .. } = self;
        Ok(Handle::new(reader, writer, session_key))
    }

    async fn receive_frame(&mut self, operation: &'static str) -> Result<Vec<u8>, Error> {
        let length = timed(self.idle, operation, self.reader.read_u32()).await?;
        let length = check_frame_length(length as i64)?;

        let mut frame = vec![0; length];
        timed(self.idle, operation, self.reader.read_exact(&mut frame)).await?;
        Ok(frame)
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
