use crate::Version;
use std::{fmt, io};
use thiserror::Error;

/// the error returned by each step of the handshake
///
/// all the errors are fatal to the handshake: the connection is released
/// and a new connection is required to try again. Use [`Error::kind`]
/// to tell apart the faults of the transport, the protocol violations and
/// the cryptographic failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot {operation}")]
    Connection {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Timed out while trying to {operation}")]
    Timeout { operation: &'static str },

    #[error("Invalid magic protocol header")]
    InvalidMagicHeader,

    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(Version),

    #[error("Protocol version {0} rejected by the remote")]
    VersionRejected(Version),

    #[error("Invalid version reply ({0:#04x})")]
    InvalidVersionReply(u8),

    #[error("Invalid frame length {0}")]
    InvalidFrameLength(i64),

    #[error("Invalid public key encoding")]
    InvalidPublicKey(#[source] rsa::pkcs8::spki::Error),

    #[error("Public key rejected")]
    PublicKeyRejected,

    #[error("Cannot decrypt the session key envelope")]
    Decryption(#[source] rsa::Error),

    #[error("Cannot encrypt the session key envelope")]
    Encryption(#[source] rsa::Error),

    #[error("Invalid session key envelope length {actual}, expecting {expected}")]
    InvalidEnvelopeLength { expected: usize, actual: usize },

    #[error("Session key digest mismatch, the envelope may have been tampered with")]
    DigestMismatch,
}

/// the families of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// IO failure or timeout
    Connection,
    /// the remote did not follow the protocol
    ProtocolViolation,
    /// the session key envelope could not be recovered or verified
    Crypto,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => ErrorKind::Connection,
            Self::InvalidMagicHeader
            | Self::UnsupportedVersion(_)
            | Self::VersionRejected(_)
            | Self::InvalidVersionReply(_)
            | Self::InvalidFrameLength(_)
            | Self::InvalidPublicKey(_)
            | Self::PublicKeyRejected => ErrorKind::ProtocolViolation,
            Self::Decryption(_)
            | Self::Encryption(_)
            | Self::InvalidEnvelopeLength { .. }
            | Self::DigestMismatch => ErrorKind::Crypto,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => f.write_str("connection error"),
            Self::ProtocolViolation => f.write_str("protocol violation"),
            Self::Crypto => f.write_str("crypto error"),
        }
    }
}
