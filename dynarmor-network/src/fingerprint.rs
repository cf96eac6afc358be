use crate::params::{SessionDigest, DIGEST_LENGTH};
use sha2::Digest as _;
use std::{fmt, str::FromStr};

/// fingerprint of a server's public key
///
/// this is the digest of the public key as it is sent on the wire. A client
/// can display it to the user or pin it to detect a change of server
/// identity.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct Fingerprint([u8; DIGEST_LENGTH]);

impl Fingerprint {
    pub const SIZE: usize = DIGEST_LENGTH;

    /// compute the fingerprint of an encoded public key
    pub fn of(encoded_public_key: &[u8]) -> Self {
        let mut fingerprint = Self([0; Self::SIZE]);
        fingerprint
            .0
            .copy_from_slice(&SessionDigest::digest(encoded_public_key));
        fingerprint
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fingerprint")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl FromStr for Fingerprint {
    type Err = hex::FromHexError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fingerprint = Fingerprint([0; Self::SIZE]);
        hex::decode_to_slice(s, &mut fingerprint.0)?;
        Ok(fingerprint)
    }
}
