use crate::{
    params::{MAX_FRAME_LENGTH, MIN_RSA_MODULUS_SIZE, RSA_TRANSFORM},
    Fingerprint,
};
use rand_core::{CryptoRng, OsRng, RngCore};
use rsa::{pkcs8::EncodePublicKey as _, traits::PublicKeyParts as _, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use thiserror::Error;

/// the RSA key pair authenticating the server
///
/// The public key is sent to every client (X.509 `SubjectPublicKeyInfo`,
/// DER) and the private key decrypts the session key envelope. It is
/// immutable once built, share it behind an [`Arc`](std::sync::Arc).
pub struct ServerIdentity {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    encoded_public: Vec<u8>,
    fingerprint: Fingerprint,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid RSA private key")]
    InvalidPrivateKey(#[source] rsa::Error),

    #[error("The public key does not match the private key")]
    KeyMismatch,

    #[error("RSA modulus of {bits} bits is too small to carry the session key envelope")]
    KeyTooSmall { bits: usize },

    #[error("Encoded public key is {0} bytes long, larger than a handshake frame")]
    KeyTooLarge(usize),

    #[error("Cannot encode the public key")]
    Encoding(#[source] rsa::pkcs8::spki::Error),

    #[error("Cannot generate a new RSA key")]
    Generation(#[source] rsa::Error),
}

impl ServerIdentity {
    /// build the identity from a key pair
    ///
    /// # Errors
    ///
    /// the keys must form a valid pair and the modulus must be large enough
    /// for the session key envelope. See [`MIN_RSA_MODULUS_SIZE`].
    pub fn new(private: RsaPrivateKey, public: RsaPublicKey) -> Result<Self, IdentityError> {
        private
            .validate()
            .map_err(IdentityError::InvalidPrivateKey)?;

        if private.to_public_key() != public {
            return Err(IdentityError::KeyMismatch);
        }

        if public.size() < MIN_RSA_MODULUS_SIZE {
            return Err(IdentityError::KeyTooSmall {
                bits: public.n().bits(),
            });
        }

        let encoded_public = public
            .to_public_key_der()
            .map_err(IdentityError::Encoding)?
            .into_vec();
        if encoded_public.len() > MAX_FRAME_LENGTH {
            return Err(IdentityError::KeyTooLarge(encoded_public.len()));
        }

        let fingerprint = Fingerprint::of(&encoded_public);

        Ok(Self {
            private,
            public,
            encoded_public,
            fingerprint,
        })
    }

    /// build the identity from the private key only
    pub fn from_private_key(private: RsaPrivateKey) -> Result<Self, IdentityError> {
        let public = private.to_public_key();
        Self::new(private, public)
    }

    /// generate a new identity with a modulus of `bits`
    pub fn generate<RNG>(rng: &mut RNG, bits: usize) -> Result<Self, IdentityError>
    where
        RNG: RngCore + CryptoRng,
    {
        let private = RsaPrivateKey::new(rng, bits).map_err(IdentityError::Generation)?;
        Self::from_private_key(private)
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// the public key as it is sent on the wire
    pub fn encoded_public_key(&self) -> &[u8] {
        &self.encoded_public
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// decrypt the session blob, with blinding
    pub(crate) fn decrypt(&self, blob: &[u8]) -> rsa::Result<Vec<u8>> {
        self.private.decrypt_blinded(&mut OsRng, RSA_TRANSFORM, blob)
    }
}

impl fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("bits", &self.public.n().bits())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ServerIdentity;
    use rand::{rngs::StdRng, SeedableRng as _};
    use std::sync::{Arc, OnceLock};

    /// a small key so the tests stay fast, still large enough for the envelope
    pub const TEST_KEY_BITS: usize = 1024;

    /// identity shared by all the tests of the crate
    pub fn identity() -> Arc<ServerIdentity> {
        static IDENTITY: OnceLock<Arc<ServerIdentity>> = OnceLock::new();
        IDENTITY
            .get_or_init(|| {
                let mut rng = StdRng::seed_from_u64(0xD7A2_0F00);
                Arc::new(ServerIdentity::generate(&mut rng, TEST_KEY_BITS).unwrap())
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{testing, *};
    use rand::{rngs::StdRng, SeedableRng as _};

    #[test]
    fn public_key_is_spki_der() {
        let identity = testing::identity();

        let decoded = <RsaPublicKey as rsa::pkcs8::DecodePublicKey>::from_public_key_der(
            identity.encoded_public_key(),
        )
        .unwrap();

        assert_eq!(&decoded, identity.public_key());
        assert_eq!(identity.fingerprint(), &Fingerprint::of(identity.encoded_public_key()));
    }

    #[test]
    fn mismatching_keys_are_rejected() {
        let identity = testing::identity();
        let mut rng = StdRng::seed_from_u64(1);
        let other = RsaPrivateKey::new(&mut rng, testing::TEST_KEY_BITS).unwrap();

        let result = ServerIdentity::new(other, identity.public_key().clone());

        assert!(matches!(result, Err(IdentityError::KeyMismatch)));
    }

    #[test]
    fn small_keys_are_rejected() {
        let mut rng = StdRng::seed_from_u64(2);

        let result = ServerIdentity::generate(&mut rng, 512);

        assert!(matches!(result, Err(IdentityError::KeyTooSmall { .. })));
    }
}
