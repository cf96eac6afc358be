use crate::params::{SessionDigest, AES_IV_SIZE, AES_KEY_SIZE, DIGEST_LENGTH};
use rand_core::{CryptoRng, RngCore};
use sha2::Digest as _;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// the AES session key and initialization vector transported by the
/// handshake
///
/// This is only ever kept in memory and is wiped when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeyMaterial {
    key: [u8; AES_KEY_SIZE],
    iv: [u8; AES_IV_SIZE],
}

impl SessionKeyMaterial {
    /// size of `key‖iv`
    pub const SIZE: usize = AES_KEY_SIZE + AES_IV_SIZE;

    pub fn new(key: [u8; AES_KEY_SIZE], iv: [u8; AES_IV_SIZE]) -> Self {
        Self { key, iv }
    }

    /// generate a fresh key and IV
    pub fn generate<RNG>(rng: &mut RNG) -> Self
    where
        RNG: RngCore + CryptoRng,
    {
        let mut material = Self {
            key: [0; AES_KEY_SIZE],
            iv: [0; AES_IV_SIZE],
        };
        rng.fill_bytes(&mut material.key);
        rng.fill_bytes(&mut material.iv);
        material
    }

    /// build from the `key‖iv` concatenation
    ///
    /// returns `None` if `bytes` is not exactly [`Self::SIZE`] long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }

        let mut material = Self {
            key: [0; AES_KEY_SIZE],
            iv: [0; AES_IV_SIZE],
        };
        material.key.copy_from_slice(&bytes[..AES_KEY_SIZE]);
        material.iv.copy_from_slice(&bytes[AES_KEY_SIZE..]);
        Some(material)
    }

    pub fn key(&self) -> &[u8; AES_KEY_SIZE] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; AES_IV_SIZE] {
        &self.iv
    }

    /// digest of `key‖iv`
    pub fn digest(&self) -> [u8; DIGEST_LENGTH] {
        let mut digest = [0; DIGEST_LENGTH];
        let hash = SessionDigest::new()
            .chain_update(&self.key)
            .chain_update(&self.iv)
            .finalize();
        digest.copy_from_slice(&hash);
        digest
    }
}

impl fmt::Debug for SessionKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyMaterial")
            .field("key", &"..")
            .field("iv", &"..")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};

    impl Arbitrary for SessionKeyMaterial {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut material = Self::new([0; AES_KEY_SIZE], [0; AES_IV_SIZE]);
            for byte in material.key.iter_mut().chain(material.iv.iter_mut()) {
                *byte = u8::arbitrary(g);
            }
            material
        }
    }

    #[test]
    fn digest_covers_key_and_iv() {
        let material = SessionKeyMaterial::new([1; AES_KEY_SIZE], [2; AES_IV_SIZE]);

        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(material.key());
        concatenated.extend_from_slice(material.iv());
        let expected = SessionDigest::digest(&concatenated);

        assert_eq!(&material.digest()[..], &expected[..]);
    }

    #[test]
    fn debug_does_not_leak_the_key() {
        let material = SessionKeyMaterial::new([0xAB; AES_KEY_SIZE], [0xCD; AES_IV_SIZE]);

        let debug = format!("{:?}", material);

        assert!(!debug.to_lowercase().contains("ab"));
        assert!(!debug.to_lowercase().contains("cd"));
        assert!(!debug.contains("171"));
    }

    #[quickcheck]
    fn from_slice_splits_key_and_iv(material: SessionKeyMaterial) -> bool {
        let mut bytes = material.key().to_vec();
        bytes.extend_from_slice(material.iv());

        SessionKeyMaterial::from_slice(&bytes) == Some(material)
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(SessionKeyMaterial::from_slice(&[0; SessionKeyMaterial::SIZE - 1]).is_none());
        assert!(SessionKeyMaterial::from_slice(&[0; SessionKeyMaterial::SIZE + 1]).is_none());
    }
}
