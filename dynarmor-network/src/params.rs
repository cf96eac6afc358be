/*!
# Session crypto parameters

both ends of the protocol must agree on these values without negotiating
them. Changing any of them is a protocol break and requires a new
[`Version`](crate::Version).
*/

use rsa::Pkcs1v15Encrypt;
use sha2::Sha512;

/// the RSA transform used to encrypt the session key envelope
///
/// PKCS#1 v1.5 encryption padding (`RSA/ECB/PKCS1Padding`).
pub const RSA_TRANSFORM: Pkcs1v15Encrypt = Pkcs1v15Encrypt;

/// number of bytes PKCS#1 v1.5 padding adds to a message
pub const RSA_PADDING_OVERHEAD: usize = 11;

/// size of the AES session key, in bits
pub const AES_KEY_BITS: usize = 256;

/// size of the AES initialization vector, in bits
pub const AES_IV_BITS: usize = 128;

/// size of the AES session key, in bytes
pub const AES_KEY_SIZE: usize = AES_KEY_BITS / 8;

/// size of the AES initialization vector, in bytes
pub const AES_IV_SIZE: usize = AES_IV_BITS / 8;

/// the digest computed over `key‖iv` to detect tampering
pub type SessionDigest = Sha512;

/// output length of [`SessionDigest`], in bytes
pub const DIGEST_LENGTH: usize = 64;

/// length of the plaintext envelope: `key‖iv‖digest(key‖iv)`
///
/// ```
/// # use dynarmor_network::params::*;
/// assert_eq!(ENVELOPE_SIZE, (AES_KEY_BITS + AES_IV_BITS) / 8 + DIGEST_LENGTH);
/// ```
pub const ENVELOPE_SIZE: usize = AES_KEY_SIZE + AES_IV_SIZE + DIGEST_LENGTH;

/// smallest RSA modulus (in bytes) able to carry the envelope
pub const MIN_RSA_MODULUS_SIZE: usize = ENVELOPE_SIZE + RSA_PADDING_OVERHEAD;

/// bounds of the length prefix of the encrypted session blob and of
/// the server's public key
pub const MIN_FRAME_LENGTH: usize = 1;
pub const MAX_FRAME_LENGTH: usize = 10 * 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest as _;

    #[test]
    fn digest_length_matches_the_digest() {
        assert_eq!(SessionDigest::output_size(), DIGEST_LENGTH)
    }

    #[test]
    fn envelope_fits_in_a_frame() {
        assert!(MIN_RSA_MODULUS_SIZE <= MAX_FRAME_LENGTH)
    }
}
