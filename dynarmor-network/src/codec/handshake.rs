use crate::{
    params::{AES_KEY_SIZE, ENVELOPE_SIZE, MAX_FRAME_LENGTH, MIN_FRAME_LENGTH},
    Error, SessionKeyMaterial,
};
use bytes::{BufMut as _, Bytes, BytesMut};
use subtle::ConstantTimeEq as _;
use zeroize::Zeroize;

/// the constant identifying the protocol, sent by the server before
/// anything else
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub struct MagicHeader([u8; Self::SIZE]);

/// the server's reply to the client's [`Version`](crate::Version)
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
#[repr(u8)]
pub enum VersionReply {
    Accepted = 0,
    Rejected = 1,
}

/// plaintext of the RSA encrypted session blob
///
/// composed of the AES key, the AES IV and the digest of both. The plaintext
/// is wiped from memory when dropped.
pub struct SessionKeyEnvelope([u8; Self::SIZE]);

impl MagicHeader {
    pub const SIZE: usize = 10;
    pub const DEFAULT: Self = Self([0xAF, 0xEA, 0x39, 0xE0, 0x67, 0x10, 0x20, 0xC9, 0x2F, 0xEB]);

    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    pub fn is_valid(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl VersionReply {
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn try_from_u8(t: u8) -> Option<Self> {
        match t {
            0 => Some(Self::Accepted),
            1 => Some(Self::Rejected),
            2..=u8::MAX => None,
        }
    }
}

impl SessionKeyEnvelope {
    pub const SIZE: usize = ENVELOPE_SIZE;

    /// prepare the envelope for the given session key material
    pub fn seal(material: &SessionKeyMaterial) -> Self {
        let mut bytes = [0; Self::SIZE];
        bytes[..AES_KEY_SIZE].copy_from_slice(material.key());
        bytes[AES_KEY_SIZE..SessionKeyMaterial::SIZE].copy_from_slice(material.iv());
        bytes[SessionKeyMaterial::SIZE..].copy_from_slice(&material.digest());
        Self(bytes)
    }

    /// wrap decrypted plaintext
    ///
    /// # Errors
    ///
    /// the plaintext must be exactly [`Self::SIZE`] bytes long. Anything
    /// else is reported as [`Error::InvalidEnvelopeLength`].
    pub fn try_from_slice(plaintext: &[u8]) -> Result<Self, Error> {
        if plaintext.len() != Self::SIZE {
            return Err(Error::InvalidEnvelopeLength {
                expected: Self::SIZE,
                actual: plaintext.len(),
            });
        }

        let mut bytes = [0; Self::SIZE];
        bytes.copy_from_slice(plaintext);
        Ok(Self(bytes))
    }

    fn key_iv(&self) -> &[u8] {
        &self.0[..SessionKeyMaterial::SIZE]
    }

    fn digest(&self) -> &[u8] {
        &self.0[SessionKeyMaterial::SIZE..]
    }

    /// extract the session key material, checking it against the digest
    /// carried in the envelope
    pub fn open(&self) -> Result<SessionKeyMaterial, Error> {
        let material = SessionKeyMaterial::from_slice(self.key_iv()).ok_or(
            Error::InvalidEnvelopeLength {
                expected: Self::SIZE,
                actual: self.0.len(),
            },
        )?;

        if bool::from(material.digest()[..].ct_eq(self.digest())) {
            Ok(material)
        } else {
            Err(Error::DigestMismatch)
        }
    }
}

impl AsRef<[u8]> for MagicHeader {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl AsRef<[u8]> for SessionKeyEnvelope {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl AsMut<[u8]> for SessionKeyEnvelope {
    fn as_mut(&mut self) -> &mut [u8] {
        self.0.as_mut()
    }
}

impl Drop for SessionKeyEnvelope {
    fn drop(&mut self) {
        self.0.zeroize()
    }
}

/// check the length prefix of a frame (the session blob or the public key)
pub fn check_frame_length(length: i64) -> Result<usize, Error> {
    if length < MIN_FRAME_LENGTH as i64 || length > MAX_FRAME_LENGTH as i64 {
        Err(Error::InvalidFrameLength(length))
    } else {
        Ok(length as usize)
    }
}

/// encode a length prefixed frame: 4 bytes big endian length then the payload
///
/// the caller is responsible for keeping the payload within the bounds
/// of [`check_frame_length`].
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut bytes = BytesMut::with_capacity(4 + payload.len());
    bytes.put_u32(payload.len() as u32);
    bytes.put_slice(payload);
    bytes.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DIGEST_LENGTH;
    use quickcheck::TestResult;

    #[test]
    fn magic_header_bytes() {
        assert_eq!(
            MagicHeader::DEFAULT.as_ref(),
            &[0xAF, 0xEA, 0x39, 0xE0, 0x67, 0x10, 0x20, 0xC9, 0x2F, 0xEB]
        );
        assert!(!MagicHeader::from_bytes([0; MagicHeader::SIZE]).is_valid());
    }

    #[test]
    fn version_reply_bytes() {
        assert_eq!(VersionReply::Accepted.to_u8(), 0);
        assert_eq!(VersionReply::Rejected.to_u8(), 1);
        assert_eq!(VersionReply::try_from_u8(2), None);
    }

    #[test]
    fn frame_length_bounds() {
        assert!(check_frame_length(0).is_err());
        assert!(check_frame_length(-1).is_err());
        assert_eq!(check_frame_length(1).unwrap(), 1);
        assert_eq!(check_frame_length(10240).unwrap(), 10240);
        assert!(check_frame_length(10241).is_err());
        assert!(check_frame_length(i32::MIN as i64).is_err());
    }

    #[test]
    fn encode_frame_prefixes_big_endian_length() {
        let frame = encode_frame(&[0xAA; 258]);

        assert_eq!(&frame[..4], &[0, 0, 1, 2]);
        assert_eq!(frame.len(), 4 + 258);
    }

    #[quickcheck]
    fn sealed_envelope_opens(material: SessionKeyMaterial) -> bool {
        let envelope = SessionKeyEnvelope::seal(&material);
        let received = SessionKeyEnvelope::try_from_slice(envelope.as_ref()).unwrap();

        received.open().unwrap() == material
    }

    #[quickcheck]
    fn flipped_key_iv_bit_is_detected(material: SessionKeyMaterial, bit: usize) -> bool {
        let mut envelope = SessionKeyEnvelope::seal(&material);
        let bit = bit % (SessionKeyMaterial::SIZE * 8);
        envelope.as_mut()[bit / 8] ^= 1 << (bit % 8);

        matches!(envelope.open(), Err(Error::DigestMismatch))
    }

    #[quickcheck]
    fn flipped_digest_bit_is_detected(material: SessionKeyMaterial, bit: usize) -> bool {
        let mut envelope = SessionKeyEnvelope::seal(&material);
        let bit = bit % (DIGEST_LENGTH * 8);
        envelope.as_mut()[SessionKeyMaterial::SIZE + bit / 8] ^= 1 << (bit % 8);

        matches!(envelope.open(), Err(Error::DigestMismatch))
    }

    #[quickcheck]
    fn wrong_plaintext_length_is_rejected(plaintext: Vec<u8>) -> TestResult {
        if plaintext.len() == SessionKeyEnvelope::SIZE {
            return TestResult::discard();
        }

        TestResult::from_bool(matches!(
            SessionKeyEnvelope::try_from_slice(&plaintext),
            Err(Error::InvalidEnvelopeLength { .. })
        ))
    }
}
