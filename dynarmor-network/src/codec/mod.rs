/*!
# handshake encoder/decoder

the handshake messages are exchanged in clear, except for the session
key envelope which is RSA encrypted with the server's public key.
*/

pub(crate) mod handshake;

pub use self::handshake::{
    check_frame_length, encode_frame, MagicHeader, SessionKeyEnvelope, VersionReply,
};
