/*!
# dynarmor session handshake

this crate implements the session establishment of the dynarmor protocol.
A client connects to the server and the two peers agree on a symmetric
session key before anything else is exchanged:

1. the server sends a 10 bytes magic header identifying the protocol;
2. the client announces the [`Version`] of the protocol it speaks and the
   server replies whether it accepts it or not;
3. the server sends its RSA public key (X.509 `SubjectPublicKeyInfo`, DER);
4. the client generates an AES-256 key and IV, seals them along with their
   SHA-512 digest and sends the result encrypted with the server's public key.

The server decrypts the blob with its [`ServerIdentity`], verifies the digest
and the session is established. There is no acknowledgement of the session
key, the connection is then handed over to whatever runs the session.

All the integers on the wire are big endian. Every read and write of the
handshake is bounded by an idle timeout (see [`IDLE_TIMEOUT`]).

The server side is driven by [`Accepting`], the client side by [`Handle::open`].
The [`net`] module wraps both on top of TCP.
*/

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

mod accept;
mod codec;
mod deadline;
mod error;
mod fingerprint;
mod handle;
mod identity;
pub mod net;
mod opening;
pub mod params;
mod session_key;
mod version;

pub use self::{
    accept::{Accepting, HandshakeState},
    deadline::IDLE_TIMEOUT,
    error::{Error, ErrorKind},
    fingerprint::Fingerprint,
    handle::Handle,
    identity::{IdentityError, ServerIdentity},
    opening::Opening,
    session_key::SessionKeyMaterial,
    version::Version,
};
