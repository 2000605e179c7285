// Login credential computation.
//
// The server opens every connection with a random nonce; the client proves
// it holds the shared login token by replying with a digest over
// `nonce ++ token`. The wire contract is a 40-character lowercase hex string
// (a 160-bit digest), so SHA-1 is the hash in use. The nonce makes each
// handshake unique — a captured hash is useless for replay on a new
// connection.

use sha1::{Digest, Sha1};

/// Compute the login hash for a handshake: lowercase hex SHA-1 of the nonce
/// concatenated with the login token.
pub fn login_hash(nonce: &str, token: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce.as_bytes());
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
