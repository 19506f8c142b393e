//! Session token generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Generate an opaque bearer token: `TOKEN_BYTES` from the OS RNG, encoded
/// as base64url without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
