//! Random token generation and secret comparison.

use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;

/// Generates an unguessable token with 256 bits of entropy, encoded as
/// base64url without padding (43 characters).
///
/// Used for session tokens and per-session CSRF tokens.
pub fn generate_token() -> String {
    let mut token_bytes = [0u8; 32];
    rng().fill(&mut token_bytes);

    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Constant-time byte comparison to prevent timing attacks.
///
/// Only the length is allowed to leak; tokens compared here have a fixed length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
