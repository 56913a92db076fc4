//! Reversible identifier encoding.
//!
//! Identifiers and secrets are stored as standard base64. This is an
//! encoding, not a hash: anyone with read access to the credential
//! collection can recover the secrets.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

pub fn encode(value: &str) -> String {
    BASE64.encode(value.as_bytes())
}

/// Returns `None` when `encoded` is not base64 of a UTF-8 string.
pub fn decode(encoded: &str) -> Option<String> {
    let bytes = BASE64.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}
