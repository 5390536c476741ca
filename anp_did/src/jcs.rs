//! Canonical JSON for signature payloads.
//!
//! Signing payloads in this SDK are flat objects with ASCII keys and string
//! values. For that shape, serializing through `serde_json::Value` (whose
//! object map is key-sorted) produces exactly the JCS (RFC 8785) form, so no
//! separate canonicalizer is carried.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Produces the canonical JSON string for a value.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    serde_json::to_string(&v)
}

/// SHA-256 over the canonical JSON form, the digest fed to [`crate::crypto::sign`].
pub fn canonical_sha256<T: Serialize>(value: &T) -> Result<[u8; 32], serde_json::Error> {
    let text = to_canonical_json(value)?;
    Ok(Sha256::digest(text.as_bytes()).into())
}
