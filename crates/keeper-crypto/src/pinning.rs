//! Content fingerprinting.
//!
//! Keystores remember the fingerprint of the material they were built
//! from; comparing fingerprints (not "does the field look non-empty")
//! decides whether a rebuild is needed.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compute a SHA-256 fingerprint of arbitrary bytes.
///
/// Returns the fingerprint as a lowercase hex string.
pub fn fingerprint_sha256(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    hex_encode(&hash)
}

/// Fingerprint an ordered list of fields.
///
/// Each field is length-prefixed so `["ab", "c"]` and `["a", "bc"]`
/// never collide.
pub fn fingerprint_fields<I, B>(fields: I) -> String
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for field in fields {
        let bytes = field.as_ref();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    hex_encode(&hasher.finalize())
}

/// Compare two fingerprint strings in constant time.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() != b_bytes.len() {
        return false;
    }

    a_bytes.ct_eq(b_bytes).into()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
