use sha1::{Digest, Sha1};

/// Computes the lowercase hex SHA-1 of `bytes`.
///
/// This is the digest npm-style registries publish as `dist.shasum`.
///
/// # Example
///
/// ```
/// use tarn_utils::hash::sha1_hex;
///
/// assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
/// ```
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Checks `bytes` against an expected `shasum`, ignoring case and surrounding whitespace.
pub fn verify_shasum(bytes: &[u8], expected: &str) -> bool {
    let expected = expected.trim();
    !expected.is_empty() && sha1_hex(bytes).eq_ignore_ascii_case(expected)
}

/// Short content digest used to build document revision tokens.
///
/// Returns the first 32 hex characters of the blake3 hash of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes);
    hash.to_hex()[..32].to_string()
}
