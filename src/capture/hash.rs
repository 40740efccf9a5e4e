use sha2::{Digest, Sha256};

/// Hex SHA-256 of the captured image bytes. Two captures are "unchanged"
/// exactly when their hashes are equal.
pub fn content_hash(image: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image);
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
