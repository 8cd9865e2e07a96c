use sha2::{Digest, Sha256};

/// Uppercase hex SHA-256 of the UTF-8 bytes of `plain`.
///
/// Unsalted, so equal passwords share a digest across accounts. Kept that way
/// so digests already stored in `users.pwd` stay comparable.
pub fn hash_password(plain: &str) -> String {
    hex::encode_upper(Sha256::digest(plain.as_bytes()))
}
