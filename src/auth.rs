//! Password hashing for employee accounts.
//!
//! Hash = hex(SHA-256(password || salt)) with a random 16-byte hex salt.
//! Stored in `employee.password_hash` / `employee.salt`.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Salt length in bytes (hex-encoded to twice as many characters)
pub const SALT_BYTES: usize = 16;

/// Generate a fresh random salt
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a password with the given salt
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a password against a stored hash by recomputing it
pub fn verify_password(password: &str, stored_hash: &str, salt: &str) -> bool {
    let computed = hash_password(password, salt);
    // Compare without short-circuiting on the first differing byte
    computed.len() == stored_hash.len()
        && computed
            .bytes()
            .zip(stored_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_is_random_hex() {
        let a = generate_salt();
        let b = generate_salt();
        assert_eq!(a.len(), SALT_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_matches_known_digest() {
        // sha256("password" + "salt") == sha256("passwordsalt")
        assert_eq!(
            hash_password("password", "salt"),
            "7a37b85c8918eac19a9089c0fa5a2ab4dce3f90528dcdeec108b23ddf3607b99"
        );
    }

    #[test]
    fn test_verify_password() {
        let salt = generate_salt();
        let hash = hash_password("correct horse", &salt);

        assert!(verify_password("correct horse", &hash, &salt));
        assert!(!verify_password("wrong horse", &hash, &salt));
        assert!(!verify_password("correct horse", &hash, "other-salt"));
        assert!(!verify_password("correct horse", "", &salt));
    }
}
