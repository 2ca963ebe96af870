//! One-way password digests, salted by the identity string.
//!
//! The digest is deterministic (`same id + password ⇒ same digest`) so a
//! stored hash can be compared without any per-user salt column. A random
//! per-user salt would be the hardening upgrade; it only touches this module.

use base64ct::{Base64, Encoding};
use sha2::{Digest, Sha256};

/// Digest of `id ‖ password`.
#[must_use]
pub fn digest(id: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(password.as_bytes());
    Base64::encode_string(&hasher.finalize())
}

/// Recompute and compare against a stored digest.
#[must_use]
pub fn verify(id: &str, password: &str, stored: &str) -> bool {
    digest(id, password) == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest("admin", "Secret1!"), digest("admin", "Secret1!"));
    }

    #[test]
    fn digest_is_identity_salted() {
        // Same password, different id: different digest.
        assert_ne!(digest("admin", "Secret1!"), digest("editor", "Secret1!"));
    }

    #[test]
    fn verify_matches_only_exact_pair() {
        let stored = digest("admin", "Secret1!");
        assert!(verify("admin", "Secret1!", &stored));
        assert!(!verify("admin", "Secret1?", &stored));
        assert!(!verify("editor", "Secret1!", &stored));
    }
}
