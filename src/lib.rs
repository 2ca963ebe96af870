//! # Gardi (CMS Authentication Core)
//!
//! `gardi` is the authentication and session-security core of a
//! content-management backend. It owns the login → token issuance → token
//! refresh → logout lifecycle for a single username/password principal per
//! device; everything else in the CMS (content CRUD, file storage, reports,
//! the admin console) lives in other services and only consumes the tokens
//! issued here.
//!
//! ## Credential transport
//!
//! Clients never send plaintext credentials. The login payload is encrypted
//! with a key derived from the client's device token (itself sealed under a
//! server static secret) plus a coarse device-class descriptor, so a
//! compromised access log does not reveal passwords.
//!
//! ## Sessions
//!
//! - **Access tokens** are short-lived HS256 tokens carrying identity and a
//!   role bitmask; they are verified offline, no session table.
//! - **Refresh tokens** are longer-lived, bound to the issuing device and the
//!   client's network origin, and rotated on every use. Only a one-way hash
//!   of the current refresh token is stored, one row per `(user, device)`.
//!
//! ## Brute-force handling
//!
//! Consecutive password failures accrue a counter; from six failures on, the
//! account freezes for `15 min × floor(failures / 6)`, a monotonically
//! growing penalty. The freeze gate runs before any password comparison.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }
}
