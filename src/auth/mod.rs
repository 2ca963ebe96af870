//! Authentication and session-security core.
//!
//! Everything security-relevant lives here: credential transport decryption,
//! password verification, progressive brute-force lockout, and device-bound
//! access/refresh token issuance and rotation. Orchestrators are stateless
//! across requests; all durable state sits behind the [`store`] traits so the
//! same flows run against Postgres in production and in-memory doubles in
//! tests.

pub mod audit;
pub mod change_password;
pub mod codec;
pub mod error;
pub mod hasher;
pub mod lockout;
pub mod login;
pub mod refresh;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

use regex::Regex;
use std::sync::OnceLock;

pub use error::AuthError;
pub use login::{login, sign_out, LoginRequest, SessionTokens};
pub use refresh::{refresh, RefreshRequest};
pub use token::TokenIssuer;

const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 30;
const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 14;
const DEFAULT_BOOTSTRAP_ID: &str = "admin";

/// Tunables for the auth core. Secrets stay in
/// [`crate::cli::globals::GlobalArgs`]; this struct only carries
/// non-sensitive knobs.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_token_minutes: i64,
    refresh_token_days: i64,
    bootstrap_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_token_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_token_days: DEFAULT_REFRESH_TOKEN_DAYS,
            bootstrap_id: DEFAULT_BOOTSTRAP_ID.to_string(),
        }
    }

    #[must_use]
    pub fn with_access_token_minutes(mut self, minutes: i64) -> Self {
        self.access_token_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_token_days(mut self, days: i64) -> Self {
        self.refresh_token_days = days;
        self
    }

    #[must_use]
    pub fn with_bootstrap_id(mut self, id: String) -> Self {
        self.bootstrap_id = id;
        self
    }

    #[must_use]
    pub const fn access_token_minutes(&self) -> i64 {
        self.access_token_minutes
    }

    #[must_use]
    pub const fn refresh_token_days(&self) -> i64 {
        self.refresh_token_days
    }

    #[must_use]
    pub fn bootstrap_id(&self) -> &str {
        &self.bootstrap_id
    }
}

/// Normalize a user id for lookup/uniqueness checks.
#[must_use]
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

fn id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]{1,63}$").ok())
        .as_ref()
}

/// Basic shape check on an already-normalized user id. Gates login before
/// any store lookup.
#[must_use]
pub fn valid_id(id_normalized: &str) -> bool {
    id_pattern().is_some_and(|pattern| pattern.is_match(id_normalized))
}
