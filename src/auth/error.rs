//! Typed failure taxonomy for the auth core.
//!
//! Every failure an orchestrator can produce maps to a stable wire code via
//! [`AuthError::code`]; callers never see internals. `Internal` wraps
//! unexpected errors (store unavailable, crypto failures) which are logged at
//! the boundary and surfaced as a generic failure.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("device token could not be opened")]
    InvalidDevice,
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
    #[error("no user found")]
    NoUserFound,
    #[error("account frozen until {frozen_until}")]
    UserFrozen { frozen_until: DateTime<Utc> },
    #[error("account disabled")]
    AccountDisabled,
    #[error("password mismatch")]
    NoPasswordMatch,
    #[error("client ip does not match token claims")]
    IpAddressChanged,
    #[error("no device token on record")]
    NoDeviceMatch,
    #[error("token expired")]
    TokenExpired { detail: Option<&'static str> },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Plain expiry, renewable by re-proving the password.
    #[must_use]
    pub const fn expired() -> Self {
        Self::TokenExpired { detail: None }
    }

    /// Stale or already-rotated token. Deliberately carries the same wire
    /// code as genuine expiry so callers cannot tell which check failed.
    #[must_use]
    pub const fn expired_no_match() -> Self {
        Self::TokenExpired {
            detail: Some("NoMatch"),
        }
    }

    /// Stable code surfaced to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidDevice => "InvalidDevice",
            Self::InvalidData(_) => "InvalidData",
            Self::NoUserFound => "NoUserFound",
            Self::UserFrozen { .. } => "UserFrozen",
            Self::AccountDisabled => "AccountDisabled",
            Self::NoPasswordMatch => "NoPasswordMatch",
            Self::IpAddressChanged => "IPAddressChanged",
            Self::NoDeviceMatch => "NoDeviceMatch",
            Self::TokenExpired { .. } => "TokenExpired",
            Self::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_variants_share_wire_code() {
        assert_eq!(AuthError::expired().code(), "TokenExpired");
        assert_eq!(AuthError::expired_no_match().code(), "TokenExpired");
    }

    #[test]
    fn internal_never_leaks_detail_in_code() {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5:5432"));
        assert_eq!(err.code(), "InternalError");
    }

    #[test]
    fn frozen_carries_expiry() {
        let until = Utc::now();
        let err = AuthError::UserFrozen {
            frozen_until: until,
        };
        assert_eq!(err.code(), "UserFrozen");
        assert!(matches!(err, AuthError::UserFrozen { frozen_until } if frozen_until == until));
    }
}
