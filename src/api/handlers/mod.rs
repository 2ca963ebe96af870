//! Axum handlers. Thin: extract request context, run the auth core, map the
//! typed failure onto a stable wire response.

pub mod health;
pub mod login;
pub mod logout;
pub mod password;
pub mod refresh;

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::{AuthError, SessionTokens};

/// Response shape shared by login, refresh, and change-password.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct AuthResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_name: Option<String>,
    /// Stable error code from the failure taxonomy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Only present with the `UserFrozen` code, for client display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_until: Option<DateTime<Utc>>,
}

impl AuthResponse {
    #[must_use]
    pub fn success(tokens: SessionTokens) -> Self {
        Self {
            ok: true,
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            expires_in: Some(tokens.expires_in),
            role: Some(tokens.role),
            masked_name: Some(tokens.masked_name),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failure(err: &AuthError) -> Self {
        Self {
            ok: false,
            error: Some(err.code().to_string()),
            frozen_until: match err {
                AuthError::UserFrozen { frozen_until } => Some(*frozen_until),
                _ => None,
            },
            ..Self::default()
        }
    }
}

pub(crate) fn error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidDevice | AuthError::InvalidData(_) => StatusCode::BAD_REQUEST,
        AuthError::NoUserFound
        | AuthError::NoPasswordMatch
        | AuthError::IpAddressChanged
        | AuthError::NoDeviceMatch
        | AuthError::TokenExpired { .. } => StatusCode::UNAUTHORIZED,
        AuthError::AccountDisabled => StatusCode::FORBIDDEN,
        AuthError::UserFrozen { .. } => StatusCode::LOCKED,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Terminal failure mapping; internal errors are logged here and leave the
/// process as an opaque code.
pub(crate) fn fail(err: &AuthError) -> (StatusCode, Json<AuthResponse>) {
    if let AuthError::Internal(inner) = err {
        error!("Unexpected auth failure: {inner:#}");
    }
    (error_status(err), Json(AuthResponse::failure(err)))
}

/// Extract a client IP from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Optional coarse region hint forwarded by the edge proxy.
pub(crate) fn extract_region(headers: &HeaderMap) -> Option<String> {
    headers
        .get("cf-ipcountry")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
}

/// Pull the bearer access token out of the `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
