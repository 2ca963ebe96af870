//! Access and refresh token issuance.
//!
//! Tokens are JWT-shaped (`header.claims.signature`, Base64Url, HS256 HMAC)
//! with a versioned claims payload. Signature validity and expiry are two
//! independent verdicts: [`TokenIssuer::parse_refresh`] returns the claims of
//! an expired-but-validly-signed refresh token, because such a token is still
//! usable for password-confirmed renewal.

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::AuthConfig;

pub const TOKEN_VERSION: u8 = 1;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims of a short-lived access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub v: u8,
    /// User id.
    pub sub: String,
    /// Role bitmask.
    pub role: i64,
    pub iat: i64,
    pub exp: i64,
}

/// Claims embedded in a refresh token. Immutable once signed; rotation mints
/// a new claims set rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub v: u8,
    /// User id.
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// Client IP the session is bound to.
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Device id the session is bound to.
    pub dev: String,
    pub iat: i64,
    pub exp: i64,
}

/// Parse result for a refresh token: expiry is reported, not enforced.
#[derive(Debug, Clone)]
pub struct ParsedRefresh {
    pub claims: RefreshClaims,
    pub expired: bool,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid token version")]
    InvalidVersion,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Signs and verifies both token kinds. One instance per server, built from
/// the token secret and the configured lifetimes.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: SecretString, config: &AuthConfig) -> Self {
        Self {
            secret,
            access_ttl: Duration::minutes(config.access_token_minutes()),
            refresh_ttl: Duration::days(config.refresh_token_days()),
        }
    }

    /// Access token lifetime in whole seconds, as surfaced to clients.
    #[must_use]
    pub fn access_expiry_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    fn sign_input(&self, signing_input: &str) -> Result<String, Error> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| Error::Key)?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        Ok(Base64UrlUnpadded::encode_string(&signature))
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, Error> {
        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature_b64 = self.sign_input(&signing_input)?;
        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify the signature and return the raw claims segment.
    fn verify_signature<'t>(&self, token: &'t str) -> Result<&'t str, Error> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
        if parts.next().is_some() {
            return Err(Error::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(Error::UnsupportedAlg(header.alg));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| Error::Key)?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidSignature)?;

        Ok(claims_b64)
    }

    /// Create a short-lived signed access token carrying role and identity.
    ///
    /// # Errors
    /// Returns an error if claims cannot be encoded or signing fails.
    pub fn create_access_token(
        &self,
        user_id: &str,
        role: i64,
        now: DateTime<Utc>,
    ) -> Result<String, Error> {
        let claims = AccessClaims {
            v: TOKEN_VERSION,
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Create a refresh token embedding the given session binding.
    ///
    /// # Errors
    /// Returns an error if claims cannot be encoded or signing fails.
    pub fn create_refresh_token(
        &self,
        user_id: &str,
        organization: Option<&str>,
        client_ip: &str,
        region: Option<&str>,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, Error> {
        let claims = RefreshClaims {
            v: TOKEN_VERSION,
            sub: user_id.to_string(),
            org: organization.map(str::to_string),
            ip: client_ip.to_string(),
            region: region.map(str::to_string),
            dev: device_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Verify an access token end-to-end: signature, version, and expiry.
    ///
    /// # Errors
    /// `InvalidSignature`/format errors for a forged or mangled token,
    /// `Expired` once `exp` has passed.
    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, Error> {
        let claims_b64 = self.verify_signature(token)?;
        let claims: AccessClaims = b64d_json(claims_b64)?;
        if claims.v != TOKEN_VERSION {
            return Err(Error::InvalidVersion);
        }
        if claims.exp <= now.timestamp() {
            return Err(Error::Expired);
        }
        Ok(claims)
    }

    /// Verify a refresh token's signature and recover its claims; expiry is
    /// reported as a separate boolean, never enforced here.
    ///
    /// # Errors
    /// Signature/format/version errors only.
    pub fn parse_refresh(&self, token: &str, now: DateTime<Utc>) -> Result<ParsedRefresh, Error> {
        let claims_b64 = self.verify_signature(token)?;
        let claims: RefreshClaims = b64d_json(claims_b64)?;
        if claims.v != TOKEN_VERSION {
            return Err(Error::InvalidVersion);
        }
        let expired = claims.exp <= now.timestamp();
        Ok(ParsedRefresh { claims, expired })
    }
}

/// One-way digest of a refresh token for storage comparison. The plaintext
/// token is never persisted.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    Base64::encode_string(&hasher.finalize())
}
