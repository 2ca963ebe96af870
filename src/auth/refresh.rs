//! Refresh-token validation and rotation. Every check is terminal; the order
//! is fixed and security-relevant.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    audit::{self, AuditRecord, AuditSink},
    error::AuthError,
    hasher, lockout,
    login::{issue_session, SessionTokens},
    store::{DeviceTokenStore, UserStore},
    token::{hash_token, TokenIssuer},
};

#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub device_id: String,
    pub client_ip: String,
    /// Re-proved password; required once the token has expired.
    pub new_password: Option<String>,
}

/// Validate an inbound refresh token end-to-end and rotate it.
///
/// Check order (any failure is terminal):
/// 1. signature → `InvalidData("Claims")`
/// 2. expiry without a re-proved password → `TokenExpired`
/// 3. IP binding → `IPAddressChanged` (fails closed even with a password)
/// 4. device row present → `NoDeviceMatch`
/// 5. optional password re-proof → `NoPasswordMatch` (counts toward lockout)
/// 6. stored-hash comparison → `TokenExpired("NoMatch")` (indistinguishable
///    from genuine expiry on the wire)
/// 7. freeze/status gate on the resolved user
///
/// On success a new pair is issued with `org`/`region`/`dev` carried forward
/// and the IP updated to the current one; the stored hash rotates.
///
/// # Errors
/// See the check list above, plus `Internal` for store/crypto failures.
pub async fn refresh<U, D, A>(
    users: &U,
    devices: &D,
    audit_sink: &A,
    issuer: &TokenIssuer,
    request: RefreshRequest,
    now: DateTime<Utc>,
) -> Result<SessionTokens, AuthError>
where
    U: UserStore + ?Sized,
    D: DeviceTokenStore + ?Sized,
    A: AuditSink + ?Sized,
{
    let parsed = issuer
        .parse_refresh(&request.refresh_token, now)
        .map_err(|err| {
            debug!("Refresh token rejected: {err}");
            AuthError::InvalidData("Claims")
        })?;
    let claims = parsed.claims;

    // Expired tokens are only renewable by re-proving the password.
    if parsed.expired && request.new_password.is_none() {
        return Err(AuthError::expired());
    }

    if claims.ip != request.client_ip {
        debug!(
            "Refresh IP mismatch for {}: token bound elsewhere",
            claims.sub
        );
        return Err(AuthError::IpAddressChanged);
    }

    let device_row = devices
        .fetch(&claims.sub, &request.device_id)
        .await?
        .ok_or(AuthError::NoDeviceMatch)?;

    let user = users.fetch(&claims.sub).await?.ok_or(AuthError::NoUserFound)?;

    if let Some(password) = &request.new_password {
        if !hasher::verify(&user.id, password, &user.password_hash) {
            lockout::register_failure(users, &user, now).await?;
            audit::emit(
                audit_sink,
                AuditRecord::token_login(&user.id, &request.device_id, &request.client_ip, false),
            )
            .await;
            return Err(AuthError::NoPasswordMatch);
        }
    }

    // Stale or already-rotated token: collapsed into TokenExpired on the wire.
    if hash_token(&request.refresh_token) != device_row.hashed_refresh_token {
        return Err(AuthError::expired_no_match());
    }

    lockout::check_gate(&user, now)?;

    let tokens = issue_session(
        users,
        devices,
        issuer,
        &user,
        claims.org.as_deref(),
        &request.client_ip,
        claims.region.as_deref(),
        &request.device_id,
        now,
    )
    .await?;

    audit::emit(
        audit_sink,
        AuditRecord::token_login(&user.id, &request.device_id, &request.client_ip, true),
    )
    .await;

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        login::login,
        test_support::{request, world, World},
    };
    use chrono::Duration;

    async fn established_session(w: &World) -> SessionTokens {
        login(
            &w.users,
            &w.devices,
            &w.audit,
            &w.issuer,
            &w.config,
            request("admin", "Secret1!", "203.0.113.10", "d1"),
            w.now,
        )
        .await
        .expect("login should succeed")
    }

    fn refresh_request(token: &str, ip: &str) -> RefreshRequest {
        RefreshRequest {
            refresh_token: token.to_string(),
            device_id: "d1".to_string(),
            client_ip: ip.to_string(),
            new_password: None,
        }
    }

    #[tokio::test]
    async fn rotation_invalidates_predecessor() -> anyhow::Result<()> {
        let w = world();
        let first = established_session(&w).await;

        let second = refresh(
            &w.users,
            &w.devices,
            &w.audit,
            &w.issuer,
            refresh_request(&first.refresh_token, "203.0.113.10"),
            w.now,
        )
        .await?;
        assert_ne!(second.refresh_token, first.refresh_token);

        // Presenting the predecessor again fails as a stale token.
        let result = refresh(
            &w.users,
            &w.devices,
            &w.audit,
            &w.issuer,
            refresh_request(&first.refresh_token, "203.0.113.10"),
            w.now + Duration::seconds(1),
        )
        .await;
        assert!(matches!(
            result,
            Err(AuthError::TokenExpired {
                detail: Some("NoMatch")
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn ip_binding_fails_closed_even_with_password() -> anyhow::Result<()> {
        let w = world();
        let session = established_session(&w).await;

        let mut moved = refresh_request(&session.refresh_token, "198.51.100.7");
        moved.new_password = Some("Secret1!".to_string());

        let result = refresh(&w.users, &w.devices, &w.audit, &w.issuer, moved, w.now).await;
        assert!(matches!(result, Err(AuthError::IpAddressChanged)));
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_requires_password() -> anyhow::Result<()> {
        let w = world();
        let session = established_session(&w).await;
        let after_expiry = w.now + Duration::days(15);

        // Without a password: plain TokenExpired.
        let result = refresh(
            &w.users,
            &w.devices,
            &w.audit,
            &w.issuer,
            refresh_request(&session.refresh_token, "203.0.113.10"),
            after_expiry,
        )
        .await;
        assert!(matches!(
            result,
            Err(AuthError::TokenExpired { detail: None })
        ));

        // With the correct password: renewal succeeds.
        let mut renew = refresh_request(&session.refresh_token, "203.0.113.10");
        renew.new_password = Some("Secret1!".to_string());
        let renewed = refresh(&w.users, &w.devices, &w.audit, &w.issuer, renew, after_expiry).await?;
        assert_ne!(renewed.refresh_token, session.refresh_token);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_renewal_password_counts_toward_lockout() -> anyhow::Result<()> {
        let w = world();
        let session = established_session(&w).await;

        let mut renew = refresh_request(&session.refresh_token, "203.0.113.10");
        renew.new_password = Some("wrong".to_string());

        let result = refresh(&w.users, &w.devices, &w.audit, &w.issuer, renew, w.now).await;
        assert!(matches!(result, Err(AuthError::NoPasswordMatch)));
        assert_eq!(w.users.failure_count("admin"), 1);
        assert!(w.audit.saw_failed_token_login("admin"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_device_is_rejected() -> anyhow::Result<()> {
        let w = world();
        let session = established_session(&w).await;

        let mut other_device = refresh_request(&session.refresh_token, "203.0.113.10");
        other_device.device_id = "d2".to_string();

        let result = refresh(
            &w.users,
            &w.devices,
            &w.audit,
            &w.issuer,
            other_device,
            w.now,
        )
        .await;
        assert!(matches!(result, Err(AuthError::NoDeviceMatch)));
        Ok(())
    }

    #[tokio::test]
    async fn forged_token_is_invalid_data() {
        let w = world();
        let result = refresh(
            &w.users,
            &w.devices,
            &w.audit,
            &w.issuer,
            refresh_request("not.a.token", "203.0.113.10"),
            w.now,
        )
        .await;
        assert!(matches!(result, Err(AuthError::InvalidData("Claims"))));
    }

    #[tokio::test]
    async fn frozen_user_cannot_rotate() -> anyhow::Result<()> {
        let w = world();
        let session = established_session(&w).await;
        w.users.freeze("admin", w.now + Duration::minutes(15));

        let result = refresh(
            &w.users,
            &w.devices,
            &w.audit,
            &w.issuer,
            refresh_request(&session.refresh_token, "203.0.113.10"),
            w.now,
        )
        .await;
        assert!(matches!(result, Err(AuthError::UserFrozen { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn rotation_carries_region_and_updates_ip() -> anyhow::Result<()> {
        let w = world();
        let mut req = request("admin", "Secret1!", "203.0.113.10", "d1");
        req.region = Some("eu-1".to_string());
        req.organization = Some("acme".to_string());
        let session = login(
            &w.users, &w.devices, &w.audit, &w.issuer, &w.config, req, w.now,
        )
        .await?;

        let rotated = refresh(
            &w.users,
            &w.devices,
            &w.audit,
            &w.issuer,
            refresh_request(&session.refresh_token, "203.0.113.10"),
            w.now,
        )
        .await?;

        let parsed = w.issuer.parse_refresh(&rotated.refresh_token, w.now).unwrap();
        assert_eq!(parsed.claims.region.as_deref(), Some("eu-1"));
        assert_eq!(parsed.claims.org.as_deref(), Some("acme"));
        assert_eq!(parsed.claims.dev, "d1");
        assert_eq!(parsed.claims.ip, "203.0.113.10");
        Ok(())
    }
}
