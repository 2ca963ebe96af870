//! Login orchestration: bootstrap, lockout gate, password check, token
//! issuance, device-row upsert.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{
    audit::{self, AuditRecord, AuditSink},
    error::AuthError,
    hasher, lockout, normalize_id,
    store::{DeviceTokenStore, UserRecord, UserStore},
    token::{hash_token, TokenIssuer},
    valid_id, AuthConfig,
};

/// Decrypted login input plus the request's network/device context.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub id: String,
    pub password: String,
    pub client_ip: String,
    pub device_id: String,
    pub region: Option<String>,
    pub organization: Option<String>,
}

/// Successful issuance result, shared by login and refresh.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub role: i64,
    pub masked_name: String,
}

/// Display form of a user id with the middle masked out.
#[must_use]
pub fn mask_name(id: &str) -> String {
    let mut chars = id.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if id.chars().count() > 2 => format!("{first}***{last}"),
        (Some(first), _) => format!("{first}***"),
        _ => "***".to_string(),
    }
}

/// Bitmask granting every permission; assigned to the bootstrap user.
pub const BOOTSTRAP_ROLE: i64 = i64::MAX;

/// Issue a token pair for the user and persist the device binding plus the
/// success bookkeeping. Shared tail of login and refresh.
pub(super) async fn issue_session<U, D>(
    users: &U,
    devices: &D,
    issuer: &TokenIssuer,
    user: &UserRecord,
    organization: Option<&str>,
    client_ip: &str,
    region: Option<&str>,
    device_id: &str,
    now: DateTime<Utc>,
) -> Result<SessionTokens, AuthError>
where
    U: UserStore + ?Sized,
    D: DeviceTokenStore + ?Sized,
{
    let access_token = issuer
        .create_access_token(&user.id, user.role, now)
        .map_err(|e| AuthError::Internal(e.into()))?;
    let refresh_token = issuer
        .create_refresh_token(&user.id, organization, client_ip, region, device_id, now)
        .map_err(|e| AuthError::Internal(e.into()))?;

    devices
        .upsert(&user.id, device_id, &hash_token(&refresh_token), now)
        .await?;
    users.record_success(&user.id, now).await?;

    Ok(SessionTokens {
        access_token,
        refresh_token,
        expires_in: issuer.access_expiry_seconds(),
        role: user.role,
        masked_name: mask_name(&user.id),
    })
}

/// Password login.
///
/// First-run bootstrap: when the user table does not exist yet and the
/// submitted id is the reserved bootstrap identity, the schema is provisioned
/// and the bootstrap user inserted with the submitted password before the
/// normal flow continues.
///
/// # Errors
/// `InvalidData` for a malformed id, `NoUserFound`, `UserFrozen`,
/// `AccountDisabled`, `NoPasswordMatch`, or `Internal` on store/crypto
/// failures.
pub async fn login<U, D, A>(
    users: &U,
    devices: &D,
    audit_sink: &A,
    issuer: &TokenIssuer,
    config: &AuthConfig,
    request: LoginRequest,
    now: DateTime<Utc>,
) -> Result<SessionTokens, AuthError>
where
    U: UserStore + ?Sized,
    D: DeviceTokenStore + ?Sized,
    A: AuditSink + ?Sized,
{
    let id = normalize_id(&request.id);
    if !valid_id(&id) {
        return Err(AuthError::InvalidData("Id"));
    }

    if !users.exists().await? {
        if id != config.bootstrap_id() {
            return Err(AuthError::NoUserFound);
        }
        info!("First run: provisioning auth schema and bootstrap user");
        users.provision().await?;
        users
            .insert_bootstrap(&UserRecord {
                id: id.clone(),
                password_hash: hasher::digest(&id, &request.password),
                role: BOOTSTRAP_ROLE,
                status: lockout::STATUS_ACTIVE,
                failure_count: 0,
                frozen_until: None,
                last_refresh: None,
            })
            .await?;
    }

    let user = users.fetch(&id).await?.ok_or(AuthError::NoUserFound)?;

    lockout::check_gate(&user, now)?;

    if !hasher::verify(&id, &request.password, &user.password_hash) {
        let failures = lockout::register_failure(users, &user, now).await?;
        debug!("Password mismatch for {id}, consecutive failures: {failures}");
        audit::emit(
            audit_sink,
            AuditRecord::login(&id, &request.device_id, &request.client_ip, false),
        )
        .await;
        return Err(AuthError::NoPasswordMatch);
    }

    audit::emit(
        audit_sink,
        AuditRecord::login(&id, &request.device_id, &request.client_ip, true),
    )
    .await;

    issue_session(
        users,
        devices,
        issuer,
        &user,
        request.organization.as_deref(),
        &request.client_ip,
        request.region.as_deref(),
        &request.device_id,
        now,
    )
    .await
}

/// Logout: drop the device's refresh-token row. Idempotent.
///
/// # Errors
/// `Internal` on store failures only.
pub async fn sign_out<D: DeviceTokenStore + ?Sized>(
    devices: &D,
    user_id: &str,
    device_id: &str,
) -> Result<(), AuthError> {
    devices.delete(&normalize_id(user_id), device_id).await?;
    Ok(())
}
