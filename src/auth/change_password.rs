//! Change-password flow. The caller is already authenticated by an access
//! token; the old password is still re-proved through the same gate as
//! login, and the device's refresh token is dropped so the old session dies
//! with the old password.

use chrono::{DateTime, Utc};

use super::{
    audit::{self, AuditRecord, AuditSink},
    error::AuthError,
    hasher, lockout, normalize_id,
    store::{DeviceTokenStore, UserStore},
};

#[derive(Debug, Clone)]
pub struct ChangePasswordRequest {
    /// User id from the verified access token.
    pub user_id: String,
    pub old_password: String,
    pub new_password: String,
    pub device_id: String,
    pub client_ip: String,
}

/// Verify the old password and store the new digest.
///
/// # Errors
/// `NoUserFound`, `UserFrozen`, `AccountDisabled`, `NoPasswordMatch`
/// (counts toward lockout), or `Internal`.
pub async fn change_password<U, D, A>(
    users: &U,
    devices: &D,
    audit_sink: &A,
    request: ChangePasswordRequest,
    now: DateTime<Utc>,
) -> Result<(), AuthError>
where
    U: UserStore + ?Sized,
    D: DeviceTokenStore + ?Sized,
    A: AuditSink + ?Sized,
{
    let id = normalize_id(&request.user_id);
    let user = users.fetch(&id).await?.ok_or(AuthError::NoUserFound)?;

    lockout::check_gate(&user, now)?;

    if !hasher::verify(&id, &request.old_password, &user.password_hash) {
        lockout::register_failure(users, &user, now).await?;
        audit::emit(
            audit_sink,
            AuditRecord::change_password(&id, &request.client_ip, false),
        )
        .await;
        return Err(AuthError::NoPasswordMatch);
    }

    users
        .update_password(&id, &hasher::digest(&id, &request.new_password))
        .await?;
    users.reset_failures(&id).await?;

    // The old refresh token was issued under the old password; retire it.
    devices.delete(&id, &request.device_id).await?;

    audit::emit(
        audit_sink,
        AuditRecord::change_password(&id, &request.client_ip, true),
    )
    .await;

    Ok(())
}
