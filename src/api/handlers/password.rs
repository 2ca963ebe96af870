use axum::{extract::Extension, http::HeaderMap, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{bearer_token, extract_client_ip, fail, user_agent, AuthResponse};
use crate::{
    auth::{
        audit::PgAuditSink,
        change_password::{self, ChangePasswordRequest},
        codec,
        store::{PgDeviceTokenStore, PgUserStore},
        AuthError, TokenIssuer,
    },
    cli::globals::GlobalArgs,
};

/// Change-password payload. Both passwords travel as AEAD ciphertexts under
/// the derived device key, same as login.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordPayload {
    pub old_password: String,
    pub new_password: String,
    pub device_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/password",
    request_body = ChangePasswordPayload,
    responses(
        (status = 200, description = "Password changed", body = AuthResponse),
        (status = 400, description = "Bad transport payload", body = AuthResponse),
        (status = 401, description = "Re-proof failed", body = AuthResponse),
        (status = 423, description = "Account frozen", body = AuthResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn change_password(
    Extension(pool): Extension<PgPool>,
    Extension(globals): Extension<GlobalArgs>,
    Extension(issuer): Extension<Arc<TokenIssuer>>,
    headers: HeaderMap,
    payload: Option<Json<ChangePasswordPayload>>,
) -> (StatusCode, Json<AuthResponse>) {
    let Some(Json(payload)) = payload else {
        return fail(&AuthError::InvalidData("Payload"));
    };

    let Some(token) = bearer_token(&headers) else {
        return fail(&AuthError::InvalidData("Token"));
    };
    let claims = match issuer.verify_access(token, Utc::now()) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Change-password with unusable access token: {err}");
            return fail(&AuthError::expired());
        }
    };

    let request = match decode_change(&globals, &headers, &claims.sub, payload) {
        Ok(request) => request,
        Err(err) => return fail(&err),
    };

    let users = PgUserStore::new(pool.clone());
    let devices = PgDeviceTokenStore::new(pool.clone());
    let audit = PgAuditSink::new(pool);

    match change_password::change_password(&users, &devices, &audit, request, Utc::now()).await {
        Ok(()) => (
            StatusCode::OK,
            Json(AuthResponse {
                ok: true,
                ..AuthResponse::default()
            }),
        ),
        Err(err) => fail(&err),
    }
}

fn decode_change(
    globals: &GlobalArgs,
    headers: &HeaderMap,
    user_id: &str,
    payload: ChangePasswordPayload,
) -> Result<ChangePasswordRequest, AuthError> {
    let device_id = codec::open_device_token(&globals.device_secret, &payload.device_token)?;
    let descriptor = codec::device_class(user_agent(headers));
    let key = codec::derive_device_key(&globals.device_secret, &device_id, descriptor);

    let old_password = codec::decrypt(&key, &payload.old_password)?;
    let new_password = codec::decrypt(&key, &payload.new_password)?;

    let client_ip = payload
        .ip
        .or_else(|| extract_client_ip(headers))
        .ok_or(AuthError::InvalidData("ClientIp"))?;

    Ok(ChangePasswordRequest {
        user_id: user_id.to_string(),
        old_password,
        new_password,
        device_id,
        client_ip,
    })
}
