use axum::{extract::Extension, http::HeaderMap, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{extract_client_ip, fail, user_agent, AuthResponse};
use crate::{
    auth::{
        self,
        audit::PgAuditSink,
        codec,
        store::{PgDeviceTokenStore, PgUserStore},
        AuthError, RefreshRequest, TokenIssuer,
    },
    cli::globals::GlobalArgs,
};

/// Refresh payload. `new_password` is an AEAD ciphertext under the derived
/// device key and is required once the refresh token has expired.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshPayload {
    pub refresh_token: String,
    pub device_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshPayload,
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 400, description = "Bad transport payload", body = AuthResponse),
        (status = 401, description = "Token rejected", body = AuthResponse),
        (status = 423, description = "Account frozen", body = AuthResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    Extension(pool): Extension<PgPool>,
    Extension(globals): Extension<GlobalArgs>,
    Extension(issuer): Extension<Arc<TokenIssuer>>,
    headers: HeaderMap,
    payload: Option<Json<RefreshPayload>>,
) -> (StatusCode, Json<AuthResponse>) {
    let Some(Json(payload)) = payload else {
        return fail(&AuthError::InvalidData("Payload"));
    };

    let request = match decode_refresh(&globals, &headers, payload) {
        Ok(request) => request,
        Err(err) => return fail(&err),
    };

    let users = PgUserStore::new(pool.clone());
    let devices = PgDeviceTokenStore::new(pool.clone());
    let audit = PgAuditSink::new(pool);

    match auth::refresh(&users, &devices, &audit, &issuer, request, Utc::now()).await {
        Ok(tokens) => (StatusCode::OK, Json(AuthResponse::success(tokens))),
        Err(err) => fail(&err),
    }
}

fn decode_refresh(
    globals: &GlobalArgs,
    headers: &HeaderMap,
    payload: RefreshPayload,
) -> Result<RefreshRequest, AuthError> {
    let device_id = codec::open_device_token(&globals.device_secret, &payload.device_token)?;

    let new_password = match &payload.new_password {
        Some(ciphertext) => {
            let descriptor = codec::device_class(user_agent(headers));
            let key = codec::derive_device_key(&globals.device_secret, &device_id, descriptor);
            Some(codec::decrypt(&key, ciphertext)?)
        }
        None => None,
    };

    let client_ip = payload
        .ip
        .or_else(|| extract_client_ip(headers))
        .ok_or(AuthError::InvalidData("ClientIp"))?;

    Ok(RefreshRequest {
        refresh_token: payload.refresh_token,
        device_id,
        client_ip,
        new_password,
    })
}
