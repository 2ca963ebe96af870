use axum::{extract::Extension, http::HeaderMap, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{bearer_token, fail, AuthResponse};
use crate::{
    auth::{self, codec, store::PgDeviceTokenStore, AuthError, TokenIssuer},
    cli::globals::GlobalArgs,
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutPayload {
    pub device_token: String,
}

/// Drop the device's refresh-token row. Idempotent; logging out twice is not
/// an error. The caller proves identity with a live access token.
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutPayload,
    responses(
        (status = 200, description = "Session ended", body = bool),
        (status = 400, description = "Bad transport payload", body = AuthResponse),
        (status = 401, description = "Missing or invalid access token", body = AuthResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    Extension(pool): Extension<PgPool>,
    Extension(globals): Extension<GlobalArgs>,
    Extension(issuer): Extension<Arc<TokenIssuer>>,
    headers: HeaderMap,
    payload: Option<Json<LogoutPayload>>,
) -> Result<Json<bool>, (StatusCode, Json<AuthResponse>)> {
    let Some(Json(payload)) = payload else {
        return Err(fail(&AuthError::InvalidData("Payload")));
    };

    let token = bearer_token(&headers).ok_or_else(|| fail(&AuthError::InvalidData("Token")))?;

    let claims = issuer.verify_access(token, Utc::now()).map_err(|err| {
        debug!("Logout with unusable access token: {err}");
        fail(&AuthError::expired())
    })?;

    let device_id = codec::open_device_token(&globals.device_secret, &payload.device_token)
        .map_err(|err| fail(&err))?;

    let devices = PgDeviceTokenStore::new(pool);
    auth::sign_out(&devices, &claims.sub, &device_id)
        .await
        .map_err(|err| fail(&err))?;

    Ok(Json(true))
}
