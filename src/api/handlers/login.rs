use axum::{extract::Extension, http::HeaderMap, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{extract_client_ip, extract_region, fail, user_agent, AuthResponse};
use crate::{
    auth::{
        self,
        audit::PgAuditSink,
        codec,
        store::{PgDeviceTokenStore, PgUserStore},
        AuthConfig, AuthError, LoginRequest, TokenIssuer,
    },
    cli::globals::GlobalArgs,
};

/// Login payload. `id` and `password` are AEAD ciphertexts under the key
/// derived from the device token and the request's device class; `ip` is an
/// explicit override for deployments without a proxy in front.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginPayload {
    pub id: String,
    pub password: String,
    pub device_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginPayload,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Bad transport payload", body = AuthResponse),
        (status = 401, description = "Authentication failed", body = AuthResponse),
        (status = 423, description = "Account frozen", body = AuthResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(pool): Extension<PgPool>,
    Extension(globals): Extension<GlobalArgs>,
    Extension(issuer): Extension<Arc<TokenIssuer>>,
    Extension(config): Extension<Arc<AuthConfig>>,
    headers: HeaderMap,
    payload: Option<Json<LoginPayload>>,
) -> (StatusCode, Json<AuthResponse>) {
    let Some(Json(payload)) = payload else {
        return fail(&AuthError::InvalidData("Payload"));
    };

    let request = match decode_login(&globals, &headers, &payload) {
        Ok(request) => request,
        Err(err) => return fail(&err),
    };

    let users = PgUserStore::new(pool.clone());
    let devices = PgDeviceTokenStore::new(pool.clone());
    let audit = PgAuditSink::new(pool);

    match auth::login(
        &users,
        &devices,
        &audit,
        &issuer,
        &config,
        request,
        Utc::now(),
    )
    .await
    {
        Ok(tokens) => (StatusCode::OK, Json(AuthResponse::success(tokens))),
        Err(err) => fail(&err),
    }
}

/// Open the device token, derive the transport key, and decrypt the
/// credentials into a core login request.
fn decode_login(
    globals: &GlobalArgs,
    headers: &HeaderMap,
    payload: &LoginPayload,
) -> Result<LoginRequest, AuthError> {
    let device_id = codec::open_device_token(&globals.device_secret, &payload.device_token)?;
    let descriptor = codec::device_class(user_agent(headers));
    let key = codec::derive_device_key(&globals.device_secret, &device_id, descriptor);

    let id = codec::decrypt(&key, &payload.id)?;
    let password = codec::decrypt(&key, &payload.password)?;

    let client_ip = payload
        .ip
        .clone()
        .or_else(|| extract_client_ip(headers))
        .ok_or(AuthError::InvalidData("ClientIp"))?;

    Ok(LoginRequest {
        id,
        password,
        client_ip,
        device_id,
        region: extract_region(headers),
        organization: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use secrecy::SecretString;

    fn globals() -> GlobalArgs {
        GlobalArgs::new(
            SecretString::from("server-device-secret"),
            SecretString::from("server-token-secret"),
        )
    }

    fn sealed_payload(globals: &GlobalArgs, descriptor: &str) -> LoginPayload {
        let device_token = codec::seal_device_token(&globals.device_secret, "d1")
            .expect("seal should succeed");
        let key = codec::derive_device_key(&globals.device_secret, "d1", descriptor);
        LoginPayload {
            id: codec::encrypt(&key, "admin").expect("encrypt should succeed"),
            password: codec::encrypt(&key, "Secret1!").expect("encrypt should succeed"),
            device_token,
            ip: Some("203.0.113.10".to_string()),
        }
    }

    #[test]
    fn decode_login_recovers_credentials() -> Result<(), AuthError> {
        let globals = globals();
        let mut headers = HeaderMap::new();
        headers.insert(
            "user-agent",
            HeaderValue::from_static("Mozilla/5.0 (X11; Linux x86_64)"),
        );

        let request = decode_login(&globals, &headers, &sealed_payload(&globals, "desktop"))?;
        assert_eq!(request.id, "admin");
        assert_eq!(request.password, "Secret1!");
        assert_eq!(request.device_id, "d1");
        assert_eq!(request.client_ip, "203.0.113.10");
        Ok(())
    }

    #[test]
    fn decode_login_fails_when_device_class_changes() {
        let globals = globals();
        // Payload sealed for a desktop key, presented with a mobile UA.
        let payload = sealed_payload(&globals, "desktop");
        let mut headers = HeaderMap::new();
        headers.insert(
            "user-agent",
            HeaderValue::from_static("Mozilla/5.0 (iPhone; Mobile)"),
        );

        let result = decode_login(&globals, &headers, &payload);
        assert!(matches!(result, Err(AuthError::InvalidData("Credential"))));
    }

    #[test]
    fn decode_login_rejects_foreign_device_token() {
        let globals = globals();
        let mut payload = sealed_payload(&globals, "desktop");
        payload.device_token = "forged".to_string();

        let result = decode_login(&globals, &HeaderMap::new(), &payload);
        assert!(matches!(result, Err(AuthError::InvalidDevice)));
    }

    #[test]
    fn decode_login_requires_a_client_ip() {
        let globals = globals();
        let mut payload = sealed_payload(&globals, "unknown");
        payload.ip = None;

        let result = decode_login(&globals, &HeaderMap::new(), &payload);
        assert!(matches!(result, Err(AuthError::InvalidData("ClientIp"))));
    }

    #[test]
    fn decode_login_reads_proxy_headers() -> Result<(), AuthError> {
        let globals = globals();
        let mut payload = sealed_payload(&globals, "unknown");
        payload.ip = None;
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7"));
        headers.insert("cf-ipcountry", HeaderValue::from_static("DE"));

        let request = decode_login(&globals, &headers, &payload)?;
        assert_eq!(request.client_ip, "198.51.100.7");
        assert_eq!(request.region.as_deref(), Some("DE"));
        Ok(())
    }
}
