use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{
    health::__path_health,
    login::{self, __path_login},
    logout::{self, __path_logout},
    password::{self, __path_change_password},
    refresh::{self, __path_refresh},
    AuthResponse,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, login, refresh, logout, change_password),
    components(schemas(
        AuthResponse,
        login::LoginPayload,
        refresh::RefreshPayload,
        logout::LogoutPayload,
        password::ChangePasswordPayload
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login, token rotation, and session management"),
        (name = "health", description = "Service metadata")
    )
)]
pub struct ApiDoc;
