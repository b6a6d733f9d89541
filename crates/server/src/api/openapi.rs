//! OpenAPI/Utoipa configuration.

use crate::api::{
    auth::AUTH_TAG, authorize::OAUTH2_TAG, clients::CLIENTS_TAG, health::MISC_TAG, roles::RBAC_TAG,
    users::USERS_TAG,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // JWT Bearer access tokens issued by /api/auth/login
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some(
                    "Use the access token obtained from `/api/auth/login` to authenticate.",
                ))
                .build();
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));

            // OAuth2 Authorization Code flow driven through the console
            let oauth2 = OAuth2::new([utoipa::openapi::security::Flow::AuthorizationCode(
                utoipa::openapi::security::AuthorizationCode::new(
                    "/oauth2/authorize",
                    "/oauth2/token",
                    Scopes::from_iter([
                        ("openid", "OpenID Connect scope"),
                        ("email", "Access to user email"),
                        ("profile", "Access to user profile"),
                    ]),
                ),
            )]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "CloseAuth API",
        version = "1.0.0",
        description = "Backend API for the CloseAuth OAuth2/OIDC identity provider console."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = AUTH_TAG, description = "Session authentication endpoints"),
        (name = USERS_TAG, description = "User administration endpoints"),
        (name = CLIENTS_TAG, description = "OAuth2 client management endpoints"),
        (name = RBAC_TAG, description = "Role and permission configuration endpoints"),
        (name = OAUTH2_TAG, description = "Authorization flow endpoints")
    )
)]
pub struct ApiDoc;
