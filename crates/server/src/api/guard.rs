//! Authentication extractor and typed API errors.
//!
//! Provides the `AuthBearer` Axum extractor that validates access-token JWTs
//! for the admin API, and the `ApiError` type every handler returns on
//! failure.

use crate::AppResources;
use crate::auth::tokens::verify_access_token;
use crate::entity::user;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error type for API failures, using OAuth2-style error codes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code (e.g. "invalid_token", "insufficient_permissions")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        Self {
            error: "invalid_credentials".to_string(),
            error_description: Some("Invalid email or password".to_string()),
        }
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_token".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn insufficient_permissions(required: &str) -> Self {
        Self {
            error: "insufficient_permissions".to_string(),
            error_description: Some(format!("Requires '{}' permission", required)),
        }
    }

    pub fn forbidden(description: impl Into<String>) -> Self {
        Self {
            error: "forbidden".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_request".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_client".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_grant".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_scope".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self {
            error: "not_found".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn conflict(description: impl Into<String>) -> Self {
        Self {
            error: "conflict".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "invalid_credentials" | "invalid_token" => StatusCode::UNAUTHORIZED,
            "insufficient_permissions" | "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "invalid_request" | "invalid_client" | "invalid_grant" | "invalid_scope"
            | "unsupported_response_type" | "unauthorized_client" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(e: sea_orm::DbErr) -> Self {
        tracing::error!("Database error: {}", e);
        ApiError::server_error()
    }
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub email_verified: bool,
}

impl AuthenticatedUser {
    /// Check if the user holds a specific permission
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p == name)
    }

    /// Error unless the user holds the given permission.
    pub fn require(&self, permission: &str) -> Result<(), ApiError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(ApiError::insufficient_permissions(permission))
        }
    }
}

/// Axum extractor that validates Bearer access tokens.
///
/// Verifies the JWT signature/expiry/issuer, then confirms the subject still
/// exists, is active and not locked. Roles and permissions come from the
/// token claims (they were resolved at issue time).
///
/// # Example
///
/// ```ignore
/// async fn handler(AuthBearer(user): AuthBearer) -> impl IntoResponse {
///     format!("Hello, {}", user.email)
/// }
/// ```
pub struct AuthBearer(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = parts
            .extensions
            .get::<AppResources>()
            .cloned()
            .ok_or_else(|| {
                tracing::error!("AppResources not found in extensions");
                ApiError::server_error()
            })?;

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());

        let token = match auth_header {
            Some(header) if header.starts_with("Bearer ") => &header[7..],
            Some(_) => {
                return Err(ApiError::invalid_token(
                    "Authorization header must use Bearer scheme",
                ));
            }
            None => {
                return Err(ApiError::invalid_token("Missing Authorization header"));
            }
        };

        let claims = verify_access_token(
            &resources.config.security.jwt_secret,
            &resources.config.oauth2.issuer_url,
            token,
        )
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            ApiError::invalid_token("Token is invalid or expired")
        })?;

        // The token may outlive an account's standing; re-check the subject.
        let account = user::Entity::find_by_id(&claims.sub)
            .one(resources.db.as_ref())
            .await
            .map_err(|e| {
                tracing::error!("Database error looking up user: {}", e);
                ApiError::server_error()
            })?
            .ok_or_else(|| ApiError::invalid_token("User no longer exists"))?;

        if !account.is_active {
            return Err(ApiError::invalid_token("Account is deactivated"));
        }
        if account.is_locked() {
            return Err(ApiError::invalid_token("Account is locked"));
        }

        Ok(AuthBearer(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            roles: claims.roles,
            permissions: claims.permissions,
            email_verified: account.email_verified,
        }))
    }
}
