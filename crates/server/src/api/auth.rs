//! Session authentication endpoints (`/api/auth/*`).
//!
//! - `POST /login` - credential login, returns user + tokens
//! - `POST /register` - account creation (auto-login)
//! - `POST /forgot-password` - trigger reset email
//! - `POST /reset-password` - consume reset token
//! - `POST /refresh` - rotate the refresh token, mint a new access token
//! - `POST /logout` - revoke the refresh session

use crate::AppResources;
use crate::api::guard::ApiError;
use crate::api::users::UserDto;
use crate::audit::{self, AuditEvent};
use crate::auth::password::{generate_opaque_token, hash_opaque_token, hash_password, verify_password};
use crate::auth::rbac::resolve_user_access;
use crate::auth::sessions::{self, SessionContext};
use crate::auth::tokens::issue_access_token;
use crate::email_templates::PasswordResetEmailTemplate;
use crate::entity::{reset_token, role, user, user_role};
use crate::response::{ApiResponse, ValidationError};
use axum::{
    Extension, Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use lettre::AsyncTransport;
use lettre::message::{MultiPart, SinglePart};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// OpenAPI tag for authentication endpoints.
pub const AUTH_TAG: &str = "Authentication";

/// Creates the authentication router.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(login))
        .routes(routes!(register))
        .routes(routes!(forgot_password))
        .routes(routes!(reset_password))
        .routes(routes!(refresh))
        .routes(routes!(logout))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Extends the refresh-token session lifetime
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: String,
    pub confirm_password: String,
    pub accept_terms: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// Issued token pair.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenDto {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Login/registration payload: the user plus their tokens.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthPayload {
    pub user: UserDto,
    pub tokens: TokenDto,
}

// =============================================================================
// Helpers
// =============================================================================

/// Pull best-effort request context out of the headers for auditing.
fn request_context(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    (ip, user_agent)
}

/// Mint the access/refresh pair for an authenticated user.
async fn issue_token_pair(
    resources: &AppResources,
    account: &user::Model,
    remember_me: bool,
    ctx: SessionContext,
) -> Result<(TokenDto, Vec<String>, Vec<String>), ApiError> {
    let access = resolve_user_access(resources.db.as_ref(), &account.id).await?;

    let access_token = issue_access_token(
        &resources.config.security.jwt_secret,
        &resources.config.oauth2.issuer_url,
        resources.config.security.access_token_lifetime,
        &account.id,
        &account.email,
        access.roles.clone(),
        access.permissions.clone(),
        None,
    )
    .map_err(|e| {
        tracing::error!("Failed to issue access token: {}", e);
        ApiError::server_error()
    })?;

    let refresh_lifetime = if remember_me {
        resources.config.security.remember_me_refresh_lifetime
    } else {
        resources.config.security.refresh_token_lifetime
    };
    let refresh_token =
        sessions::issue_session(resources.db.as_ref(), &account.id, refresh_lifetime, ctx).await?;

    Ok((
        TokenDto {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: resources.config.security.access_token_lifetime,
            scope: None,
        },
        access.roles,
        access.permissions,
    ))
}

// =============================================================================
// Endpoints
// =============================================================================

/// Credential login.
#[tracing::instrument(skip(resources, headers, payload), fields(email = %payload.email))]
#[utoipa::path(
    post,
    path = "/login",
    tag = AUTH_TAG,
    operation_id = "Login",
    summary = "Authenticate with email and password",
    description = "Verifies the credentials and returns the user profile together with an access/refresh \
                   token pair.\n\n\
                   **Lockout:** repeated failures temporarily lock the account. The error response never \
                   reveals whether the email is registered.\n\n\
                   **Remember me:** `rememberMe: true` extends the refresh-token session lifetime.",
    request_body(content = LoginRequest, description = "Login credentials"),
    responses(
        (status = 200, description = "Authenticated", body = ApiResponse<AuthPayload>),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 403, description = "Account locked or deactivated", body = ApiError),
    )
)]
async fn login(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthPayload>>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let (ip, user_agent) = request_context(&headers);

    let account = match user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(resources.db.as_ref())
        .await?
    {
        Some(u) => u,
        None => {
            // Unknown email gets the same answer as a wrong password
            audit::record(
                resources.db.as_ref(),
                AuditEvent {
                    ip_address: ip,
                    user_agent,
                    ..AuditEvent::failure("auth.login", "unknown email")
                },
            )
            .await;
            return Err(ApiError::invalid_credentials());
        }
    };

    if account.is_locked() {
        return Err(ApiError::forbidden(
            "Account is temporarily locked due to failed login attempts",
        ));
    }
    if !account.is_active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }

    if !verify_password(&payload.password, &account.password_hash) {
        let attempts = account.failed_login_attempts + 1;
        let mut active: user::ActiveModel = account.clone().into();
        active.failed_login_attempts = Set(attempts);
        if attempts >= resources.config.security.max_failed_logins {
            active.locked_until = Set(Some(
                OffsetDateTime::now_utc()
                    + time::Duration::seconds(resources.config.security.lockout_duration_secs),
            ));
            tracing::warn!(email = %email, attempts, "Account locked after repeated failed logins");
        }
        active.updated_at = Set(OffsetDateTime::now_utc());
        active.update(resources.db.as_ref()).await?;

        audit::record(
            resources.db.as_ref(),
            AuditEvent {
                ip_address: ip,
                user_agent,
                ..AuditEvent::failure("auth.login", "wrong password").user(&account.id)
            },
        )
        .await;
        return Err(ApiError::invalid_credentials());
    }

    // Successful login: clear lockout state, stamp last_login_at
    let now = OffsetDateTime::now_utc();
    let mut active: user::ActiveModel = account.clone().into();
    active.failed_login_attempts = Set(0);
    active.locked_until = Set(None);
    active.last_login_at = Set(Some(now));
    active.updated_at = Set(now);
    let account = active.update(resources.db.as_ref()).await?;

    let ctx = SessionContext {
        client_id: None,
        ip_address: ip.clone(),
        user_agent: user_agent.clone(),
    };
    let (tokens, roles, permissions) =
        issue_token_pair(&resources, &account, payload.remember_me, ctx).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent {
            ip_address: ip,
            user_agent,
            ..AuditEvent::success("auth.login").user(&account.id)
        },
    )
    .await;

    tracing::info!(user_id = %account.id, "User logged in");

    Ok(Json(ApiResponse::ok(AuthPayload {
        user: UserDto::from_model(account, roles, permissions),
        tokens,
    })))
}

/// Account registration.
#[tracing::instrument(skip(resources, headers, payload), fields(email = %payload.email))]
#[utoipa::path(
    post,
    path = "/register",
    tag = AUTH_TAG,
    operation_id = "Register",
    summary = "Create a new account",
    description = "Creates a user account with the default `user` role and logs it in immediately.\n\n\
                   Validation failures are reported as field-level errors in the response envelope.",
    request_body(content = RegisterRequest, description = "Registration data"),
    responses(
        (status = 201, description = "Account created", body = ApiResponse<AuthPayload>),
        (status = 400, description = "Validation failed: field errors in the envelope"),
    )
)]
async fn register(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Response {
    let email = payload.email.trim().to_lowercase();

    let mut errors: Vec<ValidationError> = Vec::new();
    if email.is_empty() || !email.contains('@') {
        errors.push(ValidationError::new("email", "A valid email is required"));
    }
    if payload.password.len() < 8 {
        errors.push(ValidationError::new(
            "password",
            "Password must be at least 8 characters",
        ));
    }
    if payload.password != payload.confirm_password {
        errors.push(ValidationError::new(
            "confirmPassword",
            "Passwords do not match",
        ));
    }
    if !payload.accept_terms {
        errors.push(ValidationError::new(
            "acceptTerms",
            "You must accept the terms of service",
        ));
    }
    if let Some(username) = payload.username.as_deref()
        && !username.is_empty()
        && !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push(ValidationError::new(
            "username",
            "Username may only contain letters, digits, '-' and '_'",
        ));
    }

    if errors.is_empty() {
        // Uniqueness checks
        match user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .one(resources.db.as_ref())
            .await
        {
            Ok(Some(_)) => {
                errors.push(ValidationError::new(
                    "email",
                    "An account with this email already exists",
                ));
            }
            Ok(None) => {}
            Err(e) => return ApiError::from(e).into_response(),
        }

        if let Some(username) = payload.username.as_deref()
            && !username.is_empty()
        {
            match user::Entity::find()
                .filter(user::Column::Username.eq(username))
                .one(resources.db.as_ref())
                .await
            {
                Ok(Some(_)) => {
                    errors.push(ValidationError::new("username", "Username is already taken"));
                }
                Ok(None) => {}
                Err(e) => return ApiError::from(e).into_response(),
            }
        }
    }

    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::invalid("Validation failed", errors)),
        )
            .into_response();
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("Failed to hash password: {}", e);
            return ApiError::server_error().into_response();
        }
    };

    let now = OffsetDateTime::now_utc();
    let model = user::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        email: Set(email.clone()),
        username: Set(payload.username.clone().filter(|u| !u.is_empty())),
        password_hash: Set(password_hash),
        first_name: Set(payload.first_name.clone().filter(|s| !s.is_empty())),
        last_name: Set(payload.last_name.clone().filter(|s| !s.is_empty())),
        is_active: Set(true),
        email_verified: Set(false),
        failed_login_attempts: Set(0),
        locked_until: Set(None),
        password_changed_at: Set(Some(now)),
        last_login_at: Set(Some(now)),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let account = match model.insert(resources.db.as_ref()).await {
        Ok(u) => u,
        Err(e) => return ApiError::from(e).into_response(),
    };

    // Attach the default role; its absence is a deployment problem, not the user's
    match role::Entity::find()
        .filter(role::Column::Name.eq("user"))
        .one(resources.db.as_ref())
        .await
    {
        Ok(Some(default_role)) => {
            let link = user_role::ActiveModel {
                user_id: Set(account.id.clone()),
                role_id: Set(default_role.id),
            };
            if let Err(e) = user_role::Entity::insert(link).exec(resources.db.as_ref()).await {
                tracing::error!("Failed to attach default role: {}", e);
            }
        }
        Ok(None) => {
            tracing::warn!("Default 'user' role is missing; was bootstrap seeding run?");
        }
        Err(e) => {
            tracing::error!("Database error looking up default role: {}", e);
        }
    }

    let (ip, user_agent) = request_context(&headers);
    let ctx = SessionContext {
        client_id: None,
        ip_address: ip.clone(),
        user_agent: user_agent.clone(),
    };
    let (tokens, roles, permissions) = match issue_token_pair(&resources, &account, false, ctx).await
    {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    audit::record(
        resources.db.as_ref(),
        AuditEvent {
            ip_address: ip,
            user_agent,
            ..AuditEvent::success("auth.register").user(&account.id)
        },
    )
    .await;

    tracing::info!(user_id = %account.id, "User registered");

    (
        StatusCode::CREATED,
        Json(ApiResponse::ok(AuthPayload {
            user: UserDto::from_model(account, roles, permissions),
            tokens,
        })),
    )
        .into_response()
}

/// Trigger a password reset email.
#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/forgot-password",
    tag = AUTH_TAG,
    operation_id = "Forgot Password",
    summary = "Request a password reset email",
    description = "Sends a single-use reset link to the given address if an account exists.\n\n\
                   Always responds with success so the endpoint cannot be used to probe for \
                   registered addresses.",
    request_body(content = ForgotPasswordRequest, description = "Account email"),
    responses(
        (status = 200, description = "Reset email sent if the account exists"),
    )
)]
async fn forgot_password(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let email = payload.email.trim().to_lowercase();

    let response = Ok(Json(ApiResponse::message(
        "If an account exists for this address, a reset email has been sent.",
    )));

    let account = match user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(resources.db.as_ref())
        .await?
    {
        Some(u) if u.is_active => u,
        _ => return response,
    };

    let token = generate_opaque_token();
    let now = OffsetDateTime::now_utc();
    let lifetime = resources.config.security.reset_token_lifetime;

    let model = reset_token::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        user_id: Set(account.id.clone()),
        token_hash: Set(hash_opaque_token(&token)),
        expires_at: Set(now + time::Duration::seconds(lifetime)),
        used_at: Set(None),
        created_at: Set(now),
    };
    model.insert(resources.db.as_ref()).await?;

    let reset_url = format!(
        "{}/auth/reset-password?token={}",
        resources.config.frontend_url.trim_end_matches('/'),
        urlencoding::encode(&token)
    );

    if let Err(e) = send_reset_email(&resources, &account.email, &reset_url, lifetime / 60).await {
        // Still answer success; the user can retry
        tracing::error!("Failed to send password reset email: {}", e);
    } else {
        tracing::info!(user_id = %account.id, "Password reset email sent");
    }

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("auth.forgot_password").user(&account.id),
    )
    .await;

    response
}

async fn send_reset_email(
    resources: &AppResources,
    email: &str,
    reset_url: &str,
    expiry_minutes: i64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let template = PasswordResetEmailTemplate {
        reset_url: reset_url.to_string(),
        expiry_minutes,
    };

    let html_body = template.render_html()?;
    let text_body = template.render_text();

    let message = lettre::Message::builder()
        .from(resources.config.smtp.from.parse()?)
        .to(email.parse()?)
        .subject("Reset your password - CloseAuth")
        .header(lettre::message::header::MIME_VERSION_1_0)
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(lettre::message::header::ContentType::TEXT_PLAIN)
                        .body(text_body),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(lettre::message::header::ContentType::TEXT_HTML)
                        .body(html_body),
                ),
        )?;

    resources.mailer.send(message).await?;
    Ok(())
}

/// Consume a reset token and set a new password.
#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/reset-password",
    tag = AUTH_TAG,
    operation_id = "Reset Password",
    summary = "Set a new password using a reset token",
    description = "Consumes a single-use reset token from the reset email. On success all of the \
                   user's refresh sessions are revoked, forcing a fresh login everywhere.",
    request_body(content = ResetPasswordRequest, description = "Reset token and new password"),
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid or expired token, or weak password", body = ApiError),
    )
)]
async fn reset_password(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if payload.new_password.len() < 8 {
        return Err(ApiError::invalid_request(
            "Password must be at least 8 characters",
        ));
    }

    let token_row = reset_token::Entity::find()
        .filter(reset_token::Column::TokenHash.eq(hash_opaque_token(&payload.token)))
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::invalid_grant("Reset link is invalid or expired"))?;

    if !token_row.is_usable() {
        return Err(ApiError::invalid_grant("Reset link is invalid or expired"));
    }

    let account = user::Entity::find_by_id(&token_row.user_id)
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::invalid_grant("Reset link is invalid or expired"))?;

    let password_hash = hash_password(&payload.new_password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::server_error()
    })?;

    let now = OffsetDateTime::now_utc();
    let user_id = account.id.clone();

    let mut active: user::ActiveModel = account.into();
    active.password_hash = Set(password_hash);
    active.password_changed_at = Set(Some(now));
    active.failed_login_attempts = Set(0);
    active.locked_until = Set(None);
    active.updated_at = Set(now);
    active.update(resources.db.as_ref()).await?;

    let mut used: reset_token::ActiveModel = token_row.into();
    used.used_at = Set(Some(now));
    used.update(resources.db.as_ref()).await?;

    let revoked = sessions::revoke_user_sessions(resources.db.as_ref(), &user_id).await?;
    tracing::info!(user_id = %user_id, revoked_sessions = revoked, "Password reset completed");

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("auth.reset_password").user(&user_id),
    )
    .await;

    Ok(Json(ApiResponse::message(
        "Password updated. Please sign in with your new password.",
    )))
}

/// Rotate the refresh token.
#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/refresh",
    tag = AUTH_TAG,
    operation_id = "Refresh Tokens",
    summary = "Exchange a refresh token for a new token pair",
    description = "Rotates the refresh token: the presented token is invalidated and a replacement is \
                   returned together with a fresh access token. Presenting a rotated-out or revoked \
                   token fails with `invalid_grant`.",
    request_body(content = RefreshRequest, description = "Current refresh token"),
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<TokenDto>),
        (status = 400, description = "Unknown, expired or revoked refresh token", body = ApiError),
    )
)]
async fn refresh(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenDto>>, ApiError> {
    let session = sessions::find_by_token(resources.db.as_ref(), &payload.refresh_token)
        .await?
        .ok_or_else(|| ApiError::invalid_grant("Refresh token is invalid"))?;

    if session.is_revoked() {
        // A revoked token arriving here may be replay of stolen material
        tracing::warn!(session_id = %session.id, user_id = %session.user_id, "Revoked refresh token presented");
        audit::record(
            resources.db.as_ref(),
            AuditEvent::failure("auth.refresh", "revoked token presented").user(&session.user_id),
        )
        .await;
        return Err(ApiError::invalid_grant("Refresh token is invalid"));
    }
    if session.is_expired() {
        return Err(ApiError::invalid_grant("Refresh token has expired"));
    }

    let account = user::Entity::find_by_id(&session.user_id)
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::invalid_grant("Refresh token is invalid"))?;

    if !account.can_authenticate() {
        return Err(ApiError::invalid_grant("Account is locked or deactivated"));
    }

    let access = resolve_user_access(resources.db.as_ref(), &account.id).await?;
    let access_token = issue_access_token(
        &resources.config.security.jwt_secret,
        &resources.config.oauth2.issuer_url,
        resources.config.security.access_token_lifetime,
        &account.id,
        &account.email,
        access.roles,
        access.permissions,
        None,
    )
    .map_err(|e| {
        tracing::error!("Failed to issue access token: {}", e);
        ApiError::server_error()
    })?;

    let refresh_token = sessions::rotate_session(resources.db.as_ref(), session).await?;

    Ok(Json(ApiResponse::ok(TokenDto {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: resources.config.security.access_token_lifetime,
        scope: None,
    })))
}

/// Revoke the refresh session.
#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/logout",
    tag = AUTH_TAG,
    operation_id = "Logout",
    summary = "Revoke the current refresh session",
    description = "Invalidates the presented refresh token. Idempotent: succeeds even when the token \
                   is unknown or already revoked.",
    request_body(content = LogoutRequest, description = "Refresh token to revoke"),
    responses(
        (status = 200, description = "Session revoked"),
    )
)]
async fn logout(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<LogoutRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if let Some(refresh_token) = payload.refresh_token.as_deref()
        && let Some(session) = sessions::find_by_token(resources.db.as_ref(), refresh_token).await?
    {
        let user_id = session.user_id.clone();
        sessions::revoke_session(resources.db.as_ref(), session).await?;
        audit::record(
            resources.db.as_ref(),
            AuditEvent::success("auth.logout").user(&user_id),
        )
        .await;
        tracing::info!(user_id = %user_id, "User logged out");
    }

    Ok(Json(ApiResponse::message("Logged out.")))
}
