//! User administration endpoints (`/api/users/*`).
//!
//! All endpoints require a Bearer access token and are RBAC-guarded with
//! `users:read` / `users:write` (`audit:read` for the activity feed).

use crate::AppResources;
use crate::api::guard::{ApiError, AuthBearer};
use crate::audit::{self, AuditEvent};
use crate::auth::password::{generate_temporary_password, hash_password};
use crate::auth::rbac::{replace_user_roles, resolve_user_access};
use crate::auth::sessions::revoke_user_sessions;
use crate::entity::{audit_log, role, user, user_role};
use crate::response::{ApiResponse, PageParams, Paginated, ValidationError};
use axum::{
    Extension, Json,
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

/// OpenAPI tag for user administration endpoints.
pub const USERS_TAG: &str = "User Administration";

/// Creates the user administration router.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_users, create_user))
        .routes(routes!(get_user, update_user, delete_user))
        .routes(routes!(update_user_roles))
        .routes(routes!(update_user_status))
        .routes(routes!(admin_reset_password))
        .routes(routes!(user_activity))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// User payload returned by the API.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub is_active: bool,
    pub is_email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserDto {
    pub fn from_model(model: user::Model, roles: Vec<String>, permissions: Vec<String>) -> Self {
        Self {
            id: model.id,
            email: model.email,
            username: model.username,
            first_name: model.first_name,
            last_name: model.last_name,
            roles,
            permissions,
            is_active: model.is_active,
            is_email_verified: model.email_verified,
            last_login_at: model.last_login_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserListParams {
    /// Matches email, username, first or last name
    pub search: Option<String>,
    /// Filter by role name
    pub role: Option<String>,
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size, capped at 100
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// When omitted, a temporary password is generated and returned once
    pub password: Option<String>,
    #[serde(default)]
    pub role_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRolesRequest {
    pub role_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

/// Payload for admin-created users.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUserPayload {
    pub user: UserDto,
    /// Present only when the server generated the password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
}

/// Payload for admin password resets.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryPasswordPayload {
    pub temporary_password: String,
}

/// A single audit log entry.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryDto {
    pub id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
}

impl From<audit_log::Model> for AuditEntryDto {
    fn from(entry: audit_log::Model) -> Self {
        Self {
            id: entry.id,
            action: entry.action,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            metadata: entry
                .metadata
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok()),
            success: entry.success,
            error_message: entry.error_message,
            created_at: entry.created_at,
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_user_dto(
    resources: &AppResources,
    account: user::Model,
) -> Result<UserDto, ApiError> {
    let access = resolve_user_access(resources.db.as_ref(), &account.id).await?;
    Ok(UserDto::from_model(account, access.roles, access.permissions))
}

async fn find_user_or_404(
    resources: &AppResources,
    id: &str,
) -> Result<user::Model, ApiError> {
    user::Entity::find_by_id(id)
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

// =============================================================================
// Endpoints
// =============================================================================

/// Paginated user listing.
#[tracing::instrument(skip(resources, auth), fields(admin = %auth.email))]
#[utoipa::path(
    get,
    path = "",
    tag = USERS_TAG,
    operation_id = "List Users",
    summary = "List users with pagination and filtering",
    description = "Returns a paginated user listing. `search` matches email, username, first and last \
                   name; `role` filters by role name.\n\n\
                   **Required permission:** `users:read`",
    security(("bearer_auth" = [])),
    params(UserListParams),
    responses(
        (status = 200, description = "Paginated users", body = ApiResponse<Paginated<UserDto>>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
    )
)]
async fn list_users(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Query(params): Query<UserListParams>,
) -> Result<Json<ApiResponse<Paginated<UserDto>>>, ApiError> {
    auth.require("users:read")?;

    let page_params = PageParams {
        page: params.page,
        limit: params.limit,
    };
    let (page, limit) = page_params.normalize();

    let mut query = user::Entity::find().order_by_asc(user::Column::Email);

    if let Some(search) = params.search.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter(
            Condition::any()
                .add(user::Column::Email.contains(search))
                .add(user::Column::Username.contains(search))
                .add(user::Column::FirstName.contains(search))
                .add(user::Column::LastName.contains(search)),
        );
    }

    if let Some(role_name) = params.role.as_deref().filter(|s| !s.is_empty()) {
        let role_row = role::Entity::find()
            .filter(role::Column::Name.eq(role_name))
            .one(resources.db.as_ref())
            .await?;
        let user_ids: Vec<String> = match role_row {
            Some(r) => user_role::Entity::find()
                .filter(user_role::Column::RoleId.eq(r.id))
                .all(resources.db.as_ref())
                .await?
                .into_iter()
                .map(|ur| ur.user_id)
                .collect(),
            None => Vec::new(),
        };
        query = query.filter(user::Column::Id.is_in(user_ids));
    }

    let paginator = query.paginate(resources.db.as_ref(), limit);
    let total = paginator.num_items().await?;
    let models = paginator.fetch_page(page - 1).await?;

    let mut items = Vec::with_capacity(models.len());
    for model in models {
        items.push(load_user_dto(&resources, model).await?);
    }

    Ok(Json(ApiResponse::ok(Paginated::new(
        items, total, page, limit,
    ))))
}

/// Admin user creation.
#[tracing::instrument(skip(resources, auth, payload), fields(admin = %auth.email, email = %payload.email))]
#[utoipa::path(
    post,
    path = "",
    tag = USERS_TAG,
    operation_id = "Create User",
    summary = "Create a user account",
    description = "Creates an account with the given role set. When no password is supplied, a \
                   temporary one is generated and included **once** in the response.\n\n\
                   **Required permission:** `users:write`",
    security(("bearer_auth" = [])),
    request_body(content = CreateUserRequest, description = "New user details"),
    responses(
        (status = 201, description = "User created", body = ApiResponse<CreatedUserPayload>),
        (status = 400, description = "Validation failed: field errors in the envelope"),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
    )
)]
async fn create_user(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<CreateUserRequest>,
) -> Response {
    if let Err(e) = auth.require("users:write") {
        return e.into_response();
    }

    let email = payload.email.trim().to_lowercase();
    let mut errors: Vec<ValidationError> = Vec::new();
    if email.is_empty() || !email.contains('@') {
        errors.push(ValidationError::new("email", "A valid email is required"));
    }
    if let Some(password) = payload.password.as_deref()
        && password.len() < 8
    {
        errors.push(ValidationError::new(
            "password",
            "Password must be at least 8 characters",
        ));
    }

    if errors.is_empty() {
        match user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .one(resources.db.as_ref())
            .await
        {
            Ok(Some(_)) => errors.push(ValidationError::new(
                "email",
                "An account with this email already exists",
            )),
            Ok(None) => {}
            Err(e) => return ApiError::from(e).into_response(),
        }
    }

    // Role ids must all exist before we touch anything
    for role_id in &payload.role_ids {
        match role::Entity::find_by_id(role_id).one(resources.db.as_ref()).await {
            Ok(Some(_)) => {}
            Ok(None) => errors.push(ValidationError::new("roleIds", format!("Unknown role: {role_id}"))),
            Err(e) => return ApiError::from(e).into_response(),
        }
    }

    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::invalid("Validation failed", errors)),
        )
            .into_response();
    }

    let (password, temporary_password) = match payload.password {
        Some(p) => (p, None),
        None => {
            let generated = generate_temporary_password();
            (generated.clone(), Some(generated))
        }
    };
    let password_hash = match hash_password(&password) {
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
        is_active: Set(payload.is_active),
        email_verified: Set(false),
        failed_login_attempts: Set(0),
        locked_until: Set(None),
        // Temporary passwords are flagged as never-changed
        password_changed_at: Set(temporary_password.is_none().then_some(now)),
        last_login_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let account = match model.insert(resources.db.as_ref()).await {
        Ok(u) => u,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if !payload.role_ids.is_empty()
        && let Err(e) = replace_user_roles(resources.db.as_ref(), &account.id, &payload.role_ids).await
    {
        return ApiError::from(e).into_response();
    }

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("user.create")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "target_user_id": account.id })),
    )
    .await;

    let user_dto = match load_user_dto(&resources, account).await {
        Ok(dto) => dto,
        Err(e) => return e.into_response(),
    };

    tracing::info!(user_id = %user_dto.id, "Admin created user");

    (
        StatusCode::CREATED,
        Json(ApiResponse::ok(CreatedUserPayload {
            user: user_dto,
            temporary_password,
        })),
    )
        .into_response()
}

/// Fetch a single user.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/{id}",
    tag = USERS_TAG,
    operation_id = "Get User",
    summary = "Fetch a user by id",
    description = "**Required permission:** `users:read`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "The user", body = ApiResponse<UserDto>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
    )
)]
async fn get_user(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    auth.require("users:read")?;
    let account = find_user_or_404(&resources, &id).await?;
    Ok(Json(ApiResponse::ok(load_user_dto(&resources, account).await?)))
}

/// Update profile fields.
#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    put,
    path = "/{id}",
    tag = USERS_TAG,
    operation_id = "Update User",
    summary = "Update a user's profile fields",
    description = "Updates email, username and name fields. Role and status changes have their own \
                   endpoints.\n\n**Required permission:** `users:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id")),
    request_body(content = UpdateUserRequest, description = "Fields to update"),
    responses(
        (status = 200, description = "Updated user", body = ApiResponse<UserDto>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 409, description = "Email or username already in use", body = ApiError),
    )
)]
async fn update_user(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    auth.require("users:write")?;
    let account = find_user_or_404(&resources, &id).await?;

    let mut active: user::ActiveModel = account.into();

    if let Some(email) = payload.email {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::invalid_request("A valid email is required"));
        }
        let taken = user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .filter(user::Column::Id.ne(&id))
            .one(resources.db.as_ref())
            .await?
            .is_some();
        if taken {
            return Err(ApiError::conflict("Email already in use"));
        }
        active.email = Set(email);
    }

    if let Some(username) = payload.username {
        let username = username.trim().to_string();
        if username.is_empty() {
            active.username = Set(None);
        } else {
            let taken = user::Entity::find()
                .filter(user::Column::Username.eq(&username))
                .filter(user::Column::Id.ne(&id))
                .one(resources.db.as_ref())
                .await?
                .is_some();
            if taken {
                return Err(ApiError::conflict("Username already in use"));
            }
            active.username = Set(Some(username));
        }
    }

    if let Some(first_name) = payload.first_name {
        active.first_name = Set(Some(first_name).filter(|s| !s.is_empty()));
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(Some(last_name).filter(|s| !s.is_empty()));
    }
    active.updated_at = Set(OffsetDateTime::now_utc());

    let updated = active.update(resources.db.as_ref()).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("user.update")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "target_user_id": id })),
    )
    .await;

    Ok(Json(ApiResponse::ok(load_user_dto(&resources, updated).await?)))
}

/// Delete a user.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = USERS_TAG,
    operation_id = "Delete User",
    summary = "Delete a user account",
    description = "Deletes the account, its role assignments and refresh sessions. You cannot delete \
                   your own account.\n\n**Required permission:** `users:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission or self-deletion", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
    )
)]
async fn delete_user(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    auth.require("users:write")?;

    if id == auth.user_id {
        return Err(ApiError::forbidden("You cannot delete your own account"));
    }

    let account = find_user_or_404(&resources, &id).await?;

    revoke_user_sessions(resources.db.as_ref(), &account.id).await?;
    user_role::Entity::delete_many()
        .filter(user_role::Column::UserId.eq(&account.id))
        .exec(resources.db.as_ref())
        .await?;
    user::Entity::delete_by_id(&account.id)
        .exec(resources.db.as_ref())
        .await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("user.delete")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "target_user_id": id })),
    )
    .await;

    tracing::info!(user_id = %id, "Admin deleted user");
    Ok(Json(ApiResponse::message("User deleted.")))
}

/// Replace a user's role set.
#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    put,
    path = "/{id}/roles",
    tag = USERS_TAG,
    operation_id = "Update User Roles",
    summary = "Replace a user's role assignments",
    description = "**Required permission:** `users:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id")),
    request_body(content = UpdateRolesRequest, description = "Complete new role id set"),
    responses(
        (status = 200, description = "Updated user", body = ApiResponse<UserDto>),
        (status = 400, description = "Unknown role id", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
    )
)]
async fn update_user_roles(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRolesRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    auth.require("users:write")?;
    let account = find_user_or_404(&resources, &id).await?;

    for role_id in &payload.role_ids {
        if role::Entity::find_by_id(role_id)
            .one(resources.db.as_ref())
            .await?
            .is_none()
        {
            return Err(ApiError::invalid_request(format!("Unknown role: {role_id}")));
        }
    }

    replace_user_roles(resources.db.as_ref(), &account.id, &payload.role_ids).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("user.roles_update")
            .user(&auth.user_id)
            .metadata(serde_json::json!({
                "target_user_id": id,
                "role_ids": payload.role_ids,
            })),
    )
    .await;

    Ok(Json(ApiResponse::ok(load_user_dto(&resources, account).await?)))
}

/// Enable or disable an account.
#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tag = USERS_TAG,
    operation_id = "Update User Status",
    summary = "Enable or disable a user account",
    description = "Deactivation revokes every refresh session the user holds. You cannot deactivate \
                   your own account.\n\n**Required permission:** `users:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id")),
    request_body(content = UpdateStatusRequest, description = "New status"),
    responses(
        (status = 200, description = "Updated user", body = ApiResponse<UserDto>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission or self-deactivation", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
    )
)]
async fn update_user_status(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    auth.require("users:write")?;

    if id == auth.user_id && !payload.is_active {
        return Err(ApiError::forbidden("You cannot deactivate your own account"));
    }

    let account = find_user_or_404(&resources, &id).await?;
    let mut active: user::ActiveModel = account.into();
    active.is_active = Set(payload.is_active);
    active.updated_at = Set(OffsetDateTime::now_utc());
    let updated = active.update(resources.db.as_ref()).await?;

    if !payload.is_active {
        let revoked = revoke_user_sessions(resources.db.as_ref(), &updated.id).await?;
        tracing::info!(user_id = %id, revoked_sessions = revoked, "Account deactivated");
    }

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("user.status_update")
            .user(&auth.user_id)
            .metadata(serde_json::json!({
                "target_user_id": id,
                "is_active": payload.is_active,
            })),
    )
    .await;

    Ok(Json(ApiResponse::ok(load_user_dto(&resources, updated).await?)))
}

/// Admin-initiated password reset.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    post,
    path = "/{id}/reset-password",
    tag = USERS_TAG,
    operation_id = "Admin Reset Password",
    summary = "Reset a user's password to a temporary one",
    description = "Generates a temporary password, returned **once** in the response, and revokes the \
                   user's refresh sessions.\n\n**Required permission:** `users:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Temporary password issued", body = ApiResponse<TemporaryPasswordPayload>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
    )
)]
async fn admin_reset_password(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TemporaryPasswordPayload>>, ApiError> {
    auth.require("users:write")?;
    let account = find_user_or_404(&resources, &id).await?;

    let temporary_password = generate_temporary_password();
    let password_hash = hash_password(&temporary_password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::server_error()
    })?;

    let user_id = account.id.clone();
    let mut active: user::ActiveModel = account.into();
    active.password_hash = Set(password_hash);
    active.password_changed_at = Set(None);
    active.failed_login_attempts = Set(0);
    active.locked_until = Set(None);
    active.updated_at = Set(OffsetDateTime::now_utc());
    active.update(resources.db.as_ref()).await?;

    revoke_user_sessions(resources.db.as_ref(), &user_id).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("user.password_reset")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "target_user_id": user_id })),
    )
    .await;

    tracing::info!(user_id = %user_id, "Admin reset user password");

    Ok(Json(ApiResponse::ok(TemporaryPasswordPayload {
        temporary_password,
    })))
}

/// Paginated audit feed for a user.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/{id}/activity",
    tag = USERS_TAG,
    operation_id = "User Activity",
    summary = "List a user's audit log entries",
    description = "Newest first.\n\n**Required permission:** `audit:read`",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "User id"),
        PageParams,
    ),
    responses(
        (status = 200, description = "Paginated audit entries", body = ApiResponse<Paginated<AuditEntryDto>>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
    )
)]
async fn user_activity(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
    Query(page_params): Query<PageParams>,
) -> Result<Json<ApiResponse<Paginated<AuditEntryDto>>>, ApiError> {
    auth.require("audit:read")?;
    find_user_or_404(&resources, &id).await?;

    let (page, limit) = page_params.normalize();

    let paginator = audit_log::Entity::find()
        .filter(audit_log::Column::UserId.eq(&id))
        .order_by_desc(audit_log::Column::CreatedAt)
        .paginate(resources.db.as_ref(), limit);
    let total = paginator.num_items().await?;
    let items: Vec<AuditEntryDto> = paginator
        .fetch_page(page - 1)
        .await?
        .into_iter()
        .map(AuditEntryDto::from)
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(
        items, total, page, limit,
    ))))
}
