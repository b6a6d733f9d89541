//! RBAC configuration endpoints (`/api/roles`, `/api/permissions`).
//!
//! Roles aggregate permissions; system roles (seeded at startup) are
//! read-only. Guarded with `roles:read` / `roles:write`.

use crate::AppResources;
use crate::api::guard::{ApiError, AuthBearer};
use crate::audit::{self, AuditEvent};
use crate::auth::rbac::{replace_role_permissions, role_permissions};
use crate::entity::{permission, role, role_permission, user_role};
use crate::response::ApiResponse;
use axum::{Extension, Json, extract::Path, http::StatusCode};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// OpenAPI tag for RBAC endpoints.
pub const RBAC_TAG: &str = "RBAC";

/// Creates the roles router.
pub fn roles_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_roles, create_role))
        .routes(routes!(get_role, update_role, delete_role))
        .routes(routes!(update_role_permissions))
}

/// Creates the permissions router.
pub fn permissions_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_permissions, create_permission))
        .routes(routes!(delete_permission))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Permission payload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDto {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
}

impl From<permission::Model> for PermissionDto {
    fn from(model: permission::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            resource: model.resource,
            action: model.action,
        }
    }
}

/// Role payload with embedded permissions.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleDto {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub permissions: Vec<PermissionDto>,
    pub is_system: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRolePermissionsRequest {
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionRequest {
    /// Canonical `resource:action` name
    pub name: String,
    pub description: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_role_dto(resources: &AppResources, model: role::Model) -> Result<RoleDto, ApiError> {
    let permissions = role_permissions(resources.db.as_ref(), &model.id)
        .await?
        .into_iter()
        .map(PermissionDto::from)
        .collect();
    Ok(RoleDto {
        id: model.id,
        name: model.name,
        description: model.description,
        permissions,
        is_system: model.is_system,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

async fn find_role_or_404(resources: &AppResources, id: &str) -> Result<role::Model, ApiError> {
    role::Entity::find_by_id(id)
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Role not found"))
}

async fn check_permission_ids(
    resources: &AppResources,
    permission_ids: &[String],
) -> Result<(), ApiError> {
    for permission_id in permission_ids {
        if permission::Entity::find_by_id(permission_id)
            .one(resources.db.as_ref())
            .await?
            .is_none()
        {
            return Err(ApiError::invalid_request(format!(
                "Unknown permission: {permission_id}"
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Role Endpoints
// =============================================================================

/// List all roles.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "",
    tag = RBAC_TAG,
    operation_id = "List Roles",
    summary = "List all roles with their permissions",
    description = "**Required permission:** `roles:read`",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All roles", body = ApiResponse<Vec<RoleDto>>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
    )
)]
async fn list_roles(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
) -> Result<Json<ApiResponse<Vec<RoleDto>>>, ApiError> {
    auth.require("roles:read")?;

    let models = role::Entity::find()
        .order_by_asc(role::Column::Name)
        .all(resources.db.as_ref())
        .await?;

    let mut roles = Vec::with_capacity(models.len());
    for model in models {
        roles.push(load_role_dto(&resources, model).await?);
    }

    Ok(Json(ApiResponse::ok(roles)))
}

/// Create a role.
#[tracing::instrument(skip(resources, auth, payload), fields(name = %payload.name))]
#[utoipa::path(
    post,
    path = "",
    tag = RBAC_TAG,
    operation_id = "Create Role",
    summary = "Create a role",
    description = "**Required permission:** `roles:write`",
    security(("bearer_auth" = [])),
    request_body(content = CreateRoleRequest, description = "New role details"),
    responses(
        (status = 201, description = "Role created", body = ApiResponse<RoleDto>),
        (status = 400, description = "Invalid name or unknown permission", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 409, description = "Role name already exists", body = ApiError),
    )
)]
async fn create_role(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RoleDto>>), ApiError> {
    auth.require("roles:write")?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::invalid_request("Role name is required"));
    }

    let exists = role::Entity::find()
        .filter(role::Column::Name.eq(&name))
        .one(resources.db.as_ref())
        .await?
        .is_some();
    if exists {
        return Err(ApiError::conflict("A role with this name already exists"));
    }

    check_permission_ids(&resources, &payload.permission_ids).await?;

    let now = OffsetDateTime::now_utc();
    let model = role::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        name: Set(name),
        description: Set(payload.description.clone().filter(|s| !s.is_empty())),
        is_system: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let inserted = model.insert(resources.db.as_ref()).await?;

    if !payload.permission_ids.is_empty() {
        replace_role_permissions(resources.db.as_ref(), &inserted.id, &payload.permission_ids)
            .await?;
    }

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("role.create")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "role_id": inserted.id })),
    )
    .await;

    tracing::info!(role = %inserted.name, "Created role");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(load_role_dto(&resources, inserted).await?)),
    ))
}

/// Fetch a single role.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/{id}",
    tag = RBAC_TAG,
    operation_id = "Get Role",
    summary = "Fetch a role by id",
    description = "**Required permission:** `roles:read`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "The role", body = ApiResponse<RoleDto>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError),
    )
)]
async fn get_role(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RoleDto>>, ApiError> {
    auth.require("roles:read")?;
    let model = find_role_or_404(&resources, &id).await?;
    Ok(Json(ApiResponse::ok(load_role_dto(&resources, model).await?)))
}

/// Update a role's name/description.
#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    put,
    path = "/{id}",
    tag = RBAC_TAG,
    operation_id = "Update Role",
    summary = "Update a role",
    description = "System roles cannot be modified.\n\n**Required permission:** `roles:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Role id")),
    request_body(content = UpdateRoleRequest, description = "Fields to update"),
    responses(
        (status = 200, description = "Updated role", body = ApiResponse<RoleDto>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission or system role", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError),
        (status = 409, description = "Role name already exists", body = ApiError),
    )
)]
async fn update_role(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<RoleDto>>, ApiError> {
    auth.require("roles:write")?;
    let model = find_role_or_404(&resources, &id).await?;

    if model.is_system {
        return Err(ApiError::forbidden("System roles cannot be modified"));
    }

    let mut active: role::ActiveModel = model.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::invalid_request("Role name is required"));
        }
        let taken = role::Entity::find()
            .filter(role::Column::Name.eq(&name))
            .filter(role::Column::Id.ne(&id))
            .one(resources.db.as_ref())
            .await?
            .is_some();
        if taken {
            return Err(ApiError::conflict("A role with this name already exists"));
        }
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description).filter(|s| !s.is_empty()));
    }
    active.updated_at = Set(OffsetDateTime::now_utc());
    let updated = active.update(resources.db.as_ref()).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("role.update")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "role_id": id })),
    )
    .await;

    Ok(Json(ApiResponse::ok(load_role_dto(&resources, updated).await?)))
}

/// Delete a role.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = RBAC_TAG,
    operation_id = "Delete Role",
    summary = "Delete a role",
    description = "System roles and roles still assigned to users cannot be deleted.\n\n\
                   **Required permission:** `roles:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted"),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission or system role", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError),
        (status = 409, description = "Role still assigned to users", body = ApiError),
    )
)]
async fn delete_role(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    auth.require("roles:write")?;
    let model = find_role_or_404(&resources, &id).await?;

    if model.is_system {
        return Err(ApiError::forbidden("System roles cannot be deleted"));
    }

    let assigned = user_role::Entity::find()
        .filter(user_role::Column::RoleId.eq(&model.id))
        .one(resources.db.as_ref())
        .await?
        .is_some();
    if assigned {
        return Err(ApiError::conflict(
            "Role is still assigned to users and cannot be deleted",
        ));
    }

    role_permission::Entity::delete_many()
        .filter(role_permission::Column::RoleId.eq(&model.id))
        .exec(resources.db.as_ref())
        .await?;
    role::Entity::delete_by_id(&model.id)
        .exec(resources.db.as_ref())
        .await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("role.delete")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "role_id": id })),
    )
    .await;

    tracing::info!(role = %model.name, "Deleted role");
    Ok(Json(ApiResponse::message("Role deleted.")))
}

/// Replace a role's permission set.
#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    put,
    path = "/{id}/permissions",
    tag = RBAC_TAG,
    operation_id = "Update Role Permissions",
    summary = "Replace a role's permission set",
    description = "System roles cannot be modified.\n\n**Required permission:** `roles:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Role id")),
    request_body(content = UpdateRolePermissionsRequest, description = "Complete new permission id set"),
    responses(
        (status = 200, description = "Updated role", body = ApiResponse<RoleDto>),
        (status = 400, description = "Unknown permission id", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission or system role", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError),
    )
)]
async fn update_role_permissions(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRolePermissionsRequest>,
) -> Result<Json<ApiResponse<RoleDto>>, ApiError> {
    auth.require("roles:write")?;
    let model = find_role_or_404(&resources, &id).await?;

    if model.is_system {
        return Err(ApiError::forbidden("System roles cannot be modified"));
    }

    check_permission_ids(&resources, &payload.permission_ids).await?;
    replace_role_permissions(resources.db.as_ref(), &model.id, &payload.permission_ids).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("role.permissions_update")
            .user(&auth.user_id)
            .metadata(serde_json::json!({
                "role_id": id,
                "permission_ids": payload.permission_ids,
            })),
    )
    .await;

    Ok(Json(ApiResponse::ok(load_role_dto(&resources, model).await?)))
}

// =============================================================================
// Permission Endpoints
// =============================================================================

/// List all permissions.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "",
    tag = RBAC_TAG,
    operation_id = "List Permissions",
    summary = "List all permissions",
    description = "**Required permission:** `roles:read`",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All permissions", body = ApiResponse<Vec<PermissionDto>>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
    )
)]
async fn list_permissions(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
) -> Result<Json<ApiResponse<Vec<PermissionDto>>>, ApiError> {
    auth.require("roles:read")?;

    let permissions = permission::Entity::find()
        .order_by_asc(permission::Column::Name)
        .all(resources.db.as_ref())
        .await?
        .into_iter()
        .map(PermissionDto::from)
        .collect();

    Ok(Json(ApiResponse::ok(permissions)))
}

/// Create a permission.
#[tracing::instrument(skip(resources, auth, payload), fields(name = %payload.name))]
#[utoipa::path(
    post,
    path = "",
    tag = RBAC_TAG,
    operation_id = "Create Permission",
    summary = "Create a permission",
    description = "The name must have the `resource:action` form, e.g. `reports:read`.\n\n\
                   **Required permission:** `roles:write`",
    security(("bearer_auth" = [])),
    request_body(content = CreatePermissionRequest, description = "New permission details"),
    responses(
        (status = 201, description = "Permission created", body = ApiResponse<PermissionDto>),
        (status = 400, description = "Invalid permission name", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 409, description = "Permission already exists", body = ApiError),
    )
)]
async fn create_permission(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PermissionDto>>), ApiError> {
    auth.require("roles:write")?;

    let name = payload.name.trim().to_string();
    let Some((resource, action)) = name.split_once(':') else {
        return Err(ApiError::invalid_request(
            "Permission name must have the form resource:action",
        ));
    };
    if resource.is_empty() || action.is_empty() {
        return Err(ApiError::invalid_request(
            "Permission name must have the form resource:action",
        ));
    }

    let exists = permission::Entity::find()
        .filter(permission::Column::Name.eq(&name))
        .one(resources.db.as_ref())
        .await?
        .is_some();
    if exists {
        return Err(ApiError::conflict("Permission already exists"));
    }

    let model = permission::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        name: Set(name.clone()),
        description: Set(payload.description.clone().filter(|s| !s.is_empty())),
        resource: Set(resource.to_string()),
        action: Set(action.to_string()),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    let inserted = model.insert(resources.db.as_ref()).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("permission.create")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "permission": name })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(PermissionDto::from(inserted))),
    ))
}

/// Delete a permission.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = RBAC_TAG,
    operation_id = "Delete Permission",
    summary = "Delete a permission",
    description = "Also removes the permission from every role holding it.\n\n\
                   **Required permission:** `roles:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission deleted"),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "Permission not found", body = ApiError),
    )
)]
async fn delete_permission(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    auth.require("roles:write")?;

    let model = permission::Entity::find_by_id(&id)
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Permission not found"))?;

    role_permission::Entity::delete_many()
        .filter(role_permission::Column::PermissionId.eq(&model.id))
        .exec(resources.db.as_ref())
        .await?;
    permission::Entity::delete_by_id(&model.id)
        .exec(resources.db.as_ref())
        .await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("permission.delete")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "permission": model.name })),
    )
    .await;

    Ok(Json(ApiResponse::message("Permission deleted.")))
}
