//! OAuth2 client management endpoints (`/api/clients/*`).
//!
//! Client CRUD, secret rotation and usage statistics. Secrets are generated
//! server-side, stored as SHA-256 digests, and returned exactly once.

use crate::AppResources;
use crate::api::guard::{ApiError, AuthBearer};
use crate::audit::{self, AuditEvent};
use crate::auth::password::{generate_opaque_token, hash_opaque_token};
use crate::entity::{authorization_code, client, client_branding, consent, session};
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

/// OpenAPI tag for client management endpoints.
pub const CLIENTS_TAG: &str = "Client Management";

/// Grant types the server understands.
pub const SUPPORTED_GRANT_TYPES: &[&str] = &[
    "authorization_code",
    "client_credentials",
    "refresh_token",
    "password",
];

/// Creates the client management router.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_clients, create_client))
        .routes(routes!(get_client, update_client, delete_client))
        .routes(routes!(rotate_secret))
        .routes(routes!(client_stats))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Per-client branding payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrandingDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_css: Option<String>,
}

impl From<client_branding::Model> for BrandingDto {
    fn from(model: client_branding::Model) -> Self {
        Self {
            logo_url: model.logo_url,
            primary_color: model.primary_color,
            secondary_color: model.secondary_color,
            background_color: model.background_color,
            text_color: model.text_color,
            company_name: model.company_name,
            privacy_policy_url: model.privacy_policy_url,
            terms_of_service_url: model.terms_of_service_url,
            custom_css: model.custom_css,
        }
    }
}

/// Client payload returned by the API. The secret only appears in the
/// response that created or rotated it.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientDto {
    pub id: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_grant_types: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub access_token_ttl: i64,
    pub refresh_token_ttl: i64,
    pub is_public: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branding: Option<BrandingDto>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ClientDto {
    fn from_model(model: client::Model, branding: Option<client_branding::Model>) -> Self {
        Self {
            redirect_uris: model.redirect_uris_list(),
            allowed_grant_types: model.grant_types_list(),
            allowed_scopes: model.scopes_list(),
            id: model.id,
            client_id: model.client_id,
            client_secret: None,
            name: model.name,
            description: model.description,
            access_token_ttl: model.access_token_ttl,
            refresh_token_ttl: model.refresh_token_ttl,
            is_public: model.is_public,
            is_active: model.is_active,
            branding: branding.map(BrandingDto::from),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ClientListParams {
    /// Matches client name or client_id
    pub search: Option<String>,
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size, capped at 100
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub name: String,
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_grant_types: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub access_token_ttl: Option<i64>,
    pub refresh_token_ttl: Option<i64>,
    /// Public clients get no secret and must use PKCE
    #[serde(default)]
    pub is_public: bool,
    pub branding: Option<BrandingDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub allowed_grant_types: Option<Vec<String>>,
    pub allowed_scopes: Option<Vec<String>>,
    pub access_token_ttl: Option<i64>,
    pub refresh_token_ttl: Option<i64>,
    pub is_active: Option<bool>,
    pub branding: Option<BrandingDto>,
}

/// Payload for secret rotation.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecretPayload {
    pub client_secret: String,
}

/// Usage statistics for a client.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatsDto {
    pub active_sessions: u64,
    pub consented_users: u64,
    pub total_authorizations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<OffsetDateTime>,
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_client_fields(
    name: Option<&str>,
    redirect_uris: Option<&[String]>,
    grant_types: Option<&[String]>,
    scopes: Option<&[String]>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(name) = name
        && name.trim().is_empty()
    {
        errors.push(ValidationError::new("name", "Client name is required"));
    }

    if let Some(uris) = redirect_uris {
        if uris.is_empty() {
            errors.push(ValidationError::new(
                "redirectUris",
                "At least one redirect URI is required",
            ));
        }
        for uri in uris {
            match url::Url::parse(uri) {
                Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
                _ => errors.push(ValidationError::new(
                    "redirectUris",
                    format!("Invalid redirect URI: {uri}"),
                )),
            }
        }
    }

    if let Some(grants) = grant_types {
        if grants.is_empty() {
            errors.push(ValidationError::new(
                "allowedGrantTypes",
                "At least one grant type is required",
            ));
        }
        for grant in grants {
            if !SUPPORTED_GRANT_TYPES.contains(&grant.as_str()) {
                errors.push(ValidationError::new(
                    "allowedGrantTypes",
                    format!("Unsupported grant type: {grant}"),
                ));
            }
        }
    }

    if let Some(scopes) = scopes {
        if scopes.is_empty() {
            errors.push(ValidationError::new(
                "allowedScopes",
                "At least one scope is required",
            ));
        }
        for scope in scopes {
            let valid = !scope.is_empty()
                && scope
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-'));
            if !valid {
                errors.push(ValidationError::new(
                    "allowedScopes",
                    format!("Invalid scope: {scope}"),
                ));
            }
        }
    }

    errors
}

async fn find_client_or_404(
    resources: &AppResources,
    id: &str,
) -> Result<client::Model, ApiError> {
    client::Entity::find_by_id(id)
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found"))
}

async fn load_branding(
    resources: &AppResources,
    client_row_id: &str,
) -> Result<Option<client_branding::Model>, ApiError> {
    Ok(client_branding::Entity::find_by_id(client_row_id)
        .one(resources.db.as_ref())
        .await?)
}

/// Insert or update the branding row for a client.
async fn upsert_branding(
    resources: &AppResources,
    client_row_id: &str,
    branding: BrandingDto,
) -> Result<(), ApiError> {
    let now = OffsetDateTime::now_utc();
    let existing = client_branding::Entity::find_by_id(client_row_id)
        .one(resources.db.as_ref())
        .await?;

    let model = client_branding::ActiveModel {
        client_id: Set(client_row_id.to_string()),
        logo_url: Set(branding.logo_url),
        primary_color: Set(branding.primary_color),
        secondary_color: Set(branding.secondary_color),
        background_color: Set(branding.background_color),
        text_color: Set(branding.text_color),
        company_name: Set(branding.company_name),
        privacy_policy_url: Set(branding.privacy_policy_url),
        terms_of_service_url: Set(branding.terms_of_service_url),
        custom_css: Set(branding.custom_css),
        updated_at: Set(now),
    };

    if existing.is_some() {
        model.update(resources.db.as_ref()).await?;
    } else {
        model.insert(resources.db.as_ref()).await?;
    }
    Ok(())
}

// =============================================================================
// Endpoints
// =============================================================================

/// Paginated client listing.
#[tracing::instrument(skip(resources, auth), fields(admin = %auth.email))]
#[utoipa::path(
    get,
    path = "",
    tag = CLIENTS_TAG,
    operation_id = "List Clients",
    summary = "List OAuth2 clients with pagination",
    description = "`search` matches client name and client_id.\n\n\
                   **Required permission:** `clients:read`",
    security(("bearer_auth" = [])),
    params(ClientListParams),
    responses(
        (status = 200, description = "Paginated clients", body = ApiResponse<Paginated<ClientDto>>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
    )
)]
async fn list_clients(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Query(params): Query<ClientListParams>,
) -> Result<Json<ApiResponse<Paginated<ClientDto>>>, ApiError> {
    auth.require("clients:read")?;

    let page_params = PageParams {
        page: params.page,
        limit: params.limit,
    };
    let (page, limit) = page_params.normalize();

    let mut query = client::Entity::find().order_by_asc(client::Column::Name);
    if let Some(search) = params.search.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter(
            Condition::any()
                .add(client::Column::Name.contains(search))
                .add(client::Column::ClientId.contains(search)),
        );
    }

    let paginator = query.paginate(resources.db.as_ref(), limit);
    let total = paginator.num_items().await?;
    let models = paginator.fetch_page(page - 1).await?;

    let mut items = Vec::with_capacity(models.len());
    for model in models {
        let branding = load_branding(&resources, &model.id).await?;
        items.push(ClientDto::from_model(model, branding));
    }

    Ok(Json(ApiResponse::ok(Paginated::new(
        items, total, page, limit,
    ))))
}

/// Register a new client.
#[tracing::instrument(skip(resources, auth, payload), fields(admin = %auth.email, name = %payload.name))]
#[utoipa::path(
    post,
    path = "",
    tag = CLIENTS_TAG,
    operation_id = "Create Client",
    summary = "Register a new OAuth2 client",
    description = "The server generates the `client_id` and, for confidential clients, a secret that is \
                   returned **only** in this response. Public clients receive no secret and must use \
                   PKCE.\n\n**Required permission:** `clients:write`",
    security(("bearer_auth" = [])),
    request_body(content = CreateClientRequest, description = "New client details"),
    responses(
        (status = 201, description = "Client registered", body = ApiResponse<ClientDto>),
        (status = 400, description = "Validation failed: field errors in the envelope"),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
    )
)]
async fn create_client(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<CreateClientRequest>,
) -> Response {
    if let Err(e) = auth.require("clients:write") {
        return e.into_response();
    }

    let errors = validate_client_fields(
        Some(&payload.name),
        Some(&payload.redirect_uris),
        Some(&payload.allowed_grant_types),
        Some(&payload.allowed_scopes),
    );
    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::invalid("Validation failed", errors)),
        )
            .into_response();
    }

    let client_id = format!("ca_{}", uuid::Uuid::new_v4().simple());
    let secret = (!payload.is_public).then(generate_opaque_token);

    let now = OffsetDateTime::now_utc();
    let model = client::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        client_id: Set(client_id),
        secret_hash: Set(secret.as_deref().map(hash_opaque_token)),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description.clone().filter(|s| !s.is_empty())),
        redirect_uris: Set(serde_json::to_string(&payload.redirect_uris).unwrap_or_default()),
        grant_types: Set(payload.allowed_grant_types.join(" ")),
        scopes: Set(payload.allowed_scopes.join(" ")),
        access_token_ttl: Set(payload
            .access_token_ttl
            .unwrap_or(resources.config.security.access_token_lifetime)),
        refresh_token_ttl: Set(payload
            .refresh_token_ttl
            .unwrap_or(resources.config.security.refresh_token_lifetime)),
        is_public: Set(payload.is_public),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let inserted = match model.insert(resources.db.as_ref()).await {
        Ok(c) => c,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if let Some(branding) = payload.branding
        && let Err(e) = upsert_branding(&resources, &inserted.id, branding).await
    {
        return e.into_response();
    }

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("client.create")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "client_id": inserted.client_id })),
    )
    .await;

    tracing::info!(client_id = %inserted.client_id, "Registered OAuth2 client");

    let branding = match load_branding(&resources, &inserted.id).await {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let mut dto = ClientDto::from_model(inserted, branding);
    dto.client_secret = secret;

    (StatusCode::CREATED, Json(ApiResponse::ok(dto))).into_response()
}

/// Fetch a single client.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/{id}",
    tag = CLIENTS_TAG,
    operation_id = "Get Client",
    summary = "Fetch a client by id",
    description = "The stored secret is never returned.\n\n**Required permission:** `clients:read`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Client row id")),
    responses(
        (status = 200, description = "The client", body = ApiResponse<ClientDto>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "Client not found", body = ApiError),
    )
)]
async fn get_client(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ClientDto>>, ApiError> {
    auth.require("clients:read")?;
    let model = find_client_or_404(&resources, &id).await?;
    let branding = load_branding(&resources, &model.id).await?;
    Ok(Json(ApiResponse::ok(ClientDto::from_model(model, branding))))
}

/// Update a client.
#[tracing::instrument(skip(resources, auth, payload))]
#[utoipa::path(
    put,
    path = "/{id}",
    tag = CLIENTS_TAG,
    operation_id = "Update Client",
    summary = "Update an OAuth2 client",
    description = "The `client_id` and confidential/public standing are fixed at registration.\n\n\
                   **Required permission:** `clients:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Client row id")),
    request_body(content = UpdateClientRequest, description = "Fields to update"),
    responses(
        (status = 200, description = "Updated client", body = ApiResponse<ClientDto>),
        (status = 400, description = "Validation failed: field errors in the envelope"),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "Client not found", body = ApiError),
    )
)]
async fn update_client(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
    Json(payload): Json<UpdateClientRequest>,
) -> Response {
    if let Err(e) = auth.require("clients:write") {
        return e.into_response();
    }

    let model = match find_client_or_404(&resources, &id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let errors = validate_client_fields(
        payload.name.as_deref(),
        payload.redirect_uris.as_deref(),
        payload.allowed_grant_types.as_deref(),
        payload.allowed_scopes.as_deref(),
    );
    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::invalid("Validation failed", errors)),
        )
            .into_response();
    }

    let row_id = model.id.clone();
    let mut active: client::ActiveModel = model.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description).filter(|s| !s.is_empty()));
    }
    if let Some(uris) = payload.redirect_uris {
        active.redirect_uris = Set(serde_json::to_string(&uris).unwrap_or_default());
    }
    if let Some(grants) = payload.allowed_grant_types {
        active.grant_types = Set(grants.join(" "));
    }
    if let Some(scopes) = payload.allowed_scopes {
        active.scopes = Set(scopes.join(" "));
    }
    if let Some(ttl) = payload.access_token_ttl {
        active.access_token_ttl = Set(ttl);
    }
    if let Some(ttl) = payload.refresh_token_ttl {
        active.refresh_token_ttl = Set(ttl);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(OffsetDateTime::now_utc());

    let updated = match active.update(resources.db.as_ref()).await {
        Ok(c) => c,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if let Some(branding) = payload.branding
        && let Err(e) = upsert_branding(&resources, &row_id, branding).await
    {
        return e.into_response();
    }

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("client.update")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "client_id": updated.client_id })),
    )
    .await;

    let branding = match load_branding(&resources, &updated.id).await {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    Json(ApiResponse::ok(ClientDto::from_model(updated, branding))).into_response()
}

/// Delete a client and its dependent rows.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = CLIENTS_TAG,
    operation_id = "Delete Client",
    summary = "Delete an OAuth2 client",
    description = "Cascades branding, consents, authorization codes and sessions issued for the \
                   client.\n\n**Required permission:** `clients:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Client row id")),
    responses(
        (status = 200, description = "Client deleted"),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "Client not found", body = ApiError),
    )
)]
async fn delete_client(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    auth.require("clients:write")?;
    let model = find_client_or_404(&resources, &id).await?;
    let db = resources.db.as_ref();

    client_branding::Entity::delete_many()
        .filter(client_branding::Column::ClientId.eq(&model.id))
        .exec(db)
        .await?;
    consent::Entity::delete_many()
        .filter(consent::Column::ClientId.eq(&model.client_id))
        .exec(db)
        .await?;
    authorization_code::Entity::delete_many()
        .filter(authorization_code::Column::ClientId.eq(&model.client_id))
        .exec(db)
        .await?;
    session::Entity::delete_many()
        .filter(session::Column::ClientId.eq(&model.client_id))
        .exec(db)
        .await?;
    client::Entity::delete_by_id(&model.id).exec(db).await?;

    audit::record(
        db,
        AuditEvent::success("client.delete")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "client_id": model.client_id })),
    )
    .await;

    tracing::info!(client_id = %model.client_id, "Deleted OAuth2 client");
    Ok(Json(ApiResponse::message("Client deleted.")))
}

/// Rotate the client secret.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    post,
    path = "/{id}/secret",
    tag = CLIENTS_TAG,
    operation_id = "Rotate Client Secret",
    summary = "Generate a new client secret",
    description = "Replaces the stored secret digest. The new secret is returned **only** in this \
                   response. Rejected for public clients.\n\n**Required permission:** `clients:write`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Client row id")),
    responses(
        (status = 200, description = "New secret issued", body = ApiResponse<ClientSecretPayload>),
        (status = 400, description = "Client is public", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "Client not found", body = ApiError),
    )
)]
async fn rotate_secret(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ClientSecretPayload>>, ApiError> {
    auth.require("clients:write")?;
    let model = find_client_or_404(&resources, &id).await?;

    if model.is_public {
        return Err(ApiError::invalid_request(
            "Public clients have no secret to rotate",
        ));
    }

    let secret = generate_opaque_token();
    let client_id = model.client_id.clone();
    let mut active: client::ActiveModel = model.into();
    active.secret_hash = Set(Some(hash_opaque_token(&secret)));
    active.updated_at = Set(OffsetDateTime::now_utc());
    active.update(resources.db.as_ref()).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("client.secret_rotate")
            .user(&auth.user_id)
            .metadata(serde_json::json!({ "client_id": client_id })),
    )
    .await;

    tracing::info!(client_id = %client_id, "Rotated client secret");

    Ok(Json(ApiResponse::ok(ClientSecretPayload {
        client_secret: secret,
    })))
}

/// Usage statistics.
#[tracing::instrument(skip(resources, auth))]
#[utoipa::path(
    get,
    path = "/{id}/stats",
    tag = CLIENTS_TAG,
    operation_id = "Client Stats",
    summary = "Usage statistics for a client",
    description = "Counts live sessions, consenting users and total authorization grants.\n\n\
                   **Required permission:** `clients:read`",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Client row id")),
    responses(
        (status = 200, description = "Client statistics", body = ApiResponse<ClientStatsDto>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Missing required permission", body = ApiError),
        (status = 404, description = "Client not found", body = ApiError),
    )
)]
async fn client_stats(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ClientStatsDto>>, ApiError> {
    auth.require("clients:read")?;
    let model = find_client_or_404(&resources, &id).await?;
    let db = resources.db.as_ref();
    let now = OffsetDateTime::now_utc();

    let active_sessions = session::Entity::find()
        .filter(session::Column::ClientId.eq(&model.client_id))
        .filter(session::Column::RevokedAt.is_null())
        .filter(session::Column::ExpiresAt.gt(now))
        .count(db)
        .await?;

    let consented_users = consent::Entity::find()
        .filter(consent::Column::ClientId.eq(&model.client_id))
        .count(db)
        .await?;

    let total_authorizations = crate::entity::audit_log::Entity::find()
        .filter(crate::entity::audit_log::Column::Action.eq("oauth2.code_issued"))
        .filter(crate::entity::audit_log::Column::Metadata.contains(&model.client_id))
        .count(db)
        .await?;

    let last_used_at = consent::Entity::find()
        .filter(consent::Column::ClientId.eq(&model.client_id))
        .order_by_desc(consent::Column::UpdatedAt)
        .one(db)
        .await?
        .map(|c| c.updated_at);

    Ok(Json(ApiResponse::ok(ClientStatsDto {
        active_sessions,
        consented_users,
        total_authorizations,
        last_used_at,
    })))
}
