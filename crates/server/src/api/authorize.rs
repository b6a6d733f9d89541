//! Authorization flow endpoints (`/api/oauth2/*`).
//!
//! The console renders the login and consent screens itself; these endpoints
//! supply the validation and the decision recording behind them:
//!
//! - `POST /authorize/validate` - validate an authorization request and
//!   return the client's display info for the consent screen
//! - `POST /consent` - record the user's decision; on approval an
//!   authorization code is minted for the external token endpoint to redeem

use crate::AppResources;
use crate::api::guard::{ApiError, AuthBearer};
use crate::audit::{self, AuditEvent};
use crate::auth::password::generate_opaque_token;
use crate::auth::tokens::verify_access_token;
use crate::entity::{authorization_code, client, client_branding, consent};
use crate::response::ApiResponse;
use axum::{Extension, Json, http::HeaderMap};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::clients::BrandingDto;

/// OpenAPI tag for authorization flow endpoints.
pub const OAUTH2_TAG: &str = "OAuth2";

/// Creates the authorization flow router.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(validate_authorization))
        .routes(routes!(consent_decision))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub approved: bool,
}

/// Scope information for display on the consent screen.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScopeInfo {
    pub name: String,
    pub description: String,
}

/// Validated authorization request details for the consent screen.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDetailsDto {
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branding: Option<BrandingDto>,
    pub scopes: Vec<ScopeInfo>,
    /// False when the authenticated user has already granted this scope set
    pub consent_required: bool,
}

/// Outcome of a consent decision: where to send the user agent.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsentOutcomeDto {
    pub redirect_to: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Get human-readable scope information.
fn get_scope_info(scope: &str) -> ScopeInfo {
    match scope {
        "openid" => ScopeInfo {
            name: "OpenID".to_string(),
            description: "Verify your identity".to_string(),
        },
        "email" => ScopeInfo {
            name: "Email".to_string(),
            description: "Access your email address".to_string(),
        },
        "profile" => ScopeInfo {
            name: "Profile".to_string(),
            description: "Access your profile information".to_string(),
        },
        _ => ScopeInfo {
            name: scope.to_string(),
            description: format!("Access to {}", scope),
        },
    }
}

/// Validate the shared parts of an authorization request against the client
/// registry. Returns the client on success.
async fn validate_request(
    resources: &AppResources,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    response_type: Option<&str>,
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
) -> Result<client::Model, ApiError> {
    if let Some(response_type) = response_type
        && response_type != "code"
    {
        return Err(ApiError {
            error: "unsupported_response_type".to_string(),
            error_description: Some("Only 'code' response type is supported".to_string()),
        });
    }

    let registered = client::Entity::find()
        .filter(client::Column::ClientId.eq(client_id))
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::invalid_client("Client not found"))?;

    if !registered.is_active {
        return Err(ApiError::invalid_client("Client is deactivated"));
    }

    if !registered.is_grant_type_allowed("authorization_code") {
        return Err(ApiError {
            error: "unauthorized_client".to_string(),
            error_description: Some(
                "Client is not allowed to use the authorization_code grant".to_string(),
            ),
        });
    }

    if !registered.is_redirect_uri_allowed(redirect_uri) {
        return Err(ApiError::invalid_request("Invalid redirect_uri"));
    }

    if scope.split_whitespace().next().is_none() {
        return Err(ApiError::invalid_scope("At least one scope is required"));
    }
    if !registered.are_scopes_allowed(scope) {
        return Err(ApiError::invalid_scope(
            "Requested scopes exceed the client's allowed scopes",
        ));
    }

    // PKCE: mandatory for public clients, validated whenever present
    match (code_challenge, code_challenge_method) {
        (None, _) if registered.is_public => {
            return Err(ApiError::invalid_request(
                "code_challenge is required for public clients",
            ));
        }
        (Some(_), Some(method)) if method != "S256" && method != "plain" => {
            return Err(ApiError::invalid_request(
                "code_challenge_method must be S256 or plain",
            ));
        }
        _ => {}
    }

    Ok(registered)
}

/// Append query parameters to a redirect URI, respecting existing queries.
fn append_params(redirect_uri: &str, params: &[(&str, &str)]) -> String {
    let mut url = redirect_uri.to_string();
    for (key, value) in params {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&format!("{}={}", key, urlencoding::encode(value)));
    }
    url
}

// =============================================================================
// Endpoints
// =============================================================================

/// Validate an authorization request.
#[tracing::instrument(skip(resources, headers, payload), fields(client_id = %payload.client_id))]
#[utoipa::path(
    post,
    path = "/authorize/validate",
    tag = OAUTH2_TAG,
    operation_id = "Validate Authorization Request",
    summary = "Validate an OAuth2 authorization request",
    description = "Checks the request against the client registry: known active client, registered \
                   redirect URI, `code` response type, allowed scopes, and PKCE rules (a code \
                   challenge is mandatory for public clients).\n\n\
                   Returns the client's display name, branding and per-scope descriptions for the \
                   consent screen. When a valid Bearer token accompanies the request, \
                   `consentRequired` reflects whether the user has already approved this scope set.",
    request_body(content = AuthorizationRequest, description = "Authorization request parameters"),
    responses(
        (status = 200, description = "Request is valid", body = ApiResponse<AuthorizationDetailsDto>),
        (status = 400, description = "Invalid request parameters", body = ApiError),
    )
)]
async fn validate_authorization(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Json(payload): Json<AuthorizationRequest>,
) -> Result<Json<ApiResponse<AuthorizationDetailsDto>>, ApiError> {
    let registered = validate_request(
        &resources,
        &payload.client_id,
        &payload.redirect_uri,
        &payload.scope,
        Some(&payload.response_type),
        payload.code_challenge.as_deref(),
        payload.code_challenge_method.as_deref(),
    )
    .await?;

    // Authentication is optional here: the console may validate before login.
    let authenticated_user = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| {
            verify_access_token(
                &resources.config.security.jwt_secret,
                &resources.config.oauth2.issuer_url,
                token,
            )
            .ok()
        });

    let consent_required = match authenticated_user {
        Some(claims) => {
            let existing = consent::Entity::find()
                .filter(consent::Column::ClientId.eq(&registered.client_id))
                .filter(consent::Column::UserId.eq(&claims.sub))
                .one(resources.db.as_ref())
                .await?;
            !existing.is_some_and(|c| c.covers(&payload.scope))
        }
        None => true,
    };

    let branding = client_branding::Entity::find_by_id(&registered.id)
        .one(resources.db.as_ref())
        .await?
        .map(BrandingDto::from);

    let scopes = payload
        .scope
        .split_whitespace()
        .map(get_scope_info)
        .collect();

    Ok(Json(ApiResponse::ok(AuthorizationDetailsDto {
        client_name: registered.name,
        branding,
        scopes,
        consent_required,
    })))
}

/// Record a consent decision.
#[tracing::instrument(skip(resources, auth, payload), fields(user_id = %auth.user_id, client_id = %payload.client_id))]
#[utoipa::path(
    post,
    path = "/consent",
    tag = OAUTH2_TAG,
    operation_id = "Consent Decision",
    summary = "Record the user's consent decision",
    description = "On approval, persists the consent grant and mints a single-use authorization code \
                   bound to the client, user, redirect URI, scope and PKCE challenge; the returned \
                   `redirectTo` carries `code` (and `state`). On denial, `redirectTo` carries \
                   `error=access_denied`.\n\n\
                   The code expires after the configured authorization-code lifetime and is redeemed \
                   at the authorization server's token endpoint.",
    security(("bearer_auth" = [])),
    request_body(content = ConsentRequest, description = "Consent decision and flow parameters"),
    responses(
        (status = 200, description = "Decision recorded", body = ApiResponse<ConsentOutcomeDto>),
        (status = 400, description = "Invalid request parameters", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
    )
)]
async fn consent_decision(
    Extension(resources): Extension<AppResources>,
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<ConsentRequest>,
) -> Result<Json<ApiResponse<ConsentOutcomeDto>>, ApiError> {
    let registered = validate_request(
        &resources,
        &payload.client_id,
        &payload.redirect_uri,
        &payload.scope,
        None,
        payload.code_challenge.as_deref(),
        payload.code_challenge_method.as_deref(),
    )
    .await?;

    let state = payload.state.as_deref().unwrap_or("");

    if !payload.approved {
        let mut params = vec![
            ("error", "access_denied"),
            ("error_description", "User denied the request"),
        ];
        if !state.is_empty() {
            params.push(("state", state));
        }
        let redirect_to = append_params(&payload.redirect_uri, &params);

        audit::record(
            resources.db.as_ref(),
            AuditEvent::success("oauth2.consent_denied")
                .user(&auth.user_id)
                .metadata(serde_json::json!({ "client_id": registered.client_id })),
        )
        .await;

        return Ok(Json(ApiResponse::ok(ConsentOutcomeDto { redirect_to })));
    }

    // Persist the grant: one row per (client, user), scopes accumulate
    let now = OffsetDateTime::now_utc();
    let existing = consent::Entity::find()
        .filter(consent::Column::ClientId.eq(&registered.client_id))
        .filter(consent::Column::UserId.eq(&auth.user_id))
        .one(resources.db.as_ref())
        .await?;

    match existing {
        Some(row) => {
            let mut scopes = row.scopes_list();
            for scope in payload.scope.split_whitespace() {
                if !scopes.iter().any(|s| s == scope) {
                    scopes.push(scope.to_string());
                }
            }
            let mut active: consent::ActiveModel = row.into();
            active.scopes = Set(scopes.join(" "));
            active.updated_at = Set(now);
            active.update(resources.db.as_ref()).await?;
        }
        None => {
            let model = consent::ActiveModel {
                id: Set(uuid::Uuid::new_v4().to_string()),
                client_id: Set(registered.client_id.clone()),
                user_id: Set(auth.user_id.clone()),
                scopes: Set(payload.scope.clone()),
                granted_at: Set(now),
                updated_at: Set(now),
            };
            model.insert(resources.db.as_ref()).await?;
        }
    }

    // Mint the authorization code
    let code = generate_opaque_token();
    let expires_at =
        now + time::Duration::seconds(resources.config.oauth2.authorization_code_lifetime);

    let code_row = authorization_code::ActiveModel {
        code: Set(code.clone()),
        client_id: Set(registered.client_id.clone()),
        user_id: Set(auth.user_id.clone()),
        redirect_uri: Set(payload.redirect_uri.clone()),
        scope: Set(payload.scope.clone()),
        state: Set(payload.state.clone().filter(|s| !s.is_empty())),
        code_challenge: Set(payload.code_challenge.clone()),
        code_challenge_method: Set(payload
            .code_challenge
            .is_some()
            .then(|| {
                payload
                    .code_challenge_method
                    .clone()
                    .unwrap_or_else(|| "plain".to_string())
            })),
        expires_at: Set(expires_at),
        created_at: Set(now),
    };
    code_row.insert(resources.db.as_ref()).await?;

    audit::record(
        resources.db.as_ref(),
        AuditEvent::success("oauth2.code_issued")
            .user(&auth.user_id)
            .metadata(serde_json::json!({
                "client_id": registered.client_id,
                "scope": payload.scope,
            })),
    )
    .await;

    tracing::info!(
        client_id = %registered.client_id,
        "User granted consent, authorization code issued"
    );

    let mut params = vec![("code", code.as_str())];
    if !state.is_empty() {
        params.push(("state", state));
    }
    let redirect_to = append_params(&payload.redirect_uri, &params);

    Ok(Json(ApiResponse::ok(ConsentOutcomeDto { redirect_to })))
}
