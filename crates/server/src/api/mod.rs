//! API module providing the HTTP surface of CloseAuth.
//!
//! This module is organized into submodules:
//! - `auth` - Session authentication endpoints (/api/auth/*)
//! - `users` - User administration endpoints (/api/users/*)
//! - `clients` - OAuth2 client management endpoints (/api/clients/*)
//! - `roles` - RBAC configuration endpoints (/api/roles, /api/permissions)
//! - `authorize` - Authorization flow endpoints (/api/oauth2/*)
//! - `guard` - Bearer-token extractor and typed API errors
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod auth;
pub mod authorize;
pub mod clients;
pub mod guard;
pub mod health;
pub mod openapi;
pub mod roles;
pub mod users;

pub use guard::{ApiError, AuthBearer, AuthenticatedUser};

use crate::AppResources;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the application router with all routes and middleware attached.
pub fn build_router(app_resources: AppResources) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/auth", auth::router())
        .nest("/api/users", users::router())
        .nest("/api/clients", clients::router())
        .nest("/api/roles", roles::roles_router())
        .nest("/api/permissions", roles::permissions_router())
        .nest("/api/oauth2", authorize::router())
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let listen_addr = app_resources.config.listen_addr.clone();
    let router = build_router(app_resources);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
