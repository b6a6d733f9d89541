//! Backend service for the CloseAuth identity provider console.
//!
//! CloseAuth manages user accounts, refresh-token sessions, OAuth2 client
//! registrations with per-client branding, RBAC configuration, and the
//! validation/consent half of the authorization-code flow.

use std::sync::Arc;

use lettre::{AsyncSmtpTransport, Tokio1Executor};
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod api;
pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod email_templates;
pub mod entity;
pub mod maintenance;
pub mod response;

/// Shared resources handed to every handler.
#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    pub config: Arc<AppConfig>,
}
