//! Shared fixtures for the integration test suites.
#![allow(dead_code)]

use closeauth::AppResources;
use closeauth::config::{
    AppConfig, BootstrapConfig, MaintenanceConfig, OAuth2Config, SecurityConfig, SmtpConfig,
};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::sync::Arc;

pub const ADMIN_EMAIL: &str = "admin@example.org";
pub const ADMIN_PASSWORD: &str = "admin-password-123";

/// Create an in-memory SQLite database with the full schema.
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    let statements = [
        r#"CREATE TABLE users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            username TEXT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            first_name TEXT NULL,
            last_name TEXT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            email_verified INTEGER NOT NULL DEFAULT 0,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until TEXT NULL,
            password_changed_at TEXT NULL,
            last_login_at TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE roles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NULL,
            is_system INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE permissions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NULL,
            resource TEXT NOT NULL,
            action TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE role_permissions (
            role_id TEXT NOT NULL,
            permission_id TEXT NOT NULL,
            PRIMARY KEY (role_id, permission_id)
        );"#,
        r#"CREATE TABLE user_roles (
            user_id TEXT NOT NULL,
            role_id TEXT NOT NULL,
            PRIMARY KEY (user_id, role_id)
        );"#,
        r#"CREATE TABLE oauth2_clients (
            id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL UNIQUE,
            secret_hash TEXT NULL,
            name TEXT NOT NULL,
            description TEXT NULL,
            redirect_uris TEXT NOT NULL,
            grant_types TEXT NOT NULL DEFAULT 'authorization_code',
            scopes TEXT NOT NULL DEFAULT 'openid profile email',
            access_token_ttl INTEGER NOT NULL DEFAULT 3600,
            refresh_token_ttl INTEGER NOT NULL DEFAULT 604800,
            is_public INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE client_branding (
            client_id TEXT PRIMARY KEY,
            logo_url TEXT NULL,
            primary_color TEXT NULL,
            secondary_color TEXT NULL,
            background_color TEXT NULL,
            text_color TEXT NULL,
            company_name TEXT NULL,
            privacy_policy_url TEXT NULL,
            terms_of_service_url TEXT NULL,
            custom_css TEXT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            client_id TEXT NULL,
            refresh_token_hash TEXT NOT NULL UNIQUE,
            ip_address TEXT NULL,
            user_agent TEXT NULL,
            issued_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            last_rotated_at TEXT NULL,
            rotation_count INTEGER NOT NULL DEFAULT 0,
            revoked_at TEXT NULL
        );"#,
        r#"CREATE TABLE authorization_codes (
            code TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            redirect_uri TEXT NOT NULL,
            scope TEXT NOT NULL,
            state TEXT NULL,
            code_challenge TEXT NULL,
            code_challenge_method TEXT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE reset_tokens (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            expires_at TEXT NOT NULL,
            used_at TEXT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE oauth2_consents (
            id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            scopes TEXT NOT NULL,
            granted_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE audit_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT NULL,
            action TEXT NOT NULL,
            ip_address TEXT NULL,
            user_agent TEXT NULL,
            metadata TEXT NULL,
            success INTEGER NOT NULL DEFAULT 1,
            error_message TEXT NULL,
            created_at TEXT NOT NULL
        );"#,
    ];

    for statement in statements {
        db.execute(Statement::from_string(DbBackend::Sqlite, statement))
            .await
            .expect("create table");
    }

    db
}

pub fn create_test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        smtp: SmtpConfig {
            server: "localhost".into(),
            port: 25,
            username: "test".into(),
            password: "test".into(),
            from: "noreply@test.example.org".into(),
        },
        frontend_url: "http://localhost:4200".into(),
        security: SecurityConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".into(),
            access_token_lifetime: 3600,
            refresh_token_lifetime: 86400,
            remember_me_refresh_lifetime: 86400 * 30,
            max_failed_logins: 3,
            lockout_duration_secs: 900,
            reset_token_lifetime: 3600,
        },
        oauth2: OAuth2Config {
            issuer_url: "http://localhost:8080".into(),
            authorization_code_lifetime: 600,
        },
        bootstrap: BootstrapConfig {
            admin_email: ADMIN_EMAIL.into(),
            admin_password: ADMIN_PASSWORD.into(),
        },
        maintenance: MaintenanceConfig::default(),
    }
}

/// Build `AppResources` over a fresh schema, with bootstrap seeding applied.
pub async fn create_test_resources() -> AppResources {
    let db = Arc::new(create_test_db().await);
    let config = Arc::new(create_test_config());
    let mailer = Arc::new(
        lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::builder_dangerous("localhost")
            .build(),
    );

    let resources = AppResources { db, mailer, config };
    closeauth::bootstrap::run(&resources)
        .await
        .expect("bootstrap seeding");
    resources
}

/// Full application router for a fresh test environment.
pub async fn create_test_server() -> (axum_test::TestServer, AppResources) {
    let resources = create_test_resources().await;
    let app = closeauth::api::build_router(resources.clone());
    let server = axum_test::TestServer::new(app).expect("create test server");
    (server, resources)
}

/// Log in through the API and return (access_token, refresh_token).
pub async fn login(
    server: &axum_test::TestServer,
    email: &str,
    password: &str,
) -> (String, String) {
    let response = server
        .post("/api/auth/login")
        .json(&serde_json::json!({ "email": email, "password": password }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true, "login failed: {body}");
    (
        body["data"]["tokens"]["accessToken"]
            .as_str()
            .expect("access token")
            .to_string(),
        body["data"]["tokens"]["refreshToken"]
            .as_str()
            .expect("refresh token")
            .to_string(),
    )
}

/// Log in as the bootstrap admin.
pub async fn login_admin(server: &axum_test::TestServer) -> (String, String) {
    login(server, ADMIN_EMAIL, ADMIN_PASSWORD).await
}

/// Create a user through the admin API and return its id.
pub async fn create_user_via_api(
    server: &axum_test::TestServer,
    admin_token: &str,
    email: &str,
    password: &str,
    role_names: &[&str],
) -> String {
    // Map role names to ids
    let roles_response = server
        .get("/api/roles")
        .authorization_bearer(admin_token)
        .await;
    roles_response.assert_status_ok();
    let roles_body: serde_json::Value = roles_response.json();
    let role_ids: Vec<String> = roles_body["data"]
        .as_array()
        .expect("roles array")
        .iter()
        .filter(|r| role_names.contains(&r["name"].as_str().unwrap_or_default()))
        .map(|r| r["id"].as_str().expect("role id").to_string())
        .collect();
    assert_eq!(role_ids.len(), role_names.len(), "missing roles");

    let response = server
        .post("/api/users")
        .authorization_bearer(admin_token)
        .json(&serde_json::json!({
            "email": email,
            "password": password,
            "roleIds": role_ids,
        }))
        .await;
    assert_eq!(response.status_code(), 201, "{}", response.text());
    let body: serde_json::Value = response.json();
    body["data"]["user"]["id"]
        .as_str()
        .expect("user id")
        .to_string()
}
