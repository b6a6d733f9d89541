//! Authentication endpoint tests.
//!
//! Covers login (including lockout), registration, refresh rotation,
//! logout and the password reset flow.

mod common;

use closeauth::auth::password::{generate_opaque_token, hash_opaque_token};
use closeauth::entity::{reset_token, session, user};
use common::{ADMIN_EMAIL, ADMIN_PASSWORD, create_test_server, login, login_admin};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use time::OffsetDateTime;

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_returns_user_and_jwt() {
    let (server, _resources) = create_test_server().await;

    let response = server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": ADMIN_EMAIL,
            "password": ADMIN_PASSWORD,
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["email"], ADMIN_EMAIL);
    assert!(body["data"]["user"]["roles"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r == "admin"));
    assert!(body["data"]["user"]["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p == "users:write"));

    // The console decodes the access token's payload, so it must be a JWT
    let access_token = body["data"]["tokens"]["accessToken"].as_str().unwrap();
    assert_eq!(access_token.split('.').count(), 3);
    assert_eq!(body["data"]["tokens"]["tokenType"], "Bearer");
    assert_eq!(body["data"]["tokens"]["expiresIn"], 3600);
}

#[tokio::test]
async fn test_login_unknown_email_and_wrong_password_are_indistinguishable() {
    let (server, _resources) = create_test_server().await;

    let unknown = server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": "nobody@example.org",
            "password": "whatever-password",
        }))
        .await;
    unknown.assert_status_unauthorized();
    let unknown_body: serde_json::Value = unknown.json();

    let wrong = server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": ADMIN_EMAIL,
            "password": "wrong-password",
        }))
        .await;
    wrong.assert_status_unauthorized();
    let wrong_body: serde_json::Value = wrong.json();

    assert_eq!(unknown_body["error"], wrong_body["error"]);
    assert_eq!(unknown_body["error"], "invalid_credentials");
}

#[tokio::test]
async fn test_login_locks_account_after_repeated_failures() {
    let (server, _resources) = create_test_server().await;

    // Test config locks after 3 failures
    for _ in 0..3 {
        server
            .post("/api/auth/login")
            .json(&serde_json::json!({
                "email": ADMIN_EMAIL,
                "password": "wrong-password",
            }))
            .await
            .assert_status_unauthorized();
    }

    // Even the correct password is rejected while locked
    let response = server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": ADMIN_EMAIL,
            "password": ADMIN_PASSWORD,
        }))
        .await;
    response.assert_status_forbidden();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn test_login_resets_failure_counter_on_success() {
    let (server, resources) = create_test_server().await;

    server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": ADMIN_EMAIL,
            "password": "wrong-password",
        }))
        .await
        .assert_status_unauthorized();

    login_admin(&server).await;

    let account = user::Entity::find()
        .filter(user::Column::Email.eq(ADMIN_EMAIL))
        .one(resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.failed_login_attempts, 0);
    assert!(account.last_login_at.is_some());
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_validation_errors() {
    let (server, _resources) = create_test_server().await;

    let response = server
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "email": "not-an-email",
            "password": "short",
            "confirmPassword": "different",
            "acceptTerms": false,
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], false);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
    assert!(fields.contains(&"confirmPassword"));
    assert!(fields.contains(&"acceptTerms"));
}

#[tokio::test]
async fn test_register_creates_account_and_logs_in() {
    let (server, _resources) = create_test_server().await;

    let response = server
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "email": "New.User@Example.org",
            "username": "newuser",
            "firstName": "New",
            "lastName": "User",
            "password": "a-long-password",
            "confirmPassword": "a-long-password",
            "acceptTerms": true,
        }))
        .await;

    assert_eq!(response.status_code(), 201);
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    // Email is normalised to lowercase
    assert_eq!(body["data"]["user"]["email"], "new.user@example.org");
    assert!(body["data"]["user"]["roles"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r == "user"));
    assert!(body["data"]["tokens"]["accessToken"].as_str().is_some());

    // And the credentials work for a subsequent login
    login(&server, "new.user@example.org", "a-long-password").await;
}

#[tokio::test]
async fn test_register_rejects_duplicate_email() {
    let (server, _resources) = create_test_server().await;

    let response = server
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "email": ADMIN_EMAIL,
            "password": "a-long-password",
            "confirmPassword": "a-long-password",
            "acceptTerms": true,
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["errors"][0]["field"], "email");
}

// =============================================================================
// Refresh & logout
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_token_and_invalidates_old() {
    let (server, _resources) = create_test_server().await;
    let (_access, refresh) = login_admin(&server).await;

    let response = server
        .post("/api/auth/refresh")
        .json(&serde_json::json!({ "refreshToken": refresh }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let new_refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh);
    assert!(body["data"]["accessToken"].as_str().is_some());

    // The rotated-out token is dead
    let replay = server
        .post("/api/auth/refresh")
        .json(&serde_json::json!({ "refreshToken": refresh }))
        .await;
    replay.assert_status_bad_request();
    let replay_body: serde_json::Value = replay.json();
    assert_eq!(replay_body["error"], "invalid_grant");

    // The replacement still works
    server
        .post("/api/auth/refresh")
        .json(&serde_json::json!({ "refreshToken": new_refresh }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_refresh_tracks_rotation_count() {
    let (server, resources) = create_test_server().await;
    let (_access, refresh) = login_admin(&server).await;

    let response = server
        .post("/api/auth/refresh")
        .json(&serde_json::json!({ "refreshToken": refresh }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let new_refresh = body["data"]["refreshToken"].as_str().unwrap();

    let row = session::Entity::find()
        .filter(session::Column::RefreshTokenHash.eq(hash_opaque_token(new_refresh)))
        .one(resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.rotation_count, 1);
    assert!(row.last_rotated_at.is_some());
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let (server, _resources) = create_test_server().await;
    let (_access, refresh) = login_admin(&server).await;

    server
        .post("/api/auth/logout")
        .json(&serde_json::json!({ "refreshToken": refresh }))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/auth/refresh")
        .json(&serde_json::json!({ "refreshToken": refresh }))
        .await;
    response.assert_status_bad_request();

    // Logout is idempotent
    server
        .post("/api/auth/logout")
        .json(&serde_json::json!({ "refreshToken": refresh }))
        .await
        .assert_status_ok();
}

// =============================================================================
// Password reset
// =============================================================================

#[tokio::test]
async fn test_forgot_password_never_reveals_accounts() {
    let (server, _resources) = create_test_server().await;

    let known = server
        .post("/api/auth/forgot-password")
        .json(&serde_json::json!({ "email": ADMIN_EMAIL }))
        .await;
    known.assert_status_ok();

    let unknown = server
        .post("/api/auth/forgot-password")
        .json(&serde_json::json!({ "email": "nobody@example.org" }))
        .await;
    unknown.assert_status_ok();

    let known_body: serde_json::Value = known.json();
    let unknown_body: serde_json::Value = unknown.json();
    assert_eq!(known_body["success"], true);
    assert_eq!(known_body["message"], unknown_body["message"]);
}

#[tokio::test]
async fn test_reset_password_consumes_token_and_revokes_sessions() {
    let (server, resources) = create_test_server().await;
    let (_access, refresh) = login_admin(&server).await;

    let account = user::Entity::find()
        .filter(user::Column::Email.eq(ADMIN_EMAIL))
        .one(resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();

    // Plant a reset token the way forgot-password would
    let token = generate_opaque_token();
    let now = OffsetDateTime::now_utc();
    reset_token::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        user_id: Set(account.id.clone()),
        token_hash: Set(hash_opaque_token(&token)),
        expires_at: Set(now + time::Duration::hours(1)),
        used_at: Set(None),
        created_at: Set(now),
    }
    .insert(resources.db.as_ref())
    .await
    .unwrap();

    let response = server
        .post("/api/auth/reset-password")
        .json(&serde_json::json!({
            "token": token,
            "newPassword": "a-brand-new-password",
        }))
        .await;
    response.assert_status_ok();

    // Old password no longer works, new one does
    server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": ADMIN_EMAIL,
            "password": ADMIN_PASSWORD,
        }))
        .await
        .assert_status_unauthorized();
    login(&server, ADMIN_EMAIL, "a-brand-new-password").await;

    // All prior sessions were revoked
    server
        .post("/api/auth/refresh")
        .json(&serde_json::json!({ "refreshToken": refresh }))
        .await
        .assert_status_bad_request();

    // The token is single-use
    let reuse = server
        .post("/api/auth/reset-password")
        .json(&serde_json::json!({
            "token": token,
            "newPassword": "yet-another-password",
        }))
        .await;
    reuse.assert_status_bad_request();
}

#[tokio::test]
async fn test_reset_password_rejects_expired_token() {
    let (server, resources) = create_test_server().await;

    let account = user::Entity::find()
        .filter(user::Column::Email.eq(ADMIN_EMAIL))
        .one(resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();

    let token = generate_opaque_token();
    let now = OffsetDateTime::now_utc();
    reset_token::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        user_id: Set(account.id),
        token_hash: Set(hash_opaque_token(&token)),
        expires_at: Set(now - time::Duration::minutes(5)),
        used_at: Set(None),
        created_at: Set(now - time::Duration::hours(2)),
    }
    .insert(resources.db.as_ref())
    .await
    .unwrap();

    let response = server
        .post("/api/auth/reset-password")
        .json(&serde_json::json!({
            "token": token,
            "newPassword": "a-brand-new-password",
        }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_grant");
}
