//! Authorization flow endpoint tests.
//!
//! Covers /api/oauth2/authorize/validate and /api/oauth2/consent.

mod common;

use closeauth::entity::authorization_code;
use common::{create_test_server, login_admin};
use sea_orm::EntityTrait;

async fn register_client(
    server: &axum_test::TestServer,
    admin_token: &str,
    is_public: bool,
) -> (String, String) {
    let response = server
        .post("/api/clients")
        .authorization_bearer(admin_token)
        .json(&serde_json::json!({
            "name": "Flow Test App",
            "redirectUris": ["https://flow.example.org/callback"],
            "allowedGrantTypes": ["authorization_code", "refresh_token"],
            "allowedScopes": ["openid", "profile", "email"],
            "isPublic": is_public,
        }))
        .await;
    assert_eq!(response.status_code(), 201, "{}", response.text());
    let body: serde_json::Value = response.json();
    (
        body["data"]["id"].as_str().unwrap().to_string(),
        body["data"]["clientId"].as_str().unwrap().to_string(),
    )
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_validate_unknown_client() {
    let (server, _resources) = create_test_server().await;

    let response = server
        .post("/api/oauth2/authorize/validate")
        .json(&serde_json::json!({
            "clientId": "no-such-client",
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid",
        }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn test_validate_rejects_non_code_response_type() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, false).await;

    let response = server
        .post("/api/oauth2/authorize/validate")
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "token",
            "scope": "openid",
        }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "unsupported_response_type");
}

#[tokio::test]
async fn test_validate_rejects_unregistered_redirect_uri() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, false).await;

    let response = server
        .post("/api/oauth2/authorize/validate")
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://evil.example.org/callback",
            "responseType": "code",
            "scope": "openid",
        }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_validate_rejects_excess_scopes() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, false).await;

    let response = server
        .post("/api/oauth2/authorize/validate")
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid admin:everything",
        }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_scope");
}

#[tokio::test]
async fn test_validate_requires_pkce_for_public_clients() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, true).await;

    let without = server
        .post("/api/oauth2/authorize/validate")
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid",
        }))
        .await;
    without.assert_status_bad_request();

    let with = server
        .post("/api/oauth2/authorize/validate")
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid",
            "codeChallenge": "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            "codeChallengeMethod": "S256",
        }))
        .await;
    with.assert_status_ok();

    let bad_method = server
        .post("/api/oauth2/authorize/validate")
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid",
            "codeChallenge": "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            "codeChallengeMethod": "S512",
        }))
        .await;
    bad_method.assert_status_bad_request();
}

#[tokio::test]
async fn test_validate_returns_consent_screen_details() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, false).await;

    let response = server
        .post("/api/oauth2/authorize/validate")
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid email",
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["clientName"], "Flow Test App");
    // Without a Bearer token, consent is always required
    assert_eq!(body["data"]["consentRequired"], true);

    let scopes = body["data"]["scopes"].as_array().unwrap();
    assert_eq!(scopes.len(), 2);
    assert!(scopes.iter().any(|s| s["name"] == "OpenID"));
    assert!(scopes.iter().any(|s| s["name"] == "Email"));
}

// =============================================================================
// Consent
// =============================================================================

#[tokio::test]
async fn test_consent_requires_authentication() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, false).await;

    server
        .post("/api/oauth2/consent")
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "scope": "openid",
            "approved": true,
        }))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn test_consent_denied_redirects_with_access_denied() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, false).await;

    let response = server
        .post("/api/oauth2/consent")
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "scope": "openid",
            "state": "xyz-state",
            "approved": false,
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let redirect_to = body["data"]["redirectTo"].as_str().unwrap();
    assert!(redirect_to.starts_with("https://flow.example.org/callback?"));
    assert!(redirect_to.contains("error=access_denied"));
    assert!(redirect_to.contains("state=xyz-state"));
    assert!(!redirect_to.contains("code="));
}

#[tokio::test]
async fn test_consent_approved_issues_authorization_code() {
    let (server, resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, true).await;

    let response = server
        .post("/api/oauth2/consent")
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "scope": "openid profile",
            "state": "abc123",
            "codeChallenge": "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            "codeChallengeMethod": "S256",
            "approved": true,
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let redirect_to = body["data"]["redirectTo"].as_str().unwrap();
    assert!(redirect_to.contains("code="));
    assert!(redirect_to.contains("state=abc123"));

    // The minted code is persisted with its PKCE binding
    let code = redirect_to
        .split("code=")
        .nth(1)
        .unwrap()
        .split('&')
        .next()
        .unwrap();
    let code = urlencoding::decode(code).unwrap().into_owned();
    let row = authorization_code::Entity::find_by_id(&code)
        .one(resources.db.as_ref())
        .await
        .unwrap()
        .expect("authorization code stored");
    assert_eq!(row.client_id, client_id);
    assert_eq!(row.scope, "openid profile");
    assert_eq!(
        row.code_challenge.as_deref(),
        Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM")
    );
    assert_eq!(row.code_challenge_method.as_deref(), Some("S256"));
    assert!(!row.is_expired());

    // PKCE verification works against the stored challenge
    assert!(row.verify_pkce("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"));
    assert!(!row.verify_pkce("wrong-verifier"));
}

#[tokio::test]
async fn test_consent_is_remembered_for_covered_scopes() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, false).await;

    // Approve openid + email
    server
        .post("/api/oauth2/consent")
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "scope": "openid email",
            "approved": true,
        }))
        .await
        .assert_status_ok();

    // A covered subset no longer needs the consent screen
    let covered: serde_json::Value = server
        .post("/api/oauth2/authorize/validate")
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid",
        }))
        .await
        .json();
    assert_eq!(covered["data"]["consentRequired"], false);

    // A wider set still does
    let wider: serde_json::Value = server
        .post("/api/oauth2/authorize/validate")
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid profile",
        }))
        .await
        .json();
    assert_eq!(wider["data"]["consentRequired"], true);
}

#[tokio::test]
async fn test_consent_scopes_accumulate() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (_id, client_id) = register_client(&server, &admin_token, false).await;

    for scope in ["openid", "email"] {
        server
            .post("/api/oauth2/consent")
            .authorization_bearer(&admin_token)
            .json(&serde_json::json!({
                "clientId": client_id,
                "redirectUri": "https://flow.example.org/callback",
                "scope": scope,
                "approved": true,
            }))
            .await
            .assert_status_ok();
    }

    // The union of both grants is now covered
    let body: serde_json::Value = server
        .post("/api/oauth2/authorize/validate")
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "responseType": "code",
            "scope": "openid email",
        }))
        .await
        .json();
    assert_eq!(body["data"]["consentRequired"], false);
}

#[tokio::test]
async fn test_consent_for_inactive_client_is_rejected() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let (id, client_id) = register_client(&server, &admin_token, false).await;

    server
        .put(&format!("/api/clients/{id}"))
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({ "isActive": false }))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/oauth2/consent")
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({
            "clientId": client_id,
            "redirectUri": "https://flow.example.org/callback",
            "scope": "openid",
            "approved": true,
        }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_client");
}
