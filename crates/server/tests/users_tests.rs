//! User administration endpoint tests.

mod common;

use common::{create_test_server, create_user_via_api, login, login_admin};

#[tokio::test]
async fn test_list_users_requires_token_and_permission() {
    let (server, _resources) = create_test_server().await;

    // No token
    server.get("/api/users").await.assert_status_unauthorized();

    // A plain user lacks users:read
    let (admin_token, _) = login_admin(&server).await;
    create_user_via_api(
        &server,
        &admin_token,
        "plain@example.org",
        "plain-password-1",
        &["user"],
    )
    .await;
    let (user_token, _) = login(&server, "plain@example.org", "plain-password-1").await;

    let response = server
        .get("/api/users")
        .authorization_bearer(&user_token)
        .await;
    response.assert_status_forbidden();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "insufficient_permissions");
}

#[tokio::test]
async fn test_list_users_pagination_and_search() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;

    for i in 0..3 {
        create_user_via_api(
            &server,
            &admin_token,
            &format!("listed{i}@example.org"),
            "listed-password-1",
            &["user"],
        )
        .await;
    }

    let response = server
        .get("/api/users")
        .authorization_bearer(&admin_token)
        .add_query_param("page", "1")
        .add_query_param("limit", "2")
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    // 3 created + bootstrap admin
    assert_eq!(body["data"]["total"], 4);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["totalPages"], 2);

    let search = server
        .get("/api/users")
        .authorization_bearer(&admin_token)
        .add_query_param("search", "listed1")
        .await;
    search.assert_status_ok();
    let search_body: serde_json::Value = search.json();
    assert_eq!(search_body["data"]["total"], 1);
    assert_eq!(
        search_body["data"]["items"][0]["email"],
        "listed1@example.org"
    );

    let by_role = server
        .get("/api/users")
        .authorization_bearer(&admin_token)
        .add_query_param("role", "admin")
        .await;
    by_role.assert_status_ok();
    let by_role_body: serde_json::Value = by_role.json();
    assert_eq!(by_role_body["data"]["total"], 1);
}

#[tokio::test]
async fn test_create_user_without_password_returns_temporary_one() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;

    let response = server
        .post("/api/users")
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({ "email": "temp@example.org" }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: serde_json::Value = response.json();
    let temporary_password = body["data"]["temporaryPassword"]
        .as_str()
        .expect("temporary password")
        .to_string();
    assert_eq!(temporary_password.len(), 16);

    // The generated password is immediately usable
    login(&server, "temp@example.org", &temporary_password).await;
}

#[tokio::test]
async fn test_update_user_profile_and_conflicts() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let user_id = create_user_via_api(
        &server,
        &admin_token,
        "edit-me@example.org",
        "edit-password-1",
        &["user"],
    )
    .await;

    let response = server
        .put(&format!("/api/users/{user_id}"))
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({
            "firstName": "Edited",
            "lastName": "Person",
            "username": "edited",
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["firstName"], "Edited");
    assert_eq!(body["data"]["username"], "edited");

    // Colliding with an existing email is a conflict
    let conflict = server
        .put(&format!("/api/users/{user_id}"))
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({ "email": common::ADMIN_EMAIL }))
        .await;
    assert_eq!(conflict.status_code(), 409);
}

#[tokio::test]
async fn test_update_roles_grants_admin_permissions() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let user_id = create_user_via_api(
        &server,
        &admin_token,
        "promote-me@example.org",
        "promote-password",
        &["user"],
    )
    .await;

    // Find the admin role id
    let roles: serde_json::Value = server
        .get("/api/roles")
        .authorization_bearer(&admin_token)
        .await
        .json();
    let admin_role_id = roles["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "admin")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = server
        .put(&format!("/api/users/{user_id}/roles"))
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({ "roleIds": [admin_role_id] }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["data"]["roles"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r == "admin"));

    // Unknown role id is rejected
    let bad = server
        .put(&format!("/api/users/{user_id}/roles"))
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({ "roleIds": ["no-such-role"] }))
        .await;
    bad.assert_status_bad_request();

    // A fresh login now carries admin permissions
    let (token, _) = login(&server, "promote-me@example.org", "promote-password").await;
    server
        .get("/api/users")
        .authorization_bearer(&token)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_deactivation_revokes_sessions_and_blocks_login() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let user_id = create_user_via_api(
        &server,
        &admin_token,
        "suspend-me@example.org",
        "suspend-password",
        &["user"],
    )
    .await;
    let (user_token, user_refresh) =
        login(&server, "suspend-me@example.org", "suspend-password").await;

    let response = server
        .patch(&format!("/api/users/{user_id}/status"))
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({ "isActive": false }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["isActive"], false);

    // Existing refresh session is gone, access token rejected, login blocked
    server
        .post("/api/auth/refresh")
        .json(&serde_json::json!({ "refreshToken": user_refresh }))
        .await
        .assert_status_bad_request();
    server
        .get("/api/users")
        .authorization_bearer(&user_token)
        .await
        .assert_status_unauthorized();
    server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": "suspend-me@example.org",
            "password": "suspend-password",
        }))
        .await
        .assert_status_forbidden();
}

#[tokio::test]
async fn test_admin_cannot_target_own_account() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;

    let me: serde_json::Value = server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": common::ADMIN_EMAIL,
            "password": common::ADMIN_PASSWORD,
        }))
        .await
        .json();
    let my_id = me["data"]["user"]["id"].as_str().unwrap();

    server
        .delete(&format!("/api/users/{my_id}"))
        .authorization_bearer(&admin_token)
        .await
        .assert_status_forbidden();

    server
        .patch(&format!("/api/users/{my_id}/status"))
        .authorization_bearer(&admin_token)
        .json(&serde_json::json!({ "isActive": false }))
        .await
        .assert_status_forbidden();
}

#[tokio::test]
async fn test_delete_user() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let user_id = create_user_via_api(
        &server,
        &admin_token,
        "delete-me@example.org",
        "delete-password-1",
        &["user"],
    )
    .await;

    server
        .delete(&format!("/api/users/{user_id}"))
        .authorization_bearer(&admin_token)
        .await
        .assert_status_ok();

    server
        .get(&format!("/api/users/{user_id}"))
        .authorization_bearer(&admin_token)
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_admin_password_reset_issues_temporary_password() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let user_id = create_user_via_api(
        &server,
        &admin_token,
        "reset-me@example.org",
        "original-password",
        &["user"],
    )
    .await;
    let (_token, refresh) = login(&server, "reset-me@example.org", "original-password").await;

    let response = server
        .post(&format!("/api/users/{user_id}/reset-password"))
        .authorization_bearer(&admin_token)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let temporary_password = body["data"]["temporaryPassword"].as_str().unwrap();

    // Old credentials and sessions are dead, the temporary password works
    server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": "reset-me@example.org",
            "password": "original-password",
        }))
        .await
        .assert_status_unauthorized();
    server
        .post("/api/auth/refresh")
        .json(&serde_json::json!({ "refreshToken": refresh }))
        .await
        .assert_status_bad_request();
    login(&server, "reset-me@example.org", temporary_password).await;
}

#[tokio::test]
async fn test_user_activity_feed() {
    let (server, _resources) = create_test_server().await;
    let (admin_token, _) = login_admin(&server).await;
    let user_id = create_user_via_api(
        &server,
        &admin_token,
        "active@example.org",
        "active-password-1",
        &["user"],
    )
    .await;

    // Generate some audit entries
    login(&server, "active@example.org", "active-password-1").await;
    server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": "active@example.org",
            "password": "wrong-password",
        }))
        .await
        .assert_status_unauthorized();

    let response = server
        .get(&format!("/api/users/{user_id}/activity"))
        .authorization_bearer(&admin_token)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let items = body["data"]["items"].as_array().unwrap();
    assert!(items.iter().any(|e| e["action"] == "auth.login" && e["success"] == true));
    assert!(items.iter().any(|e| e["action"] == "auth.login" && e["success"] == false));
}
