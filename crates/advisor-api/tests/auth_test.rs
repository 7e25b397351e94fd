//! Authentication, roles and error envelope tests.
//!
//! Run with: `cargo test -p advisor-api --test auth_test`
//! Requires Docker for testcontainers (Postgres).

mod helpers;

use helpers::{api_path, bearer, setup_test_app, MASTER_KEY};
use serde_json::{json, Value};

#[tokio::test]
async fn health_endpoints_are_public() {
    let app = setup_test_app().await;

    let live = app.client().get("/live").await;
    assert_eq!(live.status_code(), 200);

    let ready = app.client().get("/ready").await;
    assert_eq!(ready.status_code(), 200);

    let health = app.client().get("/health").await;
    assert_eq!(health.status_code(), 200);
    let body = health.json::<Value>();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "healthy");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = setup_test_app().await;

    let response = app.client().get(&api_path("/clients")).await;
    assert_eq!(response.status_code(), 401);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "error");
    assert!(body["message"].is_string());

    let response = app
        .client()
        .get(&api_path("/clients"))
        .add_header("Authorization", bearer("not-a-jwt"))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let app = setup_test_app().await;

    let wrong_password = app
        .client()
        .post(&api_path("/auth/login"))
        .json(&json!({ "email": helpers::ADMIN_EMAIL, "password": "nope-nope-nope" }))
        .await;
    let unknown = app
        .client()
        .post(&api_path("/auth/login"))
        .json(&json!({ "email": "ghost@example.com", "password": "nope-nope-nope" }))
        .await;

    assert_eq!(wrong_password.status_code(), 401);
    assert_eq!(unknown.status_code(), 401);
    assert_eq!(
        wrong_password.json::<Value>()["message"],
        unknown.json::<Value>()["message"]
    );
}

#[tokio::test]
async fn refresh_token_issues_a_new_access_token() {
    let app = setup_test_app().await;

    let login = app
        .client()
        .post(&api_path("/auth/login"))
        .json(&json!({ "email": helpers::ADMIN_EMAIL, "password": helpers::ADMIN_PASSWORD }))
        .await
        .json::<Value>();
    let refresh_token = login["refresh_token"].as_str().unwrap();
    let access_token = login["access_token"].as_str().unwrap();

    // a refresh token is not accepted as a bearer token
    let rejected = app
        .client()
        .get(&api_path("/auth/me"))
        .add_header("Authorization", bearer(refresh_token))
        .await;
    assert_eq!(rejected.status_code(), 401);

    let refreshed = app
        .client()
        .post(&api_path("/auth/refresh"))
        .json(&json!({ "refresh_token": refresh_token }))
        .await;
    assert_eq!(refreshed.status_code(), 200);
    let new_token = refreshed.json::<Value>()["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let me = app
        .client()
        .get(&api_path("/auth/me"))
        .add_header("Authorization", bearer(&new_token))
        .await;
    assert_eq!(me.status_code(), 200);
    assert_eq!(me.json::<Value>()["email"], helpers::ADMIN_EMAIL);

    // refresh with an access token is refused
    let wrong_kind = app
        .client()
        .post(&api_path("/auth/refresh"))
        .json(&json!({ "refresh_token": access_token }))
        .await;
    assert_eq!(wrong_kind.status_code(), 401);
}

#[tokio::test]
async fn master_key_acts_as_admin() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get(&api_path("/users"))
        .add_header("Authorization", bearer(MASTER_KEY))
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response.json::<Value>()["count"].as_i64().unwrap() >= 1);
}

#[tokio::test]
async fn viewers_cannot_write() {
    let app = setup_test_app().await;
    let viewer = app.user_token("viewer@example.com", "viewer").await;

    let listed = app
        .client()
        .get(&api_path("/clients"))
        .add_header("Authorization", bearer(&viewer))
        .await;
    assert_eq!(listed.status_code(), 200);

    let created = app
        .client()
        .post(&api_path("/clients"))
        .add_header("Authorization", bearer(&viewer))
        .json(&json!({ "company_name": "Contoso" }))
        .await;
    assert_eq!(created.status_code(), 403);

    let users = app
        .client()
        .get(&api_path("/users"))
        .add_header("Authorization", bearer(&viewer))
        .await;
    assert_eq!(users.status_code(), 403);
}

#[tokio::test]
async fn deactivated_users_lose_access() {
    let app = setup_test_app().await;
    let admin = app.admin_token().await;
    let analyst = app.user_token("analyst@example.com", "analyst").await;

    let me = app
        .client()
        .get(&api_path("/auth/me"))
        .add_header("Authorization", bearer(&analyst))
        .await
        .json::<Value>();
    let analyst_id = me["id"].as_str().unwrap();

    let response = app
        .client()
        .delete(&api_path(&format!("/users/{}", analyst_id)))
        .add_header("Authorization", bearer(&admin))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["is_active"], false);

    let after = app
        .client()
        .get(&api_path("/auth/me"))
        .add_header("Authorization", bearer(&analyst))
        .await;
    assert_eq!(after.status_code(), 401);
}

#[tokio::test]
async fn duplicate_user_email_is_a_conflict() {
    let app = setup_test_app().await;
    let admin = app.admin_token().await;

    let response = app
        .client()
        .post(&api_path("/users"))
        .add_header("Authorization", bearer(&admin))
        .json(&json!({
            "email": helpers::ADMIN_EMAIL,
            "password": "whatever-password",
            "full_name": "Second Admin",
        }))
        .await;
    assert_eq!(response.status_code(), 409);
}

#[tokio::test]
async fn repeated_bad_tokens_are_throttled_after_the_limit() {
    let app = setup_test_app().await;

    for attempt in 1..=10 {
        let response = app
            .client()
            .get(&api_path("/clients"))
            .add_header("Authorization", bearer("forged-token"))
            .await;
        assert_eq!(response.status_code(), 401, "attempt {}", attempt);
    }

    let response = app
        .client()
        .get(&api_path("/clients"))
        .add_header("Authorization", bearer("forged-token"))
        .await;
    assert_eq!(response.status_code(), 429);
    assert_eq!(response.json::<Value>()["status"], "error");

    // the master key is refused too while the address is blocked
    let response = app
        .client()
        .get(&api_path("/clients"))
        .add_header("Authorization", bearer(MASTER_KEY))
        .await;
    assert_eq!(response.status_code(), 429);
}
