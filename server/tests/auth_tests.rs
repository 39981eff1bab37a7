mod common;

use std::net::SocketAddr;

use actix_web::{cookie::Cookie, http::header, http::StatusCode, test};
use mongodb::bson::oid::ObjectId;
use serde_json::json;
use textmate_server::build_app;
use textmate_server::db::Store;
use textmate_server::middleware::TOKEN_COOKIE;

use common::{authed, test_state, test_state_with};

fn register_body() -> serde_json::Value {
    json!({ "name": "Ada Lovelace", "email": "Ada@Example.com", "password": "secret123" })
}

#[actix_web::test]
async fn test_register_then_read_profile() {
    let (state, store) = test_state();
    let app = test::init_service(build_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(register_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == TOKEN_COOKIE)
        .expect("token cookie")
        .into_owned();
    assert!(cookie.http_only().unwrap_or(false));

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(body["user"].get("password_hash").is_none());
    assert!(store
        .find_user_by_email("ada@example.com")
        .await
        .unwrap()
        .is_some());

    let req = test::TestRequest::get()
        .uri("/api/v1/profile/user")
        .cookie(Cookie::new(TOKEN_COOKIE, cookie.value().to_string()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["name"], "Ada Lovelace");
}

#[actix_web::test]
async fn test_register_duplicate_email_conflicts() {
    let (state, _store) = test_state();
    let app = test::init_service(build_app(state)).await;

    for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(register_body())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), expected);
    }
}

#[actix_web::test]
async fn test_register_validation() {
    let (state, store) = test_state();
    let app = test::init_service(build_app(state)).await;

    let cases = [
        json!({ "name": "Ada", "email": "not-an-email", "password": "secret123" }),
        json!({ "name": "Al", "email": "al@example.com", "password": "secret123" }),
        json!({ "name": "Ada", "email": "ada@example.com", "password": "123" }),
        json!({ "email": "ada@example.com", "password": "secret123" }),
    ];

    for case in cases {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(&case)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "case {}", case);
    }

    assert!(store
        .find_user_by_email("ada@example.com")
        .await
        .unwrap()
        .is_none());
}

#[actix_web::test]
async fn test_login_and_bearer_token() {
    let (state, _store) = test_state();
    let app = test::init_service(build_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(register_body())
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({ "email": "ada@example.com", "password": "wrong-password" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid credentials");

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({ "email": "ADA@example.com", "password": "secret123" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/v1/books")
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_login_unknown_user() {
    let (state, _store) = test_state();
    let app = test::init_service(build_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({ "email": "nobody@example.com", "password": "secret123" }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({ "email": "" }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[actix_web::test]
async fn test_unknown_email_and_wrong_password_look_alike() {
    let (state, _store) = test_state();
    let app = test::init_service(build_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(register_body())
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::CREATED
    );

    let attempt = |email: &str| {
        test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({ "email": email, "password": "not-the-password" }))
            .to_request()
    };

    let wrong_password = test::call_service(&app, attempt("ada@example.com")).await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password: serde_json::Value = test::read_body_json(wrong_password).await;

    let unknown = test::call_service(&app, attempt("nobody@example.com")).await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let unknown: serde_json::Value = test::read_body_json(unknown).await;

    assert_eq!(wrong_password, unknown);
}

#[actix_web::test]
async fn test_logout_clears_cookie() {
    let (state, _store) = test_state();
    let app = test::init_service(build_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/logout")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == TOKEN_COOKIE)
        .expect("token cookie");
    assert_eq!(cookie.value(), "");
    assert_eq!(
        cookie.max_age(),
        Some(actix_web::cookie::time::Duration::ZERO)
    );
}

#[actix_web::test]
async fn test_protected_routes_require_identity() {
    let (state, store) = test_state();
    let book_id = ObjectId::new().to_hex();
    let app = test::init_service(build_app(state)).await;

    let requests = vec![
        test::TestRequest::get().uri("/api/v1/profile/user"),
        test::TestRequest::post().uri("/api/v1/profile/login"),
        test::TestRequest::get().uri("/api/v1/books"),
        test::TestRequest::post()
            .uri("/api/v1/books")
            .set_json(json!({ "title": "Dune", "author": "Herbert" })),
        test::TestRequest::get().uri(&format!("/api/v1/books/{book_id}")),
        test::TestRequest::delete().uri(&format!("/api/v1/books/{book_id}")),
        test::TestRequest::post()
            .uri(&format!("/api/v1/books/{book_id}/notes"))
            .set_json(json!({ "content": "spice" })),
        test::TestRequest::get().uri("/api/v1/books/anything/at/all"),
    ];

    for req in requests {
        let req = req.to_request();
        let path = req.path().to_string();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "path {}", path);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({ "success": false, "error": "Authentication invalid" })
        );
    }

    assert_eq!(store.book_count(), 0);
    assert_eq!(store.note_count(), 0);
}

#[actix_web::test]
async fn test_forged_and_expired_tokens_rejected() {
    let (state, _store) = test_state_with(&[("AUTH_TOKEN_TTL_HOURS", "0")]);
    let expired = authed(test::TestRequest::get().uri("/api/v1/books"), &state, ObjectId::new())
        .to_request();
    let app = test::init_service(build_app(state)).await;

    assert_eq!(
        test::call_service(&app, expired).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let forged = test::TestRequest::get()
        .uri("/api/v1/books")
        .cookie(Cookie::new(TOKEN_COOKIE, "eyJ1c2VyX2lkIjoiMSJ9.c2lnbmF0dXJl"))
        .to_request();
    assert_eq!(
        test::call_service(&app, forged).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_update_profile_reissues_token() {
    let (state, _store) = test_state();
    let app = test::init_service(build_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(register_body())
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri("/api/v1/profile/user")
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .set_json(json!({ "name": "Countess Ada" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["name"], "Countess Ada");
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_ne!(body["token"].as_str().unwrap(), token);
}

#[actix_web::test]
async fn test_auth_routes_without_gate_have_no_identity() {
    let (state, _store) = test_state();
    let app = test::init_service(build_app(state)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/user")
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_login_rate_limited_per_ip() {
    let (state, _store) = test_state_with(&[("LOGIN_RATE_LIMIT", "3")]);
    let app = test::init_service(build_app(state)).await;
    let client: SocketAddr = "203.0.113.7:40000".parse().unwrap();
    let other: SocketAddr = "203.0.113.8:40000".parse().unwrap();

    let login = |addr: SocketAddr| {
        test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .peer_addr(addr)
            .set_json(json!({ "email": "nobody@example.com", "password": "secret123" }))
            .to_request()
    };

    for _ in 0..3 {
        let resp = test::call_service(&app, login(client)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    let resp = test::call_service(&app, login(client)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);

    let resp = test::call_service(&app, login(other)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_forwarded_for_rotation_does_not_bypass_limit() {
    let (state, _store) = test_state_with(&[("LOGIN_RATE_LIMIT", "3")]);
    let app = test::init_service(build_app(state)).await;
    let client: SocketAddr = "203.0.113.7:40000".parse().unwrap();

    let mut statuses = Vec::new();
    for i in 0..8 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .peer_addr(client)
            .insert_header(("X-Forwarded-For", format!("10.0.0.{i}")))
            .set_json(json!({ "email": "nobody@example.com", "password": "secret123" }))
            .to_request();
        statuses.push(test::call_service(&app, req).await.status());
    }

    assert_eq!(&statuses[..3], &[StatusCode::UNAUTHORIZED; 3]);
    assert!(statuses[3..]
        .iter()
        .all(|status| *status == StatusCode::TOO_MANY_REQUESTS));
}

#[actix_web::test]
async fn test_trusted_proxy_limits_each_forwarded_client() {
    let (state, _store) = test_state_with(&[
        ("LOGIN_RATE_LIMIT", "1"),
        ("TRUSTED_PROXIES", "10.1.1.1"),
    ]);
    let app = test::init_service(build_app(state)).await;
    let proxy: SocketAddr = "10.1.1.1:443".parse().unwrap();

    let login = |client: &str| {
        test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .peer_addr(proxy)
            .insert_header(("X-Forwarded-For", client.to_string()))
            .set_json(json!({ "email": "nobody@example.com", "password": "secret123" }))
            .to_request()
    };

    let first = test::call_service(&app, login("198.51.100.1")).await;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    let second = test::call_service(&app, login("198.51.100.2")).await;
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    let repeat = test::call_service(&app, login("198.51.100.1")).await;
    assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
}
