#![allow(dead_code)]

use std::sync::Arc;

use actix_web::{cookie::Cookie, http::header, test::TestRequest};
use mongodb::bson::oid::ObjectId;
use textmate_server::auth_token::{now_ms, AuthTokenService};
use textmate_server::config::{AppConfig, FileConfig};
use textmate_server::db::MemoryStore;
use textmate_server::middleware::TOKEN_COOKIE;
use textmate_server::AppState;

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const FRONTEND: &str = "http://localhost:5173";

pub fn test_config(extra: &[(&str, &str)]) -> AppConfig {
    let mut vars = vec![
        ("MONGO_URI".to_string(), "mongodb://unused:27017".to_string()),
        ("AUTH_TOKEN_SECRET".to_string(), SECRET.to_string()),
    ];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    AppConfig::from_sources(FileConfig::default(), |key| {
        vars.iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .expect("valid test config")
}

pub fn test_state_with(extra: &[(&str, &str)]) -> (AppState, MemoryStore) {
    let config = test_config(extra);
    let store = MemoryStore::new();
    let tokens = AuthTokenService::new(SECRET.as_bytes().to_vec(), config.auth_token_ttl)
        .expect("valid token service");

    (AppState::new(config, Arc::new(store.clone()), tokens), store)
}

pub fn test_state() -> (AppState, MemoryStore) {
    test_state_with(&[])
}

pub fn token_for(state: &AppState, user_id: ObjectId) -> String {
    state
        .tokens
        .issue_user_token(user_id.to_hex(), "Reader".to_string(), now_ms())
        .expect("issue token")
}

/// Request carrying the session cookie for `user_id`.
pub fn authed(req: TestRequest, state: &AppState, user_id: ObjectId) -> TestRequest {
    req.cookie(Cookie::new(TOKEN_COOKIE, token_for(state, user_id)))
}

pub fn with_origin(req: TestRequest, origin: &str) -> TestRequest {
    req.insert_header((header::ORIGIN, origin))
}
