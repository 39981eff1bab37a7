use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    get,
    middleware::from_fn,
    post, put, web, HttpResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::required_text;
use crate::{
    auth_token::{now_ms, AuthTokenService},
    config::AppConfig,
    db::{Store, User, UserChanges},
    error::{ApiError, Result},
    extract::CleanJson,
    middleware::{rate_limit_middleware, AuthenticatedUser, TOKEN_COOKIE},
};

const MIN_PASSWORD_LEN: usize = 6;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(logout)
        .service(current_user)
        .service(update_user);
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: UserInfo,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_ascii_lowercase();
    if email.is_empty() {
        return Err(ApiError::BadRequest("Please provide email".to_string()));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Please provide a valid email".to_string()));
    }
    Ok(email)
}

fn validate_name(raw: &str) -> Result<String> {
    let name = required_text("name", raw, 50)?;
    if name.chars().count() < 3 {
        return Err(ApiError::BadRequest(
            "name must be at least 3 characters".to_string(),
        ));
    }
    Ok(name)
}

fn cookie_max_age(config: &AppConfig) -> CookieDuration {
    i64::try_from(config.auth_token_ttl.as_secs())
        .map(CookieDuration::seconds)
        .unwrap_or(CookieDuration::MAX)
}

fn token_cookie(token: String, config: &AppConfig) -> Cookie<'static> {
    let same_site = if config.cookie_secure {
        SameSite::None
    } else {
        SameSite::Lax
    };

    Cookie::build(TOKEN_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(same_site)
        .max_age(cookie_max_age(config))
        .finish()
}

fn issue_token(tokens: &AuthTokenService, user: &User) -> Result<String> {
    let user_id = user
        .id
        .ok_or_else(|| ApiError::Internal("User should have ID".to_string()))?;

    tokens
        .issue_user_token(user_id.to_hex(), user.name.clone(), now_ms())
        .map_err(|err| ApiError::Internal(format!("Failed to issue auth token: {err}")))
}

fn signed_in(
    mut response: actix_web::HttpResponseBuilder,
    user: User,
    tokens: &AuthTokenService,
    config: &AppConfig,
) -> Result<HttpResponse> {
    let token = issue_token(tokens, &user)?;

    Ok(response
        .cookie(token_cookie(token.clone(), config))
        .json(AuthResponse {
            success: true,
            user: user.into(),
            token,
        }))
}

#[post("/register", wrap = "from_fn(rate_limit_middleware)")]
pub async fn register(
    req: CleanJson<RegisterRequest>,
    store: web::Data<dyn Store>,
    tokens: web::Data<AuthTokenService>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let name = validate_name(&req.name)?;
    let email = normalize_email(&req.email)?;
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    // bcrypt is CPU bound; keep it off the async worker.
    let user = web::block(move || User::new(name, email, &req.password))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))??;

    let user = store.create_user(user).await?;
    log::info!("Registered user {}", user.email);

    signed_in(HttpResponse::Created(), user, &tokens, &config)
}

#[post("/login", wrap = "from_fn(rate_limit_middleware)")]
pub async fn login(
    req: CleanJson<LoginRequest>,
    store: web::Data<dyn Store>,
    tokens: web::Data<AuthTokenService>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let email = req.email.trim().to_ascii_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Please provide email and password".to_string(),
        ));
    }

    let user = store.find_user_by_email(&email).await?;

    // An unknown email still pays for a bcrypt check.
    let password = req.password;
    let (user, matches) = web::block(move || match user {
        Some(user) => {
            let matches = user.verify_password(&password);
            (Some(user), matches)
        }
        None => (None, Ok(User::verify_missing(&password))),
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))?;

    let user = match (user, matches?) {
        (Some(user), true) => user,
        _ => {
            log::warn!("Failed login attempt for user: {}", email);
            return Err(ApiError::InvalidCredentials);
        }
    };
    log::info!("Successful login for user: {}", email);
    signed_in(HttpResponse::Ok(), user, &tokens, &config)
}

#[post("/logout")]
pub async fn logout() -> Result<HttpResponse> {
    let cookie = Cookie::build(TOKEN_COOKIE, "")
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::seconds(0))
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(LogoutResponse {
        success: true,
        message: "User logged out".to_string(),
    }))
}

#[get("/user")]
pub async fn current_user(
    identity: AuthenticatedUser,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let user = store
        .find_user(&identity.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(HttpResponse::Ok().json(UserResponse {
        success: true,
        user: user.into(),
    }))
}

#[put("/user")]
pub async fn update_user(
    identity: AuthenticatedUser,
    req: CleanJson<UpdateUserRequest>,
    store: web::Data<dyn Store>,
    tokens: web::Data<AuthTokenService>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    if req.name.is_none() && req.email.is_none() {
        return Err(ApiError::BadRequest(
            "Please provide name or email".to_string(),
        ));
    }

    let changes = UserChanges {
        name: req.name.as_deref().map(validate_name).transpose()?,
        email: req.email.as_deref().map(normalize_email).transpose()?,
    };

    let user = store
        .update_user(&identity.user_id, changes)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    log::info!("Updated profile for user {}", identity.user_id.to_hex());

    // The token carries the display name, so it is reissued.
    signed_in(HttpResponse::Ok(), user, &tokens, &config)
}
