use std::sync::Arc;

use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware::{from_fn, Logger, NormalizePath},
    web, App, Error,
};

use crate::{
    auth_token::AuthTokenService,
    config::AppConfig,
    db::Store,
    error::ApiError,
    handlers,
    middleware::{auth_middleware, cors_gate, security_headers, CorsPolicy, RateLimiter},
};

pub const API_PREFIX: &str = "/api/v1";

/// Everything the request pipeline shares. Cloned into each worker.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub tokens: AuthTokenService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, tokens: AuthTokenService) -> Self {
        let rate_limiter = RateLimiter::new(config.login_rate_limit)
            .with_trusted_proxies(config.trusted_proxies.clone());
        Self {
            config,
            store,
            tokens,
            rate_limiter,
        }
    }
}

/// Builds the application: shared state, extractor error mapping, the
/// middleware chain and the three route groups.
///
/// Middleware runs outermost first: access log, CORS gate, CORS headers and
/// preflight, security headers, path normalisation. Book and note routes
/// share the one `/books` scope, since a second scope with the same prefix
/// would never be reached.
pub fn build_app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let json_config = web::JsonConfig::default()
        .limit(state.config.json_limit_bytes)
        .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid JSON body: {err}")).into());
    let path_config = web::PathConfig::default()
        .error_handler(|err, _req| ApiError::NotFound(err.to_string()).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid query string: {err}")).into());

    let cors_policy = CorsPolicy::new(state.config.allowed_origins.clone());

    App::new()
        // Shared state
        .app_data(json_config)
        .app_data(path_config)
        .app_data(query_config)
        .app_data(web::Data::new(cors_policy.clone()))
        .app_data(web::Data::from(state.store))
        .app_data(web::Data::new(state.tokens))
        .app_data(web::Data::new(state.rate_limiter))
        .app_data(web::Data::new(state.config))
        // Middleware
        .wrap(NormalizePath::trim())
        .wrap(security_headers())
        .wrap(cors_policy.layer())
        .wrap(from_fn(cors_gate))
        .wrap(Logger::default())
        // Routes
        .service(web::scope(&format!("{API_PREFIX}/auth")).configure(handlers::auth::configure))
        .service(
            web::scope(&format!("{API_PREFIX}/profile"))
                .wrap(from_fn(auth_middleware))
                .configure(handlers::auth::configure),
        )
        .service(
            web::scope(&format!("{API_PREFIX}/books"))
                .wrap(from_fn(auth_middleware))
                .configure(handlers::books::configure)
                .configure(handlers::notes::configure),
        )
        .default_service(web::to(handlers::not_found))
}
