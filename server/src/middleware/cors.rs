use actix_cors::Cors;
use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::{
        header::{self, HeaderValue},
        Method,
    },
    middleware::Next,
    web,
};

use crate::error::ApiError;

pub const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];
pub const ALLOWED_HEADERS: [header::HeaderName; 2] = [header::CONTENT_TYPE, header::AUTHORIZATION];

/// An absent or empty origin is a same-origin or non-browser request.
pub fn is_origin_allowed(origin: Option<&str>, allow_list: &[String]) -> bool {
    match origin {
        None | Some("") => true,
        Some(origin) => allow_list.iter().any(|allowed| allowed == origin),
    }
}

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    pub fn allows(&self, origin: Option<&str>) -> bool {
        is_origin_allowed(origin, &self.allowed_origins)
    }

    /// Preflight handling and the `Access-Control-*` response headers for
    /// origins that passed [`cors_gate`].
    pub fn layer(&self) -> Cors {
        let allowed_origins = self.allowed_origins.clone();

        Cors::default()
            .allowed_origin_fn(move |origin, _head| {
                is_origin_allowed(origin.to_str().ok(), &allowed_origins)
            })
            .allowed_methods(ALLOWED_METHODS)
            .allowed_headers(ALLOWED_HEADERS)
            .supports_credentials()
    }
}

/// Rejects foreign origins with the uniform 403 before routing, auth or any
/// handler runs. Requests without an origin pass untouched apart from
/// `Vary: Origin`.
pub async fn cors_gate<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, actix_web::Error> {
    let policy = req
        .app_data::<web::Data<CorsPolicy>>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("CORS policy not available".to_string()))?;

    // A non-ASCII origin can't be on the list; treat it like a foreign one.
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .map(|value| value.to_str().unwrap_or("\u{fffd}").to_string());

    if !policy.allows(origin.as_deref()) {
        log::warn!(
            "Rejected {} {} from origin {:?}",
            req.method(),
            req.path(),
            origin
        );
        return Ok(req
            .error_response(ApiError::CorsRejected)
            .map_into_right_body());
    }

    let has_origin = origin.is_some_and(|origin| !origin.is_empty());
    let mut res = next.call(req).await?.map_into_left_body();

    if !has_origin {
        res.headers_mut()
            .append(header::VARY, HeaderValue::from_static("Origin"));
    }

    Ok(res)
}
