use std::future::{ready, Ready};

use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{Payload, ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web, FromRequest, HttpMessage, HttpRequest,
};
use mongodb::bson::oid::ObjectId;

use crate::auth_token::{now_ms, AuthTokenService};
use crate::error::ApiError;

pub const TOKEN_COOKIE: &str = "token";

/// Identity resolved by the auth gate, available to handlers as an extractor.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: ObjectId,
    pub name: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(ApiError::Unauthorized),
        )
    }
}

/// The `token` cookie wins over an `Authorization: Bearer` header.
pub fn request_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn resolve_identity(req: &ServiceRequest) -> Result<AuthenticatedUser, ApiError> {
    let token = request_token(req.request()).ok_or(ApiError::Unauthorized)?;

    let tokens = req
        .app_data::<web::Data<AuthTokenService>>()
        .ok_or_else(|| ApiError::Internal("Token service not available".to_string()))?;

    let claims = tokens.verify(&token, now_ms()).map_err(|err| {
        log::debug!("Rejected token on {}: {}", req.path(), err);
        ApiError::Unauthorized
    })?;

    let user_id = ObjectId::parse_str(&claims.user_id).map_err(|_| ApiError::Unauthorized)?;

    Ok(AuthenticatedUser {
        user_id,
        name: claims.name,
    })
}

/// Rejections are rendered as responses so outer middleware still decorates
/// them.
pub async fn auth_middleware<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, actix_web::Error> {
    match resolve_identity(&req) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            Ok(next.call(req).await?.map_into_left_body())
        }
        Err(err) => Ok(req.error_response(err).map_into_right_body()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{cookie::Cookie, test::TestRequest};

    #[test]
    fn test_cookie_token() {
        let req = TestRequest::default()
            .cookie(Cookie::new(TOKEN_COOKIE, "from-cookie"))
            .insert_header((header::AUTHORIZATION, "Bearer from-header"))
            .to_http_request();

        assert_eq!(request_token(&req).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_token() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def"))
            .to_http_request();

        assert_eq!(request_token(&req).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_empty_cookie_falls_back_to_header() {
        let req = TestRequest::default()
            .cookie(Cookie::new(TOKEN_COOKIE, ""))
            .insert_header((header::AUTHORIZATION, "Bearer abc.def"))
            .to_http_request();

        assert_eq!(request_token(&req).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_other_schemes_ignored() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(request_token(&req).is_none());

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer "))
            .to_http_request();
        assert!(request_token(&req).is_none());
    }
}
