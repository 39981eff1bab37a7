pub mod auth;
pub mod cors;
pub mod rate_limit;
pub mod security;

pub use auth::{auth_middleware, AuthenticatedUser, TOKEN_COOKIE};
pub use cors::{cors_gate, is_origin_allowed, CorsPolicy};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use security::security_headers;
