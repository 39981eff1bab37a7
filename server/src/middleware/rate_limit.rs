use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ApiError;

pub const WINDOW_DURATION: Duration = Duration::from_secs(60);

/// Sliding-window request counter keyed by client IP, applied to the
/// credential endpoints.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<DashMap<IpAddr, Vec<Instant>>>,
    max_requests: usize,
    trusted_proxies: Arc<[IpAddr]>,
}

impl RateLimiter {
    pub fn new(max_requests: usize) -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
            max_requests,
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    /// Only these peers may name the client through forwarding headers.
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = Arc::from(proxies);
        self
    }

    /// The peer address, or the forwarded client address when the peer is a
    /// trusted proxy.
    pub fn client_ip(&self, req: &ServiceRequest) -> Option<IpAddr> {
        let peer = req.peer_addr()?.ip();
        if !self.trusted_proxies.contains(&peer) {
            return Some(peer);
        }

        let forwarded = req
            .connection_info()
            .realip_remote_addr()
            .and_then(|addr| {
                addr.parse::<IpAddr>()
                    .ok()
                    .or_else(|| addr.parse::<SocketAddr>().ok().map(|sock| sock.ip()))
            });

        Some(forwarded.unwrap_or(peer))
    }

    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let cutoff = now.checked_sub(WINDOW_DURATION);

        let mut entry = self.requests.entry(ip).or_default();

        if let Some(cutoff) = cutoff {
            entry.retain(|&timestamp| timestamp > cutoff);
        }

        if entry.len() >= self.max_requests {
            return false;
        }

        entry.push(now);
        true
    }

    pub fn cleanup_old_entries(&self) {
        let Some(cutoff) = Instant::now().checked_sub(WINDOW_DURATION) else {
            return;
        };

        self.requests.retain(|_, timestamps| {
            timestamps.retain(|&timestamp| timestamp > cutoff);
            !timestamps.is_empty()
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.requests.len()
    }
}

pub async fn rate_limit_middleware<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, actix_web::Error> {
    let rate_limiter = req
        .app_data::<web::Data<RateLimiter>>()
        .ok_or_else(|| ApiError::Internal("Rate limiter not available".to_string()))?;

    match rate_limiter.client_ip(&req) {
        Some(ip) => {
            if !rate_limiter.check_rate_limit(ip) {
                log::warn!("Rate limit exceeded for IP: {}", ip);
                return Ok(req
                    .error_response(ApiError::RateLimitExceeded)
                    .map_into_right_body());
            }
        }
        None => log::debug!("No client address for {}, not rate limited", req.path()),
    }

    Ok(next.call(req).await?.map_into_left_body())
}
