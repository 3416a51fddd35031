use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use service_core::error::AppError;
use std::{net::IpAddr, num::NonZeroU32, sync::Arc, time::Duration};

use super::client::client_ip;

/// Rate limiter keyed by client IP.
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// `attempts` requests per `window_seconds`, refilled evenly, bursting up to `attempts`.
pub fn quota(attempts: u32, window_seconds: u64) -> Quota {
    let burst = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let window_ms = window_seconds.max(1) * 1000;
    let period = Duration::from_millis((window_ms / u64::from(burst.get())).max(1));

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    Arc::new(RateLimiter::dashmap(quota(attempts, window_seconds)))
}

pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ip) = client_ip(request.headers(), request.extensions()) else {
        tracing::warn!("Could not determine client IP for rate limiting");
        return Ok(next.run(request).await);
    };

    match limiter.check_key(&ip) {
        Ok(_) => Ok(next.run(request).await),
        Err(negative) => {
            let wait_time = negative.wait_time_from(DefaultClock::default().now());
            tracing::info!(client_ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::TooManyRequests(
                "Too many requests from this IP. Please try again later.".to_string(),
                Some(wait_time.as_secs().max(1)),
            ))
        }
    }
}
