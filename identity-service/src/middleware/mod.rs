pub mod auth;
pub mod client;
pub mod rate_limit;

pub use auth::AuthUser;
pub use client::ClientMetadata;
pub use rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter};
