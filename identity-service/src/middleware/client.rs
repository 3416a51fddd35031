use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, Extensions, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use crate::models::RequestMetadata;

const MAX_USER_AGENT_LEN: usize = 512;

/// First `x-forwarded-for` hop, else the socket peer.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// User agent and client IP, recorded on sessions and tokens.
pub struct ClientMetadata(pub RequestMetadata);

#[async_trait]
impl<S> FromRequestParts<S> for ClientMetadata
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

        let ip_address = client_ip(&parts.headers, &parts.extensions).map(|ip| ip.to_string());

        Ok(ClientMetadata(RequestMetadata {
            user_agent,
            ip_address,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));

        assert_eq!(
            client_ip(&headers, &extensions),
            Some("203.0.113.7".parse().unwrap())
        );
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4242))));

        assert_eq!(
            client_ip(&headers, &extensions),
            Some("192.0.2.1".parse().unwrap())
        );
        assert_eq!(client_ip(&headers, &Extensions::new()), None);
    }
}
