pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::middleware::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter};
use crate::services::{
    InviteService, JwtService, RegistrationService, SessionManager, TokenHasher,
    VerificationService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub pool: PgPool,
    pub sessions: SessionManager,
    pub registration: RegistrationService,
    pub verification: VerificationService,
    pub invites: InviteService,
    pub register_rate_limiter: IpRateLimiter,
    pub login_rate_limiter: IpRateLimiter,
    pub invite_accept_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(
        config: IdentityConfig,
        pool: PgPool,
        hasher: Arc<TokenHasher>,
        jwt: Arc<JwtService>,
    ) -> Self {
        let verification = VerificationService::new(pool.clone(), hasher.clone());
        let registration = RegistrationService::new(pool.clone(), verification.clone());
        let invites = InviteService::new(pool.clone(), hasher.clone(), config.app.public_url.clone());
        let sessions = SessionManager::new(
            pool.clone(),
            hasher,
            jwt,
            config.jwt.refresh_token_expiry_days,
        );

        let limits = &config.rate_limit;
        let register_rate_limiter =
            create_ip_rate_limiter(limits.register_attempts, limits.register_window_seconds);
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let invite_accept_rate_limiter = create_ip_rate_limiter(
            limits.invite_accept_attempts,
            limits.invite_accept_window_seconds,
        );
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Self {
            config,
            pool,
            sessions,
            registration,
            verification,
            invites,
            register_rate_limiter,
            login_rate_limiter,
            invite_accept_rate_limiter,
            ip_rate_limiter,
        }
    }
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    match db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "service": state.config.service_name,
                "version": state.config.service_version,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unhealthy" })),
            )
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

pub fn build_router(state: AppState) -> Router {
    // Email-producing endpoints share one budget per IP.
    let register_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/verify/resend", post(handlers::auth::resend_verification))
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let login_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let invite_accept_routes = Router::new()
        .route("/invites/accept", post(handlers::invites::accept_invite))
        .layer(from_fn_with_state(
            state.invite_accept_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/auth/verify", get(handlers::auth::verify_email))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/logout/all", post(handlers::auth::logout_all))
        .route(
            "/invites",
            post(handlers::invites::create_invite).get(handlers::invites::list_invites),
        )
        .route("/invites/preview", get(handlers::invites::preview_invite))
        .route("/invites/:invite_id", delete(handlers::invites::revoke_invite))
        .merge(register_routes)
        .merge(login_routes)
        .merge(invite_accept_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}
