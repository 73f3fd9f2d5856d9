pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use service_core::observability::REQUEST_ID_HEADER;
use tower_http::{cors::{Any, CorsLayer}, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::providers::{CodeExchangeProvider, IdentityTokenVerifier};
use crate::services::{ApiKeyManager, Checksum, JwtService, SessionManager, SigninOrchestrator, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IdentityConfig>,
    pub store: Arc<dyn Store>,
    pub api_keys: ApiKeyManager,
    pub sessions: SessionManager,
    pub signin: SigninOrchestrator,
}

impl AppState {
    /// Wire the managers over `store` and the two identity providers.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn Store>,
        github: Arc<dyn CodeExchangeProvider>,
        google: Arc<dyn IdentityTokenVerifier>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let checksum = Checksum::new(&config.api_key.checksum_secret).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("invalid API key checksum secret: {}", e))
        })?;
        let auth_state_ttl = chrono::Duration::minutes(config.sessions.auth_state_ttl_minutes);

        let api_keys = ApiKeyManager::new(store.clone(), checksum);
        let sessions = SessionManager::new(
            store.clone(),
            JwtService::new(&config.jwt),
            auth_state_ttl,
        );
        let signin = SigninOrchestrator::new(
            store.clone(),
            sessions.clone(),
            github,
            google,
            config.google.client_id.clone(),
            auth_state_ttl,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            api_keys,
            sessions,
            signin,
        })
    }
}

fn cors_layer(config: &IdentityConfig) -> CorsLayer {
    let origins = config
        .security
        .allowed_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    let cors = if config.security.allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins).allow_credentials(true)
    };

    cors.allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

pub fn build_router(state: AppState) -> Router {
    // Refresh token guard
    let refresh_routes = Router::new()
        .route("/auth/refresh", post(handlers::session::refresh))
        .route("/auth/signout", delete(handlers::session::signout))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::refresh_token_middleware,
        ));

    // Access token guard
    let user_routes = Router::new()
        .route("/auth/session", get(handlers::session::get_session))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::access_token_middleware,
        ));

    // API key guard
    let sdk_routes = Router::new()
        .route("/sdk/app", get(handlers::sdk::current_app))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::api_key_middleware,
        ));

    let timeout = Duration::from_secs(state.config.common.request_timeout_seconds);
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/auth/github", post(handlers::oauth::github_signin))
        .route("/auth/google", post(handlers::oauth::google_signin))
        .merge(refresh_routes)
        .merge(user_routes)
        .merge(sdk_routes)
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
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
        .layer(cors)
}
