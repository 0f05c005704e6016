//! HTTP routes
//!
//! - `GET  /health`
//! - `POST /api/v0.0.0/challenge`
//! - `POST /api/v0.0.0/verify`
//! - `POST /api/v0.0.0/eas` (API key)
//! - `POST /api/v0.0.0/eas/score` (API key)

pub mod challenge;
pub mod eas;
pub mod health;
pub mod verify;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::rate_limit::enforce;
use crate::state::AppState;

/// Prefix of the versioned API
pub const API_PREFIX: &str = "/api/v0.0.0";

/// Build the service router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::HeaderName::from_static("x-api-key"),
        ]);

    let gated = Router::new()
        .route("/eas", post(eas::attest_stamps))
        .route("/eas/score", post(eas::attest_score))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            enforce,
        ));

    let api = Router::new()
        .route("/challenge", post(challenge::challenge))
        .route("/verify", post(verify::verify))
        .merge(gated);

    Router::new()
        .route("/health", get(health::health))
        .nest(API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
