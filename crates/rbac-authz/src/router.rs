//! Axum router wiring.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, ops, service};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/check", post(service::check))
        .route("/v1/reload", post(service::reload))
        .route("/metrics", get(ops::metrics))
        .route("/healthz", get(ops::healthz))
        .with_state(state)
}
