//! Axum router wiring.
//!
//! Ops endpoints are served directly; every other path goes through the
//! instrumented handler chain.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .fallback(transport::serve_instrumented)
        .with_state(state)
}
