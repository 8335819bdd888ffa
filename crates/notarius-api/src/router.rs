//! Axum router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use notarius_verifier::Verifier;

use crate::handlers::{health_handler, verify_handler};

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The verifier, built once at startup and shared read-only.
    pub verifier: Arc<Verifier>,
}

impl AppState {
    /// Wrap a verifier for sharing across requests.
    pub fn new(verifier: Verifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }
}

/// Build the Axum application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/verify", post(verify_handler))
        .with_state(state)
}
