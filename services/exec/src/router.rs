//! Axum Router Configuration

use crate::{handlers, state::AppState};
use axum::{Router, routing::post};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/execute", post(handlers::execute))
        .with_state(app_state)
}
