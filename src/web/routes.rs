use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - REST API consumed by the SQL editor frontend
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::api::service_info))
        .route("/health", get(handlers::api::health_check))
        .route("/generate-sql", post(handlers::api::generate_sql))
}
