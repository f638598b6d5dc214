pub mod error;
pub mod pages;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use std::path::Path;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::adapters::http::state::HttpState;

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/upload", get(routes::upload_form))
        .route("/predict", post(routes::predict))
        .route("/api/predict", post(routes::predict_json))
        .route("/health", get(routes::health))
        .with_state(state)
}

/// Rutas + archivos estáticos (subidas y salidas anotadas) + límites.
pub fn app(state: HttpState, static_dir: &Path, max_upload_bytes: usize) -> Router {
    router(state)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}
