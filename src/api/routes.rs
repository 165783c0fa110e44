use crate::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(crate::api::handlers::health::health))
        .route("/runs", post(crate::api::handlers::research::create_run))
        .route("/runs/{id}/faq", post(crate::api::handlers::faq::ask))
}
