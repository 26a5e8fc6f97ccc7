use axum::{
    Json, Router,
    http::{StatusCode, Uri},
    routing::get,
};

use crate::{error::ErrorBody, state::AppState};

pub mod cart;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart::router())
        .nest("/orders", orders::route())
        .nest("/payments", payments::router())
}

/// Full application router, without the outer HTTP layers.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", create_api_router())
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ErrorBody>) {
    let body = ErrorBody {
        error: format!("No route for {}", uri.path()),
        details: None,
    };
    (StatusCode::NOT_FOUND, Json(body))
}
