pub mod auth;
pub mod health;
pub mod market;
pub mod trading;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/auth", auth::router())
        .nest("/api/market", market::router())
        .nest("/api/trading", trading::router())
}
