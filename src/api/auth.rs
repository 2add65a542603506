//! Authentication API
//!
//! Endpoints:
//! - GET /api/auth/me - Identity behind the bearer token
//! - POST /api/auth/logout - Revoke the bearer token

use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::ApiResponse;
use crate::services::AuthError;
use crate::types::Identity;
use crate::AppState;

/// Create auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/logout", post(logout))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// GET /api/auth/me
async fn get_me(auth: Authenticated) -> Json<ApiResponse<Identity>> {
    Json(ApiResponse {
        data: auth.identity,
    })
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<LogoutResponse>> {
    let success = state.auth.revoke(&auth.token);
    Json(ApiResponse {
        data: LogoutResponse { success },
    })
}

/// Authenticated caller extractor.
///
/// Requires an `Authorization: Bearer <token>` header that the configured
/// identity resolver accepts.
pub struct Authenticated {
    pub identity: Identity,
    pub token: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingToken)?;

        let identity = state.identity.verify(token)?;

        Ok(Authenticated {
            identity,
            token: token.to_string(),
        })
    }
}
