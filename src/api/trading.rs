//! Trading API
//!
//! All endpoints act on the caller identified by the bearer token.
//!
//! Leaderboard:
//! - GET /api/trading/leaderboard - Portfolios ranked by total value
//!
//! Portfolio:
//! - POST /api/trading/portfolio - Open (or load) the caller's portfolio
//! - GET /api/trading/portfolio - Get the caller's portfolio
//! - POST /api/trading/portfolio/live-session - Start a new live session
//!
//! Trades:
//! - POST /api/trading/trades - Execute a market order
//! - GET /api/trading/trades - Trade history, newest first
//!
//! Limit orders:
//! - GET /api/trading/orders - The caller's limit orders
//! - POST /api/trading/orders - Place a limit order
//! - DELETE /api/trading/orders/:id - Cancel a pending limit order

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::auth::Authenticated;
use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::services::trading::{parse_book, parse_direction};
use crate::types::{LeaderboardEntry, LimitOrder, Portfolio, Trade};
use crate::AppState;

/// Create trading router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/leaderboard", get(get_leaderboard))
        .route("/portfolio", post(open_portfolio).get(get_portfolio))
        .route("/portfolio/live-session", post(reset_live_session))
        .route("/trades", post(execute_trade).get(list_trades))
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/:id", delete(cancel_order))
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub player_id: String,
    pub direction: String,
    pub shares: i64,
    #[serde(default = "default_book")]
    pub account_book: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrderRequest {
    pub player_id: String,
    pub direction: String,
    pub shares: i64,
    pub limit_price: f64,
    #[serde(default = "default_book")]
    pub account_book: String,
}

fn default_book() -> String {
    "season".to_string()
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/trading/leaderboard
async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<LeaderboardEntry>>> {
    let limit = query.limit.unwrap_or(10).min(100);
    Json(ApiResponse {
        data: state.trading.leaderboard(limit),
    })
}

/// POST /api/trading/portfolio
async fn open_portfolio(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<Portfolio>> {
    Json(ApiResponse {
        data: state.trading.open_portfolio(&auth.identity.user_id),
    })
}

/// GET /api/trading/portfolio
async fn get_portfolio(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<Portfolio>>> {
    let portfolio = state
        .trading
        .get_portfolio(&auth.identity.user_id)
        .ok_or_else(|| AppError::NotFound(format!("portfolio {}", auth.identity.user_id)))?;
    Ok(Json(ApiResponse { data: portfolio }))
}

/// POST /api/trading/portfolio/live-session
async fn reset_live_session(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<Portfolio>>> {
    let portfolio = state.trading.reset_live_session(&auth.identity.user_id)?;
    Ok(Json(ApiResponse { data: portfolio }))
}

/// POST /api/trading/trades
async fn execute_trade(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(request): Json<TradeRequest>,
) -> Result<Json<ApiResponse<Trade>>> {
    let direction = parse_direction(&request.direction)?;
    let book = parse_book(&request.account_book)?;
    let trade = state.trading.execute_trade(
        &auth.identity.user_id,
        &request.player_id,
        direction,
        request.shares,
        book,
    )?;
    Ok(Json(ApiResponse { data: trade }))
}

/// GET /api/trading/trades
async fn list_trades(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<Trade>>> {
    let limit = query.limit.unwrap_or(50).min(500);
    Json(ApiResponse {
        data: state
            .trading
            .get_trade_history(&auth.identity.user_id, limit),
    })
}

/// GET /api/trading/orders
async fn list_orders(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<Vec<LimitOrder>>> {
    Json(ApiResponse {
        data: state.limit_orders.orders_for_user(&auth.identity.user_id),
    })
}

/// POST /api/trading/orders
async fn place_order(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(request): Json<LimitOrderRequest>,
) -> Result<Json<ApiResponse<LimitOrder>>> {
    let direction = parse_direction(&request.direction)?;
    let book = parse_book(&request.account_book)?;
    let order = state.limit_orders.place(
        &auth.identity.user_id,
        &request.player_id,
        direction,
        request.shares,
        request.limit_price,
        book,
    )?;
    Ok(Json(ApiResponse { data: order }))
}

/// DELETE /api/trading/orders/:id
async fn cancel_order(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LimitOrder>>> {
    let order = state.limit_orders.cancel(&auth.identity.user_id, &id)?;
    Ok(Json(ApiResponse { data: order }))
}
