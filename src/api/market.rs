//! Market API
//!
//! Endpoints:
//! - GET /api/market/players - Player list with current prices
//! - GET /api/market/players/:id - Full player record with stats and history
//! - GET /api/market/flash-multipliers - Active flash multipliers
//! - GET /api/market/trades - Public feed of recent trades
//! - GET /api/market/stats - Simulation counters
//! - POST /api/market/admin/shock - Multiply a player's price
//! - POST /api/market/admin/flash - Shock a player and raise a flash multiplier

use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::types::{FlashMultiplier, Player, PlayerSummary, Trade};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Create market router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/players", get(list_players))
        .route("/players/:id", get(get_player))
        .route("/flash-multipliers", get(list_flash_multipliers))
        .route("/trades", get(list_recent_trades))
        .route("/stats", get(get_stats))
        .route("/admin/shock", post(trigger_shock))
        .route("/admin/flash", post(trigger_flash))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub ticks: u64,
    pub players: usize,
    pub portfolios: usize,
    pub online: usize,
    pub pending_limit_orders: usize,
    pub active_flash_multipliers: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShockRequest {
    pub player_id: String,
    pub multiplier: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashRequest {
    pub player_id: String,
    pub multiplier: f64,
    pub description: Option<String>,
}

/// GET /api/market/players
async fn list_players(State(state): State<AppState>) -> Json<ApiResponse<Vec<PlayerSummary>>> {
    let players = state
        .trading
        .get_players()
        .iter()
        .map(PlayerSummary::from)
        .collect();
    Json(ApiResponse { data: players })
}

/// GET /api/market/players/:id
async fn get_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Player>>> {
    let player = state
        .registry
        .find(&id)
        .ok_or_else(|| AppError::NotFound(format!("player {}", id)))?;
    Ok(Json(ApiResponse { data: player }))
}

/// GET /api/market/flash-multipliers
async fn list_flash_multipliers(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<FlashMultiplier>>> {
    Json(ApiResponse {
        data: state.trading.active_flash_multipliers(),
    })
}

/// GET /api/market/trades
async fn list_recent_trades(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<Trade>>> {
    let limit = query.limit.unwrap_or(50).min(500);
    Json(ApiResponse {
        data: state.trading.recent_trades(limit),
    })
}

/// GET /api/market/stats
async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StatsResponse>> {
    Json(ApiResponse {
        data: StatsResponse {
            ticks: state.engine.tick_count(),
            players: state.registry.len(),
            portfolios: state.ledger.len(),
            online: state.room_manager.client_count(),
            pending_limit_orders: state.limit_orders.pending_count(),
            active_flash_multipliers: state.flashes.len(),
        },
    })
}

/// POST /api/market/admin/shock
async fn trigger_shock(
    State(state): State<AppState>,
    Json(request): Json<ShockRequest>,
) -> Result<Json<ApiResponse<Player>>> {
    let reason = request.reason.as_deref().unwrap_or("admin shock");
    if !state
        .trading
        .trigger_shock(&request.player_id, request.multiplier, reason)
    {
        return Err(AppError::BadRequest(format!(
            "cannot shock {} by {}",
            request.player_id, request.multiplier
        )));
    }
    let player = state
        .registry
        .get(&request.player_id)
        .ok_or_else(|| AppError::NotFound(format!("player {}", request.player_id)))?;
    Ok(Json(ApiResponse { data: player }))
}

/// POST /api/market/admin/flash
async fn trigger_flash(
    State(state): State<AppState>,
    Json(request): Json<FlashRequest>,
) -> Result<Json<ApiResponse<FlashMultiplier>>> {
    let flash = state.game_events.trigger_flash(
        &request.player_id,
        request.multiplier,
        request.description,
    )?;
    Ok(Json(ApiResponse { data: flash }))
}
