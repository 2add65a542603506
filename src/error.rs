use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Settlement, order and portfolio errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TradingError {
    #[error("Portfolio not found: {0}")]
    PortfolioNotFound(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: u32, held: u32 },

    #[error("Live trade limit reached for this session")]
    TradeLimitExceeded,

    #[error("Price {price:.2} no longer satisfies limit {limit:.2}")]
    LimitNotReached { price: f64, limit: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend unavailable: {0}")]
    TransientBackendFailure(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl TradingError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            TradingError::PortfolioNotFound(_)
            | TradingError::PlayerNotFound(_)
            | TradingError::OrderNotFound(_) => "NOT_FOUND",
            TradingError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TradingError::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            TradingError::TradeLimitExceeded => "TRADE_LIMIT_EXCEEDED",
            TradingError::LimitNotReached { .. } => "LIMIT_NOT_REACHED",
            TradingError::InvalidInput(_) => "INVALID_INPUT",
            TradingError::TransientBackendFailure(_) => "BACKEND_UNAVAILABLE",
            TradingError::Unauthorized(_) => "UNAUTHORIZED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TradingError::PortfolioNotFound(_)
            | TradingError::PlayerNotFound(_)
            | TradingError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            TradingError::InsufficientFunds { .. }
            | TradingError::InsufficientShares { .. }
            | TradingError::TradeLimitExceeded
            | TradingError::LimitNotReached { .. }
            | TradingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TradingError::TransientBackendFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            TradingError::Unauthorized(_) => StatusCode::FORBIDDEN,
        }
    }
}

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Trading(#[from] TradingError),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg.clone())
            }
            AppError::Trading(e) => (e.status(), e.code(), e.to_string()),
            AppError::SerdeJson(e) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string()),
            AppError::Anyhow(e) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", e.to_string()),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
