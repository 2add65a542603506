//! Persistence boundary for portfolios and trade records.
//!
//! The trading core never depends on a store being present; every call
//! site treats failures as best effort.

use crate::types::{Portfolio, Trade};
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for portfolios and the trade log.
pub trait PortfolioStore: Send + Sync {
    /// Load a user's portfolio, `None` if the user has never been saved.
    fn load_portfolio(&self, user_id: &str) -> Result<Option<Portfolio>, StoreError>;

    /// Insert or replace a user's portfolio.
    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError>;

    /// Append a trade record. Returns the stored id.
    fn append_trade(&self, trade: &Trade) -> Result<String, StoreError>;

    /// Most recent trades of a user, newest first.
    fn trades_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Trade>, StoreError>;
}
