//! Shared fixtures for integration tests.

#![allow(dead_code)]

use courtside::config::Config;
use courtside::services::PortfolioStore;
use courtside::types::{PlayerSeed, PlayerStats};
use courtside::AppState;
use std::sync::Arc;

pub fn seed(id: &str, price: f64) -> PlayerSeed {
    PlayerSeed {
        id: id.to_string(),
        name: format!("Player {}", id),
        team: "TST".to_string(),
        position: "G".to_string(),
        base_price: price,
        volatility: 0.05,
        stats: PlayerStats::default(),
    }
}

/// Config with a 1000 balance, one live trade and market impact toggled.
pub fn config(market_impact: bool) -> Config {
    let mut config = Config::default();
    config.trading.starting_balance = 1000.0;
    config.trading.live_trades_per_session = 1;
    config.trading.apply_market_impact = market_impact;
    config
}

pub fn state_with(config: Config, store: Option<Arc<dyn PortfolioStore>>) -> AppState {
    AppState::assemble(
        config,
        vec![seed("e", 100.0), seed("f", 50.0), seed("g", 10.0)],
        store,
    )
}

/// In-memory state without market impact.
pub fn state() -> AppState {
    state_with(config(false), None)
}
