//! Market Impact
//!
//! Pure calculation of how far a trade's own size moves a player's price.
//! Callers decide whether to apply the result.

use crate::types::{round_cents, ImpactLevel, MarketImpact, Player, TradeDirection, PRICE_FLOOR};

/// Notional share supply used to size the market cap.
pub const BASE_SUPPLY: f64 = 1_000_000.0;

/// Largest displacement a single trade can cause, either way.
pub const MAX_IMPACT: f64 = 0.10;

const MODERATE_THRESHOLD: f64 = 0.001;
const SIGNIFICANT_THRESHOLD: f64 = 0.005;
const MAJOR_THRESHOLD: f64 = 0.05;

/// Shares at or above which a trade is always broadcast.
pub const BROADCAST_SHARES: u32 = 100;

/// Size multiplier for large orders; the highest matching tier wins.
fn size_tier(shares: u32) -> f64 {
    if shares >= 500 {
        1.5
    } else if shares >= 250 {
        1.3
    } else if shares >= 100 {
        1.2
    } else {
        1.0
    }
}

/// Classify an absolute fractional impact.
pub fn classify(abs_impact: f64) -> ImpactLevel {
    if abs_impact >= MAJOR_THRESHOLD {
        ImpactLevel::Major
    } else if abs_impact >= SIGNIFICANT_THRESHOLD {
        // Covers the 2%..5% band as well.
        ImpactLevel::Significant
    } else if abs_impact >= MODERATE_THRESHOLD {
        ImpactLevel::Moderate
    } else {
        ImpactLevel::Minimal
    }
}

/// Compute the price displacement of a trade.
pub fn calculate(
    player: &Player,
    direction: TradeDirection,
    shares: u32,
    current_price: f64,
) -> MarketImpact {
    let trade_volume = shares as f64 * current_price;
    let market_cap = BASE_SUPPLY * current_price;
    let volume_ratio = if market_cap > 0.0 {
        trade_volume / market_cap
    } else {
        0.0
    };

    let volatility_multiplier = 1.0 + 2.0 * player.volatility;
    let raw = volume_ratio * volatility_multiplier * direction.sign() * size_tier(shares);
    let impact_percent = raw.clamp(-MAX_IMPACT, MAX_IMPACT);

    let new_price = round_cents((current_price * (1.0 + impact_percent)).max(PRICE_FLOOR));
    let impact_level = classify(impact_percent.abs());

    MarketImpact {
        player_id: player.id.clone(),
        direction,
        shares,
        old_price: current_price,
        new_price,
        impact_percent,
        impact_level,
        broadcast_required: impact_level != ImpactLevel::Minimal || shares >= BROADCAST_SHARES,
    }
}
