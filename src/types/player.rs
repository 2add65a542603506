use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::round_cents;

/// Lowest price any player can trade at.
pub const PRICE_FLOOR: f64 = 10.0;

/// Number of price samples kept per player.
pub const PRICE_HISTORY_CAPACITY: usize = 100;

/// Per-game averages used by the performance factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub points: f64,
    pub rebounds: f64,
    pub assists: f64,
}

impl PlayerStats {
    /// Rough 0..1 rating from the per-game averages.
    pub fn rating(&self) -> f64 {
        let score = (self.points / 30.0 + self.rebounds / 12.0 + self.assists / 10.0) / 3.0;
        score.clamp(0.0, 1.0)
    }
}

/// A single price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    /// Sample time (ms).
    pub timestamp: i64,
    pub price: f64,
    /// Synthetic traded volume.
    pub volume: u64,
}

/// Static reference data a player is created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSeed {
    pub id: String,
    pub name: String,
    pub team: String,
    pub position: String,
    pub base_price: f64,
    pub volatility: f64,
    #[serde(default)]
    pub stats: PlayerStats,
}

/// A tradable player and its synthetic price state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub team: String,
    pub position: String,
    pub current_price: f64,
    /// Change since the previous price mutation.
    pub price_change_24h: f64,
    pub price_change_percent_24h: f64,
    pub price_history: VecDeque<PricePoint>,
    /// Noise scale in (0, 1).
    pub volatility: f64,
    pub stats: PlayerStats,
    /// Only active players move on price ticks.
    pub is_active: bool,
}

impl Player {
    /// Create a player from seed data, priced at its base price.
    pub fn from_seed(seed: PlayerSeed) -> Self {
        let price = round_cents(seed.base_price.max(PRICE_FLOOR));
        let mut history = VecDeque::with_capacity(PRICE_HISTORY_CAPACITY);
        history.push_back(PricePoint {
            timestamp: chrono::Utc::now().timestamp_millis(),
            price,
            volume: 0,
        });

        Self {
            id: seed.id,
            name: seed.name,
            team: seed.team,
            position: seed.position,
            current_price: price,
            price_change_24h: 0.0,
            price_change_percent_24h: 0.0,
            price_history: history,
            volatility: seed.volatility.clamp(0.001, 0.999),
            stats: seed.stats,
            is_active: true,
        }
    }

    /// Move to a new price, refreshing the change fields and history.
    ///
    /// Returns the price delta.
    pub fn apply_price(&mut self, new_price: f64, volume: u64, timestamp: i64) -> f64 {
        let old_price = self.current_price;
        let new_price = round_cents(new_price.max(PRICE_FLOOR));
        let delta = round_cents(new_price - old_price);

        self.current_price = new_price;
        self.price_change_24h = delta;
        self.price_change_percent_24h = if old_price > 0.0 {
            round_cents(delta / old_price * 100.0)
        } else {
            0.0
        };

        self.price_history.push_back(PricePoint {
            timestamp,
            price: new_price,
            volume,
        });
        while self.price_history.len() > PRICE_HISTORY_CAPACITY {
            self.price_history.pop_front();
        }

        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> PlayerSeed {
        PlayerSeed {
            id: "p1".to_string(),
            name: "Test Player".to_string(),
            team: "BOS".to_string(),
            position: "SF".to_string(),
            base_price: 100.0,
            volatility: 0.1,
            stats: PlayerStats::default(),
        }
    }

    #[test]
    fn test_apply_price_updates_change_fields() {
        let mut player = Player::from_seed(seed());
        let delta = player.apply_price(110.0, 500, 1);

        assert_eq!(delta, 10.0);
        assert_eq!(player.current_price, 110.0);
        assert_eq!(player.price_change_24h, 10.0);
        assert_eq!(player.price_change_percent_24h, 10.0);
        assert_eq!(player.price_history.back().map(|p| p.volume), Some(500));
    }

    #[test]
    fn test_apply_price_respects_floor() {
        let mut player = Player::from_seed(seed());
        player.apply_price(3.0, 0, 1);
        assert_eq!(player.current_price, PRICE_FLOOR);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut player = Player::from_seed(seed());
        for i in 0..250 {
            player.apply_price(100.0 + i as f64, 1, i);
        }
        assert_eq!(player.price_history.len(), PRICE_HISTORY_CAPACITY);
        assert_eq!(player.price_history.back().map(|p| p.price), Some(349.0));
    }

    #[test]
    fn test_rating_is_clamped() {
        let stats = PlayerStats {
            points: 60.0,
            rebounds: 30.0,
            assists: 25.0,
        };
        assert_eq!(stats.rating(), 1.0);
        assert_eq!(PlayerStats::default().rating(), 0.0);
    }
}
