//! Player Registry
//!
//! Holds the live price state of every tradable player. All price mutations
//! go through [`PlayerRegistry::update_price`] so the derived change fields and
//! the bounded history always stay consistent.

use crate::types::{Player, PlayerSeed, PriceUpdate};
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe registry of players keyed by id.
pub struct PlayerRegistry {
    players: DashMap<String, Player>,
}

impl PlayerRegistry {
    /// Create a registry from seed data.
    pub fn new(seeds: Vec<PlayerSeed>) -> Arc<Self> {
        let players = DashMap::new();
        for seed in seeds {
            let player = Player::from_seed(seed);
            players.insert(player.id.clone(), player);
        }
        Arc::new(Self { players })
    }

    /// Get a player by id.
    pub fn get(&self, id: &str) -> Option<Player> {
        self.players.get(id).map(|p| p.clone())
    }

    /// Current price of a player.
    pub fn price(&self, id: &str) -> Option<f64> {
        self.players.get(id).map(|p| p.current_price)
    }

    /// All players, sorted by name.
    pub fn list(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.iter().map(|p| p.value().clone()).collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        players
    }

    /// Find a player by id or, failing that, by case-insensitive name.
    pub fn find(&self, id_or_name: &str) -> Option<Player> {
        if let Some(player) = self.get(id_or_name) {
            return Some(player);
        }
        let needle = id_or_name.to_lowercase();
        self.players
            .iter()
            .find(|p| p.name.to_lowercase() == needle)
            .map(|p| p.value().clone())
    }

    /// Ids of players that receive tick updates.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .players
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Toggle whether a player moves on ticks. Returns false for unknown ids.
    pub fn set_active(&self, id: &str, active: bool) -> bool {
        match self.players.get_mut(id) {
            Some(mut player) => {
                player.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Move a player to a new price.
    ///
    /// Appends a history sample with a synthetic volume. Unknown ids are a
    /// no-op and return `None`.
    pub fn update_price(&self, id: &str, new_price: f64) -> Option<PriceUpdate> {
        let volume = rand::thread_rng().gen_range(100..10_000);
        let timestamp = chrono::Utc::now().timestamp_millis();

        let mut player = self.players.get_mut(id)?;
        let delta = player.apply_price(new_price, volume, timestamp);

        Some(PriceUpdate {
            player_id: player.id.clone(),
            price: player.current_price,
            delta,
            change_percent: player.price_change_percent_24h,
            reason: None,
            timestamp,
        })
    }

    /// Snapshot of every player's current price.
    pub fn prices(&self) -> HashMap<String, f64> {
        self.players
            .iter()
            .map(|p| (p.key().clone(), p.current_price))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlayerStats;

    fn seed(id: &str, name: &str, price: f64) -> PlayerSeed {
        PlayerSeed {
            id: id.to_string(),
            name: name.to_string(),
            team: "LAL".to_string(),
            position: "F".to_string(),
            base_price: price,
            volatility: 0.1,
            stats: PlayerStats::default(),
        }
    }

    #[test]
    fn test_update_price_unknown_is_noop() {
        let registry = PlayerRegistry::new(vec![seed("a", "Alpha", 50.0)]);
        assert!(registry.update_price("missing", 20.0).is_none());
        assert_eq!(registry.price("a"), Some(50.0));
    }

    #[test]
    fn test_update_price_reports_delta() {
        let registry = PlayerRegistry::new(vec![seed("a", "Alpha", 50.0)]);
        let update = registry.update_price("a", 55.0).unwrap();

        assert_eq!(update.delta, 5.0);
        assert_eq!(update.change_percent, 10.0);
        let player = registry.get("a").unwrap();
        assert_eq!(player.price_history.len(), 2);
        assert!(player.price_history.back().unwrap().volume >= 100);
    }

    #[test]
    fn test_find_by_name() {
        let registry = PlayerRegistry::new(vec![seed("a", "Alpha Guard", 50.0)]);
        assert_eq!(registry.find("alpha guard").map(|p| p.id), Some("a".to_string()));
        assert_eq!(registry.find("a").map(|p| p.name), Some("Alpha Guard".to_string()));
        assert!(registry.find("beta").is_none());
    }

    #[test]
    fn test_active_ids() {
        let registry = PlayerRegistry::new(vec![seed("a", "A", 50.0), seed("b", "B", 60.0)]);
        assert!(registry.set_active("b", false));
        assert!(!registry.set_active("c", false));
        assert_eq!(registry.active_ids(), vec!["a".to_string()]);
    }
}
