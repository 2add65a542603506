//! Active flash multipliers.

use crate::types::FlashMultiplier;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of currently active flash multipliers, keyed by flash id.
pub struct FlashBoard {
    active: DashMap<String, FlashMultiplier>,
}

impl FlashBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: DashMap::new(),
        })
    }

    /// Register a flash. A newer flash on the same player replaces the old one.
    ///
    /// Returns the replaced flash, if any.
    pub fn register(&self, flash: FlashMultiplier) -> Option<FlashMultiplier> {
        let replaced = self
            .active
            .iter()
            .find(|f| f.player_id == flash.player_id)
            .map(|f| f.key().clone());
        let previous = replaced.and_then(|id| self.active.remove(&id).map(|(_, f)| f));
        self.active.insert(flash.id.clone(), flash);
        previous
    }

    /// All active flashes, oldest first.
    pub fn active(&self) -> Vec<FlashMultiplier> {
        let mut flashes: Vec<FlashMultiplier> = self.active.iter().map(|f| f.clone()).collect();
        flashes.sort_by_key(|f| f.start_time);
        flashes
    }

    /// Multiplier currently boosting `player_id`.
    pub fn multiplier_for(&self, player_id: &str, now: i64) -> Option<f64> {
        self.active
            .iter()
            .find(|f| f.player_id == player_id && !f.is_expired(now))
            .map(|f| f.multiplier)
    }

    /// Remove every flash whose lifetime has elapsed.
    pub fn sweep_expired(&self, now: i64) -> Vec<FlashMultiplier> {
        let expired: Vec<String> = self
            .active
            .iter()
            .filter(|f| f.is_expired(now))
            .map(|f| f.key().clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.active.remove(&id).map(|(_, mut f)| {
                f.active = false;
                f
            }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
