use serde::{Deserialize, Serialize};

use super::TradeDirection;

/// A temporary, broadcast-visible boost on one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashMultiplier {
    pub id: String,
    pub player_id: String,
    pub player_name: String,
    pub multiplier: f64,
    pub duration_ms: i64,
    pub start_time: i64,
    pub description: String,
    pub active: bool,
}

impl FlashMultiplier {
    pub fn new(
        player_id: String,
        player_name: String,
        multiplier: f64,
        duration_ms: i64,
        description: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            player_id,
            player_name,
            multiplier,
            duration_ms,
            start_time: chrono::Utc::now().timestamp_millis(),
            description,
            active: true,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now - self.start_time >= self.duration_ms
    }
}

/// In-game play types the event generator draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEventKind {
    Basket,
    Assist,
    Rebound,
    Steal,
    Block,
}

impl GameEventKind {
    pub const ALL: [GameEventKind; 5] = [
        GameEventKind::Basket,
        GameEventKind::Assist,
        GameEventKind::Rebound,
        GameEventKind::Steal,
        GameEventKind::Block,
    ];

    /// Range of the fractional price impact for a random event of this kind.
    pub fn impact_range(&self) -> (f64, f64) {
        match self {
            GameEventKind::Basket => (0.01, 0.03),
            GameEventKind::Assist => (0.005, 0.015),
            GameEventKind::Rebound => (0.005, 0.01),
            GameEventKind::Steal => (0.01, 0.02),
            GameEventKind::Block => (0.01, 0.025),
        }
    }

    pub fn describe(&self, player_name: &str) -> String {
        match self {
            GameEventKind::Basket => format!("{} scores in the paint", player_name),
            GameEventKind::Assist => format!("{} threads a no-look assist", player_name),
            GameEventKind::Rebound => format!("{} grabs a contested rebound", player_name),
            GameEventKind::Steal => format!("{} jumps the lane for a steal", player_name),
            GameEventKind::Block => format!("{} swats it into the stands", player_name),
        }
    }
}

impl std::fmt::Display for GameEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameEventKind::Basket => write!(f, "basket"),
            GameEventKind::Assist => write!(f, "assist"),
            GameEventKind::Rebound => write!(f, "rebound"),
            GameEventKind::Steal => write!(f, "steal"),
            GameEventKind::Block => write!(f, "block"),
        }
    }
}

/// A game event as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    pub id: String,
    pub player_id: String,
    pub player_name: String,
    pub kind: GameEventKind,
    pub description: String,
    /// Fractional price impact (0.02 = +2%).
    pub price_impact: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    pub timestamp: i64,
}

/// Entry of the scripted demo queue. `player` is an id or a display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedEvent {
    pub player: String,
    pub kind: GameEventKind,
    pub description: String,
    pub price_impact: f64,
    #[serde(default)]
    pub multiplier: Option<f64>,
}

/// Severity of a trade's own price displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Minimal,
    Moderate,
    Significant,
    Major,
}

/// Output of the market impact calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketImpact {
    pub player_id: String,
    pub direction: TradeDirection,
    pub shares: u32,
    pub old_price: f64,
    pub new_price: f64,
    /// Fractional displacement after tiering and clamping.
    pub impact_percent: f64,
    pub impact_level: ImpactLevel,
    pub broadcast_required: bool,
}

/// Price change emitted by the simulation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub player_id: String,
    pub price: f64,
    pub delta: f64,
    pub change_percent: f64,
    /// Set for shocks and trade impact, absent for regular ticks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: i64,
}

/// Notification published by the simulation engine to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// One player's price moved.
    PriceUpdated(PriceUpdate),
    /// A full tick finished, after re-sync and limit-order evaluation.
    CycleCompleted { tick: u64, updated: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_multiplier_expiry() {
        let mut flash = FlashMultiplier::new(
            "p1".to_string(),
            "Player".to_string(),
            2.0,
            1_000,
            "hot streak".to_string(),
        );
        flash.start_time = 10_000;

        assert!(!flash.is_expired(10_999));
        assert!(flash.is_expired(11_000));
    }

    #[test]
    fn test_impact_ranges_are_positive() {
        for kind in GameEventKind::ALL {
            let (low, high) = kind.impact_range();
            assert!(low > 0.0 && low < high);
        }
    }

    #[test]
    fn test_impact_level_ordering() {
        assert!(ImpactLevel::Minimal < ImpactLevel::Moderate);
        assert!(ImpactLevel::Significant < ImpactLevel::Major);
        assert_eq!(serde_json::to_string(&ImpactLevel::Major).unwrap(), "\"major\"");
    }
}
