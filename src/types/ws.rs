use super::{
    AccountBook, FlashMultiplier, GameEvent, Identity, LeaderboardEntry, LimitOrder,
    MarketImpact, Player, Portfolio, PriceUpdate, Trade, TradeDirection,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Fan-out channel a connection can be a member of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    /// Every connected client.
    General,
    /// Price and impact updates for one player.
    Player(String),
    /// Private messages for one user.
    User(String),
    /// Leaderboard of one kind (e.g. `value`).
    Leaderboard(String),
    /// Portfolio snapshots of one user.
    Portfolio(String),
    /// Opt-in room for users actively live-trading.
    LiveSession,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::General => write!(f, "general"),
            Topic::Player(id) => write!(f, "player:{}", id),
            Topic::User(id) => write!(f, "user:{}", id),
            Topic::Leaderboard(kind) => write!(f, "leaderboard:{}", kind),
            Topic::Portfolio(id) => write!(f, "portfolio:{}", id),
            Topic::LiveSession => write!(f, "live-session"),
        }
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => return Ok(Topic::General),
            "live-session" => return Ok(Topic::LiveSession),
            _ => {}
        }

        let (prefix, key) = s
            .split_once(':')
            .ok_or_else(|| format!("unknown topic: {}", s))?;
        if key.is_empty() {
            return Err(format!("topic {} is missing its key", prefix));
        }

        match prefix {
            "player" => Ok(Topic::Player(key.to_string())),
            "user" => Ok(Topic::User(key.to_string())),
            "leaderboard" => Ok(Topic::Leaderboard(key.to_string())),
            "portfolio" => Ok(Topic::Portfolio(key.to_string())),
            _ => Err(format!("unknown topic: {}", s)),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

/// Incoming WebSocket message from client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a topic (e.g. `player:lebron-james`, `live-session`)
    Join {
        topic: Topic,
    },
    /// Leave a topic
    Leave {
        topic: Topic,
    },
    /// Execute a market order against the caller's portfolio
    ExecuteTrade {
        player_id: String,
        direction: String,
        shares: i64,
        account_book: String,
    },
    /// Rest a limit order until its trigger price is reached
    PlaceLimitOrder {
        player_id: String,
        direction: String,
        shares: i64,
        limit_price: f64,
        account_book: String,
    },
    /// Cancel one of the caller's pending limit orders
    CancelLimitOrder {
        order_id: String,
    },
    /// Application-level keepalive
    Ping {
        #[serde(default)]
        timestamp: i64,
    },
}

/// Outgoing WebSocket message to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the connection is registered
    Welcome {
        data: WelcomeData,
    },
    /// Snapshot of the whole market
    MarketData {
        data: MarketDataPayload,
    },
    PriceUpdate {
        data: PriceUpdate,
    },
    FlashMultiplier {
        data: FlashMultiplier,
    },
    FlashMultiplierExpired {
        data: FlashExpiredData,
    },
    GameEvent {
        data: GameEvent,
    },
    /// Private confirmation of the caller's own trade
    TradeExecuted {
        data: TradeExecutedData,
    },
    /// Public feed of executed trades
    TradeFeed {
        data: TradeFeedData,
    },
    MarketImpact {
        data: MarketImpact,
    },
    LeaderboardUpdate {
        data: LeaderboardUpdateData,
    },
    PortfolioUpdate {
        data: Portfolio,
    },
    /// Number of connected clients
    Presence {
        data: PresenceData,
    },
    /// Result of a client-issued trade request
    TradeResult {
        data: TradeResultData,
    },
    LimitOrderUpdate {
        data: LimitOrder,
    },
    Joined {
        topic: Topic,
    },
    Left {
        topic: Topic,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        error: String,
    },
}

/// Identity and presence sent on connect.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeData {
    pub identity: Identity,
    pub online: usize,
}

/// Player fields clients need for tables and tickers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: String,
    pub name: String,
    pub team: String,
    pub position: String,
    pub current_price: f64,
    pub price_change_24h: f64,
    pub price_change_percent_24h: f64,
    pub volatility: f64,
    pub is_active: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            team: player.team.clone(),
            position: player.position.clone(),
            current_price: player.current_price,
            price_change_24h: player.price_change_24h,
            price_change_percent_24h: player.price_change_percent_24h,
            volatility: player.volatility,
            is_active: player.is_active,
        }
    }
}

/// Market snapshot payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataPayload {
    pub players: Vec<PlayerSummary>,
    pub flash_multipliers: Vec<FlashMultiplier>,
    pub timestamp: i64,
}

/// Payload announcing that a flash multiplier ended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashExpiredData {
    pub id: String,
    pub player_id: String,
    pub player_name: String,
    pub timestamp: i64,
}

/// Private trade confirmation payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeExecutedData {
    pub trade: Trade,
    pub available_balance: f64,
    pub trades_remaining: u32,
}

/// Public trade feed payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeFeedData {
    pub trade_id: String,
    pub user_id: String,
    pub player_id: String,
    pub player_name: String,
    pub direction: TradeDirection,
    pub shares: u32,
    pub price: f64,
    pub account_book: AccountBook,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    pub timestamp: i64,
}

/// Leaderboard payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardUpdateData {
    pub kind: String,
    pub entries: Vec<LeaderboardEntry>,
    pub timestamp: i64,
}

/// Presence payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceData {
    pub online: usize,
}

/// Outcome of a trade request as seen by the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResultData {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade: Option<Trade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_round_trip_strings() {
        let cases = [
            ("general", Topic::General),
            ("live-session", Topic::LiveSession),
            ("player:lebron-james", Topic::Player("lebron-james".to_string())),
            ("user:u1", Topic::User("u1".to_string())),
            ("leaderboard:value", Topic::Leaderboard("value".to_string())),
            ("portfolio:u1", Topic::Portfolio("u1".to_string())),
        ];
        for (text, topic) in cases {
            assert_eq!(text.parse::<Topic>().unwrap(), topic);
            assert_eq!(topic.to_string(), text);
        }
    }

    #[test]
    fn test_topic_rejects_unknown() {
        assert!("team:bos".parse::<Topic>().is_err());
        assert!("player:".parse::<Topic>().is_err());
        assert!("nonsense".parse::<Topic>().is_err());
    }

    #[test]
    fn test_client_join_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","topic":"player:p1"}"#).unwrap();
        match msg {
            ClientMessage::Join { topic } => assert_eq!(topic, Topic::Player("p1".to_string())),
            _ => panic!("Expected Join message"),
        }
    }
}
