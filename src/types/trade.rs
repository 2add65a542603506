use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{round_cents, AccountBook};

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            TradeDirection::Buy => 1.0,
            TradeDirection::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "buy"),
            TradeDirection::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for TradeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeDirection::Buy),
            "sell" => Ok(TradeDirection::Sell),
            other => Err(format!("unknown trade direction: {}", other)),
        }
    }
}

/// How the trade was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Executed immediately at the current price.
    Market,
    /// Executed by the limit-order watcher when its trigger price was hit.
    Limit,
}

/// Final state of a trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Executed,
    Cancelled,
    Failed,
}

/// Immutable record of a settled trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub user_id: String,
    pub player_id: String,
    pub direction: TradeDirection,
    pub order_type: OrderType,
    pub shares: u32,
    /// Execution price.
    pub price: f64,
    /// Execution time (ms).
    pub timestamp: i64,
    pub account_book: AccountBook,
    pub status: TradeStatus,
    /// Flash multiplier active on the player at execution time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    pub total_amount: f64,
}

impl Trade {
    /// Create an executed trade record.
    #[allow(clippy::too_many_arguments)]
    pub fn executed(
        user_id: String,
        player_id: String,
        direction: TradeDirection,
        order_type: OrderType,
        shares: u32,
        price: f64,
        account_book: AccountBook,
        multiplier: Option<f64>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            player_id,
            direction,
            order_type,
            shares,
            price,
            timestamp: chrono::Utc::now().timestamp_millis(),
            account_book,
            status: TradeStatus::Executed,
            multiplier,
            total_amount: round_cents(shares as f64 * price),
        }
    }
}

/// Limit order status. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitOrderStatus {
    Pending,
    Executed,
    Cancelled,
}

impl std::fmt::Display for LimitOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitOrderStatus::Pending => write!(f, "pending"),
            LimitOrderStatus::Executed => write!(f, "executed"),
            LimitOrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A resting conditional order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrder {
    pub id: String,
    pub user_id: String,
    pub player_id: String,
    pub direction: TradeDirection,
    pub shares: u32,
    pub limit_price: f64,
    pub account_book: AccountBook,
    pub status: LimitOrderStatus,
    pub created_at: i64,
    pub expires_at: i64,
    /// When the order reached a terminal state (ms).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<i64>,
}

impl LimitOrder {
    pub fn is_pending(&self) -> bool {
        self.status == LimitOrderStatus::Pending
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Whether `price` satisfies the trigger condition.
    pub fn is_triggered_by(&self, price: f64) -> bool {
        match self.direction {
            TradeDirection::Buy => price <= self.limit_price,
            TradeDirection::Sell => price >= self.limit_price,
        }
    }

    /// Move to a terminal state.
    pub fn close(&mut self, status: LimitOrderStatus, now: i64) {
        if self.is_pending() && status != LimitOrderStatus::Pending {
            self.status = status;
            self.closed_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(direction: TradeDirection) -> LimitOrder {
        LimitOrder {
            id: "o1".to_string(),
            user_id: "u1".to_string(),
            player_id: "p1".to_string(),
            direction,
            shares: 1,
            limit_price: 50.0,
            account_book: AccountBook::Season,
            status: LimitOrderStatus::Pending,
            created_at: 0,
            expires_at: 1_000,
            closed_at: None,
        }
    }

    #[test]
    fn test_trigger_conditions() {
        let buy = order(TradeDirection::Buy);
        assert!(buy.is_triggered_by(50.0));
        assert!(buy.is_triggered_by(49.99));
        assert!(!buy.is_triggered_by(50.01));

        let sell = order(TradeDirection::Sell);
        assert!(sell.is_triggered_by(50.0));
        assert!(!sell.is_triggered_by(49.99));
    }

    #[test]
    fn test_close_only_moves_forward() {
        let mut o = order(TradeDirection::Buy);
        o.close(LimitOrderStatus::Executed, 5);
        o.close(LimitOrderStatus::Cancelled, 6);
        assert_eq!(o.status, LimitOrderStatus::Executed);
        assert_eq!(o.closed_at, Some(5));
    }

    #[test]
    fn test_expiry_is_strict() {
        let o = order(TradeDirection::Buy);
        assert!(!o.is_expired(1_000));
        assert!(o.is_expired(1_001));
    }

    #[test]
    fn test_trade_total_amount() {
        let trade = Trade::executed(
            "u1".to_string(),
            "p1".to_string(),
            TradeDirection::Buy,
            OrderType::Market,
            3,
            33.33,
            AccountBook::Live,
            None,
        );
        assert_eq!(trade.total_amount, 99.99);
        assert_eq!(trade.status, TradeStatus::Executed);
        assert!(!serde_json::to_string(&trade).unwrap().contains("multiplier"));
    }
}
