//! Limit-Order Watcher
//!
//! Holds resting conditional orders and evaluates them once per price cycle.
//! Triggered orders are settled through the trading service with their
//! stored parameters and only marked executed when settlement succeeds.

use crate::config::LimitOrderConfig;
use crate::error::TradingError;
use crate::services::price_engine::TickListener;
use crate::services::trading::validate_shares;
use crate::services::{PlayerRegistry, TradingService};
use crate::types::{
    AccountBook, LimitOrder, LimitOrderStatus, ServerMessage, Topic, TradeDirection,
};
use crate::websocket::RoomManager;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    /// Orders cancelled because they passed `expires_at`.
    pub expired: usize,
    /// Triggered orders that settled.
    pub executed: usize,
    /// Triggered orders whose settlement failed; they stay pending.
    pub failed: usize,
    /// Terminal orders dropped by retention or the capacity cap.
    pub pruned: usize,
}

#[derive(Default)]
struct OrderBook {
    /// Orders in placement order.
    orders: VecDeque<LimitOrder>,
    /// Orders currently being settled.
    in_flight: HashSet<String>,
}

impl OrderBook {
    fn find_mut(&mut self, order_id: &str) -> Option<&mut LimitOrder> {
        self.orders.iter_mut().find(|o| o.id == order_id)
    }
}

/// Watches pending limit orders against live prices.
pub struct LimitOrderWatcher {
    book: Mutex<OrderBook>,
    trading: Arc<TradingService>,
    registry: Arc<PlayerRegistry>,
    room_manager: Option<Arc<RoomManager>>,
    config: LimitOrderConfig,
    evaluating: AtomicBool,
}

impl LimitOrderWatcher {
    pub fn new(
        trading: Arc<TradingService>,
        registry: Arc<PlayerRegistry>,
        config: LimitOrderConfig,
    ) -> Self {
        Self {
            book: Mutex::new(OrderBook::default()),
            trading,
            registry,
            room_manager: None,
            config,
            evaluating: AtomicBool::new(false),
        }
    }

    pub fn with_room_manager(mut self, room_manager: Arc<RoomManager>) -> Self {
        self.room_manager = Some(room_manager);
        self
    }

    /// Rest a new order.
    pub fn place(
        &self,
        user_id: &str,
        player_id: &str,
        direction: TradeDirection,
        shares: i64,
        limit_price: f64,
        book: AccountBook,
    ) -> Result<LimitOrder, TradingError> {
        let shares = validate_shares(shares)?;
        if !limit_price.is_finite() || limit_price <= 0.0 {
            return Err(TradingError::InvalidInput(format!(
                "limit price must be positive, got {}",
                limit_price
            )));
        }
        if self.registry.get(player_id).is_none() {
            return Err(TradingError::PlayerNotFound(player_id.to_string()));
        }
        if self.trading.get_portfolio(user_id).is_none() {
            return Err(TradingError::PortfolioNotFound(user_id.to_string()));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let order = LimitOrder {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            player_id: player_id.to_string(),
            direction,
            shares,
            limit_price,
            account_book: book,
            status: LimitOrderStatus::Pending,
            created_at: now,
            expires_at: now + self.config.ttl.as_millis() as i64,
            closed_at: None,
        };

        {
            let mut state = self.book.lock().unwrap();
            state.orders.push_back(order.clone());
            enforce_capacity(&mut state, self.config.capacity);
        }

        info!(
            "Limit order {} placed: {} {} x{} @ {:.2}",
            order.id, direction, player_id, shares, limit_price
        );
        self.broadcast_update(&order);
        Ok(order)
    }

    /// Cancel one of the caller's pending orders.
    pub fn cancel(&self, user_id: &str, order_id: &str) -> Result<LimitOrder, TradingError> {
        let order = {
            let mut state = self.book.lock().unwrap();
            if state.in_flight.contains(order_id) {
                return Err(TradingError::InvalidInput(format!(
                    "order {} is being executed",
                    order_id
                )));
            }
            let order = state
                .find_mut(order_id)
                .filter(|o| o.user_id == user_id)
                .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))?;
            if !order.is_pending() {
                return Err(TradingError::InvalidInput(format!(
                    "order {} is already {}",
                    order_id, order.status
                )));
            }
            order.close(LimitOrderStatus::Cancelled, chrono::Utc::now().timestamp_millis());
            order.clone()
        };

        debug!("Limit order {} cancelled by {}", order_id, user_id);
        self.broadcast_update(&order);
        Ok(order)
    }

    /// Cancel every pending order of a user whose portfolio is going away.
    ///
    /// Orders being settled right now are left to finish.
    pub fn cancel_all_for_user(&self, user_id: &str) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let mut state = self.book.lock().unwrap();
        let OrderBook { orders, in_flight } = &mut *state;
        let mut cancelled = 0;
        for order in orders
            .iter_mut()
            .filter(|o| o.user_id == user_id && o.is_pending() && !in_flight.contains(&o.id))
        {
            order.close(LimitOrderStatus::Cancelled, now);
            cancelled += 1;
        }
        if cancelled > 0 {
            debug!("Cancelled {} limit orders of {}", cancelled, user_id);
        }
        cancelled
    }

    pub fn get(&self, order_id: &str) -> Option<LimitOrder> {
        self.book
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
    }

    /// A user's orders, newest first.
    pub fn orders_for_user(&self, user_id: &str) -> Vec<LimitOrder> {
        self.book
            .lock()
            .unwrap()
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.book
            .lock()
            .unwrap()
            .orders
            .iter()
            .filter(|o| o.is_pending())
            .count()
    }

    /// Evaluate every pending order against current prices.
    pub fn evaluate(&self) -> EvaluationSummary {
        self.evaluate_at(chrono::Utc::now().timestamp_millis())
    }

    /// Evaluate as of `now` (ms).
    ///
    /// A pass started while another one is running is skipped.
    pub fn evaluate_at(&self, now: i64) -> EvaluationSummary {
        let Some(_pass) = PassGuard::acquire(&self.evaluating) else {
            return EvaluationSummary::default();
        };

        let mut summary = EvaluationSummary::default();
        let mut updates = Vec::new();

        let triggered: Vec<LimitOrder> = {
            let mut state = self.book.lock().unwrap();
            let mut triggered = Vec::new();
            for order in state.orders.iter_mut().filter(|o| o.is_pending()) {
                if order.is_expired(now) {
                    order.close(LimitOrderStatus::Cancelled, now);
                    summary.expired += 1;
                    updates.push(order.clone());
                    continue;
                }
                let fires = self
                    .registry
                    .price(&order.player_id)
                    .is_some_and(|price| order.is_triggered_by(price));
                if fires {
                    triggered.push(order.clone());
                }
            }
            for order in &triggered {
                state.in_flight.insert(order.id.clone());
            }
            triggered
        };

        for order in triggered {
            let result = self.trading.execute(
                &order.user_id,
                &order.player_id,
                order.direction,
                order.shares as i64,
                order.account_book,
                Some(order.limit_price),
            );

            let mut state = self.book.lock().unwrap();
            state.in_flight.remove(&order.id);
            match result {
                Ok(trade) => {
                    if let Some(stored) = state.find_mut(&order.id) {
                        stored.close(LimitOrderStatus::Executed, now);
                        updates.push(stored.clone());
                    }
                    summary.executed += 1;
                    info!("Limit order {} executed as trade {}", order.id, trade.id);
                }
                Err(e) => {
                    summary.failed += 1;
                    debug!("Limit order {} not settled, retrying next cycle: {}", order.id, e);
                }
            }
        }

        summary.pruned = self.prune(now);

        for order in &updates {
            self.broadcast_update(order);
        }

        summary
    }

    /// Drop terminal orders past retention, then enforce the capacity cap.
    fn prune(&self, now: i64) -> usize {
        let retention = self.config.retention.as_millis() as i64;
        let mut state = self.book.lock().unwrap();
        let before = state.orders.len();
        state
            .orders
            .retain(|o| o.is_pending() || o.closed_at.map_or(true, |t| now - t < retention));
        enforce_capacity(&mut state, self.config.capacity);
        before - state.orders.len()
    }

    fn broadcast_update(&self, order: &LimitOrder) {
        if let Some(ref room_manager) = self.room_manager {
            let msg = ServerMessage::LimitOrderUpdate {
                data: order.clone(),
            };
            room_manager.publish(&Topic::User(order.user_id.clone()), &msg);
        }
    }
}

/// Holds the single-pass flag, clearing it on every exit path.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Keep only the most recent `capacity` orders, never dropping one in flight.
fn enforce_capacity(state: &mut OrderBook, capacity: usize) {
    while state.orders.len() > capacity {
        let victim = state
            .orders
            .iter()
            .position(|o| !state.in_flight.contains(&o.id));
        match victim {
            Some(index) => {
                state.orders.remove(index);
            }
            None => break,
        }
    }
}

impl TickListener for LimitOrderWatcher {
    fn on_price_cycle(&self) {
        let summary = self.evaluate();
        if summary != EvaluationSummary::default() {
            debug!("Limit order pass: {:?}", summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_guard_releases_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _pass = PassGuard::acquire(&flag).unwrap();
            assert!(PassGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_pass_guard_releases_on_panic() {
        let flag = AtomicBool::new(false);
        let result = std::panic::catch_unwind(|| {
            let _pass = PassGuard::acquire(&flag).unwrap();
            panic!("settlement blew up");
        });
        assert!(result.is_err());
        assert!(PassGuard::acquire(&flag).is_some());
    }
}
