//! Trading Service
//!
//! Settles buy/sell orders against the portfolio ledger:
//! - Validation and mutation of one portfolio happen under its ledger guard
//! - Each executed trade is logged, persisted (best effort) and broadcast
//! - The trade's own market impact is applied after the guard is released
//!
//! Failed settlements leave the portfolio and the registry untouched.

use crate::config::TradingConfig;
use crate::error::TradingError;
use crate::services::store::PortfolioStore;
use crate::services::{market_impact, FlashBoard, PlayerRegistry, PortfolioLedger, PriceEngine};
use crate::types::{
    round_cents, AccountBook, FlashMultiplier, Holding, LeaderboardEntry, MarketImpact, OrderType,
    Player, Portfolio, ServerMessage, Topic, Trade, TradeDirection, TradeExecutedData,
    TradeFeedData,
};
use crate::websocket::RoomManager;
use dashmap::DashSet;
use std::collections::btree_map::Entry;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Parse a client-supplied trade direction.
pub fn parse_direction(value: &str) -> Result<TradeDirection, TradingError> {
    value.parse().map_err(TradingError::InvalidInput)
}

/// Parse a client-supplied account book.
pub fn parse_book(value: &str) -> Result<AccountBook, TradingError> {
    value.parse().map_err(TradingError::InvalidInput)
}

/// Validate a client-supplied share count.
pub fn validate_shares(shares: i64) -> Result<u32, TradingError> {
    if shares <= 0 {
        return Err(TradingError::InvalidInput(format!(
            "shares must be positive, got {}",
            shares
        )));
    }
    u32::try_from(shares)
        .map_err(|_| TradingError::InvalidInput(format!("share count {} is too large", shares)))
}

/// Trade settlement service.
pub struct TradingService {
    registry: Arc<PlayerRegistry>,
    ledger: Arc<PortfolioLedger>,
    engine: Arc<PriceEngine>,
    flashes: Arc<FlashBoard>,
    /// Durable storage (optional, in-memory only without it)
    store: Option<Arc<dyn PortfolioStore>>,
    /// Room manager for WebSocket broadcasts (optional for testing)
    room_manager: Option<Arc<RoomManager>>,
    /// Most recent trades, oldest first
    trade_log: Mutex<VecDeque<Trade>>,
    config: TradingConfig,
    /// Users whose portfolio lives only as long as their connection
    guests: DashSet<String>,
}

impl TradingService {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        ledger: Arc<PortfolioLedger>,
        engine: Arc<PriceEngine>,
        flashes: Arc<FlashBoard>,
        config: TradingConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            engine,
            flashes,
            store: None,
            room_manager: None,
            trade_log: Mutex::new(VecDeque::new()),
            config,
            guests: DashSet::new(),
        }
    }

    /// Attach durable storage.
    pub fn with_store(mut self, store: Arc<dyn PortfolioStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the room manager for WebSocket broadcasts.
    pub fn with_room_manager(mut self, room_manager: Arc<RoomManager>) -> Self {
        self.room_manager = Some(room_manager);
        self
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    // ==========================================================================
    // Portfolios
    // ==========================================================================

    /// Open (or resume) a user's portfolio.
    ///
    /// Looks in memory, then in the store, and otherwise creates a fresh
    /// portfolio with the configured starting balance and live trade cap.
    pub fn open_portfolio(&self, user_id: &str) -> Portfolio {
        if let Some(portfolio) = self.ledger.get(user_id) {
            return portfolio;
        }

        let durable = self.store.as_ref().filter(|_| !self.guests.contains(user_id));
        let stored = durable.and_then(|store| {
            store.load_portfolio(user_id).unwrap_or_else(|e| {
                warn!("Failed to load portfolio for {}: {}", user_id, e);
                None
            })
        });

        let created = stored.is_none();
        let mut portfolio = stored.unwrap_or_else(|| {
            Portfolio::new(
                user_id.to_string(),
                self.config.starting_balance,
                self.config.live_trades_per_session,
            )
        });

        // Stored holdings carry stale prices.
        let prices = self.registry.prices();
        let held: Vec<String> = portfolio.holdings().map(|h| h.player_id.clone()).collect();
        for player_id in held {
            if let Some(&price) = prices.get(&player_id) {
                portfolio.sync_price(&player_id, price);
            }
        }
        portfolio.recalculate();

        let portfolio = self.ledger.insert_if_absent(portfolio);
        if created {
            info!("Opened portfolio for {}", user_id);
            self.persist_portfolio(&portfolio);
        }
        portfolio
    }

    /// Open a portfolio that is never persisted and is dropped when the
    /// guest's connection closes.
    pub fn open_guest_portfolio(&self, user_id: &str) -> Portfolio {
        self.guests.insert(user_id.to_string());
        self.open_portfolio(user_id)
    }

    /// Drop a guest's portfolio. Returns false for non-guest users.
    pub fn close_guest_portfolio(&self, user_id: &str) -> bool {
        if self.guests.remove(user_id).is_none() {
            return false;
        }
        let removed = self.ledger.remove(user_id).is_some();
        debug!("Closed guest portfolio for {}", user_id);
        removed
    }

    pub fn get_portfolio(&self, user_id: &str) -> Option<Portfolio> {
        self.ledger.get(user_id)
    }

    /// Restore the live trade cap for a new session.
    pub fn reset_live_session(&self, user_id: &str) -> Result<Portfolio, TradingError> {
        let trades = self.config.live_trades_per_session;
        let portfolio = self
            .ledger
            .with_portfolio_mut(user_id, |portfolio| {
                portfolio.trades_remaining = trades;
                portfolio.updated_at = chrono::Utc::now().timestamp_millis();
                portfolio.clone()
            })
            .ok_or_else(|| TradingError::PortfolioNotFound(user_id.to_string()))?;

        self.persist_portfolio(&portfolio);
        self.broadcast_portfolio_update(&portfolio);
        Ok(portfolio)
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.ledger.leaderboard(limit)
    }

    // ==========================================================================
    // Market queries
    // ==========================================================================

    pub fn get_players(&self) -> Vec<Player> {
        self.registry.list()
    }

    pub fn active_flash_multipliers(&self) -> Vec<FlashMultiplier> {
        self.flashes.active()
    }

    /// Multiply a player's price (admin and demo tooling).
    pub fn trigger_shock(&self, player_id: &str, multiplier: f64, reason: &str) -> bool {
        self.engine.apply_shock(player_id, multiplier, reason)
    }

    // ==========================================================================
    // Settlement
    // ==========================================================================

    /// Execute a market order at the current price.
    pub fn execute_trade(
        &self,
        user_id: &str,
        player_id: &str,
        direction: TradeDirection,
        shares: i64,
        book: AccountBook,
    ) -> Result<Trade, TradingError> {
        self.execute(user_id, player_id, direction, shares, book, None)
    }

    /// Settle an order at the current price.
    ///
    /// With a `limit_price` the order settles as a limit order, and only if
    /// the price read under the portfolio guard still satisfies the limit.
    /// Preconditions are checked in order and the first failure is
    /// returned: share count, existence, limit, live trade cap, funds, position.
    pub fn execute(
        &self,
        user_id: &str,
        player_id: &str,
        direction: TradeDirection,
        shares: i64,
        book: AccountBook,
        limit_price: Option<f64>,
    ) -> Result<Trade, TradingError> {
        let shares = validate_shares(shares)?;
        if !self.ledger.contains(user_id) {
            return Err(TradingError::PortfolioNotFound(user_id.to_string()));
        }
        let player = self
            .registry
            .get(player_id)
            .ok_or_else(|| TradingError::PlayerNotFound(player_id.to_string()))?;

        let order_type = if limit_price.is_some() {
            OrderType::Limit
        } else {
            OrderType::Market
        };
        let now = chrono::Utc::now().timestamp_millis();
        let multiplier = self.flashes.multiplier_for(player_id, now);

        let (trade, portfolio) = self
            .ledger
            .with_portfolio_mut(user_id, |portfolio| -> Result<_, TradingError> {
                let price = self
                    .registry
                    .price(player_id)
                    .ok_or_else(|| TradingError::PlayerNotFound(player_id.to_string()))?;
                if let Some(limit) = limit_price {
                    if !limit_reached(direction, price, limit) {
                        return Err(TradingError::LimitNotReached { price, limit });
                    }
                }
                settle(portfolio, player_id, direction, shares, price, book, now)?;

                let trade = Trade::executed(
                    user_id.to_string(),
                    player_id.to_string(),
                    direction,
                    order_type,
                    shares,
                    price,
                    book,
                    multiplier,
                );
                Ok((trade, portfolio.clone()))
            })
            .ok_or_else(|| TradingError::PortfolioNotFound(user_id.to_string()))??;

        info!(
            "{} {} {} x{} @ {:.2} ({} book)",
            user_id, direction, player_id, shares, trade.price, book
        );

        self.record_trade(&trade);
        self.persist_portfolio(&portfolio);
        self.persist_trade(&trade);

        let impact = self.apply_market_impact(&player, &trade);

        self.broadcast_trade_executed(&trade, &portfolio);
        self.broadcast_trade_feed(&trade, &player);
        if let Some(impact) = impact.filter(|i| i.broadcast_required) {
            self.broadcast_market_impact(&impact);
        }
        if let Some(latest) = self.ledger.get(user_id) {
            self.broadcast_portfolio_update(&latest);
        }

        Ok(trade)
    }

    /// Move the market by the trade's own size.
    fn apply_market_impact(&self, player: &Player, trade: &Trade) -> Option<MarketImpact> {
        if !self.config.apply_market_impact {
            return None;
        }
        let impact = market_impact::calculate(player, trade.direction, trade.shares, trade.price);
        if impact.new_price != trade.price {
            self.engine
                .apply_price(&trade.player_id, impact.new_price, "market impact");
            debug!(
                "Market impact on {}: {:+.4}% ({:?})",
                trade.player_id,
                impact.impact_percent * 100.0,
                impact.impact_level
            );
        }
        Some(impact)
    }

    // ==========================================================================
    // Trade log
    // ==========================================================================

    fn record_trade(&self, trade: &Trade) {
        let mut log = self.trade_log.lock().unwrap();
        log.push_back(trade.clone());
        while log.len() > self.config.trade_log_capacity {
            log.pop_front();
        }
    }

    /// A user's trades, newest first.
    pub fn get_trade_history(&self, user_id: &str, limit: usize) -> Vec<Trade> {
        if let Some(store) = self.store.as_ref().filter(|_| !self.guests.contains(user_id)) {
            match store.trades_for_user(user_id, limit) {
                Ok(trades) => return trades,
                Err(e) => warn!("Falling back to in-memory trade log: {}", e),
            }
        }

        self.trade_log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Most recent trades across all users, newest first.
    pub fn recent_trades(&self, limit: usize) -> Vec<Trade> {
        self.trade_log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    // ==========================================================================
    // Persistence (best effort)
    // ==========================================================================

    fn persist_portfolio(&self, portfolio: &Portfolio) {
        if self.guests.contains(&portfolio.user_id) {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save_portfolio(portfolio) {
                let err = TradingError::TransientBackendFailure(e.to_string());
                warn!("Portfolio {} not persisted: {}", portfolio.user_id, err);
            }
        }
    }

    fn persist_trade(&self, trade: &Trade) {
        if self.guests.contains(&trade.user_id) {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.append_trade(trade) {
                let err = TradingError::TransientBackendFailure(e.to_string());
                warn!("Trade {} not persisted: {}", trade.id, err);
            }
        }
    }

    // ==========================================================================
    // WebSocket Broadcast Helpers
    // ==========================================================================

    fn broadcast_trade_executed(&self, trade: &Trade, portfolio: &Portfolio) {
        if let Some(ref room_manager) = self.room_manager {
            let msg = ServerMessage::TradeExecuted {
                data: TradeExecutedData {
                    trade: trade.clone(),
                    available_balance: portfolio.available_balance,
                    trades_remaining: portfolio.trades_remaining,
                },
            };
            room_manager.publish(&Topic::User(trade.user_id.clone()), &msg);
        }
    }

    fn broadcast_trade_feed(&self, trade: &Trade, player: &Player) {
        if let Some(ref room_manager) = self.room_manager {
            let msg = ServerMessage::TradeFeed {
                data: TradeFeedData {
                    trade_id: trade.id.clone(),
                    user_id: trade.user_id.clone(),
                    player_id: trade.player_id.clone(),
                    player_name: player.name.clone(),
                    direction: trade.direction,
                    shares: trade.shares,
                    price: trade.price,
                    account_book: trade.account_book,
                    multiplier: trade.multiplier,
                    timestamp: trade.timestamp,
                },
            };
            room_manager.publish(&Topic::General, &msg);
        }
    }

    fn broadcast_market_impact(&self, impact: &MarketImpact) {
        if let Some(ref room_manager) = self.room_manager {
            let msg = ServerMessage::MarketImpact {
                data: impact.clone(),
            };
            room_manager.publish_multi(
                &[Topic::General, Topic::Player(impact.player_id.clone())],
                &msg,
            );
        }
    }

    fn broadcast_portfolio_update(&self, portfolio: &Portfolio) {
        if let Some(ref room_manager) = self.room_manager {
            let msg = ServerMessage::PortfolioUpdate {
                data: portfolio.clone(),
            };
            room_manager.publish(&Topic::Portfolio(portfolio.user_id.clone()), &msg);
        }
    }
}

/// Buy limits cap the price, sell limits floor it.
fn limit_reached(direction: TradeDirection, price: f64, limit: f64) -> bool {
    match direction {
        TradeDirection::Buy => price <= limit,
        TradeDirection::Sell => price >= limit,
    }
}

/// Validate and apply one trade to a portfolio.
///
/// Nothing is written unless every check passes.
fn settle(
    portfolio: &mut Portfolio,
    player_id: &str,
    direction: TradeDirection,
    shares: u32,
    price: f64,
    book: AccountBook,
    now: i64,
) -> Result<(), TradingError> {
    if book == AccountBook::Live && portfolio.trades_remaining == 0 {
        return Err(TradingError::TradeLimitExceeded);
    }

    let amount = round_cents(shares as f64 * price);

    match direction {
        TradeDirection::Buy => {
            if portfolio.available_balance < amount {
                return Err(TradingError::InsufficientFunds {
                    needed: amount,
                    available: portfolio.available_balance,
                });
            }
            portfolio.available_balance = round_cents(portfolio.available_balance - amount);

            match portfolio.book_mut(book).entry(player_id.to_string()) {
                Entry::Occupied(mut entry) => entry.get_mut().add_shares(shares, price),
                Entry::Vacant(entry) => {
                    entry.insert(Holding::open(player_id.to_string(), shares, price, now));
                }
            }
        }
        TradeDirection::Sell => {
            let held = portfolio
                .book(book)
                .get(player_id)
                .map(|h| h.shares)
                .unwrap_or(0);
            if held < shares {
                return Err(TradingError::InsufficientShares {
                    requested: shares,
                    held,
                });
            }
            portfolio.available_balance = round_cents(portfolio.available_balance + amount);

            let holdings = portfolio.book_mut(book);
            if held == shares {
                holdings.remove(player_id);
            } else if let Some(holding) = holdings.get_mut(player_id) {
                holding.shares -= shares;
                holding.update_price(price);
            }
        }
    }

    portfolio.sync_price(player_id, price);
    portfolio.recalculate();

    if book == AccountBook::Live {
        portfolio.trades_remaining = portfolio.trades_remaining.saturating_sub(1);
    }

    Ok(())
}
