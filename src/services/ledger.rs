//! Portfolio Ledger
//!
//! In-memory home of every user's portfolio. Each portfolio sits behind its
//! own map entry guard, which is what serializes settlement against price
//! re-syncs for the same user.

use crate::types::{LeaderboardEntry, Portfolio};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe portfolio store keyed by user id.
pub struct PortfolioLedger {
    portfolios: DashMap<String, Portfolio>,
}

impl PortfolioLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            portfolios: DashMap::new(),
        })
    }

    /// Get a copy of a user's portfolio.
    pub fn get(&self, user_id: &str) -> Option<Portfolio> {
        self.portfolios.get(user_id).map(|p| p.clone())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.portfolios.contains_key(user_id)
    }

    /// Insert the portfolio unless the user already has one.
    ///
    /// Returns the portfolio now stored for the user.
    pub fn insert_if_absent(&self, portfolio: Portfolio) -> Portfolio {
        self.portfolios
            .entry(portfolio.user_id.clone())
            .or_insert(portfolio)
            .clone()
    }

    /// Replace a user's portfolio.
    pub fn replace(&self, portfolio: Portfolio) {
        self.portfolios.insert(portfolio.user_id.clone(), portfolio);
    }

    /// Run `f` with exclusive access to a user's portfolio.
    ///
    /// No other settlement or re-sync can touch the portfolio while `f` runs.
    pub fn with_portfolio_mut<R>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut Portfolio) -> R,
    ) -> Option<R> {
        let mut entry = self.portfolios.get_mut(user_id)?;
        Some(f(entry.value_mut()))
    }

    /// Push current prices into every holding and refresh the aggregates.
    ///
    /// Returns the ids of users whose portfolio changed.
    pub fn sync_prices(&self, prices: &HashMap<String, f64>) -> Vec<String> {
        let mut changed = Vec::new();

        for mut entry in self.portfolios.iter_mut() {
            let portfolio = entry.value_mut();
            if !portfolio.has_holdings() {
                continue;
            }

            let held: Vec<String> = portfolio
                .holdings()
                .map(|h| h.player_id.clone())
                .collect();

            let mut touched = false;
            for player_id in held {
                if let Some(&price) = prices.get(&player_id) {
                    touched |= portfolio.sync_price(&player_id, price);
                }
            }

            if touched {
                portfolio.recalculate();
                changed.push(portfolio.user_id.clone());
            }
        }

        changed
    }

    /// Portfolios ranked by total value.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(String, f64, f64, u32)> = self
            .portfolios
            .iter()
            .map(|p| {
                let holdings = (p.season_holdings.len() + p.live_holdings.len()) as u32;
                (p.user_id.clone(), p.total_value, p.todays_pl, holdings)
            })
            .collect();

        rows.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        rows.into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (user_id, total_value, todays_pl, holdings))| LeaderboardEntry {
                rank: i as u32 + 1,
                user_id,
                total_value,
                todays_pl,
                holdings,
            })
            .collect()
    }

    /// Ids of users whose portfolio holds at least one position.
    pub fn users_with_holdings(&self) -> Vec<String> {
        self.portfolios
            .iter()
            .filter(|p| p.has_holdings())
            .map(|p| p.key().clone())
            .collect()
    }

    /// Drop a user's portfolio (session teardown).
    pub fn remove(&self, user_id: &str) -> Option<Portfolio> {
        self.portfolios.remove(user_id).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.portfolios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portfolios.is_empty()
    }
}

impl Default for PortfolioLedger {
    fn default() -> Self {
        Self {
            portfolios: DashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Holding;

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let ledger = PortfolioLedger::new();
        ledger.insert_if_absent(Portfolio::new("u1".to_string(), 1000.0, 5));
        let second = ledger.insert_if_absent(Portfolio::new("u1".to_string(), 50.0, 1));
        assert_eq!(second.available_balance, 1000.0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_sync_prices_refreshes_holdings() {
        let ledger = PortfolioLedger::new();
        let mut portfolio = Portfolio::new("u1".to_string(), 0.0, 5);
        portfolio
            .season_holdings
            .insert("p1".to_string(), Holding::open("p1".to_string(), 3, 10.0, 0));
        ledger.replace(portfolio);
        ledger.insert_if_absent(Portfolio::new("u2".to_string(), 0.0, 5));

        let prices = HashMap::from([("p1".to_string(), 12.0)]);
        let changed = ledger.sync_prices(&prices);

        assert_eq!(changed, vec!["u1".to_string()]);
        let portfolio = ledger.get("u1").unwrap();
        assert_eq!(portfolio.season_holdings["p1"].total_value, 36.0);
        assert_eq!(portfolio.total_value, 36.0);
        assert!(ledger.sync_prices(&prices).is_empty());
    }

    #[test]
    fn test_leaderboard_ordering() {
        let ledger = PortfolioLedger::new();
        ledger.insert_if_absent(Portfolio::new("low".to_string(), 100.0, 5));
        ledger.insert_if_absent(Portfolio::new("high".to_string(), 900.0, 5));
        ledger.insert_if_absent(Portfolio::new("mid".to_string(), 500.0, 5));

        let board = ledger.leaderboard(2);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].user_id, "high");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].user_id, "mid");
    }
}
