use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::round_cents;

/// One of the two segregated holding books of a portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountBook {
    /// Long-horizon holdings, no trade cap.
    Season,
    /// Session holdings, capped by `trades_remaining`.
    Live,
}

impl std::fmt::Display for AccountBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountBook::Season => write!(f, "season"),
            AccountBook::Live => write!(f, "live"),
        }
    }
}

impl FromStr for AccountBook {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "season" => Ok(AccountBook::Season),
            "live" => Ok(AccountBook::Live),
            other => Err(format!("unknown account book: {}", other)),
        }
    }
}

/// A position in one player within one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub player_id: String,
    pub shares: u32,
    /// Weighted-average cost basis.
    pub average_price: f64,
    pub current_price: f64,
    pub total_value: f64,
    pub unrealized_pl: f64,
    pub unrealized_pl_percent: f64,
    /// When the position was opened (ms).
    pub purchase_date: i64,
}

impl Holding {
    /// Open a new holding at the given price.
    pub fn open(player_id: String, shares: u32, price: f64, timestamp: i64) -> Self {
        let mut holding = Self {
            player_id,
            shares,
            average_price: round_cents(price),
            current_price: price,
            total_value: 0.0,
            unrealized_pl: 0.0,
            unrealized_pl_percent: 0.0,
            purchase_date: timestamp,
        };
        holding.refresh();
        holding
    }

    /// Add shares bought at `price`, re-averaging the cost basis.
    pub fn add_shares(&mut self, shares: u32, price: f64) {
        let total_shares = self.shares + shares;
        self.average_price =
            round_cents((self.cost_basis() + shares as f64 * price) / total_shares as f64);
        self.shares = total_shares;
        self.current_price = price;
        self.refresh();
    }

    /// Sync the market price and recompute the cached values.
    pub fn update_price(&mut self, price: f64) {
        self.current_price = price;
        self.refresh();
    }

    /// Recompute `total_value`, `unrealized_pl` and `unrealized_pl_percent`.
    pub fn refresh(&mut self) {
        let cost = self.cost_basis();
        self.total_value = round_cents(self.shares as f64 * self.current_price);
        self.unrealized_pl = round_cents(self.total_value - cost);
        self.unrealized_pl_percent = if cost > 0.0 {
            round_cents(self.unrealized_pl / cost * 100.0)
        } else {
            0.0
        };
    }

    /// Cost basis of the whole position.
    pub fn cost_basis(&self) -> f64 {
        self.shares as f64 * self.average_price
    }
}

/// A user's virtual portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub user_id: String,
    pub available_balance: f64,
    pub season_holdings: BTreeMap<String, Holding>,
    pub live_holdings: BTreeMap<String, Holding>,
    /// Live-book trades left this session.
    pub trades_remaining: u32,
    pub total_value: f64,
    #[serde(rename = "todaysPL")]
    pub todays_pl: f64,
    #[serde(rename = "seasonPL")]
    pub season_pl: f64,
    #[serde(rename = "livePL")]
    pub live_pl: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Portfolio {
    /// Create an empty portfolio.
    pub fn new(user_id: String, starting_balance: f64, trades_remaining: u32) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            user_id,
            available_balance: round_cents(starting_balance.max(0.0)),
            season_holdings: BTreeMap::new(),
            live_holdings: BTreeMap::new(),
            trades_remaining,
            total_value: round_cents(starting_balance.max(0.0)),
            todays_pl: 0.0,
            season_pl: 0.0,
            live_pl: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Holdings of one book.
    pub fn book(&self, book: AccountBook) -> &BTreeMap<String, Holding> {
        match book {
            AccountBook::Season => &self.season_holdings,
            AccountBook::Live => &self.live_holdings,
        }
    }

    /// Mutable holdings of one book.
    pub fn book_mut(&mut self, book: AccountBook) -> &mut BTreeMap<String, Holding> {
        match book {
            AccountBook::Season => &mut self.season_holdings,
            AccountBook::Live => &mut self.live_holdings,
        }
    }

    /// Iterate over the holdings of both books.
    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.season_holdings.values().chain(self.live_holdings.values())
    }

    pub fn has_holdings(&self) -> bool {
        !self.season_holdings.is_empty() || !self.live_holdings.is_empty()
    }

    /// Set the market price on every holding of `player_id`.
    ///
    /// Returns true if any holding changed.
    pub fn sync_price(&mut self, player_id: &str, price: f64) -> bool {
        let mut changed = false;
        for book in [&mut self.season_holdings, &mut self.live_holdings] {
            if let Some(holding) = book.get_mut(player_id) {
                if holding.current_price != price {
                    holding.update_price(price);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Recompute the derived aggregates from the holdings.
    pub fn recalculate(&mut self) {
        let holdings_value: f64 = self.holdings().map(|h| h.total_value).sum();
        self.season_pl = round_cents(self.season_holdings.values().map(|h| h.unrealized_pl).sum());
        self.live_pl = round_cents(self.live_holdings.values().map(|h| h.unrealized_pl).sum());
        self.todays_pl = round_cents(self.season_pl + self.live_pl);
        self.total_value = round_cents(holdings_value + self.available_balance);
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

/// A row of the portfolio leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub total_value: f64,
    #[serde(rename = "todaysPL")]
    pub todays_pl: f64,
    pub holdings: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holding_weighted_average() {
        let mut holding = Holding::open("p1".to_string(), 10, 100.0, 0);
        holding.add_shares(30, 120.0);

        assert_eq!(holding.shares, 40);
        assert_eq!(holding.average_price, 115.0);
        assert_eq!(holding.total_value, 4800.0);
        assert_eq!(holding.unrealized_pl, 200.0);
    }

    #[test]
    fn test_holding_update_price() {
        let mut holding = Holding::open("p1".to_string(), 4, 50.0, 0);
        holding.update_price(55.5);

        assert_eq!(holding.total_value, 222.0);
        assert_eq!(holding.unrealized_pl, 22.0);
        assert_eq!(holding.unrealized_pl_percent, 11.0);
    }

    #[test]
    fn test_portfolio_recalculate() {
        let mut portfolio = Portfolio::new("u1".to_string(), 1000.0, 10);
        portfolio
            .season_holdings
            .insert("p1".to_string(), Holding::open("p1".to_string(), 2, 100.0, 0));
        portfolio
            .live_holdings
            .insert("p2".to_string(), Holding::open("p2".to_string(), 1, 50.0, 0));
        portfolio.sync_price("p1", 110.0);
        portfolio.recalculate();

        assert_eq!(portfolio.season_pl, 20.0);
        assert_eq!(portfolio.live_pl, 0.0);
        assert_eq!(portfolio.todays_pl, 20.0);
        assert_eq!(portfolio.total_value, 1270.0);
    }

    #[test]
    fn test_account_book_parsing() {
        assert_eq!("live".parse::<AccountBook>(), Ok(AccountBook::Live));
        assert_eq!("Season".parse::<AccountBook>(), Ok(AccountBook::Season));
        assert!("weekly".parse::<AccountBook>().is_err());
        assert_eq!(serde_json::to_string(&AccountBook::Live).unwrap(), "\"live\"");
    }
}
