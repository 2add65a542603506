//! SQLite persistence for portfolios and the trade log.
//!
//! Portfolios are stored as JSON documents keyed by user id. Trades are
//! append-only rows with the indexed columns pulled out of the JSON body.

use super::store::{PortfolioStore, StoreError};
use crate::types::{Portfolio, Trade};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// SQLite-backed [`PortfolioStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS portfolios (
                user_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                player_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user_time ON trades(user_id, timestamp DESC)",
            [],
        )?;

        Ok(())
    }

    /// Number of stored portfolios.
    pub fn portfolio_count(&self) -> usize {
        self.lock()
            .ok()
            .and_then(|conn| {
                conn.query_row("SELECT COUNT(*) FROM portfolios", [], |row| row.get(0))
                    .ok()
            })
            .unwrap_or(0)
    }
}

impl PortfolioStore for SqliteStore {
    fn load_portfolio(&self, user_id: &str) -> Result<Option<Portfolio>, StoreError> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM portfolios WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        let data = serde_json::to_string(portfolio)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO portfolios (user_id, data, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at",
            params![portfolio.user_id, data, portfolio.updated_at],
        )?;
        Ok(())
    }

    fn append_trade(&self, trade: &Trade) -> Result<String, StoreError> {
        let data = serde_json::to_string(trade)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO trades (id, user_id, player_id, timestamp, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![trade.id, trade.user_id, trade.player_id, trade.timestamp, data],
        )?;
        Ok(trade.id.clone())
    }

    fn trades_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM trades WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| row.get::<_, String>(0))?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(serde_json::from_str(&row?)?);
        }
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountBook, Holding, OrderType, TradeDirection};

    #[test]
    fn test_portfolio_roundtrip() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.load_portfolio("u1").unwrap().is_none());

        let mut portfolio = Portfolio::new("u1".to_string(), 500.0, 3);
        portfolio
            .live_holdings
            .insert("p1".to_string(), Holding::open("p1".to_string(), 2, 40.0, 1));
        store.save_portfolio(&portfolio).unwrap();
        store.save_portfolio(&portfolio).unwrap();

        assert_eq!(store.load_portfolio("u1").unwrap(), Some(portfolio));
        assert_eq!(store.portfolio_count(), 1);
    }

    #[test]
    fn test_trades_newest_first() {
        let store = SqliteStore::new_in_memory().unwrap();
        for (i, shares) in [1u32, 2, 3].into_iter().enumerate() {
            let mut trade = Trade::executed(
                "u1".to_string(),
                "p1".to_string(),
                TradeDirection::Buy,
                OrderType::Market,
                shares,
                20.0,
                AccountBook::Season,
                None,
            );
            trade.timestamp = i as i64;
            store.append_trade(&trade).unwrap();
        }

        let trades = store.trades_for_user("u1", 2).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].shares, 3);
        assert!(store.trades_for_user("u2", 10).unwrap().is_empty());
    }
}
