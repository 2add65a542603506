//! Bridge from price engine events to WebSocket rooms.

use crate::services::PortfolioLedger;
use crate::types::{EngineEvent, LeaderboardUpdateData, ServerMessage, Topic};
use crate::websocket::RoomManager;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Rows published with every leaderboard update.
pub const LEADERBOARD_SIZE: usize = 10;

/// Kind key of the value-ranked leaderboard topic.
pub const VALUE_LEADERBOARD: &str = "value";

/// Relays engine events to subscribed clients.
pub struct PriceFanout {
    ledger: Arc<PortfolioLedger>,
    room_manager: Arc<RoomManager>,
}

impl PriceFanout {
    pub fn new(ledger: Arc<PortfolioLedger>, room_manager: Arc<RoomManager>) -> Self {
        Self {
            ledger,
            room_manager,
        }
    }

    /// Publish the messages for one engine event.
    pub fn handle(&self, event: &EngineEvent) {
        match event {
            EngineEvent::PriceUpdated(update) => {
                self.room_manager.publish_multi(
                    &[Topic::General, Topic::Player(update.player_id.clone())],
                    &ServerMessage::PriceUpdate {
                        data: update.clone(),
                    },
                );
            }
            EngineEvent::CycleCompleted { tick, .. } => {
                self.publish_leaderboard();
                let portfolios = self.publish_portfolios();
                debug!("Cycle {} fan-out: {} portfolio updates", tick, portfolios);
            }
        }
    }

    fn publish_leaderboard(&self) {
        let topic = Topic::Leaderboard(VALUE_LEADERBOARD.to_string());
        if self.room_manager.subscriber_count(&topic) == 0 {
            return;
        }
        let msg = ServerMessage::LeaderboardUpdate {
            data: LeaderboardUpdateData {
                kind: VALUE_LEADERBOARD.to_string(),
                entries: self.ledger.leaderboard(LEADERBOARD_SIZE),
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        };
        self.room_manager.publish(&topic, &msg);
    }

    fn publish_portfolios(&self) -> usize {
        let mut published = 0;
        for user_id in self.ledger.users_with_holdings() {
            let topic = Topic::Portfolio(user_id.clone());
            if self.room_manager.subscriber_count(&topic) == 0 {
                continue;
            }
            if let Some(portfolio) = self.ledger.get(&user_id) {
                self.room_manager
                    .publish(&topic, &ServerMessage::PortfolioUpdate { data: portfolio });
                published += 1;
            }
        }
        published
    }

    /// Run the relay until the engine's channel closes.
    pub fn spawn(self, mut rx: broadcast::Receiver<EngineEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Price fan-out started");
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Price fan-out lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("Price fan-out stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Holding, Identity, Portfolio, PriceUpdate};

    fn connect(manager: &RoomManager, user: &str) -> (uuid::Uuid, Arc<crate::websocket::OutboundQueue>) {
        let (id, queue) = manager.register(Identity {
            user_id: user.to_string(),
            username: user.to_string(),
            guest: false,
        });
        while queue.try_recv().is_some() {}
        (id, queue)
    }

    #[test]
    fn test_price_update_reaches_general_once() {
        let manager = RoomManager::new(16);
        let fanout = PriceFanout::new(PortfolioLedger::new(), manager.clone());
        let (id, queue) = connect(&manager, "u1");
        manager.join(id, Topic::Player("p1".to_string()));

        fanout.handle(&EngineEvent::PriceUpdated(PriceUpdate {
            player_id: "p1".to_string(),
            price: 12.0,
            delta: 1.0,
            change_percent: 9.09,
            reason: None,
            timestamp: 0,
        }));

        let message = queue.try_recv().unwrap();
        assert!(message.contains("\"type\":\"price_update\""));
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_cycle_publishes_subscribed_portfolios() {
        let manager = RoomManager::new(16);
        let ledger = PortfolioLedger::new();
        let mut portfolio = Portfolio::new("u1".to_string(), 100.0, 5);
        portfolio
            .season_holdings
            .insert("p1".to_string(), Holding::open("p1".to_string(), 1, 10.0, 0));
        ledger.replace(portfolio);

        let fanout = PriceFanout::new(ledger, manager.clone());
        let (id, queue) = connect(&manager, "u1");
        manager.join(id, Topic::Portfolio("u1".to_string()));
        manager.join(id, Topic::Leaderboard(VALUE_LEADERBOARD.to_string()));

        fanout.handle(&EngineEvent::CycleCompleted { tick: 1, updated: 1 });

        let messages: Vec<String> = std::iter::from_fn(|| queue.try_recv()).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("leaderboard_update"));
        assert!(messages[1].contains("portfolio_update"));
    }
}
