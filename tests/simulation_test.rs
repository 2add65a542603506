//! End-to-end tests of the running simulation

mod common;

use common::{config, state_with};
use courtside::types::*;
use courtside::websocket::OutboundQueue;
use std::time::Duration;

fn fast_state() -> courtside::AppState {
    let mut cfg = config(false);
    cfg.simulation.tick_interval = Duration::from_millis(20);
    cfg.events.tick_interval = Duration::from_secs(3600);
    state_with(cfg, None)
}

async fn next_of_type(queue: &OutboundQueue, kind: &str) -> serde_json::Value {
    let wait = async {
        loop {
            let Some(raw) = queue.recv().await else {
                panic!("queue closed");
            };
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            if value["type"] == kind {
                return value;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("message not received in time")
}

#[tokio::test]
async fn test_cycles_reach_subscribers() {
    let state = fast_state();
    state.trading.open_portfolio("u1");
    state
        .trading
        .execute_trade("u1", "e", TradeDirection::Buy, 1, AccountBook::Season)
        .unwrap();

    let (id, queue) = state.room_manager.register(Identity {
        user_id: "u1".to_string(),
        username: "u1".to_string(),
        guest: false,
    });
    state
        .room_manager
        .join(id, Topic::Leaderboard("value".to_string()));
    state.room_manager.join(id, Topic::Portfolio("u1".to_string()));

    let fanout = state.start();

    let leaderboard = next_of_type(&queue, "leaderboard_update").await;
    assert_eq!(leaderboard["data"]["kind"], "value");
    assert_eq!(leaderboard["data"]["entries"][0]["userId"], "u1");

    let portfolio = next_of_type(&queue, "portfolio_update").await;
    assert_eq!(portfolio["data"]["userId"], "u1");

    state.stop();
    fanout.abort();
    assert!(!state.engine.is_running());
    assert!(state.engine.tick_count() > 0);
}

#[tokio::test]
async fn test_flash_reaches_general_and_price_update_follows() {
    let state = fast_state();
    let (_, queue) = state.room_manager.register(Identity::guest());
    let fanout = state.start();

    let flash = state.game_events.trigger_flash("f", 2.0, None).unwrap();
    assert_eq!(flash.player_id, "f");

    let message = next_of_type(&queue, "flash_multiplier").await;
    assert_eq!(message["data"]["playerId"], "f");

    let update = next_of_type(&queue, "price_update").await;
    assert!(update["data"]["price"].as_f64().unwrap() >= PRICE_FLOOR);

    state.stop();
    fanout.abort();
}

#[tokio::test]
async fn test_prices_respect_floor_while_running() {
    let state = fast_state();
    let fanout = state.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    state.stop();
    fanout.abort();

    for player in state.registry.list() {
        assert!(player.current_price >= PRICE_FLOOR);
        assert!(player.price_history.len() <= PRICE_HISTORY_CAPACITY);
    }
}
