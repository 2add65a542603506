//! Tests for the WebSocket protocol and fan-out rooms

mod common;

use common::{config, state, state_with};
use courtside::services::{PortfolioStore, SqliteStore};
use courtside::types::*;
use courtside::websocket::handler::{close_session, handle_message, open_session, resolve_identity};
use courtside::websocket::OutboundQueue;
use std::sync::Arc;
use uuid::Uuid;

fn identity(user_id: &str) -> Identity {
    Identity {
        user_id: user_id.to_string(),
        username: user_id.to_string(),
        guest: false,
    }
}

fn connect(state: &courtside::AppState, user_id: &str) -> (Uuid, Arc<OutboundQueue>) {
    state.trading.open_portfolio(user_id);
    let (id, queue) = state.room_manager.register(identity(user_id));
    while queue.try_recv().is_some() {}
    (id, queue)
}

fn drain(queue: &OutboundQueue) -> Vec<serde_json::Value> {
    std::iter::from_fn(|| queue.try_recv())
        .map(|m| serde_json::from_str(&m).unwrap())
        .collect()
}

// =============================================================================
// Message parsing
// =============================================================================

#[test]
fn test_execute_trade_parsing() {
    let json = r#"{"type":"execute_trade","player_id":"e","direction":"buy","shares":3,"account_book":"live"}"#;
    let msg: ClientMessage = serde_json::from_str(json).unwrap();

    match msg {
        ClientMessage::ExecuteTrade {
            player_id,
            direction,
            shares,
            account_book,
        } => {
            assert_eq!(player_id, "e");
            assert_eq!(direction, "buy");
            assert_eq!(shares, 3);
            assert_eq!(account_book, "live");
        }
        _ => panic!("Expected ExecuteTrade message"),
    }
}

#[test]
fn test_unknown_topic_rejected_at_parse() {
    let json = r#"{"type":"join","topic":"team:bos"}"#;
    assert!(serde_json::from_str::<ClientMessage>(json).is_err());
}

#[test]
fn test_server_message_tags() {
    let msg = ServerMessage::Joined {
        topic: Topic::Player("e".to_string()),
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert_eq!(json, r#"{"type":"joined","topic":"player:e"}"#);

    let msg = ServerMessage::Presence {
        data: PresenceData { online: 3 },
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains(r#""type":"presence""#));
    assert!(json.contains(r#""online":3"#));
}

// =============================================================================
// Rooms
// =============================================================================

#[test]
fn test_register_joins_general_and_user() {
    let state = state();
    let (id, _queue) = state.room_manager.register(identity("u1"));

    let topics = state.room_manager.topics(id);
    assert!(topics.contains(&Topic::General));
    assert!(topics.contains(&Topic::User("u1".to_string())));
}

#[test]
fn test_publish_multi_delivers_once() {
    let state = state();
    let (id, queue) = connect(&state, "u1");
    state.room_manager.join(id, Topic::Player("e".to_string()));

    let delivered = state.room_manager.publish_multi(
        &[Topic::General, Topic::Player("e".to_string())],
        &ServerMessage::Pong { timestamp: 1 },
    );
    assert_eq!(delivered, 1);
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_disconnect_leaves_rooms_and_updates_presence() {
    let state = state();
    let (first, _) = connect(&state, "u1");
    let (_, second_queue) = connect(&state, "u2");
    while second_queue.try_recv().is_some() {}

    state.room_manager.unregister(first);

    assert_eq!(state.room_manager.client_count(), 1);
    assert_eq!(state.room_manager.subscriber_count(&Topic::User("u1".to_string())), 0);
    let messages = drain(&second_queue);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "presence");
    assert_eq!(messages[0]["data"]["online"], 1);
}

#[test]
fn test_slow_subscriber_drops_oldest() {
    let queue = OutboundQueue::new(2);
    assert!(queue.push("a".to_string()));
    assert!(queue.push("b".to_string()));
    assert!(queue.push("c".to_string()));

    assert_eq!(queue.dropped(), 1);
    assert_eq!(queue.try_recv().as_deref(), Some("b"));
    assert_eq!(queue.try_recv().as_deref(), Some("c"));

    queue.close();
    assert!(!queue.push("d".to_string()));
}

// =============================================================================
// Client messages
// =============================================================================

#[test]
fn test_join_and_leave() {
    let state = state();
    let (id, queue) = connect(&state, "u1");

    handle_message(&state, id, r#"{"type":"join","topic":"player:e"}"#);
    handle_message(&state, id, r#"{"type":"leave","topic":"player:e"}"#);

    let messages = drain(&queue);
    assert_eq!(messages[0]["type"], "joined");
    assert_eq!(messages[0]["topic"], "player:e");
    assert_eq!(messages[1]["type"], "left");
    assert!(!state
        .room_manager
        .topics(id)
        .contains(&Topic::Player("e".to_string())));
}

#[test]
fn test_private_topics_are_owner_only() {
    let state = state();
    let (id, queue) = connect(&state, "u1");

    handle_message(&state, id, r#"{"type":"join","topic":"portfolio:u2"}"#);
    handle_message(&state, id, r#"{"type":"join","topic":"portfolio:u1"}"#);

    let messages = drain(&queue);
    assert_eq!(messages[0]["type"], "error");
    assert_eq!(messages[1]["type"], "joined");
}

#[test]
fn test_execute_trade_result() {
    let state = state();
    let (id, queue) = connect(&state, "u1");

    handle_message(
        &state,
        id,
        r#"{"type":"execute_trade","player_id":"e","direction":"buy","shares":2,"account_book":"season"}"#,
    );
    let messages = drain(&queue);
    let result = messages
        .iter()
        .find(|m| m["type"] == "trade_result")
        .unwrap();
    assert_eq!(result["data"]["success"], true);
    assert_eq!(result["data"]["trade"]["shares"], 2);

    handle_message(
        &state,
        id,
        r#"{"type":"execute_trade","player_id":"e","direction":"buy","shares":100,"account_book":"season"}"#,
    );
    let messages = drain(&queue);
    let result = messages
        .iter()
        .find(|m| m["type"] == "trade_result")
        .unwrap();
    assert_eq!(result["data"]["success"], false);
    assert_eq!(result["data"]["code"], "INSUFFICIENT_FUNDS");
}

#[test]
fn test_bad_direction_reports_invalid_input() {
    let state = state();
    let (id, queue) = connect(&state, "u1");

    handle_message(
        &state,
        id,
        r#"{"type":"execute_trade","player_id":"e","direction":"hold","shares":1,"account_book":"season"}"#,
    );
    let messages = drain(&queue);
    assert_eq!(messages[0]["data"]["code"], "INVALID_INPUT");
}

#[test]
fn test_limit_order_round_trip() {
    let state = state();
    let (id, queue) = connect(&state, "u1");

    handle_message(
        &state,
        id,
        r#"{"type":"place_limit_order","player_id":"e","direction":"buy","shares":1,"limit_price":90.0,"account_book":"season"}"#,
    );
    let messages = drain(&queue);
    assert_eq!(messages[0]["type"], "limit_order_update");
    let order_id = messages[0]["data"]["id"].as_str().unwrap().to_string();

    let cancel = format!(r#"{{"type":"cancel_limit_order","order_id":"{}"}}"#, order_id);
    handle_message(&state, id, &cancel);
    let messages = drain(&queue);
    assert_eq!(messages[0]["data"]["status"], "cancelled");

    handle_message(&state, id, &cancel);
    let messages = drain(&queue);
    assert_eq!(messages[0]["type"], "error");
}

#[test]
fn test_ping_and_garbage() {
    let state = state();
    let (id, queue) = connect(&state, "u1");

    handle_message(&state, id, r#"{"type":"ping","timestamp":42}"#);
    handle_message(&state, id, "not json");

    let messages = drain(&queue);
    assert_eq!(messages[0]["type"], "pong");
    assert_eq!(messages[0]["timestamp"], 42);
    assert_eq!(messages[1]["type"], "error");
}

// =============================================================================
// Session teardown
// =============================================================================

#[test]
fn test_guest_portfolio_dropped_on_disconnect() {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let state = state_with(config(false), Some(store.clone() as Arc<dyn PortfolioStore>));

    let guest = resolve_identity(&state, None);
    assert!(guest.guest);
    open_session(&state, &guest);
    state
        .trading
        .execute_trade(&guest.user_id, "g", TradeDirection::Buy, 2, AccountBook::Season)
        .unwrap();
    let order = state
        .limit_orders
        .place(&guest.user_id, "g", TradeDirection::Buy, 1, 5.0, AccountBook::Season)
        .unwrap();
    assert_eq!(state.trading.get_trade_history(&guest.user_id, 10).len(), 1);

    close_session(&state, &guest);

    assert!(state.trading.get_portfolio(&guest.user_id).is_none());
    assert_eq!(
        state.limit_orders.get(&order.id).unwrap().status,
        LimitOrderStatus::Cancelled
    );
    assert!(store.load_portfolio(&guest.user_id).unwrap().is_none());
    assert!(store.trades_for_user(&guest.user_id, 10).unwrap().is_empty());
}

#[test]
fn test_registered_portfolio_survives_disconnect() {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let state = state_with(config(false), Some(store.clone() as Arc<dyn PortfolioStore>));
    let user = identity("u1");

    open_session(&state, &user);
    close_session(&state, &user);

    assert!(state.trading.get_portfolio("u1").is_some());
    assert!(store.load_portfolio("u1").unwrap().is_some());
}
