use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::TradingError;
use crate::services::trading::{parse_book, parse_direction};
use crate::types::{
    ClientMessage, Identity, MarketDataPayload, PlayerSummary, Portfolio, ServerMessage, Topic,
    TradeResultData, WelcomeData,
};
use crate::AppState;

/// Connection query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Response {
    let identity = resolve_identity(&state, query.token.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Resolve a connection token, falling back to a guest identity.
pub fn resolve_identity(state: &AppState, token: Option<&str>) -> Identity {
    match token {
        Some(token) => match state.identity.verify(token) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Token rejected ({}), connecting as guest", e);
                Identity::guest()
            }
        },
        None => Identity::guest(),
    }
}

/// Open the portfolio a connection trades against.
pub fn open_session(state: &AppState, identity: &Identity) -> Portfolio {
    if identity.guest {
        state.trading.open_guest_portfolio(&identity.user_id)
    } else {
        state.trading.open_portfolio(&identity.user_id)
    }
}

/// Tear down a connection's session state. Guest portfolios and their
/// resting orders go away with the connection.
pub fn close_session(state: &AppState, identity: &Identity) {
    if identity.guest {
        state.limit_orders.cancel_all_for_user(&identity.user_id);
        state.trading.close_guest_portfolio(&identity.user_id);
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();

    open_session(&state, &identity);
    let (client_id, queue) = state.room_manager.register(identity.clone());
    info!(
        "WebSocket client connected: {} ({})",
        client_id, identity.user_id
    );

    send_welcome(&state, client_id, identity.clone());

    // Forward queued messages to the socket
    let forward_queue = queue.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = forward_queue.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!("Received message from {}: {}", client_id, text);
                handle_message(&state, client_id, &text);
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket client disconnecting: {}", client_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by axum
                debug!("Received ping from {}", client_id);
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", client_id, e);
                break;
            }
            _ => {}
        }
    }

    // Clean up
    state.room_manager.unregister(client_id);
    close_session(&state, &identity);
    send_task.abort();
    if queue.dropped() > 0 {
        debug!("Client {} dropped {} slow messages", client_id, queue.dropped());
    }
    info!("WebSocket client disconnected: {}", client_id);
}

fn send_welcome(state: &AppState, client_id: Uuid, identity: Identity) {
    let welcome = ServerMessage::Welcome {
        data: WelcomeData {
            identity,
            online: state.room_manager.client_count(),
        },
    };
    send_message(state, client_id, &welcome);

    let market = ServerMessage::MarketData {
        data: MarketDataPayload {
            players: state
                .trading
                .get_players()
                .iter()
                .map(PlayerSummary::from)
                .collect(),
            flash_multipliers: state.trading.active_flash_multipliers(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    };
    send_message(state, client_id, &market);
}

/// Handle one text frame from a client.
pub fn handle_message(state: &AppState, client_id: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send_error(state, client_id, &format!("Invalid message: {}", e));
            return;
        }
    };

    let Some(identity) = state.room_manager.identity(client_id) else {
        return;
    };

    match msg {
        ClientMessage::Join { topic } => {
            if !may_join(&identity, &topic) {
                send_error(state, client_id, &format!("Cannot join {}", topic));
                return;
            }
            state.room_manager.join(client_id, topic.clone());
            debug!("Client {} joined {}", client_id, topic);
            send_message(state, client_id, &ServerMessage::Joined { topic });
        }
        ClientMessage::Leave { topic } => {
            state.room_manager.leave(client_id, &topic);
            debug!("Client {} left {}", client_id, topic);
            send_message(state, client_id, &ServerMessage::Left { topic });
        }
        ClientMessage::ExecuteTrade {
            player_id,
            direction,
            shares,
            account_book,
        } => {
            let result = parse_direction(&direction)
                .and_then(|d| Ok((d, parse_book(&account_book)?)))
                .and_then(|(direction, book)| {
                    state
                        .trading
                        .execute_trade(&identity.user_id, &player_id, direction, shares, book)
                });

            let data = match result {
                Ok(trade) => TradeResultData {
                    success: true,
                    trade: Some(trade),
                    error: None,
                    code: None,
                },
                Err(e) => TradeResultData {
                    success: false,
                    trade: None,
                    error: Some(e.to_string()),
                    code: Some(e.code().to_string()),
                },
            };
            send_message(state, client_id, &ServerMessage::TradeResult { data });
        }
        ClientMessage::PlaceLimitOrder {
            player_id,
            direction,
            shares,
            limit_price,
            account_book,
        } => {
            let result = parse_direction(&direction)
                .and_then(|d| Ok((d, parse_book(&account_book)?)))
                .and_then(|(direction, book)| {
                    state.limit_orders.place(
                        &identity.user_id,
                        &player_id,
                        direction,
                        shares,
                        limit_price,
                        book,
                    )
                });
            // Success is delivered as limit_order_update on the user topic
            if let Err(e) = result {
                send_trading_error(state, client_id, &e);
            }
        }
        ClientMessage::CancelLimitOrder { order_id } => {
            if let Err(e) = state.limit_orders.cancel(&identity.user_id, &order_id) {
                send_trading_error(state, client_id, &e);
            }
        }
        ClientMessage::Ping { timestamp } => {
            send_message(state, client_id, &ServerMessage::Pong { timestamp });
        }
    }
}

/// Private topics are only open to their owner.
fn may_join(identity: &Identity, topic: &Topic) -> bool {
    match topic {
        Topic::User(id) | Topic::Portfolio(id) => *id == identity.user_id,
        _ => true,
    }
}

fn send_message(state: &AppState, client_id: Uuid, msg: &ServerMessage) {
    state.room_manager.send_to(client_id, msg);
}

fn send_trading_error(state: &AppState, client_id: Uuid, error: &TradingError) {
    send_error(state, client_id, &format!("{}: {}", error.code(), error));
}

fn send_error(state: &AppState, client_id: Uuid, error: &str) {
    let msg = ServerMessage::Error {
        error: error.to_string(),
    };
    send_message(state, client_id, &msg);
}
