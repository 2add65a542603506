//! Courtside - real-time NBA player stock market simulation server

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;
pub mod websocket;

use axum::{routing::get, Router};
use config::Config;
use services::{
    roster, AuthService, FlashBoard, GameEventGenerator, IdentityResolver, LimitOrderWatcher,
    PlayerRegistry, PortfolioLedger, PortfolioStore, PriceEngine, PriceFanout, SqliteStore,
    TickListener, TradingService,
};
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use types::PlayerSeed;
use websocket::RoomManager;

// Re-export commonly used types
pub use types::*;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<PlayerRegistry>,
    pub ledger: Arc<PortfolioLedger>,
    pub engine: Arc<PriceEngine>,
    pub flashes: Arc<FlashBoard>,
    pub trading: Arc<TradingService>,
    pub limit_orders: Arc<LimitOrderWatcher>,
    pub game_events: Arc<GameEventGenerator>,
    pub room_manager: Arc<RoomManager>,
    pub auth: Arc<AuthService>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    /// Build the application from configuration.
    ///
    /// Loads the roster and opens the database. A database that cannot be
    /// opened degrades to in-memory operation.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let seeds = roster::load_roster(config.roster_path.as_deref().map(Path::new))?;

        let store: Option<Arc<dyn PortfolioStore>> = match config.database_path.as_deref() {
            Some(path) => match SqliteStore::new(path) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    warn!("Database {} unavailable, running in memory: {}", path, e);
                    None
                }
            },
            None => None,
        };

        Ok(Self::assemble(config, seeds, store))
    }

    /// Wire every service together.
    pub fn assemble(
        config: Config,
        seeds: Vec<PlayerSeed>,
        store: Option<Arc<dyn PortfolioStore>>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = PlayerRegistry::new(seeds);
        let ledger = PortfolioLedger::new();
        let flashes = FlashBoard::new();
        let room_manager = RoomManager::new(config.outbound_queue_capacity);

        let engine = PriceEngine::new(registry.clone(), ledger.clone(), config.simulation.clone());

        let mut trading = TradingService::new(
            registry.clone(),
            ledger.clone(),
            engine.clone(),
            flashes.clone(),
            config.trading.clone(),
        )
        .with_room_manager(room_manager.clone());
        if let Some(store) = store {
            trading = trading.with_store(store);
        }
        let trading = Arc::new(trading);

        let limit_orders = Arc::new(
            LimitOrderWatcher::new(trading.clone(), registry.clone(), config.limit_orders.clone())
                .with_room_manager(room_manager.clone()),
        );
        let listener: Weak<dyn TickListener> = Arc::downgrade(&limit_orders) as Weak<dyn TickListener>;
        engine.add_tick_listener(listener);

        let game_events = Arc::new(
            GameEventGenerator::new(
                registry.clone(),
                engine.clone(),
                flashes.clone(),
                config.events.clone(),
            )
            .with_room_manager(room_manager.clone()),
        );

        let auth = Arc::new(AuthService::new(config.session_ttl));
        let identity: Arc<dyn IdentityResolver> = auth.clone();

        Self {
            config,
            registry,
            ledger,
            engine,
            flashes,
            trading,
            limit_orders,
            game_events,
            room_manager,
            auth,
            identity,
        }
    }

    /// Start the periodic engines and the price fan-out.
    pub fn start(&self) -> JoinHandle<()> {
        let fanout = PriceFanout::new(self.ledger.clone(), self.room_manager.clone())
            .spawn(self.engine.subscribe());
        self.engine.start();
        self.game_events.start();
        self.auth.start_cleanup(self.config.session_sweep_interval);
        fanout
    }

    /// Stop the periodic engines.
    pub fn stop(&self) {
        self.engine.stop();
        self.game_events.stop();
        self.auth.stop_cleanup();
        info!("Simulation stopped");
    }
}

/// Build the HTTP and WebSocket router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
