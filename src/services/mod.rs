pub mod auth;
pub mod fanout;
pub mod flash;
pub mod game_events;
pub mod ledger;
pub mod limit_orders;
pub mod market_impact;
pub mod player_registry;
pub mod price_engine;
pub mod roster;
pub mod sqlite_store;
pub mod store;
pub mod trading;

pub use auth::{AuthError, AuthService, IdentityResolver};
pub use fanout::PriceFanout;
pub use flash::FlashBoard;
pub use game_events::GameEventGenerator;
pub use ledger::PortfolioLedger;
pub use limit_orders::{EvaluationSummary, LimitOrderWatcher};
pub use player_registry::PlayerRegistry;
pub use price_engine::{PriceEngine, TickListener};
pub use roster::RosterError;
pub use sqlite_store::SqliteStore;
pub use store::{PortfolioStore, StoreError};
pub use trading::TradingService;
