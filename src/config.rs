use std::env;
use std::time::Duration;
use tracing::warn;

/// Price simulation engine settings.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Interval between price ticks.
    pub tick_interval: Duration,
    /// Add the stats-derived performance drift (at most ±2%).
    pub performance_factor: bool,
    /// Add random sentiment swings (at most ±10%).
    pub sentiment_factor: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            performance_factor: true,
            sentiment_factor: false,
        }
    }
}

/// Game event generator settings.
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Interval between game events.
    pub tick_interval: Duration,
    /// Chance of a random event once the script is exhausted.
    pub random_event_probability: f64,
    /// Chance that a random event carries a flash multiplier.
    pub random_multiplier_probability: f64,
    /// Lifetime of a flash multiplier.
    pub flash_duration: Duration,
    /// Interval of the flash multiplier expiry sweep.
    pub flash_sweep_interval: Duration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            random_event_probability: 0.3,
            random_multiplier_probability: 0.1,
            flash_duration: Duration::from_secs(60),
            flash_sweep_interval: Duration::from_secs(5),
        }
    }
}

/// Settlement and portfolio settings.
#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// Cash a new portfolio starts with.
    pub starting_balance: f64,
    /// Live-book trades allowed per session.
    pub live_trades_per_session: u32,
    /// Number of trade records kept in memory.
    pub trade_log_capacity: usize,
    /// Move the market by each settled trade's own impact.
    pub apply_market_impact: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            starting_balance: 10_000.0,
            live_trades_per_session: 10,
            trade_log_capacity: 1000,
            apply_market_impact: true,
        }
    }
}

/// Limit-order watcher settings.
#[derive(Debug, Clone)]
pub struct LimitOrderConfig {
    /// Time a pending order stays valid.
    pub ttl: Duration,
    /// How long terminal orders are kept.
    pub retention: Duration,
    /// Maximum number of orders kept, terminal ones included.
    pub capacity: usize,
}

impl Default for LimitOrderConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            capacity: 100,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database path. In-memory only when unset.
    pub database_path: Option<String>,
    /// JSON roster file. Built-in roster when unset.
    pub roster_path: Option<String>,
    /// Session token lifetime.
    pub session_ttl: Duration,
    /// How often expired sessions are swept.
    pub session_sweep_interval: Duration,
    /// Messages buffered per connection before the oldest is dropped.
    pub outbound_queue_capacity: usize,
    pub simulation: SimulationConfig,
    pub events: EventConfig,
    pub trading: TradingConfig,
    pub limit_orders: LimitOrderConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let value = env::var(key).ok()?;
    let flag = parse_flag(&value);
    if flag.is_none() {
        warn!("Ignoring unrecognized value {:?} for {}", value, key);
    }
    flag
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let simulation_defaults = SimulationConfig::default();
        let event_defaults = EventConfig::default();
        let trading_defaults = TradingConfig::default();
        let limit_defaults = LimitOrderConfig::default();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT").unwrap_or(3001),
            database_path: env::var("DATABASE_PATH").ok().filter(|p| !p.is_empty()),
            roster_path: env::var("ROSTER_PATH").ok().filter(|p| !p.is_empty()),
            session_ttl: env_secs("SESSION_TTL_SECS").unwrap_or(Duration::from_secs(86_400)),
            session_sweep_interval: env_secs("SESSION_SWEEP_SECS")
                .unwrap_or(Duration::from_secs(300)),
            outbound_queue_capacity: env_parse("OUTBOUND_QUEUE_CAPACITY").unwrap_or(256),
            simulation: SimulationConfig {
                tick_interval: env_secs("PRICE_TICK_SECS")
                    .unwrap_or(simulation_defaults.tick_interval),
                performance_factor: env_flag("PERFORMANCE_FACTOR")
                    .unwrap_or(simulation_defaults.performance_factor),
                sentiment_factor: env_flag("SENTIMENT_FACTOR")
                    .unwrap_or(simulation_defaults.sentiment_factor),
            },
            events: EventConfig {
                tick_interval: env_secs("EVENT_TICK_SECS").unwrap_or(event_defaults.tick_interval),
                random_event_probability: env_parse("RANDOM_EVENT_PROBABILITY")
                    .map(|p: f64| p.clamp(0.0, 1.0))
                    .unwrap_or(event_defaults.random_event_probability),
                random_multiplier_probability: env_parse("RANDOM_MULTIPLIER_PROBABILITY")
                    .map(|p: f64| p.clamp(0.0, 1.0))
                    .unwrap_or(event_defaults.random_multiplier_probability),
                flash_duration: env_secs("FLASH_DURATION_SECS")
                    .unwrap_or(event_defaults.flash_duration),
                flash_sweep_interval: env_secs("FLASH_SWEEP_SECS")
                    .unwrap_or(event_defaults.flash_sweep_interval),
            },
            trading: TradingConfig {
                starting_balance: env_parse("STARTING_BALANCE")
                    .unwrap_or(trading_defaults.starting_balance),
                live_trades_per_session: env_parse("LIVE_TRADES_PER_SESSION")
                    .unwrap_or(trading_defaults.live_trades_per_session),
                trade_log_capacity: env_parse("TRADE_LOG_CAPACITY")
                    .unwrap_or(trading_defaults.trade_log_capacity),
                apply_market_impact: env_flag("APPLY_MARKET_IMPACT")
                    .unwrap_or(trading_defaults.apply_market_impact),
            },
            limit_orders: LimitOrderConfig {
                ttl: env_secs("LIMIT_ORDER_TTL_SECS").unwrap_or(limit_defaults.ttl),
                retention: env_parse::<u64>("LIMIT_ORDER_RETENTION_DAYS")
                    .map(|days| Duration::from_secs(days * 24 * 60 * 60))
                    .unwrap_or(limit_defaults.retention),
                capacity: env_parse("LIMIT_ORDER_CAPACITY").unwrap_or(limit_defaults.capacity),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database_path: None,
            roster_path: None,
            session_ttl: Duration::from_secs(86_400),
            session_sweep_interval: Duration::from_secs(300),
            outbound_queue_capacity: 256,
            simulation: SimulationConfig::default(),
            events: EventConfig::default(),
            trading: TradingConfig::default(),
            limit_orders: LimitOrderConfig::default(),
        }
    }
}
