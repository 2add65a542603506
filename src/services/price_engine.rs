//! Price Simulation Engine
//!
//! Advances every active player's price on a fixed tick from
//! volatility-scaled noise plus optional performance and sentiment drift.
//! Shocks and absolute price moves go through the same pipeline:
//!
//! 1. registry update (floor and rounding)
//! 2. portfolio re-sync, once per cycle
//! 3. observer notification over a broadcast channel, in mutation order
//! 4. tick listeners (limit-order evaluation), once per cycle
//!
//! Observers hear a move before any listener reacts to it, so a fill's
//! market impact is always published after the price that triggered it.

use crate::config::SimulationConfig;
use crate::services::{PlayerRegistry, PortfolioLedger};
use crate::types::{round_cents, EngineEvent, PriceUpdate, PRICE_FLOOR};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Largest performance drift per tick, as a fraction of price.
const MAX_PERFORMANCE: f64 = 0.02;
/// Largest sentiment swing per tick, as a fraction of price.
const MAX_SENTIMENT: f64 = 0.10;

/// Hook run once per price cycle, after portfolios were re-synced.
pub trait TickListener: Send + Sync {
    fn on_price_cycle(&self);
}

/// Periodic price simulator.
pub struct PriceEngine {
    registry: Arc<PlayerRegistry>,
    ledger: Arc<PortfolioLedger>,
    config: SimulationConfig,
    events: broadcast::Sender<EngineEvent>,
    /// Held weakly; listeners usually own a path back to the engine.
    listeners: RwLock<Vec<Weak<dyn TickListener>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    ticks: AtomicU64,
}

impl PriceEngine {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        ledger: Arc<PortfolioLedger>,
        config: SimulationConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            registry,
            ledger,
            config,
            events,
            listeners: RwLock::new(Vec::new()),
            task: Mutex::new(None),
            ticks: AtomicU64::new(0),
        })
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Register a hook run once per cycle.
    pub fn add_tick_listener(&self, listener: Weak<dyn TickListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Start ticking. A second call while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            info!("Price engine already running");
            return;
        }

        let engine = Arc::clone(self);
        let period = self.config.tick_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of an interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.tick();
            }
        }));

        info!(
            "Price engine started ({} players, tick every {}s)",
            self.registry.len(),
            period.as_secs()
        );
    }

    /// Stop ticking. A tick already in progress completes.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
            info!("Price engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of completed cycles.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Run one simulation cycle over every active player.
    pub fn tick(&self) -> Vec<PriceUpdate> {
        let mut rng = rand::thread_rng();
        let mut updates = Vec::new();

        for id in self.registry.active_ids() {
            let Some(player) = self.registry.get(&id) else {
                continue;
            };
            let price = player.current_price;

            let noise = (rng.gen::<f64>() - 0.5) * 2.0 * player.volatility * price;
            let performance = if self.config.performance_factor {
                let drift = ((player.stats.rating() - 0.5) * 0.04)
                    .clamp(-MAX_PERFORMANCE, MAX_PERFORMANCE);
                drift * rng.gen::<f64>()
            } else {
                0.0
            };
            let sentiment = if self.config.sentiment_factor {
                (rng.gen::<f64>() - 0.5) * 2.0 * MAX_SENTIMENT
            } else {
                0.0
            };

            let target = round_cents(
                (price + noise + performance * price + sentiment * price).max(PRICE_FLOOR),
            );

            match self.registry.update_price(&id, target) {
                Some(update) => updates.push(update),
                None => warn!("Player {} vanished during tick", id),
            }
        }

        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        self.resync(&self.registry.prices());
        for update in &updates {
            let _ = self.events.send(EngineEvent::PriceUpdated(update.clone()));
        }
        self.run_listeners();

        let _ = self.events.send(EngineEvent::CycleCompleted {
            tick,
            updated: updates.len(),
        });

        debug!("Price tick {} updated {} players", tick, updates.len());
        updates
    }

    /// Multiply a player's price. Returns false for unknown players.
    pub fn apply_shock(&self, player_id: &str, multiplier: f64, reason: &str) -> bool {
        let Some(price) = self.registry.price(player_id) else {
            warn!("Shock for unknown player {} ignored ({})", player_id, reason);
            return false;
        };
        if !multiplier.is_finite() || multiplier <= 0.0 {
            warn!("Invalid shock multiplier {} for {}", multiplier, player_id);
            return false;
        }
        self.apply_price(player_id, price * multiplier, reason)
    }

    /// Move a player to an absolute price. Returns false for unknown players.
    pub fn apply_price(&self, player_id: &str, new_price: f64, reason: &str) -> bool {
        let target = round_cents(new_price.max(PRICE_FLOOR));
        let Some(mut update) = self.registry.update_price(player_id, target) else {
            warn!("Price move for unknown player {} ignored ({})", player_id, reason);
            return false;
        };
        update.reason = Some(reason.to_string());

        let prices = HashMap::from([(update.player_id.clone(), update.price)]);
        self.resync(&prices);

        debug!(
            "{} moved to {:.2} ({:+.2}): {}",
            player_id, update.price, update.delta, reason
        );
        let _ = self.events.send(EngineEvent::PriceUpdated(update));
        self.run_listeners();
        true
    }

    fn resync(&self, prices: &HashMap<String, f64>) {
        let changed = self.ledger.sync_prices(prices);
        if !changed.is_empty() {
            debug!("Re-synced {} portfolios", changed.len());
        }
    }

    fn run_listeners(&self) {
        let listeners: Vec<Arc<dyn TickListener>> = {
            let mut guard = self.listeners.write().unwrap();
            guard.retain(|l| l.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_price_cycle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlayerSeed, PlayerStats};
    use std::sync::atomic::AtomicUsize;

    fn engine(volatility: f64, price: f64) -> Arc<PriceEngine> {
        let registry = PlayerRegistry::new(vec![PlayerSeed {
            id: "p1".to_string(),
            name: "Player One".to_string(),
            team: "LAL".to_string(),
            position: "G".to_string(),
            base_price: price,
            volatility,
            stats: PlayerStats::default(),
        }]);
        PriceEngine::new(registry, PortfolioLedger::new(), SimulationConfig::default())
    }

    struct Counter(AtomicUsize);

    impl TickListener for Counter {
        fn on_price_cycle(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_shock_scenario() {
        let engine = engine(0.1, 100.0);
        assert!(engine.apply_shock("p1", 1.5, "test"));

        let player = engine.registry().get("p1").unwrap();
        assert_eq!(player.current_price, 150.0);
        assert_eq!(player.price_change_24h, 50.0);
    }

    #[test]
    fn test_shock_unknown_player() {
        let engine = engine(0.1, 100.0);
        assert!(!engine.apply_shock("nobody", 1.5, "test"));
        assert!(!engine.apply_shock("p1", 0.0, "test"));
        assert_eq!(engine.registry().price("p1"), Some(100.0));
    }

    #[test]
    fn test_tick_respects_floor() {
        let engine = engine(0.99, 10.0);
        for _ in 0..200 {
            engine.tick();
            assert!(engine.registry().price("p1").unwrap() >= PRICE_FLOOR);
        }
        assert_eq!(engine.tick_count(), 200);
    }

    #[test]
    fn test_inactive_players_do_not_move() {
        let engine = engine(0.5, 100.0);
        engine.registry().set_active("p1", false);
        assert!(engine.tick().is_empty());
        assert_eq!(engine.registry().price("p1"), Some(100.0));
    }

    #[test]
    fn test_listeners_run_once_per_cycle() {
        let engine = engine(0.1, 100.0);
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let weak: Weak<dyn TickListener> = Arc::downgrade(&counter) as Weak<dyn TickListener>;
        engine.add_tick_listener(weak);

        engine.tick();
        engine.apply_shock("p1", 1.1, "test");
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        drop(counter);
        engine.tick();
        assert!(engine.listeners.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let engine = engine(0.1, 100.0);
        engine.start();
        engine.start();
        assert!(engine.is_running());

        engine.stop();
        engine.stop();
        tokio::task::yield_now().await;
        assert!(!engine.is_running());
    }

    /// Moves the price again from inside the cycle, like a fill's impact.
    struct Mover(Weak<PriceEngine>);

    impl TickListener for Mover {
        fn on_price_cycle(&self) {
            if let Some(engine) = self.0.upgrade() {
                let price = engine.registry().price("p1").unwrap();
                if price < 1000.0 {
                    engine.apply_price("p1", 1000.0, "listener");
                }
            }
        }
    }

    #[test]
    fn test_listener_moves_published_after_tick_update() {
        let engine = engine(0.1, 100.0);
        let mover = Arc::new(Mover(Arc::downgrade(&engine)));
        engine.add_tick_listener(Arc::downgrade(&mover) as Weak<dyn TickListener>);
        let mut rx = engine.subscribe();

        engine.tick();

        let mut prices = Vec::new();
        let mut completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                EngineEvent::PriceUpdated(update) => prices.push(update.price),
                EngineEvent::CycleCompleted { .. } => completed = true,
            }
        }
        assert!(completed);
        assert_eq!(prices.len(), 2);
        assert_ne!(prices[0], 1000.0);
        assert_eq!(prices.last().copied(), engine.registry().price("p1"));
    }

    #[tokio::test]
    async fn test_observers_receive_updates() {
        let engine = engine(0.1, 100.0);
        let mut rx = engine.subscribe();

        engine.tick();
        match rx.recv().await.unwrap() {
            EngineEvent::PriceUpdated(update) => assert_eq!(update.player_id, "p1"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::CycleCompleted { tick: 1, updated: 1 }
        ));
    }
}
