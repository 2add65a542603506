//! Game Event Generator
//!
//! Runs on its own interval, independent of the price engine. Plays a
//! scripted queue of events first, then falls back to random events for
//! random active players. Events with a multiplier above 1 also raise a
//! flash multiplier, which a separate sweep expires.

use crate::config::EventConfig;
use crate::error::TradingError;
use crate::services::{FlashBoard, PlayerRegistry, PriceEngine};
use crate::types::{
    FlashExpiredData, FlashMultiplier, GameEvent, GameEventKind, Player, ScriptedEvent,
    ServerMessage, Topic,
};
use crate::websocket::RoomManager;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Demo script played before random events take over.
pub fn default_script() -> Vec<ScriptedEvent> {
    let event = |player: &str, kind, description: &str, price_impact, multiplier| ScriptedEvent {
        player: player.to_string(),
        kind,
        description: description.to_string(),
        price_impact,
        multiplier,
    };

    vec![
        event("LeBron James", GameEventKind::Basket, "LeBron James throws down a tomahawk dunk in transition", 0.025, None),
        event("Stephen Curry", GameEventKind::Basket, "Stephen Curry hits a three from the logo", 0.03, Some(1.5)),
        event("Nikola Jokic", GameEventKind::Assist, "Nikola Jokic finds a cutter with a full-court outlet", 0.015, None),
        event("Victor Wembanyama", GameEventKind::Block, "Victor Wembanyama erases a layup at the rim", 0.02, None),
        event("Luka Doncic", GameEventKind::Basket, "Luka Doncic sinks a step-back three over two defenders", 0.025, Some(2.0)),
        event("Giannis Antetokounmpo", GameEventKind::Rebound, "Giannis Antetokounmpo rips down an offensive board and finishes", 0.01, None),
        event("Shai Gilgeous-Alexander", GameEventKind::Steal, "Shai Gilgeous-Alexander picks the pocket at half court", 0.015, None),
    ]
}

/// Periodic game event source.
pub struct GameEventGenerator {
    registry: Arc<PlayerRegistry>,
    engine: Arc<PriceEngine>,
    flashes: Arc<FlashBoard>,
    room_manager: Option<Arc<RoomManager>>,
    config: EventConfig,
    script: Mutex<VecDeque<ScriptedEvent>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GameEventGenerator {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        engine: Arc<PriceEngine>,
        flashes: Arc<FlashBoard>,
        config: EventConfig,
    ) -> Self {
        Self {
            registry,
            engine,
            flashes,
            room_manager: None,
            config,
            script: Mutex::new(default_script().into()),
            task: Mutex::new(None),
        }
    }

    /// Replace the scripted queue.
    pub fn with_script(self, script: Vec<ScriptedEvent>) -> Self {
        *self.script.lock().unwrap() = script.into();
        self
    }

    pub fn with_room_manager(mut self, room_manager: Arc<RoomManager>) -> Self {
        self.room_manager = Some(room_manager);
        self
    }

    /// Scripted events not yet played.
    pub fn remaining_script(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    /// Start the event and sweep timers. A second call while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            info!("Event generator already running");
            return;
        }

        let generator = Arc::clone(self);
        let event_period = self.config.tick_interval;
        let sweep_period = self.config.flash_sweep_interval;
        *task = Some(tokio::spawn(async move {
            let mut events = tokio::time::interval(event_period);
            let mut sweeps = tokio::time::interval(sweep_period);
            events.set_missed_tick_behavior(MissedTickBehavior::Skip);
            sweeps.set_missed_tick_behavior(MissedTickBehavior::Skip);
            events.tick().await;
            sweeps.tick().await;

            loop {
                tokio::select! {
                    _ = events.tick() => {
                        generator.step();
                    }
                    _ = sweeps.tick() => {
                        generator.sweep_flashes(chrono::Utc::now().timestamp_millis());
                    }
                }
            }
        }));

        info!(
            "Event generator started (event every {}s, {} scripted)",
            event_period.as_secs(),
            self.remaining_script()
        );
    }

    /// Stop both timers. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
            info!("Event generator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one event tick.
    ///
    /// Plays the next scripted event, or once the script is exhausted rolls
    /// for a random one.
    pub fn step(&self) -> Option<GameEvent> {
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(event) => self.play(event),
            None => {
                let roll: f64 = rand::thread_rng().gen();
                if roll < self.config.random_event_probability {
                    self.random_event()
                } else {
                    None
                }
            }
        }
    }

    /// Play a scripted event. Events naming an unknown player are skipped.
    pub fn play(&self, event: ScriptedEvent) -> Option<GameEvent> {
        let Some(player) = self.registry.find(&event.player) else {
            warn!("Scripted event for unknown player {} skipped", event.player);
            return None;
        };
        self.emit(
            &player,
            event.kind,
            event.description,
            event.price_impact,
            event.multiplier,
        )
    }

    /// Generate an event for a random active player.
    pub fn random_event(&self) -> Option<GameEvent> {
        let mut rng = rand::thread_rng();
        let ids = self.registry.active_ids();
        let id = ids.choose(&mut rng)?;
        let player = self.registry.get(id)?;
        let kind = *GameEventKind::ALL.choose(&mut rng)?;

        let (low, high) = kind.impact_range();
        let impact = rng.gen_range(low..high);
        let multiplier = if rng.gen::<f64>() < self.config.random_multiplier_probability {
            Some(rng.gen_range(1.5..=2.5_f64))
        } else {
            None
        };

        let description = kind.describe(&player.name);
        self.emit(&player, kind, description, impact, multiplier)
    }

    /// Apply an event's price impact and broadcast it.
    fn emit(
        &self,
        player: &Player,
        kind: GameEventKind,
        description: String,
        price_impact: f64,
        multiplier: Option<f64>,
    ) -> Option<GameEvent> {
        if !self.engine.apply_shock(&player.id, 1.0 + price_impact, &description) {
            return None;
        }

        let event = GameEvent {
            id: uuid::Uuid::new_v4().to_string(),
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            kind,
            description,
            price_impact,
            multiplier,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        info!("Game event: {} ({:+.2}%)", event.description, price_impact * 100.0);

        if let Some(ref room_manager) = self.room_manager {
            room_manager.publish_multi(
                &[Topic::General, Topic::Player(player.id.clone())],
                &ServerMessage::GameEvent {
                    data: event.clone(),
                },
            );
        }

        if let Some(factor) = multiplier.filter(|m| *m > 1.0) {
            self.raise_flash(player, factor, event.description.clone());
        }

        Some(event)
    }

    /// Shock a player's price by `multiplier` and raise a flash multiplier.
    pub fn trigger_flash(
        &self,
        player_id: &str,
        multiplier: f64,
        description: Option<String>,
    ) -> Result<FlashMultiplier, TradingError> {
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(TradingError::InvalidInput(format!(
                "flash multiplier must be above 1, got {}",
                multiplier
            )));
        }
        let player = self
            .registry
            .get(player_id)
            .ok_or_else(|| TradingError::PlayerNotFound(player_id.to_string()))?;

        let description =
            description.unwrap_or_else(|| format!("{} is heating up", player.name));
        if !self.engine.apply_shock(&player.id, multiplier, &description) {
            return Err(TradingError::PlayerNotFound(player_id.to_string()));
        }
        Ok(self.raise_flash(&player, multiplier, description))
    }

    fn raise_flash(&self, player: &Player, multiplier: f64, description: String) -> FlashMultiplier {
        let flash = FlashMultiplier::new(
            player.id.clone(),
            player.name.clone(),
            multiplier,
            self.config.flash_duration.as_millis() as i64,
            description,
        );
        if let Some(previous) = self.flashes.register(flash.clone()) {
            debug!("Flash {} on {} replaced", previous.id, previous.player_id);
        }
        info!("Flash multiplier x{:.2} on {}", multiplier, player.name);

        if let Some(ref room_manager) = self.room_manager {
            room_manager.publish_multi(
                &[Topic::General, Topic::Player(player.id.clone())],
                &ServerMessage::FlashMultiplier {
                    data: flash.clone(),
                },
            );
        }
        flash
    }

    /// Expire flashes whose lifetime has elapsed and announce each one.
    pub fn sweep_flashes(&self, now: i64) -> Vec<FlashMultiplier> {
        let expired = self.flashes.sweep_expired(now);
        for flash in &expired {
            debug!("Flash multiplier on {} expired", flash.player_name);
            if let Some(ref room_manager) = self.room_manager {
                room_manager.publish_multi(
                    &[Topic::General, Topic::Player(flash.player_id.clone())],
                    &ServerMessage::FlashMultiplierExpired {
                        data: FlashExpiredData {
                            id: flash.id.clone(),
                            player_id: flash.player_id.clone(),
                            player_name: flash.player_name.clone(),
                            timestamp: now,
                        },
                    },
                );
            }
        }
        expired
    }
}
