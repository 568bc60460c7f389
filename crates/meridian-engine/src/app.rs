//! Engine lifecycle management.
//!
//! Owns the event bus, world clock and state machine and runs them in a fixed
//! order each frame: clock, queued events, states, render.

use std::path::PathBuf;

use meridian_common::HandlerId;
use meridian_core::{
    payload, Clock, Color, Event, EventBus, EventKind, InputEvent, KeyCode, Propagation,
    StateData, StateKind, StateMachine, Surface,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::states::PlaceholderState;
use crate::timing::FrameTiming;

/// Source name on events the engine publishes.
const SOURCE: &str = "engine";

/// Debug overlay text colour.
const DEBUG_COLOR: Color = Color::rgb(255, 255, 0);

/// Debug overlay layout.
const DEBUG_ORIGIN: (f32, f32) = (10.0, 10.0);
const DEBUG_LINE_HEIGHT: f32 = 25.0;

/// The engine: one bus, one clock, one state machine.
pub struct Engine {
    /// Engine configuration
    config: EngineConfig,
    /// Where the configuration is written on shutdown
    config_path: Option<PathBuf>,

    // === Core Systems ===
    /// Event bus
    bus: EventBus,
    /// World clock
    clock: Clock,
    /// State machine
    states: StateMachine,
    /// Frame timing
    timing: FrameTiming,

    // === Lifecycle ===
    /// Placeholder states registered
    initialized: bool,
    /// Between initialize and shutdown
    running: bool,
    /// Whether debug overlay is visible
    show_debug: bool,
    /// Global handler logging every dispatched event
    event_logger: Option<HandlerId>,
}

impl Engine {
    /// Creates an engine from configuration.
    #[must_use]
    pub fn new(mut config: EngineConfig) -> Self {
        config.validate();

        let bus = EventBus::with_history_capacity(config.events.history_capacity);
        let clock = Clock::with_settings(bus.publisher(), &config.clock_settings());
        let states = StateMachine::with_history_capacity(bus.publisher(), config.states.history_capacity);
        let timing = FrameTiming::new(config.frame.target_fps)
            .with_max_delta(config.frame.max_delta)
            .with_frame_limit(config.frame.limit_frame_rate);

        Self {
            show_debug: config.frame.show_debug,
            config,
            config_path: None,
            bus,
            clock,
            states,
            timing,
            initialized: false,
            running: false,
            event_logger: None,
        }
    }

    /// Saves the configuration to `path` on shutdown.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Registers the startup screens and queues the splash screen.
    ///
    /// Returns `false` if the engine was already initialized.
    pub fn initialize(&mut self) -> bool {
        if self.initialized {
            warn!("Engine already initialized");
            return false;
        }

        if self.config.events.log_events {
            let id = self.bus.add_fn(|event: &Event, _bus: &mut EventBus| {
                debug!(kind = %event.kind(), source = ?event.source(), "event dispatched");
                Ok(Propagation::Continue)
            });
            self.bus.subscribe_global(id, i32::MIN);
            self.event_logger = Some(id);
        }

        for state in PlaceholderState::defaults() {
            self.states.register(state);
        }
        self.states.change_state(StateKind::SplashScreen, StateData::new());

        self.initialized = true;
        self.running = true;
        self.timing.reset();
        info!(time = %self.clock.time(), "Engine initialized");
        true
    }

    /// Runs one frame with an externally measured delta.
    pub fn frame(&mut self, dt: f64, surface: &mut dyn Surface) {
        let dt = self.timing.record(dt);
        self.step(dt, surface);
    }

    fn step(&mut self, dt: f64, surface: &mut dyn Surface) {
        if !self.running {
            return;
        }

        self.clock.update(dt);
        self.bus.drain();
        self.states.update(dt);
        self.render(surface);
    }

    /// Draws the state stack and, when enabled, the debug overlay.
    pub fn render(&self, surface: &mut dyn Surface) {
        surface.fill(Color::BLACK);
        self.states.render(surface);

        if self.show_debug {
            let (x, mut y) = DEBUG_ORIGIN;
            for line in self.debug_lines() {
                surface.draw_text(&line, x, y, DEBUG_COLOR);
                y += DEBUG_LINE_HEIGHT;
            }
        }
    }

    /// Lines shown by the debug overlay.
    #[must_use]
    pub fn debug_lines(&self) -> Vec<String> {
        let state = self.states.current().map_or("none", StateKind::name);
        let weather = self.clock.weather();
        vec![
            format!("FPS: {:.1}", self.timing.current_fps()),
            format!("Time: {}", self.clock.time()),
            format!("State: {state}"),
            format!("Weather: {} ({:.1})", weather.kind.name(), weather.intensity),
        ]
    }

    /// Handles engine-wide keys, then offers the event to the states.
    ///
    /// Returns `true` if the event was consumed.
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        if !self.running {
            return false;
        }

        match event {
            InputEvent::Quit => {
                self.shutdown();
                return true;
            },
            InputEvent::KeyDown(KeyCode::F5) => {
                info!("Quick save requested");
                self.bus.publish(EventKind::SaveGame, payload([("slot", json!("quicksave"))]), Some(SOURCE));
            },
            InputEvent::KeyDown(KeyCode::F9) => {
                info!("Quick load requested");
                self.bus.publish(EventKind::LoadGame, payload([("slot", json!("quicksave"))]), Some(SOURCE));
            },
            InputEvent::KeyDown(KeyCode::F12) => {
                self.show_debug = !self.show_debug;
                info!("Debug overlay {}", if self.show_debug { "enabled" } else { "disabled" });
            },
            _ => {},
        }

        self.states.handle_input(event)
    }

    /// Pauses world time.
    pub fn pause(&mut self) {
        if self.clock.is_paused() {
            return;
        }
        self.clock.pause();
        self.bus.publish(EventKind::GamePaused, payload([("time", self.clock.time().to_json())]), Some(SOURCE));
        info!("Game paused");
    }

    /// Resumes world time.
    pub fn resume(&mut self) {
        if !self.clock.is_paused() {
            return;
        }
        self.clock.resume();
        self.timing.reset();
        self.bus.publish(EventKind::GameResumed, payload([("time", self.clock.time().to_json())]), Some(SOURCE));
        info!("Game resumed");
    }

    /// Tears down states, drops queued events and saves the configuration.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        info!("Shutting down engine");
        self.running = false;

        self.states.cleanup_all();
        let dropped = self.bus.clear_queue();
        if let Some(id) = self.event_logger.take() {
            self.bus.remove_handler(id);
        }

        if let Some(path) = &self.config_path {
            if let Err(e) = self.config.save_to(path) {
                warn!("Failed to save config: {e}");
            }
        }
        info!(dropped, "Engine shutdown complete");
    }

    /// Runs frames at real-time pace until shutdown or the configured frame limit.
    ///
    /// Returns the number of frames run.
    pub fn run(&mut self, surface: &mut dyn Surface) -> u64 {
        if !self.initialized {
            self.initialize();
        }

        let mut frames = 0;
        while self.running && frames < self.config.frame.frame_limit {
            let dt = self.timing.delta_time();
            self.step(dt, surface);
            self.timing.sleep_remainder();
            frames += 1;
        }
        self.shutdown();
        frames
    }

    /// Runs `frames` frames of `dt` seconds without real-time pacing.
    ///
    /// Each `(frame, event)` in `script` is handled before that frame runs.
    /// Stops early on shutdown and returns the number of frames run.
    pub fn run_scripted(
        &mut self,
        frames: u64,
        dt: f64,
        script: &[(u64, InputEvent)],
        surface: &mut dyn Surface,
    ) -> u64 {
        if !self.initialized {
            self.initialize();
        }

        for frame in 0..frames {
            for (_, event) in script.iter().filter(|(at, _)| *at == frame) {
                self.handle_input(event);
            }
            if !self.running {
                return frame;
            }
            self.frame(dt, surface);
        }
        frames
    }

    // === Accessors ===

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Event bus, mutably.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// World clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// World clock, mutably.
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    /// State machine.
    #[must_use]
    pub fn states(&self) -> &StateMachine {
        &self.states
    }

    /// State machine, mutably.
    pub fn states_mut(&mut self) -> &mut StateMachine {
        &mut self.states
    }

    /// Frame timing.
    #[must_use]
    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    /// Check if the engine is between initialize and shutdown.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Check if the debug overlay is visible.
    #[must_use]
    pub fn show_debug(&self) -> bool {
        self.show_debug
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
