//! End-to-end tests for the Meridian engine.
//!
//! These drive a whole engine through scripted frames and check what a player
//! would observe: the screen stack, world time and the event stream.

#![cfg(test)]

use crate::app::Engine;
use crate::config::EngineConfig;
use meridian_core::{
    Event, EventBus, EventKind, InputEvent, KeyCode, Propagation, RecordingSurface, StateKind,
};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

const DT: f64 = 0.016;

fn engine_with(config: EngineConfig) -> Engine {
    let mut engine = Engine::new(config);
    engine.initialize();
    engine
}

fn headless() -> Engine {
    let mut config = EngineConfig::default();
    config.time.weather_seed = Some(11);
    config.frame.limit_frame_rate = false;
    engine_with(config)
}

/// Test suite for screen flow
mod screen_tests {
    use super::*;

    #[test]
    fn e2e_engine_starts_on_splash_screen() {
        let mut engine = headless();
        let mut surface = RecordingSurface::new(640, 480);

        engine.run_scripted(1, DT, &[], &mut surface);
        assert_eq!(engine.states().stack(), &[StateKind::SplashScreen]);
    }

    #[test]
    fn e2e_menu_to_gameplay_and_pause() {
        let mut engine = headless();
        let mut surface = RecordingSurface::new(640, 480);
        let script = [
            (1, InputEvent::KeyDown(KeyCode::Space)),
            (2, InputEvent::KeyDown(KeyCode::Enter)),
            (3, InputEvent::KeyDown(KeyCode::Escape)),
        ];

        engine.run_scripted(4, DT, &script, &mut surface);
        assert_eq!(engine.states().stack(), &[StateKind::Gameplay, StateKind::PauseMenu]);
        assert!(engine.states().is_state_active(StateKind::Gameplay));

        engine.run_scripted(2, DT, &[(0, InputEvent::KeyDown(KeyCode::Escape))], &mut surface);
        assert_eq!(engine.states().stack(), &[StateKind::Gameplay]);
    }

    #[test]
    fn e2e_transitions_reach_the_bus() {
        let mut engine = headless();
        let mut surface = RecordingSurface::new(640, 480);
        let script = [
            (1, InputEvent::KeyDown(KeyCode::Space)),
            (2, InputEvent::KeyDown(KeyCode::Enter)),
        ];

        // The last frame drains what the previous one published
        engine.run_scripted(4, DT, &script, &mut surface);

        let changes: Vec<_> = engine
            .bus()
            .history(Some(EventKind::StateChanged), usize::MAX)
            .into_iter()
            .filter_map(|event| event.get("to").cloned())
            .collect();
        assert_eq!(changes, vec![json!("splash_screen"), json!("main_menu"), json!("gameplay")]);
    }

    #[test]
    fn e2e_quit_stops_the_session() {
        let mut engine = headless();
        let mut surface = RecordingSurface::new(640, 480);

        let frames = engine.run_scripted(10, DT, &[(3, InputEvent::Quit)], &mut surface);
        assert_eq!(frames, 3);
        assert!(!engine.is_running());
        assert!(engine.states().stack().is_empty());
    }
}

/// Test suite for world time driven by frames
mod world_tests {
    use super::*;

    fn fast_engine() -> Engine {
        let mut config = EngineConfig::default();
        config.time.scale = 3600.0;
        config.time.weather_seed = Some(5);
        config.frame.limit_frame_rate = false;
        engine_with(config)
    }

    #[test]
    fn e2e_frames_advance_world_time() {
        let mut engine = fast_engine();
        let start = engine.clock().time().total_minutes();
        let mut surface = RecordingSurface::new(64, 64);

        // 0.05 s at 3600x is three hours per frame
        engine.run_scripted(10, 0.05, &[], &mut surface);
        assert_eq!(engine.clock().time().total_minutes(), start + 10 * 180);

        let advanced = engine.bus().history(Some(EventKind::TimeAdvanced), usize::MAX);
        assert_eq!(advanced.len(), 10);
        assert!(!engine.bus().history(Some(EventKind::DayNightChanged), 1).is_empty());
        assert!(!engine.bus().history(Some(EventKind::WeatherChanged), 1).is_empty());
    }

    #[test]
    fn e2e_pause_freezes_world_but_not_screens() {
        let mut engine = fast_engine();
        let mut surface = RecordingSurface::new(64, 64);
        engine.run_scripted(1, 0.05, &[], &mut surface);

        engine.pause();
        let frozen = engine.clock().time();
        engine.run_scripted(2, 0.05, &[(0, InputEvent::KeyDown(KeyCode::Space))], &mut surface);

        assert_eq!(engine.clock().time(), frozen);
        assert_eq!(engine.states().current(), Some(StateKind::MainMenu));

        engine.resume();
        engine.run_scripted(1, 0.05, &[], &mut surface);
        assert!(engine.clock().time() > frozen);
    }

    #[test]
    fn e2e_scheduled_callback_fires_during_frames() {
        let mut engine = fast_engine();
        let fired = Rc::new(RefCell::new(0));

        let counter = Rc::clone(&fired);
        engine.clock_mut().schedule_in(60 * 24, "dawn_patrol", false, 0, move || {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let mut surface = RecordingSurface::new(64, 64);
        engine.run_scripted(7, 0.05, &[], &mut surface);
        assert_eq!(*fired.borrow(), 0);

        engine.run_scripted(2, 0.05, &[], &mut surface);
        assert_eq!(*fired.borrow(), 1);
        assert_eq!(engine.clock().completed_callbacks().count(), 1);
    }

    #[test]
    fn e2e_game_handler_sees_engine_events() {
        let mut engine = headless();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        let id = engine.bus_mut().add_fn(move |event: &Event, _bus: &mut EventBus| {
            log.borrow_mut().push(event.kind());
            Ok(Propagation::Continue)
        });
        engine.bus_mut().subscribe(EventKind::SaveGame, id, 0);
        engine.bus_mut().subscribe(EventKind::GamePaused, id, 0);

        let mut surface = RecordingSurface::new(64, 64);
        engine.handle_input(&InputEvent::KeyDown(KeyCode::F5));
        engine.pause();
        engine.run_scripted(1, DT, &[], &mut surface);

        assert_eq!(*seen.borrow(), vec![EventKind::SaveGame, EventKind::GamePaused]);
    }
}

/// Test suite for the debug overlay
mod overlay_tests {
    use super::*;

    #[test]
    fn e2e_f12_toggles_overlay_text() {
        let mut engine = headless();
        let mut surface = RecordingSurface::new(640, 480);

        engine.run_scripted(1, DT, &[(0, InputEvent::KeyDown(KeyCode::F12))], &mut surface);
        assert!(surface.texts().contains(&"State: splash_screen"));

        surface.clear();
        engine.run_scripted(1, DT, &[(0, InputEvent::KeyDown(KeyCode::F12))], &mut surface);
        assert!(!surface.texts().iter().any(|t| t.starts_with("State: ")));
    }

    #[test]
    fn e2e_overlay_configured_on() {
        let mut config = EngineConfig::default();
        config.frame.show_debug = true;
        let mut engine = engine_with(config);
        let mut surface = RecordingSurface::new(640, 480);

        engine.run_scripted(1, DT, &[], &mut surface);
        assert_eq!(engine.debug_lines().len(), 4);
        assert!(surface.texts().iter().any(|t| t.starts_with("Weather: ")));
    }
}
