//! World clock: scaled time progression, weather and scheduled callbacks.
//!
//! Real seconds are scaled into simulated minutes and applied in whole-minute
//! batches. Each batch runs the same pipeline:
//! 1. Calendar carry
//! 2. Time-of-day and season transition notifications
//! 3. Weather update
//! 4. Due callbacks
//! 5. `TimeAdvanced` notification
//!
//! All notifications are queued through a [`Publisher`] and delivered on the
//! next drain of the bus.

use std::time::Instant;

use meridian_common::{HandlerFault, TimerId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::events::{payload, EventKind, Publisher};
use crate::schedule::{CompletedCallback, ScheduledCallback, Scheduler};
use crate::time::{GameTime, Season, TimeOfDay};
use crate::weather::{self, WeatherChange, WeatherCondition, WeatherSystem, WeatherType, DEFAULT_CHANGE_PROBABILITY};

/// Default simulated minutes per real second.
pub const DEFAULT_TIME_SCALE: f64 = 60.0;
/// Lowest allowed time scale.
pub const MIN_TIME_SCALE: f64 = 0.1;
/// Highest allowed time scale.
pub const MAX_TIME_SCALE: f64 = 3600.0;

const SOURCE: &str = "clock";

/// Construction settings for a [`Clock`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSettings {
    /// Simulated minutes per real second.
    pub time_scale: f64,
    /// Starting world time.
    pub start: GameTime,
    /// Early weather change probability per simulated minute.
    pub weather_change_probability: f64,
    /// Fixed weather seed; random when `None`.
    pub weather_seed: Option<u64>,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            time_scale: DEFAULT_TIME_SCALE,
            start: GameTime::default(),
            weather_change_probability: DEFAULT_CHANGE_PROBABILITY,
            weather_seed: None,
        }
    }
}

/// Drives world time.
#[derive(Debug)]
pub struct Clock {
    time: GameTime,
    time_scale: f64,
    paused: bool,
    /// Fractional simulated minutes not yet applied.
    accumulator: f64,
    last_bucket: TimeOfDay,
    last_season: Season,
    last_real: Instant,
    weather: WeatherSystem,
    scheduler: Scheduler,
    publisher: Publisher,
}

impl Clock {
    /// Create a clock with default settings.
    #[must_use]
    pub fn new(publisher: Publisher) -> Self {
        Self::with_settings(publisher, &ClockSettings::default())
    }

    /// Create a clock from explicit settings.
    #[must_use]
    pub fn with_settings(publisher: Publisher, settings: &ClockSettings) -> Self {
        let mut weather = match settings.weather_seed {
            Some(seed) => WeatherSystem::with_seed(seed),
            None => WeatherSystem::new(),
        };
        weather.set_change_probability(settings.weather_change_probability);

        let time = settings.start;
        info!(start = %time, scale = settings.time_scale, "clock initialized");
        Self {
            time,
            time_scale: settings.time_scale.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE),
            paused: false,
            accumulator: 0.0,
            last_bucket: time.time_of_day(),
            last_season: time.season(),
            last_real: Instant::now(),
            weather,
            scheduler: Scheduler::new(),
            publisher,
        }
    }

    // === Progression ===

    /// Advances by `dt` real seconds. Does nothing while paused.
    ///
    /// Non-finite and non-positive deltas are ignored.
    pub fn update(&mut self, dt: f64) {
        self.last_real = Instant::now();
        if self.paused || !dt.is_finite() || dt <= 0.0 {
            return;
        }

        self.accumulator += dt * self.time_scale;
        if self.accumulator >= 1.0 {
            let minutes = self.accumulator.floor();
            self.accumulator -= minutes;
            self.advance_batch(minutes as u64);
        }
    }

    /// Advances by the real time elapsed since the previous update.
    pub fn tick(&mut self) {
        let dt = self.last_real.elapsed().as_secs_f64();
        self.update(dt);
    }

    /// Runs the pipeline for `minutes` at once, e.g. while resting.
    ///
    /// Works while paused.
    pub fn advance_minutes(&mut self, minutes: u64) {
        if minutes > 0 {
            self.advance_batch(minutes);
        }
    }

    fn advance_batch(&mut self, minutes: u64) {
        let old_time = self.time;
        self.time.advance(minutes);

        let bucket = self.time.time_of_day();
        if bucket != self.last_bucket {
            self.on_time_of_day_changed(self.last_bucket, bucket);
            self.last_bucket = bucket;
        }

        let season = self.time.season();
        if season != self.last_season {
            self.on_season_changed(self.last_season, season);
            self.last_season = season;
        }

        if let Some(change) = self.weather.update(minutes, season) {
            self.publish_weather_change(change, false);
        }

        let fired = self.scheduler.run_due(&self.time);
        if fired > 0 {
            debug!(fired, at = %self.time, "ran scheduled callbacks");
        }

        self.publisher.publish(
            EventKind::TimeAdvanced,
            payload([
                ("minutes", json!(minutes)),
                ("old_time", old_time.to_json()),
                ("new_time", self.time.to_json()),
                ("time_of_day", json!(bucket.name())),
                ("season", json!(season.name())),
            ]),
            Some(SOURCE),
        );
    }

    fn on_time_of_day_changed(&self, from: TimeOfDay, to: TimeOfDay) {
        info!(from = %from, to = %to, at = %self.time, "time of day changed");
        self.publisher.publish(
            EventKind::DayNightChanged,
            payload([
                ("transition", json!("time_of_day")),
                ("from", json!(from.name())),
                ("to", json!(to.name())),
            ]),
            Some(SOURCE),
        );
        if let Some(label) = to.transition_label() {
            self.publisher.publish(
                EventKind::DayNightChanged,
                payload([("transition", json!(label))]),
                Some(SOURCE),
            );
        }
    }

    fn on_season_changed(&self, from: Season, to: Season) {
        info!(from = %from, to = %to, "season changed");
        self.publisher.publish(
            EventKind::SeasonChanged,
            payload([("old_season", json!(from.name())), ("new_season", json!(to.name()))]),
            Some(SOURCE),
        );
    }

    fn publish_weather_change(&self, change: WeatherChange, forced: bool) {
        let condition = self.weather.condition();
        self.publisher.publish(
            EventKind::WeatherChanged,
            payload([
                ("old_weather", json!(change.from.name())),
                ("new_weather", json!(change.to.name())),
                ("intensity", json!(condition.intensity)),
                ("visibility", json!(condition.visibility)),
                ("forced", json!(forced)),
            ]),
            Some(SOURCE),
        );
    }

    // === Control ===

    /// Halts time progression.
    pub fn pause(&mut self) {
        self.paused = true;
        info!("time paused");
    }

    /// Resumes time progression without catching up on the paused interval.
    pub fn resume(&mut self) {
        self.paused = false;
        self.last_real = Instant::now();
        info!("time resumed");
    }

    /// Check if time is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Set simulated minutes per real second, clamped to 0.1-3600.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = scale.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE);
        info!(scale = self.time_scale, "time scale set");
    }

    /// Get simulated minutes per real second.
    #[must_use]
    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Jumps to a world time.
    ///
    /// Bucket and season transitions are announced on the next batch.
    pub fn set_time(&mut self, time: GameTime) {
        let old_time = self.time;
        self.time = time;
        info!(time = %time, "time set");
        self.publisher.publish(
            EventKind::TimeAdvanced,
            payload([
                ("old_time", old_time.to_json()),
                ("new_time", time.to_json()),
                ("time_of_day", json!(time.time_of_day().name())),
                ("season", json!(time.season().name())),
            ]),
            Some(SOURCE),
        );
    }

    /// Get the current world time.
    #[must_use]
    pub fn time(&self) -> GameTime {
        self.time
    }

    // === Weather ===

    /// Get the current weather.
    #[must_use]
    pub fn weather(&self) -> &WeatherCondition {
        self.weather.condition()
    }

    /// Sets the weather directly, bypassing the season table.
    pub fn force_weather(&mut self, kind: WeatherType, duration: i64, intensity: f32) {
        let change = self.weather.force(kind, duration, intensity);
        info!(weather = %kind, duration, "weather forced");
        self.publish_weather_change(change, true);
    }

    /// Set the early weather change probability per simulated minute.
    pub fn set_weather_change_probability(&mut self, probability: f64) {
        self.weather.set_change_probability(probability);
    }

    /// Light level from 0.05 to 1.0 for the current time and weather.
    #[must_use]
    pub fn light_level(&self) -> f32 {
        weather::light_level(self.time.time_of_day(), self.weather.current())
    }

    /// Ambient RGB colour for the current time and weather.
    #[must_use]
    pub fn ambient_color(&self) -> [u8; 3] {
        weather::ambient_color(self.time.time_of_day(), self.weather.current())
    }

    // === Scheduling ===

    /// Schedules a callback at an absolute world time.
    pub fn schedule_at<F>(
        &mut self,
        at: GameTime,
        name: impl Into<String>,
        repeating: bool,
        repeat_interval: u64,
        callback: F,
    ) -> TimerId
    where
        F: FnMut() -> Result<(), HandlerFault> + 'static,
    {
        self.scheduler
            .schedule(at, name, repeating, repeat_interval, Box::new(callback))
    }

    /// Schedules a callback `minutes` from now.
    pub fn schedule_in<F>(
        &mut self,
        minutes: u64,
        name: impl Into<String>,
        repeating: bool,
        repeat_interval: u64,
        callback: F,
    ) -> TimerId
    where
        F: FnMut() -> Result<(), HandlerFault> + 'static,
    {
        let at = self.time.plus_minutes(minutes);
        self.schedule_at(at, name, repeating, repeat_interval, callback)
    }

    /// Cancels a pending callback. Returns `false` if it was not pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Iterates over pending callbacks.
    pub fn pending_callbacks(&self) -> impl Iterator<Item = &ScheduledCallback> {
        self.scheduler.pending()
    }

    /// Iterates over fired one-shot callbacks, oldest first.
    pub fn completed_callbacks(&self) -> impl Iterator<Item = &CompletedCallback> {
        self.scheduler.completed()
    }
}
