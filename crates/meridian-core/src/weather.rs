//! Weather simulation driven by the world clock.
//!
//! Weather is rolled from a per-season table of candidate types:
//! - A condition lasts for a rolled number of simulated minutes
//! - Each batch of minutes may also trigger an early change
//! - A re-roll never repeats the current type when an alternative exists
//! - Light level and ambient colour combine the time-of-day bucket with the
//!   current weather

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info};

use crate::time::{Season, TimeOfDay};

/// Default probability of an early weather change per simulated minute.
pub const DEFAULT_CHANGE_PROBABILITY: f64 = 0.001;

/// Minimum light level regardless of time and weather.
pub const MIN_LIGHT_LEVEL: f32 = 0.05;

const DURATION_RANGE: (i64, i64) = (30, 240);
const INTENSITY_RANGE: (f32, f32) = (0.3, 1.0);
const FALLBACK_VISIBILITY: (f32, f32) = (0.5, 0.8);
const FALLBACK_WIND: (f32, f32) = (5.0, 20.0);

/// Weather types in the game world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherType {
    /// Clear skies.
    #[default]
    Clear,
    /// Overcast.
    Cloudy,
    /// Rain.
    Rain,
    /// Heavy rain and wind.
    Storm,
    /// Low visibility.
    Fog,
    /// Snowfall.
    Snow,
    /// Magical storm with a violet cast.
    CrystalStorm,
}

impl WeatherType {
    /// Get all weather types.
    #[must_use]
    pub const fn all() -> [Self; 7] {
        [
            Self::Clear,
            Self::Cloudy,
            Self::Rain,
            Self::Storm,
            Self::Fog,
            Self::Snow,
            Self::CrystalStorm,
        ]
    }

    /// Lowercase name used in payloads.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Cloudy => "cloudy",
            Self::Rain => "rain",
            Self::Storm => "storm",
            Self::Fog => "fog",
            Self::Snow => "snow",
            Self::CrystalStorm => "crystal_storm",
        }
    }

    /// Candidate types rolled during a season.
    #[must_use]
    pub const fn for_season(season: Season) -> &'static [Self] {
        match season {
            Season::Spring => &[Self::Clear, Self::Rain, Self::Cloudy],
            Season::Summer => &[Self::Clear, Self::Storm, Self::Cloudy],
            Season::Autumn => &[Self::Cloudy, Self::Rain, Self::Fog],
            Season::Winter => &[Self::Snow, Self::Cloudy, Self::Clear],
        }
    }

    /// Multiplier applied to the time-of-day light level.
    #[must_use]
    pub const fn light_factor(self) -> f32 {
        match self {
            Self::Clear => 1.0,
            Self::Cloudy => 0.8,
            Self::Rain => 0.7,
            Self::Storm => 0.4,
            Self::Fog => 0.5,
            Self::Snow | Self::CrystalStorm => 0.6,
        }
    }

    /// Visibility range rolled for this type.
    #[must_use]
    pub const fn visibility_range(self) -> (f32, f32) {
        match self {
            Self::Clear => (1.0, 1.0),
            Self::Rain => (0.6, 0.9),
            Self::Storm => (0.3, 0.6),
            Self::Fog => (0.2, 0.5),
            Self::CrystalStorm => (0.4, 0.7),
            Self::Cloudy | Self::Snow => FALLBACK_VISIBILITY,
        }
    }

    /// Wind speed range in km/h.
    #[must_use]
    pub const fn wind_range(self) -> (f32, f32) {
        match self {
            Self::Clear => (0.0, 10.0),
            Self::Rain => (10.0, 30.0),
            Self::Storm => (40.0, 80.0),
            Self::Fog => (0.0, 5.0),
            Self::CrystalStorm => (20.0, 60.0),
            Self::Cloudy | Self::Snow => FALLBACK_WIND,
        }
    }

    /// Intensity range.
    #[must_use]
    pub const fn intensity_range(self) -> (f32, f32) {
        match self {
            Self::CrystalStorm => (0.7, 1.0),
            _ => INTENSITY_RANGE,
        }
    }

    /// Temperature range in degrees Celsius.
    #[must_use]
    pub const fn temperature_range(self) -> (f32, f32) {
        match self {
            Self::Clear => (12.0, 28.0),
            Self::Cloudy => (8.0, 20.0),
            Self::Rain => (6.0, 16.0),
            Self::Storm => (10.0, 22.0),
            Self::Fog => (2.0, 12.0),
            Self::Snow => (-12.0, 0.0),
            Self::CrystalStorm => (-5.0, 10.0),
        }
    }
}

impl fmt::Display for WeatherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current weather conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    /// Weather type.
    pub kind: WeatherType,
    /// Strength from 0.0 to 1.0.
    pub intensity: f32,
    /// Visibility from 0.0 to 1.0.
    pub visibility: f32,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Wind speed in km/h.
    pub wind_speed: f32,
    /// Simulated minutes left; may go negative before the next re-roll.
    pub duration_remaining: i64,
}

impl Default for WeatherCondition {
    fn default() -> Self {
        Self {
            kind: WeatherType::Clear,
            intensity: 0.0,
            visibility: 1.0,
            temperature: 20.0,
            wind_speed: 0.0,
            duration_remaining: 0,
        }
    }
}

impl WeatherCondition {
    /// Serializes into a notification payload value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "type": self.kind.name(),
            "intensity": self.intensity,
            "visibility": self.visibility,
            "temperature": self.temperature,
            "wind_speed": self.wind_speed,
            "duration_remaining": self.duration_remaining,
        })
    }
}

/// A weather change produced by [`WeatherSystem::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherChange {
    /// Type before the change.
    pub from: WeatherType,
    /// Type after the change.
    pub to: WeatherType,
}

/// Rolls and tracks weather conditions.
#[derive(Debug, Clone)]
pub struct WeatherSystem {
    condition: WeatherCondition,
    change_probability: f64,
    rng: fastrand::Rng,
}

impl Default for WeatherSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherSystem {
    /// Create a weather system with a random seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(fastrand::Rng::new())
    }

    /// Create a weather system with a fixed seed for reproducible rolls.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(fastrand::Rng::with_seed(seed))
    }

    fn with_rng(rng: fastrand::Rng) -> Self {
        Self {
            condition: WeatherCondition::default(),
            change_probability: DEFAULT_CHANGE_PROBABILITY,
            rng,
        }
    }

    /// Get the current condition.
    #[must_use]
    pub fn condition(&self) -> &WeatherCondition {
        &self.condition
    }

    /// Get the current weather type.
    #[must_use]
    pub fn current(&self) -> WeatherType {
        self.condition.kind
    }

    /// Get the early-change probability per simulated minute.
    #[must_use]
    pub fn change_probability(&self) -> f64 {
        self.change_probability
    }

    /// Set the early-change probability per simulated minute (0.0 to 1.0).
    pub fn set_change_probability(&mut self, probability: f64) {
        self.change_probability = probability.clamp(0.0, 1.0);
    }

    /// Advances the weather by a batch of simulated minutes.
    ///
    /// Returns the change if the weather was re-rolled.
    pub fn update(&mut self, minutes: u64, season: Season) -> Option<WeatherChange> {
        let minutes_i64 = i64::try_from(minutes).unwrap_or(i64::MAX);
        self.condition.duration_remaining = self.condition.duration_remaining.saturating_sub(minutes_i64);

        let chance = (self.change_probability * minutes as f64).min(1.0);
        let expired = self.condition.duration_remaining <= 0;
        if expired || self.rng.f64() < chance {
            Some(self.reroll(season))
        } else {
            None
        }
    }

    /// Rolls a new condition from the season's table.
    pub fn reroll(&mut self, season: Season) -> WeatherChange {
        let from = self.condition.kind;
        let candidates: Vec<WeatherType> = {
            let table = WeatherType::for_season(season);
            if table.len() > 1 {
                table.iter().copied().filter(|&kind| kind != from).collect()
            } else {
                table.to_vec()
            }
        };
        let to = candidates
            .get(self.rng.usize(..candidates.len().max(1)))
            .copied()
            .unwrap_or(WeatherType::Clear);

        self.condition = self.roll_condition(to);
        info!(
            from = %from,
            to = %to,
            intensity = self.condition.intensity,
            duration = self.condition.duration_remaining,
            "weather changed"
        );

        WeatherChange { from, to }
    }

    fn roll_condition(&mut self, kind: WeatherType) -> WeatherCondition {
        WeatherCondition {
            kind,
            intensity: self.range(kind.intensity_range()),
            visibility: self.range(kind.visibility_range()),
            temperature: self.range(kind.temperature_range()),
            wind_speed: self.range(kind.wind_range()),
            duration_remaining: self.rng.i64(DURATION_RANGE.0..=DURATION_RANGE.1),
        }
    }

    fn range(&mut self, (min, max): (f32, f32)) -> f32 {
        min + self.rng.f32() * (max - min)
    }

    /// Sets the weather directly, bypassing the season table.
    ///
    /// Only type, duration and intensity change. Returns the change.
    pub fn force(&mut self, kind: WeatherType, duration: i64, intensity: f32) -> WeatherChange {
        let from = self.condition.kind;
        self.condition.kind = kind;
        self.condition.duration_remaining = duration;
        self.condition.intensity = intensity.clamp(0.0, 1.0);
        debug!(from = %from, to = %kind, duration, "weather forced");
        WeatherChange { from, to: kind }
    }
}

/// Light level from 0.0 (dark) to 1.0 (full daylight).
#[must_use]
pub fn light_level(time_of_day: TimeOfDay, weather: WeatherType) -> f32 {
    let base = match time_of_day {
        TimeOfDay::Midnight => 0.1,
        TimeOfDay::Dawn => 0.4,
        TimeOfDay::Morning => 0.8,
        TimeOfDay::Midday => 1.0,
        TimeOfDay::Afternoon => 0.9,
        TimeOfDay::Dusk => 0.5,
        TimeOfDay::Evening => 0.3,
        TimeOfDay::Night => 0.2,
    };
    (base * weather.light_factor()).max(MIN_LIGHT_LEVEL)
}

/// Ambient RGB colour for the given time and weather.
#[must_use]
pub fn ambient_color(time_of_day: TimeOfDay, weather: WeatherType) -> [u8; 3] {
    let [r, g, b] = match time_of_day {
        TimeOfDay::Midnight => [20, 20, 40],
        TimeOfDay::Dawn => [255, 180, 100],
        TimeOfDay::Morning => [255, 255, 200],
        TimeOfDay::Midday => [255, 255, 255],
        TimeOfDay::Afternoon => [255, 240, 200],
        TimeOfDay::Dusk => [255, 150, 80],
        TimeOfDay::Evening => [100, 100, 150],
        TimeOfDay::Night => [40, 40, 80],
    };

    let tint = |channel: u8, scale: f32, offset: f32| -> u8 {
        (f32::from(channel) * scale + offset).clamp(0.0, 255.0) as u8
    };

    match weather {
        WeatherType::Storm => [tint(r, 0.7, 0.0), tint(g, 0.7, 0.0), tint(b, 0.9, 0.0)],
        WeatherType::CrystalStorm => [tint(r, 0.8, 50.0), tint(g, 0.7, 0.0), tint(b, 0.9, 50.0)],
        _ => [r, g, b],
    }
}
