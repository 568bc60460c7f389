//! Engine configuration.
//!
//! Sections mirror the subsystems they tune: world time and weather, the
//! event bus, the state machine and the frame loop. Configuration is loaded
//! from a TOML file and can be patched at runtime with [`EngineConfig::apply_overrides`].

use meridian_common::{ConfigError, MeridianResult};
use meridian_core::{ClockSettings, GameTime, DEFAULT_HISTORY_CAPACITY, DEFAULT_TRANSITION_HISTORY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "meridian.toml";

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// World time and weather
    pub time: TimeConfig,
    /// Event bus
    pub events: EventsConfig,
    /// State machine
    pub states: StatesConfig,
    /// Frame loop
    pub frame: FrameConfig,
}

/// World time and weather settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Simulated minutes per real second
    pub scale: f64,
    /// Starting year
    pub start_year: u32,
    /// Starting month (1-12)
    pub start_month: u8,
    /// Starting day (1-30)
    pub start_day: u8,
    /// Starting hour (0-23)
    pub start_hour: u8,
    /// Starting minute (0-59)
    pub start_minute: u8,
    /// Early weather change probability per simulated minute
    pub weather_change_probability: f64,
    /// Weather seed (None = random)
    pub weather_seed: Option<u64>,
}

impl Default for TimeConfig {
    fn default() -> Self {
        let start = GameTime::default();
        Self {
            scale: meridian_core::DEFAULT_TIME_SCALE,
            start_year: start.year(),
            start_month: start.month(),
            start_day: start.day(),
            start_hour: start.hour(),
            start_minute: start.minute(),
            weather_change_probability: meridian_core::DEFAULT_CHANGE_PROBABILITY,
            weather_seed: None,
        }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Dispatched events kept for inspection
    pub history_capacity: usize,
    /// Log every dispatched event at debug level
    pub log_events: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            log_events: true,
        }
    }
}

/// State machine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatesConfig {
    /// Transitions kept for inspection
    pub history_capacity: usize,
}

impl Default for StatesConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_TRANSITION_HISTORY,
        }
    }
}

/// Frame loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Target frames per second
    pub target_fps: u32,
    /// Longest frame delta handed to the simulation, in seconds
    pub max_delta: f64,
    /// Sleep off the rest of each frame budget
    pub limit_frame_rate: bool,
    /// Frames run by the headless binary before shutting down
    pub frame_limit: u64,
    /// Show the debug overlay (F12)
    pub show_debug: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_delta: crate::timing::DEFAULT_MAX_DELTA,
            limit_frame_rate: true,
            frame_limit: 600,
            show_debug: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match Self::from_toml_str(&contents) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to load config file: {e}");
                Self::default()
            },
        }
    }

    /// Parses configuration text, starting from defaults.
    ///
    /// Unknown keys are ignored with a warning; values are clamped.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(contents)?;
        let mut config = Self::default();
        config.apply_overrides(&table)?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> MeridianResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(ConfigError::from)?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        let time = &mut self.time;
        time.scale = time.scale.clamp(meridian_core::MIN_TIME_SCALE, meridian_core::MAX_TIME_SCALE);
        time.start_year = time.start_year.max(1);
        time.start_month = time.start_month.clamp(1, 12);
        time.start_day = time.start_day.clamp(1, 30);
        time.start_hour = time.start_hour.min(23);
        time.start_minute = time.start_minute.min(59);
        time.weather_change_probability = time.weather_change_probability.clamp(0.0, 1.0);

        self.events.history_capacity = self.events.history_capacity.clamp(1, 100_000);
        self.states.history_capacity = self.states.history_capacity.clamp(1, 10_000);

        self.frame.target_fps = self.frame.target_fps.clamp(1, 240);
        self.frame.max_delta = self.frame.max_delta.clamp(0.001, 1.0);
    }

    /// Merges a TOML table of `[section] key = value` overrides.
    ///
    /// Unknown sections and keys are logged and skipped. A value of the wrong
    /// type fails the merge; keys applied before it stay applied.
    pub fn apply_overrides(&mut self, table: &toml::Table) -> Result<(), ConfigError> {
        for (section, value) in table {
            let Some(entries) = value.as_table() else {
                if matches!(section.as_str(), "time" | "events" | "states" | "frame") {
                    return Err(ConfigError::NotATable(section.clone()));
                }
                warn!(section = %section, "Ignoring unknown config entry");
                continue;
            };

            for (key, value) in entries {
                let known = match section.as_str() {
                    "time" => self.time.apply(key, value)?,
                    "events" => self.events.apply(key, value)?,
                    "states" => self.states.apply(key, value)?,
                    "frame" => self.frame.apply(key, value)?,
                    _ => false,
                };
                if !known {
                    warn!(section = %section, key = %key, "Ignoring unknown config key");
                }
            }
        }

        self.validate();
        Ok(())
    }

    /// Clock settings derived from the `time` section.
    #[must_use]
    pub fn clock_settings(&self) -> ClockSettings {
        let time = &self.time;
        let start = GameTime::new(
            time.start_year,
            time.start_month,
            time.start_day,
            time.start_hour,
            time.start_minute,
        )
        .unwrap_or_else(|e| {
            warn!("Invalid start time ({e}), using default");
            GameTime::default()
        });

        ClockSettings {
            time_scale: time.scale,
            start,
            weather_change_probability: time.weather_change_probability,
            weather_seed: time.weather_seed,
        }
    }
}

impl TimeConfig {
    fn apply(&mut self, key: &str, value: &toml::Value) -> Result<bool, ConfigError> {
        match key {
            "scale" => self.scale = float("time", key, value)?,
            "start_year" => self.start_year = integer("time", key, value)?,
            "start_month" => self.start_month = integer("time", key, value)?,
            "start_day" => self.start_day = integer("time", key, value)?,
            "start_hour" => self.start_hour = integer("time", key, value)?,
            "start_minute" => self.start_minute = integer("time", key, value)?,
            "weather_change_probability" => self.weather_change_probability = float("time", key, value)?,
            "weather_seed" => self.weather_seed = Some(integer("time", key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl EventsConfig {
    fn apply(&mut self, key: &str, value: &toml::Value) -> Result<bool, ConfigError> {
        match key {
            "history_capacity" => self.history_capacity = integer("events", key, value)?,
            "log_events" => self.log_events = boolean("events", key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl StatesConfig {
    fn apply(&mut self, key: &str, value: &toml::Value) -> Result<bool, ConfigError> {
        match key {
            "history_capacity" => self.history_capacity = integer("states", key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl FrameConfig {
    fn apply(&mut self, key: &str, value: &toml::Value) -> Result<bool, ConfigError> {
        match key {
            "target_fps" => self.target_fps = integer("frame", key, value)?,
            "max_delta" => self.max_delta = float("frame", key, value)?,
            "limit_frame_rate" => self.limit_frame_rate = boolean("frame", key, value)?,
            "frame_limit" => self.frame_limit = integer("frame", key, value)?,
            "show_debug" => self.show_debug = boolean("frame", key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn invalid(section: &str, key: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_owned(),
        key: key.to_owned(),
        expected,
    }
}

/// Floats also accept integer literals.
fn float(section: &str, key: &str, value: &toml::Value) -> Result<f64, ConfigError> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
        .ok_or_else(|| invalid(section, key, "a number"))
}

fn integer<T: TryFrom<i64>>(section: &str, key: &str, value: &toml::Value) -> Result<T, ConfigError> {
    value
        .as_integer()
        .and_then(|i| T::try_from(i).ok())
        .ok_or_else(|| invalid(section, key, "an integer in range"))
}

fn boolean(section: &str, key: &str, value: &toml::Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or_else(|| invalid(section, key, "a boolean"))
}
