//! Frame timing.
//!
//! Measures real frame deltas, clamps them before they reach the simulation,
//! and keeps a rolling average for the FPS readout.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Longest delta handed to the simulation by default (20 FPS floor).
pub const DEFAULT_MAX_DELTA: f64 = 1.0 / 20.0;

/// Samples kept for the rolling average.
const MAX_SAMPLES: usize = 120;

/// Frame timing manager.
#[derive(Debug)]
pub struct FrameTiming {
    /// Target frames per second
    target_fps: u32,
    /// Time budget per frame
    frame_budget: Duration,
    /// Time of last frame start
    last_frame: Instant,
    /// Maximum delta, prevents a long stall from becoming one huge step
    max_delta: f64,
    /// Whether `sleep_remainder` sleeps at all
    limit_frame_rate: bool,
    /// Recent clamped deltas
    frame_times: VecDeque<f64>,
    /// Frames recorded since creation or reset
    frame_count: u64,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(60)
    }
}

impl FrameTiming {
    /// Create a new frame timing manager.
    #[must_use]
    pub fn new(target_fps: u32) -> Self {
        let target_fps = target_fps.max(1);
        Self {
            target_fps,
            frame_budget: Duration::from_secs_f64(1.0 / f64::from(target_fps)),
            last_frame: Instant::now(),
            max_delta: DEFAULT_MAX_DELTA,
            limit_frame_rate: true,
            frame_times: VecDeque::with_capacity(MAX_SAMPLES),
            frame_count: 0,
        }
    }

    /// Sets the delta clamp.
    #[must_use]
    pub fn with_max_delta(mut self, max_delta: f64) -> Self {
        self.max_delta = max_delta.max(0.001);
        self
    }

    /// Enables or disables frame-budget sleeping.
    #[must_use]
    pub fn with_frame_limit(mut self, limit: bool) -> Self {
        self.limit_frame_rate = limit;
        self
    }

    /// Measures the time since the last frame, clamped to `max_delta`.
    pub fn delta_time(&mut self) -> f64 {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f64();
        self.last_frame = now;
        self.record(dt)
    }

    /// Clamps an externally supplied delta and records it.
    ///
    /// Negative deltas count as zero.
    pub fn record(&mut self, dt: f64) -> f64 {
        let clamped = dt.clamp(0.0, self.max_delta);

        self.frame_times.push_back(clamped);
        if self.frame_times.len() > MAX_SAMPLES {
            self.frame_times.pop_front();
        }
        self.frame_count += 1;

        clamped
    }

    /// Sleep for the remainder of the frame budget.
    pub fn sleep_remainder(&self) {
        if !self.limit_frame_rate {
            return;
        }

        let elapsed = self.last_frame.elapsed();
        if elapsed < self.frame_budget {
            std::thread::sleep(self.frame_budget - elapsed);
        }
    }

    /// Get the current FPS (averaged over recent frames).
    #[must_use]
    pub fn current_fps(&self) -> f64 {
        let avg = self.average_frame_time();
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }

    /// Get the average frame time in milliseconds.
    #[must_use]
    pub fn average_frame_time_ms(&self) -> f64 {
        self.average_frame_time() * 1000.0
    }

    fn average_frame_time(&self) -> f64 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        self.frame_times.iter().sum::<f64>() / self.frame_times.len() as f64
    }

    /// Frames recorded since creation or the last reset.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the target FPS.
    #[must_use]
    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// Set the target FPS.
    pub fn set_target_fps(&mut self, fps: u32) {
        self.target_fps = fps.max(1);
        self.frame_budget = Duration::from_secs_f64(1.0 / f64::from(self.target_fps));
    }

    /// Get the delta clamp.
    #[must_use]
    pub fn max_delta(&self) -> f64 {
        self.max_delta
    }

    /// Reset timing (call after pause or loading).
    pub fn reset(&mut self) {
        self.last_frame = Instant::now();
        self.frame_times.clear();
        self.frame_count = 0;
    }
}
