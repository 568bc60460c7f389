//! # Meridian Engine
//!
//! Drives the Meridian control core frame by frame.
//!
//! This crate ties together:
//! - Configuration loaded from `meridian.toml`
//! - Frame timing with a clamped delta
//! - The startup screens
//! - The engine loop over bus, clock and state machine

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod app;
pub mod config;
pub mod states;
pub mod timing;

mod e2e_tests;

pub use app::Engine;
pub use config::{EngineConfig, CONFIG_FILE};
pub use states::PlaceholderState;
pub use timing::FrameTiming;
