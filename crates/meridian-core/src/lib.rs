//! # Meridian Core
//!
//! Control core of the Meridian engine.
//!
//! This crate provides the systems every frame runs through:
//! - Event bus with prioritized, consumable dispatch and bounded history
//! - World calendar with time-of-day buckets and seasons
//! - Weather simulation and scheduled world-time callbacks
//! - World clock driving time, weather and callbacks
//! - Stack-based state machine with deferred transitions
//! - Input events and the rendering surface abstraction

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod clock;
pub mod events;
pub mod input;
pub mod schedule;
pub mod state;
pub mod state_machine;
pub mod surface;
pub mod time;
pub mod weather;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::events::*;
    pub use crate::input::*;
    pub use crate::schedule::*;
    pub use crate::state::*;
    pub use crate::state_machine::*;
    pub use crate::surface::*;
    pub use crate::time::*;
    pub use crate::weather::*;
}

pub use prelude::*;
