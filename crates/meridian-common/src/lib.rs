//! # Meridian Common
//!
//! Common types shared by the Meridian crates:
//! - Generational handler ids and scheduled-callback ids
//! - Error types for configuration and handler faults
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_id_sequence() {
        let first = TimerId::from_raw(1);
        let second = first.next();
        assert_ne!(first, second);
        assert!(second > first);
        assert_eq!(second.raw(), 2);
    }

    #[test]
    fn test_handler_id_generations_differ() {
        let old = HandlerId::from_parts(3, 0);
        let new = HandlerId::from_parts(3, 1);
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(new.to_string(), "handler#3v1");
    }

    #[test]
    fn test_handler_fault_message() {
        let fault = HandlerFault::from("listener exploded");
        assert_eq!(fault.message(), "listener exploded");
        assert_eq!(fault.to_string(), "listener exploded");
    }
}
