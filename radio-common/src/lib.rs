//! # Radio Common Library
//!
//! Shared code for the radio widget crates including:
//! - Error type used by configuration loading
//! - Broadcast event bus (`EventBus<E>`)
//! - Configuration file resolution and TOML loading
//! - Event timestamps and millisecond-to-second conversion

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::EventBus;
