//! Speaker engine
//!
//! **Module Structure:**
//! - `core.rs`: Speaker struct, initialization, session volume, event dispatch
//! - `sounds.rs`: Sound operations (create, prepare, play, pause, resume, destroy)
//! - `position.rs`: Resource notifications (envelope, fade-out rotation, finish)
//! - `diagnostics.rs`: Status accessors and slot snapshots

mod core;
mod diagnostics;
mod position;
mod sounds;

pub use core::Speaker;
