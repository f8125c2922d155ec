//! Ember interaction core.
//!
//! Motion-controller object manipulation for VR: hand-held containers that
//! are filled, lit, consumed from, emptied, and passed between hands through
//! physical gestures, plus a small crafting loop and per-hand haptics.
//!
//! The core is engine-agnostic. It talks to the game world, the tracking
//! layer, and the feedback hardware only through the traits in `world`,
//! `tracking`, and `haptics`; `sim` provides in-process stand-ins.

pub mod catalog;
pub mod config;
pub mod crafting;
pub mod engine;
pub mod error;
pub mod events;
pub mod hand;
pub mod haptics;
pub mod machine;
pub mod math;
pub mod schedule;
pub mod sim;
pub mod state;
pub mod tracking;
pub mod world;
pub mod zones;

pub use config::InteractionConfig;
pub use engine::{Engine, EngineParts};
