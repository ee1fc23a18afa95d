//! # Phasecount Core Library
//!
//! This library provides the core logic for phasecount, a phased countdown
//! scheduler for game servers and other hosts that announce timed events.
//! A countdown is an ordered list of phases; each phase ticks once per second
//! with the remaining time, and the countdown can be cancelled at any moment.
//!
//! ## Architecture
//!
//! - **Countdown Engine**: runs every countdown as a repeating task on an
//!   injected scheduler, with cooperative cancellation
//! - **Alerts**: one-shot callbacks at specific remaining-time thresholds
//! - **Presets**: countdowns described in TOML configuration, broadcasting
//!   rendered messages
//! - **Events**: lifecycle events (start, phase, finish, cancel, fault, close)
//!
//! ## Key Components
//!
//! - [`CountdownEngine`]: Start, cancel and query countdown runs
//! - [`Phase`] and [`AlertMapper`]: What happens on every tick
//! - [`Scheduler`]: Tokio-backed or manually advanced clock
//! - [`Config`]: Application configuration management

pub mod broadcast;
pub mod error;
pub mod events;
pub mod presets;
pub mod storage;
pub mod timer;

pub use broadcast::{Broadcaster, MemoryBroadcaster};
pub use error::{ConfigError, CountdownError};
pub use events::Event;
pub use presets::{AlertPreset, CountdownPreset, PhasePreset};
pub use storage::{Config, EngineConfig};
pub use timer::{
    alert, AlertMapper, CountdownEngine, CountdownRegistry, CountdownTicker, ManualScheduler,
    Phase, Scheduler, TaskHandle, TickControl, TokioScheduler,
};
