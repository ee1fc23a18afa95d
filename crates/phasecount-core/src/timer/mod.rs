mod alert;
mod engine;
mod phase;
mod registry;
mod scheduler;

pub use alert::{alert, AlertFn, AlertMapper, AlertTicker};
pub use engine::{CancelFn, CountdownEngine, FinishFn, TICK_INTERVAL};
pub use phase::{total_secs, CountdownTicker, Phase};
pub use registry::{CountdownRegistry, RunHandle};
pub use scheduler::{
    ManualScheduler, RepeatingTask, Scheduler, TaskHandle, TickControl, TokioScheduler,
};

pub(crate) use phase::non_negative_secs;
