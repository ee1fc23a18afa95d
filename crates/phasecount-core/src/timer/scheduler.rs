//! Repeating-task schedulers that drive countdown runs.
//!
//! The engine never sleeps itself. It hands each run to a [`Scheduler`] as a
//! repeating task whose first invocation is due immediately and whose later
//! invocations follow every `period`.
//!
//! - [`TokioScheduler`]: one tokio task per run, paced by `tokio::time::interval`.
//! - [`ManualScheduler`]: virtual time, advanced explicitly. Invocations run on
//!   the caller's thread, which makes multi-second countdowns deterministic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

/// What a repeating task wants after an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

pub type RepeatingTask = Box<dyn FnMut() -> TickControl + Send + 'static>;

/// Source of periodic invocations.
pub trait Scheduler: Send + Sync {
    /// Run `task` now and then every `period` until it returns
    /// [`TickControl::Stop`] or the returned handle is cancelled.
    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TaskHandle;
}

/// Cancellation handle for a scheduled task.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop future invocations. An invocation already in progress completes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ── Tokio ────────────────────────────────────────────────────────────

/// Scheduler backed by a tokio runtime.
///
/// Late ticks are delayed, never bunched up: a run that falls behind keeps a
/// one-period gap between invocations instead of catching up.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Bind to the runtime the caller is running inside.
    ///
    /// # Errors
    ///
    /// Fails when called outside of a tokio runtime.
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, period: Duration, mut task: RepeatingTask) -> TaskHandle {
        let handle = TaskHandle::new();
        let control = handle.clone();
        let period = clamp_period(period);

        self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately.
                interval.tick().await;
                if control.is_cancelled() {
                    break;
                }
                if task() == TickControl::Stop {
                    control.cancel();
                    break;
                }
            }
        });

        handle
    }
}

// ── Manual ───────────────────────────────────────────────────────────

/// Scheduler on a virtual clock that only moves when told to.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    tasks: Vec<ManualTask>,
}

struct ManualTask {
    seq: u64,
    period: Duration,
    next_due: Duration,
    handle: TaskHandle,
    /// `None` while the task is being invoked.
    task: Option<RepeatingTask>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Tasks that will still be invoked.
    pub fn pending_tasks(&self) -> usize {
        self.lock()
            .tasks
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// Invoke every task due at the current instant. Returns the number of
    /// invocations.
    pub fn run_pending(&self) -> usize {
        self.advance(Duration::ZERO)
    }

    pub fn advance_secs(&self, secs: u64) -> usize {
        self.advance(Duration::from_secs(secs))
    }

    /// Move virtual time forward by `by`, invoking due tasks in due-time
    /// order (ties in scheduling order). Tasks scheduled from inside an
    /// invocation take part if they fall due before the target instant.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut invocations = 0;

        while let Some((seq, mut task)) = self.take_next_due(target) {
            let control = task();
            invocations += 1;

            let mut state = self.lock();
            if let Some(pos) = state.tasks.iter().position(|t| t.seq == seq) {
                let entry = &mut state.tasks[pos];
                if control == TickControl::Stop || entry.handle.is_cancelled() {
                    entry.handle.cancel();
                    state.tasks.remove(pos);
                } else {
                    entry.next_due += entry.period;
                    entry.task = Some(task);
                }
            }
        }

        let mut state = self.lock();
        if state.now < target {
            state.now = target;
        }
        invocations
    }

    fn take_next_due(&self, target: Duration) -> Option<(u64, RepeatingTask)> {
        let mut state = self.lock();
        state.tasks.retain(|t| !t.handle.is_cancelled());

        let next = state
            .tasks
            .iter_mut()
            .filter(|t| t.task.is_some() && t.next_due <= target)
            .min_by_key(|t| (t.next_due, t.seq))?;
        let due = next.next_due;
        let seq = next.seq;
        let task = next.task.take()?;

        if state.now < due {
            state.now = due;
        }
        Some((seq, task))
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let now = state.now;
        state.tasks.push(ManualTask {
            seq,
            period: clamp_period(period),
            next_due: now,
            handle: handle.clone(),
            task: Some(task),
        });
        handle
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("tasks", &state.tasks.len())
            .finish()
    }
}

fn clamp_period(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}
