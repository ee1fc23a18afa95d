//! Countdown engine implementation.
//!
//! Every run is a repeating task on the injected [`Scheduler`]. The task owns
//! the run state; the engine only keeps a [`RunHandle`] in the registry so
//! that `cancel(id)` can flip the run's flag.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running(phase, remaining) -> (Finished | Cancelled | Faulted)
//! ```
//!
//! ## Tick discipline
//!
//! Each invocation of a run's task, in order:
//!
//! 1. cancelled? -> `on_cancel(id)`, deregister, stop
//! 2. skip exhausted phases; none left -> `on_finish(id, elapsed)`, deregister, stop
//! 3. `phase.tick(id, remaining, elapsed)`, then `remaining -= 1`
//!
//! The first invocation is immediate, so a countdown of `D` seconds ticks at
//! `t = 0..D-1` and finishes at `t = D`. Zero-length phases never tick.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = CountdownEngine::new(Arc::new(TokioScheduler::try_current()?));
//! engine.start_phased_countdown("arena", phases, |id, _| done(id), |id| aborted(id))?;
//! engine.cancel("arena");
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

use super::phase::{total_secs, Phase};
use super::registry::{CountdownRegistry, RunHandle};
use super::scheduler::{Scheduler, TickControl};
use crate::error::{ConfigError, Result};
use crate::events::Event;
use crate::storage::EngineConfig;

/// Default pacing of every run.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_EVENT_CAPACITY: usize = 64;

pub type FinishFn = Box<dyn FnOnce(&str, Duration) + Send + 'static>;
pub type CancelFn = Box<dyn FnOnce(&str) + Send + 'static>;

/// Drives phased countdowns on a shared scheduler.
///
/// Cheap to clone; clones share the registry and the event channel.
#[derive(Clone)]
pub struct CountdownEngine {
    scheduler: Arc<dyn Scheduler>,
    registry: Arc<CountdownRegistry>,
    events: broadcast::Sender<Event>,
    tick_interval: Duration,
    next_generation: Arc<AtomicU64>,
}

impl CountdownEngine {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_parts(scheduler, TICK_INTERVAL, DEFAULT_EVENT_CAPACITY)
    }

    /// Build an engine with the pacing and event buffer from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the tick interval or the
    /// event capacity is zero.
    pub fn from_config(
        scheduler: Arc<dyn Scheduler>,
        config: &EngineConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_parts(
            scheduler,
            config.tick_interval(),
            config.event_capacity,
        ))
    }

    fn with_parts(scheduler: Arc<dyn Scheduler>, tick_interval: Duration, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            scheduler,
            registry: Arc::new(CountdownRegistry::new()),
            events,
            tick_interval,
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Receive lifecycle events of every run started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &CountdownRegistry {
        &self.registry
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Whether a run under `id` is live and has not been asked to cancel.
    pub fn has_countdown(&self, id: &str) -> bool {
        self.registry
            .get(id)
            .map(|h| !h.is_cancelled())
            .unwrap_or(false)
    }

    /// Ids of live runs that have not been asked to cancel, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registry
            .handles()
            .into_iter()
            .filter(|(_, h)| !h.is_cancelled())
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a countdown under `id` running `phases` in order.
    ///
    /// `on_finish` receives the total elapsed time once every phase is
    /// exhausted; `on_cancel` fires once if the run is cancelled first.
    /// Neither fires if a callback of the run panics.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NoPhases`] for an empty phase list
    /// - [`CountdownError::DuplicateRun`](crate::CountdownError::DuplicateRun)
    ///   if a live, uncancelled run already uses `id`
    pub fn start_phased_countdown<F, C>(
        &self,
        id: impl Into<String>,
        phases: Vec<Phase>,
        on_finish: F,
        on_cancel: C,
    ) -> Result<()>
    where
        F: FnOnce(&str, Duration) + Send + 'static,
        C: FnOnce(&str) + Send + 'static,
    {
        let id = id.into();
        if phases.is_empty() {
            return Err(ConfigError::NoPhases { id }.into());
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let handle = RunHandle::new(generation);
        self.registry.register(&id, handle.clone())?;

        let total = total_secs(&phases);
        info!(countdown_id = %id, phases = phases.len(), total_secs = total, "countdown started");
        let _ = self.events.send(Event::CountdownStarted {
            id: id.clone(),
            phase_count: phases.len(),
            total_secs: total,
            at: handle.started_at(),
        });

        let mut run = CountdownRun {
            remaining: phases[0].duration_secs(),
            id,
            phases,
            phase_index: 0,
            announced_phase: None,
            elapsed: 0,
            handle,
            on_finish: Some(Box::new(on_finish)),
            on_cancel: Some(Box::new(on_cancel)),
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
            terminated: false,
        };
        self.scheduler
            .schedule_repeating(self.tick_interval, Box::new(move || run.step()));
        Ok(())
    }

    /// Ask the run under `id` to stop at its next tick boundary.
    ///
    /// Returns `true` if this call requested the cancellation; unknown,
    /// finished and already-cancelled ids are a no-op returning `false`.
    pub fn cancel(&self, id: &str) -> bool {
        match self.registry.get(id) {
            Some(handle) => {
                let requested = handle.cancel();
                if requested {
                    debug!(countdown_id = %id, "cancellation requested");
                }
                requested
            }
            None => false,
        }
    }

    /// Cancel every live run. Returns how many were newly cancelled.
    pub fn cancel_all(&self) -> usize {
        self.registry
            .handles()
            .into_iter()
            .filter(|(id, handle)| {
                let requested = handle.cancel();
                if requested {
                    debug!(countdown_id = %id, "cancellation requested");
                }
                requested
            })
            .count()
    }
}

impl std::fmt::Debug for CountdownEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownEngine")
            .field("tick_interval", &self.tick_interval)
            .field("active", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Runtime state of one countdown, owned by its scheduled task.
struct CountdownRun {
    id: String,
    phases: Vec<Phase>,
    phase_index: usize,
    /// Seconds left in the current phase.
    remaining: u64,
    announced_phase: Option<usize>,
    /// Ticks delivered across all phases, in nominal phase seconds.
    elapsed: u64,
    handle: RunHandle,
    on_finish: Option<FinishFn>,
    on_cancel: Option<CancelFn>,
    registry: Arc<CountdownRegistry>,
    events: broadcast::Sender<Event>,
    terminated: bool,
}

impl CountdownRun {
    fn step(&mut self) -> TickControl {
        if self.terminated {
            return TickControl::Stop;
        }
        if self.handle.is_cancelled() {
            return self.cancel();
        }

        let Some(index) = self.current_phase() else {
            return self.finish();
        };

        let phase = &self.phases[index];
        let (id, remaining, elapsed) = (&self.id, self.remaining, Duration::from_secs(self.elapsed));
        trace!(countdown_id = %id, phase = index, remaining, "tick");
        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| phase.tick(id, remaining, elapsed)))
        {
            return self.fault(Some(index), payload);
        }

        self.remaining -= 1;
        self.elapsed += 1;
        TickControl::Continue
    }

    /// Index of the phase that owns the next tick, skipping exhausted and
    /// zero-length phases. `None` once every phase is done.
    fn current_phase(&mut self) -> Option<usize> {
        loop {
            let phase = self.phases.get(self.phase_index)?;
            if self.remaining > 0 {
                if self.announced_phase != Some(self.phase_index) {
                    self.announced_phase = Some(self.phase_index);
                    debug!(
                        countdown_id = %self.id,
                        phase = self.phase_index,
                        duration_secs = phase.duration_secs(),
                        "phase started"
                    );
                    let _ = self.events.send(Event::PhaseStarted {
                        id: self.id.clone(),
                        phase_index: self.phase_index,
                        label: phase.label().map(str::to_string),
                        duration_secs: phase.duration_secs(),
                        at: Utc::now(),
                    });
                }
                return Some(self.phase_index);
            }
            self.phase_index += 1;
            self.remaining = self
                .phases
                .get(self.phase_index)
                .map(Phase::duration_secs)
                .unwrap_or(0);
        }
    }

    fn finish(&mut self) -> TickControl {
        self.terminate();
        let elapsed = Duration::from_secs(self.elapsed);
        if let Some(on_finish) = self.on_finish.take() {
            let id = self.id.as_str();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_finish(id, elapsed))) {
                return self.fault(None, payload);
            }
        }

        info!(countdown_id = %self.id, elapsed_secs = self.elapsed, "countdown finished");
        let _ = self.events.send(Event::CountdownFinished {
            id: self.id.clone(),
            elapsed_secs: self.elapsed,
            at: Utc::now(),
        });
        self.close()
    }

    fn cancel(&mut self) -> TickControl {
        self.terminate();
        if let Some(on_cancel) = self.on_cancel.take() {
            let id = self.id.as_str();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_cancel(id))) {
                return self.fault(None, payload);
            }
        }

        info!(countdown_id = %self.id, elapsed_secs = self.elapsed, "countdown cancelled");
        let _ = self.events.send(Event::CountdownCancelled {
            id: self.id.clone(),
            elapsed_secs: self.elapsed,
            at: Utc::now(),
        });
        self.close()
    }

    fn fault(&mut self, phase_index: Option<usize>, payload: Box<dyn Any + Send>) -> TickControl {
        self.terminate();
        let message = panic_message(payload.as_ref());
        error!(
            countdown_id = %self.id,
            phase = ?phase_index,
            %message,
            "countdown callback panicked; run torn down"
        );
        let _ = self.events.send(Event::CountdownFaulted {
            id: self.id.clone(),
            phase_index,
            message,
            at: Utc::now(),
        });
        self.close()
    }

    fn close(&mut self) -> TickControl {
        let _ = self.events.send(Event::CountdownClosed {
            id: self.id.clone(),
            at: Utc::now(),
        });
        TickControl::Stop
    }

    /// Deregister before any terminal callback so the id is reusable from
    /// inside `on_finish` / `on_cancel`.
    fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            self.registry
                .remove_if_current(&self.id, self.handle.generation());
        }
    }
}

impl Drop for CountdownRun {
    fn drop(&mut self) {
        // The scheduler dropped the task early (runtime shutdown).
        if !self.terminated {
            debug!(countdown_id = %self.id, "countdown dropped before completion");
            self.terminate();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}
