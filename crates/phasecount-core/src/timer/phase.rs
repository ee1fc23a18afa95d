use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;

/// Per-second callback of a phase.
///
/// Receives the countdown id, the seconds remaining in the current phase
/// (counting down from the phase duration to 1) and the time elapsed across
/// all phases before this tick.
pub trait CountdownTicker: Send + Sync {
    fn tick(&self, countdown_id: &str, seconds_remaining: u64, elapsed: Duration);
}

impl<F> CountdownTicker for F
where
    F: Fn(&str, u64, Duration) + Send + Sync,
{
    fn tick(&self, countdown_id: &str, seconds_remaining: u64, elapsed: Duration) {
        self(countdown_id, seconds_remaining, elapsed)
    }
}

/// One time-bounded step of a countdown.
///
/// Immutable once built. Cloning shares the ticker, so one phase can serve as
/// a template for any number of runs.
#[derive(Clone)]
pub struct Phase {
    duration_secs: u64,
    label: Option<String>,
    ticker: Arc<dyn CountdownTicker>,
}

impl Phase {
    /// Build a phase from a whole-second duration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FractionalSeconds`] if `duration` has a
    /// sub-second component.
    pub fn new(duration: Duration, ticker: impl CountdownTicker + 'static) -> Result<Self, ConfigError> {
        let duration_secs = whole_seconds("phase.duration", duration)?;
        Ok(Self::from_secs(duration_secs, ticker))
    }

    pub fn from_secs(duration_secs: u64, ticker: impl CountdownTicker + 'static) -> Self {
        Self::from_shared(duration_secs, Arc::new(ticker))
    }

    pub fn from_shared(duration_secs: u64, ticker: Arc<dyn CountdownTicker>) -> Self {
        Self {
            duration_secs,
            label: None,
            ticker,
        }
    }

    /// A phase that only waits; nothing happens on its ticks.
    pub fn silent(duration_secs: u64) -> Self {
        Self::from_secs(duration_secs, |_: &str, _: u64, _: Duration| {})
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn ticker(&self) -> &Arc<dyn CountdownTicker> {
        &self.ticker
    }

    pub(crate) fn tick(&self, countdown_id: &str, seconds_remaining: u64, elapsed: Duration) {
        self.ticker.tick(countdown_id, seconds_remaining, elapsed);
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("duration_secs", &self.duration_secs)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Sum of all phase durations in seconds.
///
/// Uses saturating arithmetic to prevent overflow with large values.
pub fn total_secs(phases: &[Phase]) -> u64 {
    phases
        .iter()
        .fold(0u64, |acc, p| acc.saturating_add(p.duration_secs))
}

pub(crate) fn whole_seconds(field: &str, duration: Duration) -> Result<u64, ConfigError> {
    if duration.subsec_nanos() != 0 {
        return Err(ConfigError::FractionalSeconds {
            field: field.to_string(),
            millis: duration.as_millis(),
        });
    }
    Ok(duration.as_secs())
}

/// Convert a signed second count from configuration into a duration.
pub(crate) fn non_negative_secs(field: &str, seconds: i64) -> Result<u64, ConfigError> {
    u64::try_from(seconds).map_err(|_| ConfigError::NegativeDuration {
        field: field.to_string(),
        seconds,
    })
}
