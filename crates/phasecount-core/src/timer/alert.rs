//! Remaining-time alerts.
//!
//! An [`AlertMapper`] maps thresholds ("10 seconds left") to one-shot
//! callbacks and turns into a phase ticker. Inside one phase the remaining
//! time strictly decreases, so every threshold is hit at most once per phase
//! execution.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::phase::{non_negative_secs, whole_seconds, CountdownTicker};
use crate::error::ConfigError;

/// Alert callback, shared between a mapper and the tickers built from it.
pub type AlertFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wrap a closure as an alert for countdown ids.
pub fn alert<F>(f: F) -> AlertFn<str>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub struct AlertMapper<T: ?Sized = str> {
    thresholds: Arc<BTreeMap<u64, AlertFn<T>>>,
}

impl<T: ?Sized + 'static> AlertMapper<T> {
    pub fn new() -> Self {
        Self {
            thresholds: Arc::new(BTreeMap::new()),
        }
    }

    /// Build a mapper from `(remaining time, callback)` pairs in any order.
    ///
    /// # Errors
    ///
    /// Rejects thresholds with a sub-second component and thresholds that
    /// appear twice.
    pub fn from_durations<I>(input: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (Duration, AlertFn<T>)>,
    {
        let mut thresholds = BTreeMap::new();
        for (at, callback) in input {
            let seconds = whole_seconds("alert.at", at)?;
            insert_unique(&mut thresholds, seconds, callback)?;
        }
        Ok(Self {
            thresholds: Arc::new(thresholds),
        })
    }

    /// Build a mapper from signed second counts, as read from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NegativeDuration`] for keys below zero.
    pub fn from_seconds<I>(input: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (i64, AlertFn<T>)>,
    {
        let mut thresholds = BTreeMap::new();
        for (at, callback) in input {
            let seconds = non_negative_secs("alert.at", at)?;
            insert_unique(&mut thresholds, seconds, callback)?;
        }
        Ok(Self {
            thresholds: Arc::new(thresholds),
        })
    }

    /// Add one threshold.
    pub fn with_alert<F>(self, at: Duration, callback: F) -> Result<Self, ConfigError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let seconds = whole_seconds("alert.at", at)?;
        let mut thresholds =
            Arc::try_unwrap(self.thresholds).unwrap_or_else(|shared| (*shared).clone());
        insert_unique(&mut thresholds, seconds, Arc::new(callback))?;
        Ok(Self {
            thresholds: Arc::new(thresholds),
        })
    }

    /// The callback registered for exactly `seconds_left`, if any.
    pub fn resolve(&self, seconds_left: u64) -> Option<&AlertFn<T>> {
        self.thresholds.get(&seconds_left)
    }

    /// Invoke the alert for `seconds_left` with `value`. Returns whether one fired.
    pub fn fire(&self, seconds_left: u64, value: &T) -> bool {
        match self.resolve(seconds_left) {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    /// Configured thresholds, ascending.
    pub fn thresholds(&self) -> Vec<Duration> {
        self.thresholds.keys().map(|s| Duration::from_secs(*s)).collect()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

impl AlertMapper<str> {
    /// A phase ticker that fires the alert matching the remaining seconds.
    pub fn to_countdown_ticker(&self) -> AlertTicker {
        AlertTicker {
            thresholds: Arc::clone(&self.thresholds),
        }
    }
}

impl<T: ?Sized + 'static> Default for AlertMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for AlertMapper<T> {
    fn clone(&self) -> Self {
        Self {
            thresholds: Arc::clone(&self.thresholds),
        }
    }
}

impl<T: ?Sized> fmt::Debug for AlertMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertMapper")
            .field("thresholds", &self.thresholds.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Ticker produced by [`AlertMapper::to_countdown_ticker`].
#[derive(Clone)]
pub struct AlertTicker {
    thresholds: Arc<BTreeMap<u64, AlertFn<str>>>,
}

impl CountdownTicker for AlertTicker {
    fn tick(&self, countdown_id: &str, seconds_remaining: u64, _elapsed: Duration) {
        if let Some(callback) = self.thresholds.get(&seconds_remaining) {
            callback(countdown_id);
        }
    }
}

fn insert_unique<T: ?Sized>(
    thresholds: &mut BTreeMap<u64, AlertFn<T>>,
    seconds: u64,
    callback: AlertFn<T>,
) -> Result<(), ConfigError> {
    if thresholds.contains_key(&seconds) {
        return Err(ConfigError::DuplicateThreshold { seconds });
    }
    thresholds.insert(seconds, callback);
    Ok(())
}
