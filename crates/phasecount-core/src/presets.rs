//! Countdowns described in configuration.
//!
//! A preset turns into real [`Phase`]s whose callbacks broadcast rendered
//! message templates. Templates expand `{id}`, `{seconds}` and `{elapsed}`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broadcast::Broadcaster;
use crate::error::{ConfigError, Result};
use crate::timer::{
    alert, non_negative_secs, AlertMapper, AlertTicker, CountdownEngine, CountdownTicker, Phase,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownPreset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub phases: Vec<PhasePreset>,
    /// Broadcast once all phases are done.
    #[serde(default)]
    pub finish_message: Option<String>,
    /// Broadcast when the countdown is cancelled.
    #[serde(default)]
    pub cancel_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePreset {
    /// Signed so that a negative value in the file is reported, not misparsed.
    pub seconds: i64,
    #[serde(default)]
    pub label: Option<String>,
    /// Broadcast on every tick of the phase.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub alerts: Vec<AlertPreset>,
}

/// Broadcast `message` when `at` seconds remain in the phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPreset {
    pub at: i64,
    pub message: String,
}

impl CountdownPreset {
    /// # Errors
    ///
    /// Rejects presets without phases, negative phase or alert durations and
    /// duplicate alert thresholds within a phase.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.phases.is_empty() {
            return Err(ConfigError::NoPhases {
                id: self.name.clone(),
            });
        }
        for (index, phase) in self.phases.iter().enumerate() {
            phase.duration_secs(&self.name, index)?;
            let mut seen = Vec::with_capacity(phase.alerts.len());
            for a in &phase.alerts {
                let field = format!("{}.phases.{index}.alerts.at", self.name);
                let at = non_negative_secs(&field, a.at)?;
                if seen.contains(&at) {
                    return Err(ConfigError::DuplicateThreshold { seconds: at });
                }
                seen.push(at);
            }
        }
        Ok(())
    }

    /// Sum of all phase durations.
    pub fn total_secs(&self) -> std::result::Result<u64, ConfigError> {
        self.phases
            .iter()
            .enumerate()
            .try_fold(0u64, |acc, (i, p)| -> std::result::Result<u64, ConfigError> {
                Ok(acc.saturating_add(p.duration_secs(&self.name, i)?))
            })
    }

    /// Build phases whose callbacks broadcast into `broadcaster`.
    pub fn build_phases(
        &self,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> std::result::Result<Vec<Phase>, ConfigError> {
        self.validate()?;
        self.phases
            .iter()
            .enumerate()
            .map(|(i, p)| p.build(&self.name, i, &broadcaster))
            .collect()
    }

    /// Start this preset on `engine` under `id`.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from the preset itself and
    /// [`CountdownError::DuplicateRun`](crate::CountdownError::DuplicateRun)
    /// if `id` is already running.
    pub fn start(
        &self,
        engine: &CountdownEngine,
        id: &str,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Result<()> {
        let phases = self.build_phases(Arc::clone(&broadcaster))?;

        let finish = self.finish_message.clone();
        let finish_sink = Arc::clone(&broadcaster);
        let cancel = self.cancel_message.clone();
        let cancel_sink = broadcaster;

        engine.start_phased_countdown(
            id,
            phases,
            move |id, elapsed| {
                if let Some(template) = &finish {
                    finish_sink.broadcast_message(&render_message(template, id, None, elapsed));
                }
            },
            move |id| {
                if let Some(template) = &cancel {
                    cancel_sink.broadcast_message(&render_message(
                        template,
                        id,
                        None,
                        Duration::ZERO,
                    ));
                }
            },
        )
    }
}

impl PhasePreset {
    fn duration_secs(&self, preset: &str, index: usize) -> std::result::Result<u64, ConfigError> {
        non_negative_secs(&format!("{preset}.phases.{index}.seconds"), self.seconds)
    }

    fn build(
        &self,
        preset: &str,
        index: usize,
        broadcaster: &Arc<dyn Broadcaster>,
    ) -> std::result::Result<Phase, ConfigError> {
        let seconds = self.duration_secs(preset, index)?;

        let alerts = AlertMapper::from_seconds(self.alerts.iter().map(|a| {
            let sink = Arc::clone(broadcaster);
            let template = a.message.clone();
            let at = a.at.max(0) as u64;
            (
                a.at,
                alert(move |id| {
                    sink.broadcast_message(&render_message(&template, id, Some(at), Duration::ZERO))
                }),
            )
        }))?;

        let ticker = PresetTicker {
            alerts: alerts.to_countdown_ticker(),
            message: self.message.clone(),
            sink: Arc::clone(broadcaster),
        };
        let phase = Phase::from_secs(seconds, ticker);
        Ok(match &self.label {
            Some(label) => phase.with_label(label.clone()),
            None => phase,
        })
    }
}

/// Fires the phase alerts, then the per-tick message.
struct PresetTicker {
    alerts: AlertTicker,
    message: Option<String>,
    sink: Arc<dyn Broadcaster>,
}

impl CountdownTicker for PresetTicker {
    fn tick(&self, countdown_id: &str, seconds_remaining: u64, elapsed: Duration) {
        self.alerts.tick(countdown_id, seconds_remaining, elapsed);
        if let Some(template) = &self.message {
            self.sink.broadcast_message(&render_message(
                template,
                countdown_id,
                Some(seconds_remaining),
                elapsed,
            ));
        }
    }
}

/// Expand `{id}`, `{seconds}` and `{elapsed}` in `template`.
///
/// `{seconds}` is left as is when no remaining-time value applies.
pub fn render_message(template: &str, id: &str, seconds: Option<u64>, elapsed: Duration) -> String {
    let mut out = template
        .replace("{id}", id)
        .replace("{elapsed}", &elapsed.as_secs().to_string());
    if let Some(seconds) = seconds {
        out = out.replace("{seconds}", &seconds.to_string());
    }
    out
}
