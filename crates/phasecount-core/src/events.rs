use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every lifecycle change of a countdown run produces an Event.
/// Hosts subscribe via [`CountdownEngine::subscribe`](crate::CountdownEngine::subscribe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    CountdownStarted {
        id: String,
        phase_count: usize,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    /// A phase with a non-zero duration became current.
    PhaseStarted {
        id: String,
        phase_index: usize,
        label: Option<String>,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    CountdownFinished {
        id: String,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    CountdownCancelled {
        id: String,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// A caller-supplied callback panicked; the run was torn down.
    CountdownFaulted {
        id: String,
        phase_index: Option<usize>,
        message: String,
        at: DateTime<Utc>,
    },
    /// Emitted after every terminal outcome (finish, cancel or fault).
    CountdownClosed {
        id: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Identifier of the countdown this event belongs to.
    pub fn countdown_id(&self) -> &str {
        match self {
            Event::CountdownStarted { id, .. }
            | Event::PhaseStarted { id, .. }
            | Event::CountdownFinished { id, .. }
            | Event::CountdownCancelled { id, .. }
            | Event::CountdownFaulted { id, .. }
            | Event::CountdownClosed { id, .. } => id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::CountdownFinished { .. }
                | Event::CountdownCancelled { .. }
                | Event::CountdownFaulted { .. }
        )
    }
}
