//! Message sinks that countdown callbacks broadcast into.
//!
//! The engine itself never talks to a broadcaster. Presets and host code
//! capture one inside their tick, finish and cancel callbacks.

use std::sync::{Arc, Mutex};

/// Any sink that accepts a formatted text message (a game server chat,
/// a terminal, a log).
pub trait Broadcaster: Send + Sync {
    fn broadcast_message(&self, text: &str);
}

impl<B: Broadcaster + ?Sized> Broadcaster for Arc<B> {
    fn broadcast_message(&self, text: &str) {
        (**self).broadcast_message(text)
    }
}

/// Broadcaster that keeps every message in memory, in delivery order.
#[derive(Debug, Default, Clone)]
pub struct MemoryBroadcaster {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MemoryBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all messages received so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Number of times `text` was broadcast.
    pub fn count(&self, text: &str) -> usize {
        self.messages().iter().filter(|m| m.as_str() == text).count()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.messages.lock() {
            guard.clear();
        }
    }
}

impl Broadcaster for MemoryBroadcaster {
    fn broadcast_message(&self, text: &str) {
        if let Ok(mut guard) = self.messages.lock() {
            guard.push(text.to_string());
        }
    }
}
