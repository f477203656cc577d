use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Debounced draft save: fires once `delay` has passed since the most
/// recent edit. Each edit pushes the deadline back.
#[derive(Debug, Clone)]
pub struct Autosave {
    delay: Duration,
    last_edit: Option<Instant>,
    last_saved: Option<DateTime<Utc>>,
}

impl Autosave {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_edit: None,
            last_saved: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn record_edit(&mut self, at: Instant) {
        self.last_edit = Some(at);
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.last_edit
            .is_some_and(|edit| now.saturating_duration_since(edit) >= self.delay)
    }

    /// Marks the draft saved if the debounce window has elapsed.
    pub fn fire_if_due(&mut self, now: Instant, saved_at: DateTime<Utc>) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.last_edit = None;
        self.last_saved = Some(saved_at);
        true
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// Drops any pending save; an in-flight deadline is simply forgotten.
    pub fn cancel_pending(&mut self) {
        self.last_edit = None;
    }
}
