//! Event-type filter applied to verified deliveries.

/// Wildcard entry subscribing to every event type.
pub const WILDCARD: &str = "*";

/// Ordered set of subscribed event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    events: Vec<String>,
}

impl EventFilter {
    /// Builds a filter, trimming entries and dropping blanks and duplicates
    /// while keeping first-seen order.
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for event in events {
            let event = event.as_ref().trim();
            if !event.is_empty() && !unique.iter().any(|e| e == event) {
                unique.push(event.to_string());
            }
        }
        Self { events: unique }
    }

    /// Filter admitting everything.
    pub fn all() -> Self {
        Self::new([WILDCARD])
    }

    pub fn is_wildcard(&self) -> bool {
        self.events.iter().any(|e| e == WILDCARD)
    }

    /// Whether a delivery of `event_type` should be dispatched.
    pub fn admits(&self, event_type: &str) -> bool {
        self.is_wildcard() || self.events.iter().any(|e| e == event_type)
    }

    /// Event list as registered with GitHub.
    pub fn as_slice(&self) -> &[String] {
        &self.events
    }
}
