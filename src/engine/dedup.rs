// src/engine/dedup.rs - Recent highlight history for notification deduplication

use chrono::{DateTime, Local, Utc};
use std::collections::VecDeque;

/// Number of recent highlights remembered
pub const RECENT_HIGHLIGHT_CAPACITY: usize = 30;

/// Format of the display-minute used in keys and on pinned cards
pub const DISPLAY_MINUTE_FORMAT: &str = "%I:%M";

/// Render a timestamp the way it is shown next to a highlight
pub fn display_minute(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format(DISPLAY_MINUTE_FORMAT).to_string()
}

/// Bounded FIFO of `(display-minute, sender, text)` keys.
///
/// Entries leave only through capacity eviction.
#[derive(Debug)]
pub struct DuplicateSuppressor {
    recent: VecDeque<String>,
    capacity: usize,
}

impl DuplicateSuppressor {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_HIGHLIGHT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    /// Returns true when the same sender posted the same text in the same
    /// display-minute recently. Otherwise records the highlight and returns false.
    pub fn is_duplicate(&mut self, timestamp: DateTime<Utc>, sender: &str, text: &str) -> bool {
        let key = format!("{},{},{}", display_minute(timestamp), sender, text);
        if self.recent.contains(&key) {
            return true;
        }

        self.recent.push_back(key);
        if self.recent.len() > self.capacity {
            self.recent.pop_front();
        }

        false
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

impl Default for DuplicateSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn test_same_minute_is_duplicate() {
        let mut recent = DuplicateSuppressor::new();
        let base = at(0);

        assert!(!recent.is_duplicate(base, "alice", "hello"));
        assert!(recent.is_duplicate(base + Duration::seconds(20), "alice", "hello"));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_different_sender_text_or_minute() {
        let mut recent = DuplicateSuppressor::new();

        assert!(!recent.is_duplicate(at(0), "alice", "hello"));
        assert!(!recent.is_duplicate(at(0), "bob", "hello"));
        assert!(!recent.is_duplicate(at(0), "alice", "hello!"));
        assert!(!recent.is_duplicate(at(1), "alice", "hello"));
        assert_eq!(recent.len(), 4);
    }

    #[test]
    fn test_capacity_eviction() {
        let mut recent = DuplicateSuppressor::new();

        for i in 0..RECENT_HIGHLIGHT_CAPACITY {
            assert!(!recent.is_duplicate(at(0), "alice", &format!("message {}", i)));
        }
        assert_eq!(recent.len(), RECENT_HIGHLIGHT_CAPACITY);
        // all thirty are still remembered
        assert!(recent.is_duplicate(at(0), "alice", "message 0"));

        // the 31st distinct entry evicts the 1st
        assert!(!recent.is_duplicate(at(0), "alice", "message 30"));
        assert_eq!(recent.len(), RECENT_HIGHLIGHT_CAPACITY);
        assert!(!recent.is_duplicate(at(0), "alice", "message 0"));
    }

    #[test]
    fn test_display_minute_format() {
        let label = display_minute(at(0));
        assert_eq!(label.len(), 5);
        assert_eq!(&label[2..3], ":");
        assert_eq!(display_minute(at(0) + Duration::seconds(59)), label);
    }
}
