// src/engine/pins.rs - Pinned highlight cards

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::VecDeque;

use super::dedup::display_minute;
use crate::config::EngineSettings;
use crate::types::PinRequest;

/// How long a pinned card stays up when timeouts are enabled
pub const PINNED_HIGHLIGHT_TIMEOUT_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedHighlight {
    /// `hh:mm` label shown on the card
    pub time: String,
    pub sender: String,
    pub text: String,
    pub pinned_at: DateTime<Utc>,
}

/// The stack of highlight cards pinned above chat, oldest first
#[derive(Debug, Default)]
pub struct PinBoard {
    pins: VecDeque<PinnedHighlight>,
}

impl PinBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a highlight. Returns false when pinning is turned off. The oldest
    /// card makes room once `max_pinned_highlights` is reached.
    pub fn pin(&mut self, request: &PinRequest, settings: &EngineSettings, now: DateTime<Utc>) -> bool {
        if !settings.pinned_highlights || settings.max_pinned_highlights == 0 {
            return false;
        }

        while self.pins.len() >= settings.max_pinned_highlights {
            if let Some(dropped) = self.pins.pop_front() {
                debug!("Unpinned highlight from {} to make room", dropped.sender);
            }
        }

        self.pins.push_back(PinnedHighlight {
            time: display_minute(request.timestamp),
            sender: request.sender.clone(),
            text: request.text.clone(),
            pinned_at: now,
        });
        true
    }

    /// Drop cards that outlived the timeout. Does nothing while timeouts are off.
    pub fn expire(&mut self, settings: &EngineSettings, now: DateTime<Utc>) -> usize {
        if !settings.timeout_highlights {
            return 0;
        }

        let cutoff = now - Duration::seconds(PINNED_HIGHLIGHT_TIMEOUT_SECS);
        let before = self.pins.len();
        self.pins.retain(|pin| pin.pinned_at > cutoff);
        before - self.pins.len()
    }

    /// Remove the card at `index`, as when the user closes it
    pub fn dismiss(&mut self, index: usize) -> Option<PinnedHighlight> {
        self.pins.remove(index)
    }

    pub fn pins(&self) -> impl Iterator<Item = &PinnedHighlight> {
        self.pins.iter()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}
