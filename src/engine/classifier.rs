// src/engine/classifier.rs - Per-message blacklist/highlight decision

use chrono::{DateTime, Utc};
use log::debug;

use super::dedup::DuplicateSuppressor;
use super::matcher::{first_match, matches_field, MatchContext};
use super::rule_set::{Bucket, RuleSet};
use crate::types::{ChatMessage, PinRequest, RuleCategory, Verdict, DEFAULT_HIGHLIGHT_COLOR};

/// Classifies messages against one pair of rule snapshots.
///
/// Blacklist rules are always evaluated first and a blacklisted message is
/// never considered for highlighting.
pub struct Classifier<'a> {
    blacklist: &'a RuleSet,
    highlight: &'a RuleSet,
    ctx: MatchContext<'a>,
    loaded_at: DateTime<Utc>,
}

impl<'a> Classifier<'a> {
    pub fn new(
        blacklist: &'a RuleSet,
        highlight: &'a RuleSet,
        ctx: MatchContext<'a>,
        loaded_at: DateTime<Utc>,
    ) -> Self {
        Self { blacklist, highlight, ctx, loaded_at }
    }

    /// Decide what happens to a live chat message.
    ///
    /// Returns `None` when the message has no sender to match against.
    /// `composer_open` suppresses highlighting (not blacklisting) while the
    /// user is typing.
    pub fn classify(
        &self,
        message: &ChatMessage,
        composer_open: bool,
        recent: &mut DuplicateSuppressor,
    ) -> Option<Verdict> {
        let Some(sender) = message.sender() else {
            debug!("Skipping message without sender: {}", message.text);
            return None;
        };

        if self.is_blacklisted(sender, message, true) {
            return Some(Verdict::Suppress);
        }

        if composer_open {
            return Some(Verdict::Pass);
        }

        let Some(color) = self.highlight_color(sender, message, true) else {
            return Some(Verdict::Pass);
        };

        if recent.is_duplicate(message.timestamp, sender, &message.text) {
            debug!("Duplicate highlight from {} withheld from notification", sender);
            return Some(Verdict::Highlight { color, notify: false, pin: None });
        }

        // backlog replayed when chat loads is marked but never pinned
        let pin = (message.timestamp > self.loaded_at).then(|| PinRequest {
            sender: sender.to_string(),
            text: message.text.clone(),
            timestamp: message.timestamp,
        });

        Some(Verdict::Highlight { color, notify: true, pin })
    }

    /// Decide what happens to a message of a recorded video's chat replay.
    ///
    /// Reply parents and mentions are not considered, there is no composer
    /// gate, and highlights pin (stamped `now`) without a sound.
    pub fn classify_replay(
        &self,
        message: &ChatMessage,
        recent: &mut DuplicateSuppressor,
        now: DateTime<Utc>,
    ) -> Option<Verdict> {
        let sender = message.sender()?;

        if self.is_blacklisted(sender, message, false) {
            return Some(Verdict::Suppress);
        }

        let Some(color) = self.highlight_color(sender, message, false) else {
            return Some(Verdict::Pass);
        };

        let pin = (!recent.is_duplicate(now, sender, &message.text)).then(|| PinRequest {
            sender: sender.to_string(),
            text: message.text.clone(),
            timestamp: now,
        });

        Some(Verdict::Highlight { color, notify: false, pin })
    }

    /// Any badge, the sender, the text, or (with `check_reply`) the reply
    /// parent's login or text matching a blacklist rule.
    pub fn is_blacklisted(&self, sender: &str, message: &ChatMessage, check_reply: bool) -> bool {
        let hit = |bucket: Bucket, field: &str| {
            matches_field(self.blacklist, RuleCategory::Blacklist, bucket, &self.ctx, sender, field, None)
        };

        let blacklisted = message.badges.iter().any(|badge| hit(Bucket::Badge, badge))
            || hit(Bucket::User, sender)
            || hit(Bucket::Keyword, &message.text)
            || (check_reply
                && message.reply.as_ref().map_or(false, |reply| {
                    hit(Bucket::User, &reply.parent_user_login)
                        || hit(Bucket::Keyword, &reply.parent_message_body)
                }));

        if blacklisted {
            debug!("Blacklisted message from {}: {}", sender, message.text);
        }
        blacklisted
    }

    /// Color to mark the message with, or `None` when it is not highlighted.
    /// The color comes from the first matching rule, checked in badge, user,
    /// keyword order; a mention highlights with the default color.
    pub fn highlight_color(&self, sender: &str, message: &ChatMessage, check_mention: bool) -> Option<String> {
        let rule = message
            .badges
            .iter()
            .find_map(|badge| first_match(self.highlight, RuleCategory::Highlight, Bucket::Badge, &self.ctx, sender, badge))
            .or_else(|| first_match(self.highlight, RuleCategory::Highlight, Bucket::User, &self.ctx, sender, sender))
            .or_else(|| first_match(self.highlight, RuleCategory::Highlight, Bucket::Keyword, &self.ctx, sender, &message.text));

        match rule {
            Some(rule) => Some(
                rule.color
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HIGHLIGHT_COLOR.to_string()),
            ),
            None if check_mention && message.is_mentioned => Some(DEFAULT_HIGHLIGHT_COLOR.to_string()),
            None => None,
        }
    }
}
