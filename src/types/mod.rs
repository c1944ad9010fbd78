// src/types/mod.rs - Rule definitions, chat messages and classification verdicts

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Color used to mark a highlighted message when no matching rule carries one
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#ff0000";

/// Stored rules of one category, keyed by the rule id as written in configuration
pub type RuleMap = BTreeMap<String, RuleDefinition>;

/// The two rule categories a user can configure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Blacklist,
    Highlight,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 2] = [RuleCategory::Blacklist, RuleCategory::Highlight];

    /// Name of the configuration entry holding this category's rules
    pub fn setting_key(&self) -> &'static str {
        match self {
            RuleCategory::Blacklist => "blacklist_keywords",
            RuleCategory::Highlight => "highlight_keywords",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.setting_key())
    }
}

/// Which message field a rule is matched against.
///
/// `Exact` and `Wildcard` are legacy shapes that only exist in old
/// configuration; they are rewritten to `Message` when rules are repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[serde(alias = "Message", alias = "MESSAGE")]
    Message,
    #[serde(alias = "User", alias = "USER")]
    User,
    #[serde(alias = "Badge", alias = "BADGE")]
    Badge,
    #[serde(alias = "Exact", alias = "EXACT")]
    Exact,
    #[serde(alias = "Wildcard", alias = "WILDCARD")]
    Wildcard,
}

impl RuleType {
    pub fn is_legacy(&self) -> bool {
        matches!(self, RuleType::Exact | RuleType::Wildcard)
    }
}

/// Rule ids are numeric for rules created by the settings UI, but hand-edited
/// configuration may use any string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleId {
    Number(u64),
    Text(String),
}

impl RuleId {
    /// Key under which the rule is stored in its `RuleMap`
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleId::Number(n) => write!(f, "{}", n),
            RuleId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RuleId {
    fn from(value: u64) -> Self {
        RuleId::Number(value)
    }
}

/// One user-authored rule as persisted in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: RuleId,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
}

impl RuleDefinition {
    pub fn new(id: impl Into<RuleId>, rule_type: RuleType, keyword: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rule_type,
            keyword: keyword.into(),
            channels: None,
            color: None,
            status: None,
        }
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Build a `RuleMap` from a list of rules, keyed by their ids
pub fn rule_map<I: IntoIterator<Item = RuleDefinition>>(rules: I) -> RuleMap {
    rules.into_iter().map(|rule| (rule.id.key(), rule)).collect()
}

/// Canonical array index form of a key: no sign, no leading zeros, below
/// `u32::MAX`. Anything else orders as a text key.
fn index_key(key: &str) -> Option<u32> {
    key.parse::<u32>()
        .ok()
        .filter(|n| *n != u32::MAX && n.to_string() == key)
}

/// Rules in evaluation order: index keys ascending, then the remaining keys
/// in lexical order.
pub fn ordered_rules(map: &RuleMap) -> Vec<&RuleDefinition> {
    let (mut numeric, text): (Vec<_>, Vec<_>) = map
        .iter()
        .partition(|(key, _)| index_key(key).is_some());

    numeric.sort_by_key(|(key, _)| index_key(key).unwrap_or(u32::MAX));

    numeric
        .into_iter()
        .chain(text)
        .map(|(_, rule)| rule)
        .collect()
}

/// The authenticated user of the chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
}

/// The channel whose chat is currently open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIdentity {
    pub id: String,
    pub name: String,
}

/// Parent of a threaded reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContext {
    pub parent_user_login: String,
    pub parent_message_body: String,
}

/// A chat message as handed over by the platform adapter, already reduced to
/// plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub sender_login: Option<String>,
    #[serde(default)]
    pub sender_display_name: Option<String>,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub reply: Option<ReplyContext>,
    #[serde(default)]
    pub is_mentioned: bool,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            sender_login: Some(sender.into()),
            sender_display_name: None,
            text: text.into(),
            timestamp,
            badges: Vec::new(),
            reply: None,
            is_mentioned: false,
        }
    }

    /// Name rules are matched against: the login, falling back to the display name
    pub fn sender(&self) -> Option<&str> {
        self.sender_login
            .as_deref()
            .or(self.sender_display_name.as_deref())
    }
}

/// Request for a transient pinned-highlight card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRequest {
    pub sender: String,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Outcome of classifying one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Verdict {
    /// Hide the message
    Suppress,
    /// Visually mark the message; `notify` and `pin` are the notification side
    /// effects, withheld for duplicates
    Highlight {
        color: String,
        notify: bool,
        pin: Option<PinRequest>,
    },
    /// Leave the message untouched
    Pass,
}

impl Verdict {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Verdict::Suppress)
    }

    pub fn is_highlighted(&self) -> bool {
        matches!(self, Verdict::Highlight { .. })
    }
}
