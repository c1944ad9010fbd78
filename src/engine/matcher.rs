// src/engine/matcher.rs - Evaluates one message field against one rule bucket

use log::debug;

use super::compiler::CompiledRule;
use super::rule_set::{Bucket, RuleSet};
use crate::types::RuleCategory;

/// Session facts the matcher needs: who is logged in and which channel is open
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchContext<'a> {
    pub current_user: Option<&'a str>,
    pub current_channel: Option<&'a str>,
}

impl<'a> MatchContext<'a> {
    pub fn new(current_user: Option<&'a str>, current_channel: Option<&'a str>) -> Self {
        Self { current_user, current_channel }
    }

    /// Only highlight user rules may fire on the current user's own messages.
    /// Nothing the user writes is ever blacklisted.
    pub fn excludes_own_message(&self, category: RuleCategory, bucket: Bucket, sender: &str) -> bool {
        !(category == RuleCategory::Highlight && bucket == Bucket::User)
            && self
                .current_user
                .map_or(false, |user| user.eq_ignore_ascii_case(sender))
    }
}

/// First rule of `bucket` matching `field`, honoring self-match exclusion and
/// channel scoping. Later rules are not evaluated once one matches.
pub fn first_match<'r>(
    rules: &'r RuleSet,
    category: RuleCategory,
    bucket: Bucket,
    ctx: &MatchContext<'_>,
    sender: &str,
    field: &str,
) -> Option<&'r CompiledRule> {
    if ctx.excludes_own_message(category, bucket, sender) {
        return None;
    }

    let rule = rules
        .bucket(bucket)
        .iter()
        .filter(|rule| rule.applies_to_channel(ctx.current_channel))
        .find(|rule| rule.is_match(field))?;

    debug!("{} {:?} rule {} ('{}') matched '{}'", category, bucket, rule.id, rule.keyword, field);
    Some(rule)
}

/// Whether `field` matches any rule of `bucket`. The first matching rule's
/// color, if it has one, is handed to `on_color`.
pub fn matches_field(
    rules: &RuleSet,
    category: RuleCategory,
    bucket: Bucket,
    ctx: &MatchContext<'_>,
    sender: &str,
    field: &str,
    on_color: Option<&mut dyn FnMut(&str)>,
) -> bool {
    match first_match(rules, category, bucket, ctx, sender, field) {
        Some(rule) => {
            if let (Some(color), Some(on_color)) = (rule.color.as_deref(), on_color) {
                on_color(color);
            }
            true
        }
        None => false,
    }
}
