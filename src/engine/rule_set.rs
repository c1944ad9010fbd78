// src/engine/rule_set.rs - Compiled rules of one category, plus schema repair

use log::{debug, info};

use super::compiler::CompiledRule;
use crate::types::{ordered_rules, RuleDefinition, RuleMap, RuleType, UserIdentity};

/// Field a group of rules is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Message text (and reply parent text)
    Keyword,
    /// Sender login (and reply parent login)
    User,
    /// Badge labels
    Badge,
}

/// Compiled rules of one category, split by the field they apply to.
/// Order inside each bucket is evaluation order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    keywords: Vec<CompiledRule>,
    users: Vec<CompiledRule>,
    badges: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile and partition stored rules. The rule type is the only thing
    /// deciding the bucket; legacy types left unrepaired count as message rules.
    pub fn compile(map: &RuleMap) -> Self {
        let mut set = Self::default();

        for definition in ordered_rules(map) {
            if definition.keyword.trim().is_empty() {
                debug!("Skipping rule {} with empty keyword", definition.id);
                continue;
            }

            let rule = CompiledRule::compile(definition);
            match definition.rule_type {
                RuleType::Message | RuleType::Exact | RuleType::Wildcard => set.keywords.push(rule),
                RuleType::User => set.users.push(rule),
                RuleType::Badge => set.badges.push(rule),
            }
        }

        set
    }

    pub fn bucket(&self, bucket: Bucket) -> &[CompiledRule] {
        match bucket {
            Bucket::Keyword => &self.keywords,
            Bucket::User => &self.users,
            Bucket::Badge => &self.badges,
        }
    }

    pub fn len(&self) -> usize {
        self.keywords.len() + self.users.len() + self.badges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bring stored rules up to the current schema in place.
///
/// Rules with blank keywords are removed, legacy `Exact` rules become
/// `<keyword>` message rules and legacy `Wildcard` rules become message rules.
/// Returns true when anything changed and the map should be written back.
pub fn migrate_rules(map: &mut RuleMap) -> bool {
    let before = map.len();
    map.retain(|_, rule| !rule.keyword.trim().is_empty());
    let mut updated = map.len() != before;

    for rule in map.values_mut() {
        match rule.rule_type {
            RuleType::Exact => {
                rule.keyword = format!("<{}>", rule.keyword);
                rule.rule_type = RuleType::Message;
            }
            RuleType::Wildcard => {
                rule.rule_type = RuleType::Message;
            }
            _ => continue,
        }
        debug!("Migrated legacy rule {} to '{}'", rule.id, rule.keyword);
        updated = true;
    }

    if updated {
        info!("Repaired rule configuration ({} rules pruned)", before - map.len());
    }
    updated
}

/// Highlight rules for a user who never configured any: their own name
pub fn default_highlight_rules(user: &UserIdentity) -> RuleMap {
    let rule = RuleDefinition::new(0, RuleType::Message, user.name.clone());
    let mut map = RuleMap::new();
    map.insert(rule.id.key(), rule);
    map
}
