// src/engine/compiler.rs - Turns stored rule keywords into runtime matchers

use log::{debug, warn};
use regex::{Regex, RegexBuilder};

use super::safety::is_safe_pattern;
use crate::types::{RuleDefinition, RuleId};

/// Replacement for `*` in literal keywords: any run of non-space characters
const WILDCARD: &str = "[^ ]*";

/// Characters that may directly follow a keyword besides whitespace
const TRAILING_PUNCTUATION: &str = r"[!.,:';?/]";

/// Upper bound on the compiled size of any rule regex
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Runtime form of a rule keyword
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    /// Explicit `~/pattern/flags` regex that passed the safety screen
    Regex(Regex),
    /// Boundary-anchored pattern generated from literal, wildcard or exact text
    Keyword(Regex),
}

impl CompiledMatcher {
    pub fn is_match(&self, field: &str) -> bool {
        match self {
            CompiledMatcher::Regex(regex) | CompiledMatcher::Keyword(regex) => regex.is_match(field),
        }
    }

    pub fn is_explicit_regex(&self) -> bool {
        matches!(self, CompiledMatcher::Regex(_))
    }
}

/// Compile one keyword.
///
/// Explicit regexes that are unsafe or fail to build fall back to the literal
/// path using the raw keyword, delimiters included. `None` means the keyword
/// can never match.
pub fn compile(keyword: &str) -> Option<CompiledMatcher> {
    if let Some((pattern, flags)) = split_regex_keyword(keyword) {
        if let Some(regex) = build_explicit_regex(pattern, flags) {
            return Some(CompiledMatcher::Regex(regex));
        }
        debug!("Regex keyword '{}' is inert, matching it literally", keyword);
    }

    let pattern = keyword_pattern(keyword);
    match RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
    {
        Ok(regex) => Some(CompiledMatcher::Keyword(regex)),
        Err(e) => {
            warn!("Keyword '{}' could not be compiled and will never match: {}", keyword, e);
            None
        }
    }
}

/// Split `~/pattern/flags` into its pattern and flags.
///
/// The pattern extends to the rightmost `/` that is followed only by
/// lowercase letters. Keywords spanning several lines are never regexes.
pub fn split_regex_keyword(keyword: &str) -> Option<(&str, &str)> {
    let body = keyword.strip_prefix("~/")?;
    if body.contains(['\n', '\r', '\u{2028}', '\u{2029}']) {
        return None;
    }

    body.rmatch_indices('/').find_map(|(idx, _)| {
        let flags = &body[idx + 1..];
        flags
            .bytes()
            .all(|b| b.is_ascii_lowercase())
            .then(|| (&body[..idx], flags))
    })
}

fn build_explicit_regex(pattern: &str, flags: &str) -> Option<Regex> {
    if !is_safe_pattern(pattern) {
        warn!("Ignoring potentially catastrophic regex: {}", pattern);
        return None;
    }

    let mut builder = RegexBuilder::new(pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);

    let mut seen = String::with_capacity(flags.len());
    for flag in flags.chars() {
        if seen.contains(flag) {
            debug!("Duplicate regex flag '{}' in /{}/{}", flag, pattern, flags);
            return None;
        }
        seen.push(flag);

        match flag {
            'i' => { builder.case_insensitive(true); }
            'm' => { builder.multi_line(true); }
            's' => { builder.dot_matches_new_line(true); }
            // global, unicode, unicode sets, sticky and indices change nothing for a boolean test
            'g' | 'u' | 'v' | 'y' | 'd' => {}
            other => {
                debug!("Unknown regex flag '{}' in /{}/{}", other, pattern, flags);
                return None;
            }
        }
    }

    match builder.build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            debug!("Invalid regex /{}/{}: {}", pattern, flags, e);
            None
        }
    }
}

/// Build the boundary-anchored pattern for a literal keyword.
///
/// `*` becomes a run of non-space characters and `<text>` requires the whole
/// field to be `text`. The keyword must start the field or follow whitespace or
/// `@`, and must end the field or precede whitespace or sentence punctuation.
pub fn keyword_pattern(keyword: &str) -> String {
    let mut body = keyword
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(WILDCARD);

    if let Some(inner) = body.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
        body = format!("^{}$", inner);
    }

    format!(r"(\s|^|@){}({}|\s|$)", body, TRAILING_PUNCTUATION)
}

/// A stored rule together with its compiled matcher
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: RuleId,
    pub keyword: String,
    /// Lowercased channel scope; empty means every channel
    pub channels: Vec<String>,
    pub color: Option<String>,
    matcher: Option<CompiledMatcher>,
}

impl CompiledRule {
    pub fn compile(definition: &RuleDefinition) -> Self {
        Self {
            id: definition.id.clone(),
            keyword: definition.keyword.clone(),
            channels: definition
                .channels
                .iter()
                .flatten()
                .map(|channel| channel.to_lowercase())
                .collect(),
            color: definition.color.clone(),
            matcher: compile(&definition.keyword),
        }
    }

    pub fn matcher(&self) -> Option<&CompiledMatcher> {
        self.matcher.as_ref()
    }

    /// Whether the rule's channel scope admits `channel`. An unknown channel
    /// never restricts.
    pub fn applies_to_channel(&self, channel: Option<&str>) -> bool {
        match channel {
            Some(name) if !self.channels.is_empty() => {
                let name = name.to_lowercase();
                self.channels.iter().any(|scoped| *scoped == name)
            }
            _ => true,
        }
    }

    pub fn is_match(&self, field: &str) -> bool {
        self.matcher
            .as_ref()
            .map_or(false, |matcher| matcher.is_match(field))
    }
}
