//! Rules: wildcard patterns paired with response templates.
//!
//! A [`Pattern`] is a sequence of literal words and wildcards. `*` matches
//! one or more contiguous tokens, `_` matches exactly one. Literal words are
//! normalized the same way utterances are, so `what is AIML?` and
//! `WHAT IS AIML` denote the same pattern.

pub mod store;
pub mod template;

use std::cmp::Ordering;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

use crate::error::{RuleError, RuleResult};
use crate::utterance::normalize_word;

pub use template::{FactRef, KbView, Part, Segment, Template};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a rule in the pattern store.
///
/// Ids are allocated in registration order, so a lower id means the rule was
/// registered first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RuleId(NonZeroU64);

impl RuleId {
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(RuleId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule:{}", self.0)
    }
}

/// Thread-safe monotonic rule id allocator.
#[derive(Debug)]
pub(crate) struct RuleIdAllocator {
    next: AtomicU64,
}

impl RuleIdAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> RuleId {
        let raw = self.next.fetch_add(1, AtomicOrdering::Relaxed);
        RuleId::new(raw).expect("rule id allocator starts at 1")
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// One element of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternToken {
    /// A normalized (uppercase) word that must match exactly.
    Literal(String),
    /// `_`: exactly one token.
    Single,
    /// `*`: one or more contiguous tokens.
    Multi,
}

impl PatternToken {
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }
}

impl std::fmt::Display for PatternToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(word) => f.write_str(word),
            Self::Single => f.write_str("_"),
            Self::Multi => f.write_str("*"),
        }
    }
}

/// A validated wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    tokens: Vec<PatternToken>,
}

impl Pattern {
    /// Parse pattern text.
    ///
    /// Fails on an empty pattern, a pattern with no literal word, or two
    /// adjacent `*` wildcards.
    pub fn parse(text: &str) -> RuleResult<Self> {
        let tokens: Vec<PatternToken> = text
            .split_whitespace()
            .filter_map(|word| match word {
                "*" => Some(PatternToken::Multi),
                "_" => Some(PatternToken::Single),
                other => normalize_word(other).map(PatternToken::Literal),
            })
            .collect();

        if tokens.is_empty() {
            return Err(RuleError::EmptyPattern);
        }

        let pattern = Self { tokens };
        if pattern.literal_count() == 0 {
            return Err(RuleError::NoLiteral {
                pattern: pattern.canonical(),
            });
        }
        if let Some(position) = pattern
            .tokens
            .windows(2)
            .position(|w| w[0] == PatternToken::Multi && w[1] == PatternToken::Multi)
        {
            return Err(RuleError::ConsecutiveWildcards {
                pattern: pattern.canonical(),
                position: position + 1,
            });
        }
        Ok(pattern)
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    /// Canonical text form: tokens joined by single spaces.
    pub fn canonical(&self) -> String {
        self.tokens
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn literal_count(&self) -> usize {
        self.tokens.iter().filter(|t| !t.is_wildcard()).count()
    }

    pub fn wildcard_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_wildcard()).count()
    }

    pub fn multi_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t, PatternToken::Multi))
            .count()
    }

    /// Number of literal tokens before the first wildcard.
    pub fn literal_prefix(&self) -> usize {
        self.tokens.iter().take_while(|t| !t.is_wildcard()).count()
    }

    pub fn priority(&self) -> Priority {
        Priority {
            literals: self.literal_count(),
            wildcards: self.wildcard_count(),
            literal_prefix: self.literal_prefix(),
            multis: self.multi_count(),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Specificity of a pattern. Greater is more specific.
///
/// Ordered by: more literals, then fewer wildcards, then a longer literal
/// prefix, then fewer multi-token wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Priority {
    pub literals: usize,
    pub wildcards: usize,
    pub literal_prefix: usize,
    pub multis: usize,
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.literals
            .cmp(&other.literals)
            .then_with(|| other.wildcards.cmp(&self.wildcards))
            .then_with(|| self.literal_prefix.cmp(&other.literal_prefix))
            .then_with(|| other.multis.cmp(&self.multis))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Uncompiled rule text as supplied by a loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    pub pattern: String,
    pub template: String,
    /// Where the rule came from (pack name, `workflow:PG001`, ...).
    #[serde(default)]
    pub source: String,
}

impl RuleDef {
    pub fn new(pattern: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            template: template.into(),
            source: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// An immutable, validated rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    pub pattern: Pattern,
    pub template: Template,
    pub priority: Priority,
    pub source: String,
    /// The template text as written, kept for display and export.
    pub template_text: String,
}

impl Rule {
    /// Compile a definition into a rule.
    ///
    /// Checks everything that can be checked without the rest of the rule
    /// set: pattern shape, template syntax and capture ranges. Redirect
    /// resolvability is checked by the store.
    pub fn compile(id: RuleId, def: &RuleDef) -> RuleResult<Self> {
        let pattern = Pattern::parse(&def.pattern)?;
        let template = Template::parse(&def.template)?;

        let wildcards = pattern.wildcard_count();
        if let Some(index) = template.max_capture().filter(|&i| i >= wildcards) {
            return Err(RuleError::CaptureOutOfRange {
                index,
                wildcards,
                pattern: pattern.canonical(),
            });
        }

        Ok(Self {
            id,
            priority: pattern.priority(),
            pattern,
            template,
            source: def.source.clone(),
            template_text: def.template.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_literals() {
        let p = Pattern::parse("what is  aiml?").unwrap();
        assert_eq!(p.canonical(), "WHAT IS AIML");
        assert_eq!(p.literal_count(), 3);
        assert_eq!(p.wildcard_count(), 0);
    }

    #[test]
    fn parse_wildcards() {
        let p = Pattern::parse("MY NAME IS *").unwrap();
        assert_eq!(p.tokens()[3], PatternToken::Multi);
        let p = Pattern::parse("_ LIKES *").unwrap();
        assert_eq!(p.tokens()[0], PatternToken::Single);
        assert_eq!(p.literal_prefix(), 0);
    }

    #[test]
    fn parse_rejects_invalid_shapes() {
        assert!(matches!(Pattern::parse("   "), Err(RuleError::EmptyPattern)));
        assert!(matches!(Pattern::parse("?!"), Err(RuleError::EmptyPattern)));
        assert!(matches!(Pattern::parse("* _"), Err(RuleError::NoLiteral { .. })));
        assert!(matches!(
            Pattern::parse("TELL * * NOW"),
            Err(RuleError::ConsecutiveWildcards { position: 2, .. })
        ));
        // Adjacent single wildcards are fine.
        assert!(Pattern::parse("SAY _ _").is_ok());
    }

    #[test]
    fn priority_prefers_more_literals() {
        let exact = Pattern::parse("WHAT IS AIML").unwrap().priority();
        let wild = Pattern::parse("WHAT IS *").unwrap().priority();
        assert!(exact > wild);
    }

    #[test]
    fn priority_prefers_fewer_wildcards() {
        let one = Pattern::parse("HELLO *").unwrap().priority();
        let two = Pattern::parse("HELLO _ *").unwrap().priority();
        assert!(one > two);
    }

    #[test]
    fn priority_prefers_longer_literal_prefix() {
        let prefix = Pattern::parse("I LIKE *").unwrap().priority();
        let suffix = Pattern::parse("* I LIKE").unwrap().priority();
        assert!(prefix > suffix);
    }

    #[test]
    fn priority_prefers_single_over_multi() {
        let single = Pattern::parse("HELLO _").unwrap().priority();
        let multi = Pattern::parse("HELLO *").unwrap().priority();
        assert!(single > multi);
    }

    #[test]
    fn compile_checks_capture_range() {
        let id = RuleId::new(1).unwrap();
        let ok = Rule::compile(id, &RuleDef::new("MY NAME IS *", "Hi {0}")).unwrap();
        assert_eq!(ok.priority.literals, 3);

        let err = Rule::compile(id, &RuleDef::new("MY NAME IS *", "Hi {1}")).unwrap_err();
        assert!(matches!(
            err,
            RuleError::CaptureOutOfRange { index: 1, wildcards: 1, .. }
        ));
    }

    #[test]
    fn allocator_is_monotonic() {
        let alloc = RuleIdAllocator::new();
        let a = alloc.next_id();
        let b = alloc.next_id();
        assert!(a < b);
        assert_eq!(a.get(), 1);
    }
}
