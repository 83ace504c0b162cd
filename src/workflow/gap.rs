//! Knowledge gap tracking: which concepts users ask about that nothing answers.
//!
//! Two signals feed the tracker:
//! 1. Utterances that matched no rule at all
//! 2. Knowledge base subjects a template asked about that had nothing stored
//!
//! Suggestions are advisory. Nothing is generated or approved automatically.

use dashmap::DashMap;
use serde::Serialize;

use crate::pattern::Pattern;
use crate::pattern::store::RuleSet;
use crate::utterance::Utterance;

use super::generate::{self, TemplateKind};

/// Leading question words stripped from an unmatched utterance.
const QUESTION_PREFIXES: &[&[&str]] = &[
    &["WHAT", "IS", "A"],
    &["WHAT", "IS", "AN"],
    &["WHAT", "IS"],
    &["WHAT", "ARE"],
    &["WHO", "IS"],
    &["TELL", "ME", "ABOUT"],
    &["EXPLAIN"],
    &["DEFINE"],
];

/// How urgently a gap should be covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum GapPriority {
    Low,
    Medium,
    High,
}

impl GapPriority {
    fn from_mentions(mentions: usize) -> Self {
        match mentions {
            n if n >= 3 => Self::High,
            2 => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl std::fmt::Display for GapPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// A concept worth a generated pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeGap {
    pub concept: String,
    pub mentions: usize,
    pub suggested_kind: TemplateKind,
    pub priority: GapPriority,
}

impl std::fmt::Display for KnowledgeGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "\"{}\" (mentioned {} time(s)) -> {} pattern, priority {}",
            self.concept, self.mentions, self.suggested_kind, self.priority
        )
    }
}

#[derive(Debug, Clone)]
struct GapEntry {
    display: String,
    mentions: usize,
    /// Order of first mention, for stable output.
    first_seen: usize,
}

/// Process-wide mention counter.
#[derive(Debug, Default)]
pub struct GapTracker {
    entries: DashMap<String, GapEntry>,
}

impl GapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an utterance that no rule matched.
    pub fn record_unmatched(&self, utterance: &Utterance) {
        let tokens = utterance.tokens();
        let skip = QUESTION_PREFIXES
            .iter()
            .find(|prefix| tokens.len() > prefix.len() && starts_with(tokens, prefix))
            .map_or(0, |prefix| prefix.len());
        if skip < utterance.len() {
            self.record(&utterance.raw_span(skip, utterance.len()));
        }
    }

    /// Count a subject the knowledge base knew nothing about.
    pub fn record_miss(&self, subject: &str) {
        self.record(subject);
    }

    fn record(&self, concept: &str) {
        let key = crate::knowledge::term_key(concept);
        if key.is_empty() {
            return;
        }
        let order = self.entries.len();
        self.entries
            .entry(key.clone())
            .and_modify(|e| e.mentions += 1)
            .or_insert_with(|| GapEntry {
                display: key,
                mentions: 1,
                first_seen: order,
            });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top gaps by mention count, skipping concepts whose pattern is live.
    pub fn suggest(&self, limit: usize, rules: &RuleSet, reflection_prefix: &str) -> Vec<KnowledgeGap> {
        let mut entries: Vec<GapEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| b.mentions.cmp(&a.mentions).then(a.first_seen.cmp(&b.first_seen)));

        entries
            .into_iter()
            .filter_map(|entry| {
                let draft = generate::draft(&entry.display, reflection_prefix)?;
                let covered = Pattern::parse(&draft.pattern)
                    .ok()
                    .and_then(|p| rules.contains_pattern(&p))
                    .is_some();
                (!covered).then(|| KnowledgeGap {
                    concept: entry.display,
                    mentions: entry.mentions,
                    suggested_kind: draft.kind,
                    priority: GapPriority::from_mentions(entry.mentions),
                })
            })
            .take(limit)
            .collect()
    }
}

fn starts_with(tokens: &[String], prefix: &[&str]) -> bool {
    tokens.iter().zip(prefix).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::RuleDef;
    use crate::pattern::store::PatternStore;

    const PREFIX: &str = "METACOGNITIVE PROCESS";

    #[test]
    fn strips_question_words() {
        let tracker = GapTracker::new();
        tracker.record_unmatched(&Utterance::normalize("What is blockchain technology?"));
        tracker.record_unmatched(&Utterance::normalize("tell me about Blockchain Technology"));
        tracker.record_unmatched(&Utterance::normalize("blockchain technology"));
        let gaps = tracker.suggest(10, &PatternStore::new().snapshot(), PREFIX);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].concept, "blockchain technology");
        assert_eq!(gaps[0].mentions, 3);
        assert_eq!(gaps[0].priority, GapPriority::High);
        assert_eq!(gaps[0].suggested_kind, TemplateKind::Definition);
    }

    #[test]
    fn orders_by_mentions_and_limits() {
        let tracker = GapTracker::new();
        tracker.record_miss("rust");
        tracker.record_miss("compare Python and Java");
        tracker.record_miss("compare python and java");
        let gaps = tracker.suggest(1, &PatternStore::new().snapshot(), PREFIX);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].suggested_kind, TemplateKind::Comparison);
        assert_eq!(gaps[0].priority, GapPriority::Medium);
    }

    #[test]
    fn live_patterns_are_not_suggested() {
        let tracker = GapTracker::new();
        tracker.record_miss("rust");
        tracker.record_miss("go");
        let store = PatternStore::new();
        store.insert(&RuleDef::new("WHAT IS RUST", "a language")).unwrap();
        let gaps = tracker.suggest(10, &store.snapshot(), PREFIX);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].concept, "go");
        assert_eq!(gaps[0].priority, GapPriority::Low);
    }

    #[test]
    fn bare_question_words_are_kept() {
        let tracker = GapTracker::new();
        tracker.record_unmatched(&Utterance::normalize("what is"));
        assert_eq!(tracker.len(), 1);
    }
}
