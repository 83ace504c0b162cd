//! Wildcard matching and rule selection.
//!
//! A pattern matches an utterance only when it covers the whole token
//! sequence. `*` is tried greedy-first with backtracking. Failed
//! `(pattern position, token position)` states are memoized, so a single
//! alignment costs at most `pattern_len × tokens²` steps.

use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;

use rayon::prelude::*;
use serde::Serialize;

use crate::pattern::store::RuleSet;
use crate::pattern::{Pattern, PatternToken, Rule, RuleId};
use crate::utterance::Utterance;

/// Rule sets at least this large are scanned in parallel by default.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 512;

/// One wildcard binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capture {
    /// 0-based wildcard index within the pattern.
    pub index: usize,
    /// First token covered.
    pub start: usize,
    /// One past the last token covered.
    pub end: usize,
    /// Normalized tokens of the span joined by single spaces.
    pub text: String,
}

/// The winning rule and its wildcard bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub rule_id: RuleId,
    pub captures: Vec<Capture>,
}

/// Rule selector with a configurable parallelism threshold.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    parallel_threshold: usize,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold.max(1);
        self
    }

    /// Select the highest-priority rule matching the utterance.
    ///
    /// Ties on priority go to the lowest rule id.
    pub fn find(&self, utterance: &Utterance, rules: &RuleSet) -> Option<MatchResult> {
        if utterance.is_empty() {
            return None;
        }
        let tokens = utterance.tokens();

        let best = if rules.len() >= self.parallel_threshold {
            rules
                .rules()
                .par_iter()
                .filter_map(|rule| align(&rule.pattern, tokens).map(|spans| (rule.as_ref(), spans)))
                .max_by(|a, b| rank(a.0, b.0))
        } else {
            rules
                .iter()
                .filter_map(|rule| align(&rule.pattern, tokens).map(|spans| (rule.as_ref(), spans)))
                .max_by(|a, b| rank(a.0, b.0))
        };

        best.map(|(rule, spans)| {
            tracing::debug!(
                rule = %rule.id,
                pattern = %rule.pattern,
                utterance = %utterance,
                "matched"
            );
            MatchResult {
                rule_id: rule.id,
                captures: spans
                    .into_iter()
                    .enumerate()
                    .map(|(index, (start, end))| Capture {
                        index,
                        start,
                        end,
                        text: tokens[start..end].join(" "),
                    })
                    .collect(),
            }
        })
    }
}

/// Match with the default threshold.
pub fn match_utterance(utterance: &Utterance, rules: &RuleSet) -> Option<MatchResult> {
    Matcher::default().find(utterance, rules)
}

/// Total order on candidate rules: priority first, then lower id wins.
fn rank(a: &Rule, b: &Rule) -> Ordering {
    (a.priority, Reverse(a.id)).cmp(&(b.priority, Reverse(b.id)))
}

/// Align a whole pattern against a whole token sequence.
///
/// Returns the `(start, end)` token span of every wildcard, in order.
pub fn align(pattern: &Pattern, tokens: &[String]) -> Option<Vec<(usize, usize)>> {
    let ptoks = pattern.tokens();
    if ptoks.len() > tokens.len() {
        return None;
    }
    if pattern.multi_count() == 0 && ptoks.len() != tokens.len() {
        return None;
    }

    let mut spans = Vec::with_capacity(pattern.wildcard_count());
    let mut failed = HashSet::new();
    step(ptoks, tokens, 0, 0, &mut spans, &mut failed).then_some(spans)
}

fn step(
    ptoks: &[PatternToken],
    tokens: &[String],
    pi: usize,
    ti: usize,
    spans: &mut Vec<(usize, usize)>,
    failed: &mut HashSet<(usize, usize)>,
) -> bool {
    if pi == ptoks.len() {
        return ti == tokens.len();
    }
    // Every remaining pattern token consumes at least one input token.
    if tokens.len() - ti < ptoks.len() - pi || failed.contains(&(pi, ti)) {
        return false;
    }

    let ok = match &ptoks[pi] {
        PatternToken::Literal(word) => {
            tokens[ti] == *word && step(ptoks, tokens, pi + 1, ti + 1, spans, failed)
        }
        PatternToken::Single => {
            spans.push((ti, ti + 1));
            let ok = step(ptoks, tokens, pi + 1, ti + 1, spans, failed);
            if !ok {
                spans.pop();
            }
            ok
        }
        PatternToken::Multi => {
            let reserved = ptoks.len() - pi - 1;
            let longest = tokens.len() - reserved;
            (ti + 1..=longest).rev().any(|end| {
                spans.push((ti, end));
                let ok = step(ptoks, tokens, pi + 1, end, spans, failed);
                if !ok {
                    spans.pop();
                }
                ok
            })
        }
    };

    if !ok {
        failed.insert((pi, ti));
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::RuleDef;
    use crate::pattern::store::PatternStore;

    fn spans(pattern: &str, text: &str) -> Option<Vec<(usize, usize)>> {
        let p = Pattern::parse(pattern).unwrap();
        align(&p, Utterance::normalize(text).tokens())
    }

    #[test]
    fn literal_only() {
        assert_eq!(spans("HELLO THERE", "hello there!"), Some(vec![]));
        assert_eq!(spans("HELLO THERE", "hello"), None);
        assert_eq!(spans("HELLO", "hello there"), None);
    }

    #[test]
    fn multi_needs_one_token() {
        assert_eq!(spans("MY NAME IS *", "my name is"), None);
        assert_eq!(spans("MY NAME IS *", "my name is Alice Smith"), Some(vec![(3, 5)]));
    }

    #[test]
    fn single_matches_exactly_one() {
        assert_eq!(spans("SAY _", "say hi"), Some(vec![(1, 2)]));
        assert_eq!(spans("SAY _", "say hi there"), None);
    }

    #[test]
    fn multi_is_greedy_first() {
        // The first wildcard takes as much as it can.
        assert_eq!(
            spans("* AND *", "salt and pepper and vinegar"),
            Some(vec![(0, 3), (4, 5)])
        );
    }

    #[test]
    fn backtracks_across_literals() {
        assert_eq!(
            spans("* IS A * OF *", "x is a y of z is a w"),
            Some(vec![(0, 1), (3, 4), (5, 9)])
        );
    }

    #[test]
    fn pathological_input_terminates() {
        let text = "a ".repeat(200);
        assert_eq!(spans("* A * A * B", &text), None);
    }

    #[test]
    fn selects_most_specific_rule() {
        let store = PatternStore::new();
        let generic = store.insert(&RuleDef::new("WHAT IS *", "generic")).unwrap();
        let exact = store.insert(&RuleDef::new("WHAT IS AIML", "exact")).unwrap();

        let set = store.snapshot();
        let m = match_utterance(&Utterance::normalize("What is AIML?"), &set).unwrap();
        assert_eq!(m.rule_id, exact);
        assert!(m.captures.is_empty());

        let m = match_utterance(&Utterance::normalize("what is rust"), &set).unwrap();
        assert_eq!(m.rule_id, generic);
        assert_eq!(m.captures[0].text, "RUST");
    }

    #[test]
    fn equal_priority_goes_to_first_registered() {
        let store = PatternStore::new();
        let first = store.insert(&RuleDef::new("I _ CATS _", "a")).unwrap();
        let second = store.insert(&RuleDef::new("I _ _ TOO", "b")).unwrap();
        let set = store.snapshot();
        assert_eq!(
            set.get(first).unwrap().priority,
            set.get(second).unwrap().priority
        );
        let m = match_utterance(&Utterance::normalize("i like cats too"), &set).unwrap();
        assert_eq!(m.rule_id, first);
        assert_eq!(m.captures.len(), 2);
    }

    #[test]
    fn parallel_scan_agrees_with_sequential() {
        let store = PatternStore::new();
        let defs: Vec<RuleDef> = (0..64)
            .map(|i| RuleDef::new(format!("TOPIC{i} *"), "x"))
            .chain([RuleDef::new("TOPIC7 IS *", "y")])
            .collect();
        store.insert_batch(&defs);
        let set = store.snapshot();
        let utt = Utterance::normalize("topic7 is fun");

        let seq = Matcher::new().with_parallel_threshold(usize::MAX).find(&utt, &set);
        let par = Matcher::new().with_parallel_threshold(1).find(&utt, &set);
        assert_eq!(seq, par);
        assert_eq!(seq.unwrap().captures[0].text, "FUN");
    }

    #[test]
    fn empty_utterance_matches_nothing() {
        let store = PatternStore::new();
        store.insert(&RuleDef::new("HELLO", "hi")).unwrap();
        assert!(match_utterance(&Utterance::normalize("..."), &store.snapshot()).is_none());
    }
}
