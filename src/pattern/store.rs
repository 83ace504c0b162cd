//! The live rule set, published copy-on-write.
//!
//! Readers take a cheap [`Arc`] snapshot and never observe a partial insert.
//! Writers build a fresh [`RuleSet`] under the write lock and swap it in with
//! a single assignment.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{RuleError, RuleResult};
use crate::matcher;
use crate::utterance::Utterance;

use super::{Pattern, Rule, RuleDef, RuleId, RuleIdAllocator};

/// An immutable set of rules in registration order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
    by_pattern: HashMap<Pattern, RuleId>,
}

impl RuleSet {
    /// All rules in registration (id) order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.rules[i])
    }

    pub fn contains_pattern(&self, pattern: &Pattern) -> Option<RuleId> {
        self.by_pattern.get(pattern).copied()
    }

    fn push(&mut self, rule: Arc<Rule>) {
        self.by_pattern.insert(rule.pattern.clone(), rule.id);
        self.rules.push(rule);
    }

    fn without(&self, id: RuleId) -> Self {
        let mut next = Self::default();
        for rule in self.rules.iter().filter(|r| r.id != id) {
            next.push(Arc::clone(rule));
        }
        next
    }
}

/// Thread-safe pattern store.
pub struct PatternStore {
    live: RwLock<Arc<RuleSet>>,
    ids: RuleIdAllocator,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternStore {
    pub fn new() -> Self {
        Self {
            live: RwLock::new(Arc::new(RuleSet::default())),
            ids: RuleIdAllocator::new(),
        }
    }

    /// The current rule set.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.live.read().expect("pattern store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn get(&self, id: RuleId) -> Option<Arc<Rule>> {
        self.snapshot().get(id).cloned()
    }

    pub fn contains_pattern(&self, pattern: &Pattern) -> Option<RuleId> {
        self.snapshot().contains_pattern(pattern)
    }

    /// Validate and insert a single rule.
    pub fn insert(&self, def: &RuleDef) -> RuleResult<RuleId> {
        self.insert_batch(std::slice::from_ref(def))
            .pop()
            .expect("insert_batch yields one result per definition")
    }

    /// Validate and insert many rules with one publish.
    ///
    /// Results are positional. Literal redirects may target rules defined
    /// anywhere in the same batch.
    pub fn insert_batch(&self, defs: &[RuleDef]) -> Vec<RuleResult<RuleId>> {
        let mut live = self.live.write().expect("pattern store lock poisoned");

        let mut results: Vec<RuleResult<RuleId>> = Vec::with_capacity(defs.len());
        let mut staged: Vec<(usize, Arc<Rule>)> = Vec::new();
        let mut next = (**live).clone();

        for (pos, def) in defs.iter().enumerate() {
            let compiled = Rule::compile(self.ids.next_id(), def).and_then(|rule| {
                match next.contains_pattern(&rule.pattern) {
                    Some(existing) => Err(RuleError::DuplicatePattern {
                        pattern: rule.pattern.canonical(),
                        existing: existing.get(),
                    }),
                    None => Ok(Arc::new(rule)),
                }
            });
            match compiled {
                Ok(rule) => {
                    results.push(Ok(rule.id));
                    next.push(Arc::clone(&rule));
                    staged.push((pos, rule));
                }
                Err(e) => results.push(Err(e)),
            }
        }

        // Dropping a rule can strand redirects that pointed at it, so repeat
        // until every staged rule resolves.
        loop {
            let unresolved: Vec<(usize, RuleId, String)> = staged
                .iter()
                .filter_map(|(pos, rule)| {
                    rule.template
                        .literal_redirects()
                        .into_iter()
                        .find(|target| {
                            matcher::match_utterance(&Utterance::normalize(target), &next).is_none()
                        })
                        .map(|target| (*pos, rule.id, target))
                })
                .collect();
            if unresolved.is_empty() {
                break;
            }
            for (pos, id, target) in unresolved {
                tracing::warn!(rule = %id, %target, "rejecting rule with unresolvable redirect");
                results[pos] = Err(RuleError::UnresolvableRedirect { target });
                staged.retain(|(_, r)| r.id != id);
                next = next.without(id);
            }
        }

        if !staged.is_empty() {
            *live = Arc::new(next);
            tracing::debug!(inserted = staged.len(), total = live.len(), "published rule set");
        }
        results
    }

    /// Remove a rule by id.
    pub fn remove(&self, id: RuleId) -> RuleResult<Rule> {
        let mut live = self.live.write().expect("pattern store lock poisoned");
        let rule = live
            .get(id)
            .cloned()
            .ok_or(RuleError::NotFound { id: id.get() })?;
        *live = Arc::new(live.without(id));
        tracing::info!(rule = %id, pattern = %rule.pattern, "removed rule");
        Ok(Arc::unwrap_or_clone(rule))
    }
}
