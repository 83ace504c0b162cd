//! Template execution with bounded redirection.
//!
//! The [`Rewriter`] walks a matched rule's segments in order. Redirects
//! re-enter the matcher with a fresh utterance; recursion is bounded by a
//! depth budget and by the set of utterances already on the redirect path.
//!
//! Side effects are never applied during the walk. They are collected into
//! the returned [`Rewrite`] and reads go through a staged view that overlays
//! them on the session and knowledge base. The caller commits them only when
//! the whole top-level call succeeded.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{OverflowReason, RewriteError};
use crate::knowledge::{Fact, KnowledgeBase, KnowledgeQuery, Predicate, Relation, RelationEdge, term_key};
use crate::matcher::{Capture, Matcher};
use crate::pattern::store::RuleSet;
use crate::pattern::{FactRef, KbView, Part, RuleId, Segment};
use crate::session::{SessionContext, render_summary};
use crate::utterance::Utterance;

/// Default redirect depth budget.
pub const DEFAULT_MAX_REDIRECT_DEPTH: usize = 10;

/// Rendered for a session fact that was never learned.
const UNKNOWN: &str = "unknown";

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// A deferred mutation produced by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Effect {
    Learn { name: String, value: String },
    Prefer { value: String },
    StoreFact(Fact),
    StoreRelation(RelationEdge),
}

/// What a commit actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub learned: usize,
    pub preferences: usize,
    pub facts_stored: usize,
    pub relations_stored: usize,
}

/// The outcome of one successful top-level rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rewrite {
    pub text: String,
    /// Effects in template order across the whole redirect chain.
    pub effects: Vec<Effect>,
    /// The rule that matched the top-level utterance.
    pub rule_id: RuleId,
    /// Deepest redirect level reached (0 = no redirect).
    pub depth_reached: usize,
    /// Knowledge subjects a template asked about that had nothing stored.
    pub knowledge_misses: Vec<String>,
}

impl Rewrite {
    /// Apply the collected effects.
    pub fn commit(&self, session: &mut SessionContext, kb: &KnowledgeBase) -> CommitReport {
        let mut report = CommitReport::default();
        for effect in &self.effects {
            match effect {
                Effect::Learn { name, value } => {
                    session.set_fact(name, value.clone());
                    report.learned += 1;
                }
                Effect::Prefer { value } => {
                    if session.add_preference(value.clone()) {
                        report.preferences += 1;
                    }
                }
                Effect::StoreFact(fact) => {
                    if kb.store_fact(fact.clone()) {
                        report.facts_stored += 1;
                    }
                }
                Effect::StoreRelation(edge) => {
                    if kb.store_relation(edge.clone()) {
                        report.relations_stored += 1;
                    }
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Rewriter
// ---------------------------------------------------------------------------

/// Executes templates against a rule set.
#[derive(Debug, Clone)]
pub struct Rewriter {
    matcher: Matcher,
    max_depth: usize,
    timeout: Option<Duration>,
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDIRECT_DEPTH)
    }
}

impl Rewriter {
    pub fn new(max_depth: usize) -> Self {
        Self {
            matcher: Matcher::default(),
            max_depth,
            timeout: None,
        }
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Wall-clock budget for one top-level call.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Rewrite an utterance. Reads `session` and `kb` but never mutates them.
    pub fn respond(
        &self,
        utterance: &Utterance,
        rules: &RuleSet,
        session: &SessionContext,
        kb: &KnowledgeBase,
    ) -> Result<Rewrite, RewriteError> {
        let mut walk = Walk {
            rewriter: self,
            rules,
            session,
            kb,
            started: Instant::now(),
            path: Vec::new(),
            effects: Vec::new(),
            misses: Vec::new(),
            depth_reached: 0,
        };
        let (rule_id, raw) = walk.expand(utterance, 0)?;

        Ok(Rewrite {
            text: tidy(&raw),
            effects: walk.effects,
            rule_id,
            depth_reached: walk.depth_reached,
            knowledge_misses: walk.misses,
        })
    }
}

/// Per-call traversal state threaded through the recursion.
struct Walk<'a> {
    rewriter: &'a Rewriter,
    rules: &'a RuleSet,
    session: &'a SessionContext,
    kb: &'a KnowledgeBase,
    started: Instant,
    /// Normalized utterances on the current redirect path.
    path: Vec<String>,
    effects: Vec<Effect>,
    misses: Vec<String>,
    depth_reached: usize,
}

impl Walk<'_> {
    fn expand(&mut self, utterance: &Utterance, depth: usize) -> Result<(RuleId, String), RewriteError> {
        if let Some(limit) = self.rewriter.timeout {
            let elapsed = self.started.elapsed();
            if elapsed >= limit {
                return Err(RewriteError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
        }

        let key = utterance.text();
        if self.path.contains(&key) {
            return Err(RewriteError::RedirectionOverflow {
                depth,
                utterance: key,
                reason: OverflowReason::Cycle,
            });
        }

        let rules = self.rules;
        let matched = self
            .rewriter
            .matcher
            .find(utterance, rules)
            .ok_or_else(|| RewriteError::NoMatch {
                utterance: key.clone(),
            })?;
        let rule = rules
            .get(matched.rule_id)
            .ok_or_else(|| RewriteError::NoMatch {
                utterance: key.clone(),
            })?;

        self.path.push(key);
        self.depth_reached = self.depth_reached.max(depth);
        let scope = Scope {
            utterance,
            captures: &matched.captures,
        };

        let mut out = String::new();
        for segment in rule.template.segments() {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Capture(index) => out.push_str(&scope.capture(*index)),
                Segment::Fact(fact_ref) => {
                    let rendered = self.read(fact_ref, &scope);
                    out.push_str(&rendered);
                }
                Segment::Redirect(body) => {
                    let target = Utterance::normalize(&scope.render(body));
                    if depth + 1 > self.rewriter.max_depth {
                        return Err(RewriteError::RedirectionOverflow {
                            depth: depth + 1,
                            utterance: target.text(),
                            reason: OverflowReason::Depth,
                        });
                    }
                    tracing::debug!(depth = depth + 1, target = %target, "redirect");
                    let (_, text) = self.expand(&target, depth + 1)?;
                    out.push_str(&text);
                }
                Segment::Learn { name, value } => self.effects.push(Effect::Learn {
                    name: name.clone(),
                    value: scope.render(value),
                }),
                Segment::Prefer { value } => self.effects.push(Effect::Prefer {
                    value: scope.render(value),
                }),
                Segment::StoreFact {
                    subject,
                    predicate,
                    object,
                } => match Fact::new(scope.render(subject), *predicate, scope.render(object)) {
                    Ok(fact) => self.effects.push(Effect::StoreFact(fact)),
                    Err(e) => tracing::warn!(rule = %rule.id, error = %e, "skipping fact"),
                },
                Segment::StoreRelation {
                    subject,
                    relation,
                    object,
                } => match RelationEdge::new(scope.render(subject), *relation, scope.render(object)) {
                    Ok(edge) => self.effects.push(Effect::StoreRelation(edge)),
                    Err(e) => tracing::warn!(rule = %rule.id, error = %e, "skipping relation"),
                },
            }
        }

        self.path.pop();
        Ok((rule.id, out))
    }

    // -- staged reads -------------------------------------------------------

    fn read(&mut self, fact_ref: &FactRef, scope: &Scope<'_>) -> String {
        match fact_ref {
            FactRef::Session { name } => self
                .staged_session_fact(name)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            FactRef::SessionSummary => {
                let (facts, prefs) = self.staged_session();
                render_summary(&facts, &prefs)
            }
            FactRef::Knowledge {
                subject,
                view,
                otherwise,
            } => {
                let subject = scope.render(subject);
                let otherwise = otherwise.as_ref().map(|parts| scope.render(parts));
                self.read_knowledge(subject.trim(), *view, otherwise)
            }
        }
    }

    fn staged_session_fact(&self, name: &str) -> Option<String> {
        let name = name.to_lowercase();
        self.effects
            .iter()
            .rev()
            .find_map(|e| match e {
                Effect::Learn { name: n, value } if n.to_lowercase() == name => Some(value.clone()),
                _ => None,
            })
            .or_else(|| self.session.fact(&name).map(str::to_string))
    }

    fn staged_session(&self) -> (BTreeMap<String, String>, BTreeSet<String>) {
        let mut facts = self.session.facts().clone();
        let mut prefs = self.session.preferences().clone();
        for effect in &self.effects {
            match effect {
                Effect::Learn { name, value } => {
                    facts.insert(name.to_lowercase(), value.clone());
                }
                Effect::Prefer { value } => {
                    prefs.insert(value.clone());
                }
                Effect::StoreFact(_) | Effect::StoreRelation(_) => {}
            }
        }
        (facts, prefs)
    }

    fn staged_facts(&self, key: &str) -> Vec<Fact> {
        let mut staged: Vec<Fact> = Vec::new();
        for fact in self.pending_facts() {
            if term_key(&fact.subject) == key {
                staged.push(fact.clone());
            }
        }
        staged
    }

    /// Staged facts not yet in the knowledge base, without duplicates.
    fn pending_facts(&self) -> Vec<&Fact> {
        let mut pending: Vec<&Fact> = Vec::new();
        for effect in &self.effects {
            let Effect::StoreFact(fact) = effect else {
                continue;
            };
            if !self.kb.has_fact(fact) && !pending.iter().any(|f| same_fact(f, fact)) {
                pending.push(fact);
            }
        }
        pending
    }

    fn staged_relations(&self, key: &str) -> Vec<RelationEdge> {
        let mut staged: Vec<RelationEdge> = Vec::new();
        for effect in &self.effects {
            let Effect::StoreRelation(edge) = effect else {
                continue;
            };
            let touches = term_key(&edge.subject) == key || term_key(&edge.object) == key;
            if touches && !self.kb.has_relation(edge) && !staged.iter().any(|e| same_edge(e, edge)) {
                staged.push(edge.clone());
            }
        }
        staged
    }

    fn read_knowledge(&mut self, subject: &str, view: KbView, otherwise: Option<String>) -> String {
        if view == KbView::Count {
            return (self.kb.fact_count() + self.pending_facts().len()).to_string();
        }

        let key = term_key(subject);
        let mut query = self.kb.query(subject);
        query.facts.extend(self.staged_facts(&key));
        query.relations.extend(self.staged_relations(&key));

        let rendered = match view {
            KbView::Is | KbView::Has | KbView::Can => {
                let predicate = match view {
                    KbView::Is => Predicate::Is,
                    KbView::Has => Predicate::Has,
                    _ => Predicate::Can,
                };
                let objects = query.objects(predicate);
                (!objects.is_empty()).then(|| objects.join(", "))
            }
            KbView::Definition => query
                .facts
                .iter()
                .find(|f| f.predicate == Predicate::Is)
                .map(|first| {
                    format!("{} is {}.", first.subject, query.objects(Predicate::Is).join(" and "))
                }),
            KbView::Summary => (!query.is_empty()).then(|| render_grouped(&query, &key)),
            KbView::Infer => {
                let direct: Vec<String> = query
                    .relations
                    .iter()
                    .filter(|r| {
                        r.relation == Relation::IsA && term_key(&r.subject) == key
                    })
                    .map(ToString::to_string)
                    .collect();
                let derived: Vec<String> =
                    self.kb.infer(subject).iter().map(ToString::to_string).collect();
                match (direct.is_empty(), derived.is_empty()) {
                    (true, true) => None,
                    (_, true) => Some(format!("{}. Nothing further can be inferred.", direct.join(". "))),
                    (true, false) => Some(format!("Inferred: {}.", derived.join("; "))),
                    (false, false) => Some(format!(
                        "{}. Inferred: {}.",
                        direct.join(". "),
                        derived.join("; ")
                    )),
                }
            }
            KbView::Count => None,
        };

        rendered.unwrap_or_else(|| {
            if !self.misses.iter().any(|m| term_key(m) == key) {
                self.misses.push(subject.to_string());
            }
            if let Some(text) = otherwise {
                return text;
            }
            match view {
                KbView::Summary | KbView::Infer => format!("nothing about {subject}"),
                _ => UNKNOWN.to_string(),
            }
        })
    }
}

/// Facts by predicate, then outgoing relations by kind, with `[none]` for
/// empty groups. Edges pointing at the subject close the line.
fn render_grouped(query: &KnowledgeQuery, key: &str) -> String {
    fn group(objects: Vec<&str>) -> String {
        if objects.is_empty() {
            "[none]".to_string()
        } else {
            objects.join(", ")
        }
    }

    let outgoing = |relation: Relation| {
        group(
            query
                .relations
                .iter()
                .filter(|r| r.relation == relation && term_key(&r.subject) == key)
                .map(|r| r.object.as_str())
                .collect(),
        )
    };
    let mut out = format!(
        "Facts: Is: {}; Has: {}; Can: {}. Relationships: Is-a: {}; Part-of: {}; Used-for: {}.",
        group(query.objects(Predicate::Is)),
        group(query.objects(Predicate::Has)),
        group(query.objects(Predicate::Can)),
        outgoing(Relation::IsA),
        outgoing(Relation::PartOf),
        outgoing(Relation::UsedFor),
    );
    let incoming: Vec<String> = query
        .relations
        .iter()
        .filter(|r| term_key(&r.subject) != key)
        .map(ToString::to_string)
        .collect();
    if !incoming.is_empty() {
        out.push_str(&format!(" Referenced by: {}.", incoming.join("; ")));
    }
    out
}

fn same_fact(a: &Fact, b: &Fact) -> bool {
    a.predicate == b.predicate
        && term_key(&a.subject) == term_key(&b.subject)
        && term_key(&a.object) == term_key(&b.object)
}

fn same_edge(a: &RelationEdge, b: &RelationEdge) -> bool {
    a.relation == b.relation
        && term_key(&a.subject) == term_key(&b.subject)
        && term_key(&a.object) == term_key(&b.object)
}

/// Capture bindings for one level of the redirect chain.
struct Scope<'a> {
    utterance: &'a Utterance,
    captures: &'a [Capture],
}

impl Scope<'_> {
    /// Raw-cased text of a capture.
    fn capture(&self, index: usize) -> String {
        self.captures
            .get(index)
            .map(|c| self.utterance.raw_span(c.start, c.end))
            .unwrap_or_default()
    }

    fn render(&self, parts: &[Part]) -> String {
        parts
            .iter()
            .map(|p| match p {
                Part::Text(t) => t.clone(),
                Part::Capture(i) => self.capture(*i),
            })
            .collect()
    }
}

/// Collapse runs of spaces on each line and trim the result.
fn tidy(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::RuleDef;
    use crate::pattern::store::PatternStore;
    use crate::session::SessionId;

    fn setup(rules: &[(&str, &str)]) -> (PatternStore, SessionContext, KnowledgeBase) {
        let store = PatternStore::new();
        let defs: Vec<RuleDef> = rules.iter().map(|(p, t)| RuleDef::new(*p, *t)).collect();
        for r in store.insert_batch(&defs) {
            r.unwrap();
        }
        (
            store,
            SessionContext::new(SessionId::new(1).unwrap(), 10),
            KnowledgeBase::new(),
        )
    }

    fn run(
        rw: &Rewriter,
        store: &PatternStore,
        session: &SessionContext,
        kb: &KnowledgeBase,
        text: &str,
    ) -> Result<Rewrite, RewriteError> {
        rw.respond(&Utterance::normalize(text), &store.snapshot(), session, kb)
    }

    #[test]
    fn captures_echo_raw_case() {
        let (store, session, kb) = setup(&[("MY NAME IS *", "Nice to meet you, {0}!")]);
        let out = run(&Rewriter::default(), &store, &session, &kb, "my name is Alice Smith").unwrap();
        assert_eq!(out.text, "Nice to meet you, Alice Smith!");
        assert_eq!(out.depth_reached, 0);
    }

    #[test]
    fn learn_is_staged_and_readable() {
        let (store, session, kb) = setup(&[(
            "MY NAME IS *",
            r#"<learn name="name" value="{0}"/>Hello, <get name="name"/>."#,
        )]);
        let out = run(&Rewriter::default(), &store, &session, &kb, "my name is Alice").unwrap();
        assert_eq!(out.text, "Hello, Alice.");
        assert_eq!(
            out.effects,
            vec![Effect::Learn {
                name: "name".into(),
                value: "Alice".into()
            }]
        );
        // Nothing applied yet.
        assert_eq!(session.fact("name"), None);
    }

    #[test]
    fn redirect_composes_rules() {
        let (store, session, kb) = setup(&[
            ("HELLO", "Hi there!"),
            ("HI *", "<srai>HELLO</srai> You said {0}."),
        ]);
        let out = run(&Rewriter::default(), &store, &session, &kb, "hi friend").unwrap();
        assert_eq!(out.text, "Hi there! You said friend.");
        assert_eq!(out.depth_reached, 1);
    }

    #[test]
    fn same_target_twice_is_not_a_cycle() {
        let (store, session, kb) = setup(&[
            ("PING", "pong"),
            ("TWICE", "<srai>PING</srai> <srai>PING</srai>"),
        ]);
        let out = run(&Rewriter::default(), &store, &session, &kb, "twice").unwrap();
        assert_eq!(out.text, "pong pong");
    }

    #[test]
    fn self_redirect_overflows_as_cycle() {
        let (store, session, kb) = setup(&[("LOOP", "<srai>LOOP</srai>")]);
        let err = run(&Rewriter::default(), &store, &session, &kb, "loop").unwrap_err();
        assert!(matches!(
            err,
            RewriteError::RedirectionOverflow {
                reason: OverflowReason::Cycle,
                ..
            }
        ));
    }

    #[test]
    fn two_rule_loop_is_a_cycle_before_the_depth_budget() {
        let (store, session, kb) = setup(&[
            ("PING", r#"<learn name="volley" value="ping"/><srai>PONG</srai>"#),
            ("PONG", r#"<fact subject="ball" predicate="is" object="round"/><srai>PING</srai>"#),
        ]);
        let err = run(&Rewriter::new(10), &store, &session, &kb, "ping").unwrap_err();
        assert!(matches!(
            err,
            RewriteError::RedirectionOverflow {
                depth: 2,
                reason: OverflowReason::Cycle,
                ..
            }
        ));
        assert_eq!(session.fact("volley"), None);
        assert_eq!(kb.fact_count(), 0);
    }

    #[test]
    fn long_chain_overflows_on_depth() {
        let mut rules: Vec<(String, String)> = (0..15)
            .map(|i| (format!("STEP{i}"), format!("<srai>STEP{}</srai>", i + 1)))
            .collect();
        rules.push(("STEP15".into(), "done".into()));
        let refs: Vec<(&str, &str)> = rules.iter().map(|(p, t)| (p.as_str(), t.as_str())).collect();
        let (store, session, kb) = setup(&refs);

        let err = run(&Rewriter::new(10), &store, &session, &kb, "step0").unwrap_err();
        assert!(matches!(
            err,
            RewriteError::RedirectionOverflow {
                depth: 11,
                reason: OverflowReason::Depth,
                ..
            }
        ));

        let ok = run(&Rewriter::new(10), &store, &session, &kb, "step5").unwrap();
        assert_eq!(ok.text, "done");
        assert_eq!(ok.depth_reached, 10);
    }

    #[test]
    fn failed_chain_discards_effects() {
        let (store, session, kb) = setup(&[
            ("BOOM", "<srai>BOOM</srai>"),
            ("LEARN AND BOOM", r#"<learn name="x" value="1"/><srai>BOOM</srai>"#),
        ]);
        let result = run(&Rewriter::default(), &store, &session, &kb, "learn and boom");
        assert!(result.is_err());
        assert_eq!(session.fact("x"), None);
    }

    #[test]
    fn redirect_to_nothing_is_no_match() {
        let (store, session, kb) = setup(&[("ASK *", "<srai>{0}</srai>")]);
        let err = run(&Rewriter::default(), &store, &session, &kb, "ask something odd").unwrap_err();
        assert!(matches!(err, RewriteError::NoMatch { utterance } if utterance == "SOMETHING ODD"));
    }

    #[test]
    fn staged_facts_are_visible_to_kb_reads() {
        let (store, session, kb) = setup(&[(
            "STORE FACT * IS *",
            r#"<fact subject="{0}" predicate="is" object="{1}"/>Stored. {0} is <kb subject="{0}" view="is"/>. Total: <kb view="count"/>."#,
        )]);
        let out = run(&Rewriter::default(), &store, &session, &kb, "store fact Python is a language").unwrap();
        assert_eq!(out.text, "Stored. Python is a language. Total: 1.");
        assert_eq!(kb.fact_count(), 0);

        let mut session = session;
        let report = out.commit(&mut session, &kb);
        assert_eq!(report.facts_stored, 1);
        assert_eq!(kb.fact_count(), 1);
    }

    #[test]
    fn knowledge_misses_are_reported() {
        let (store, session, kb) = setup(&[(
            "WHAT DO YOU KNOW ABOUT *",
            r#"<kb subject="{0}" view="summary"/>"#,
        )]);
        let out = run(&Rewriter::default(), &store, &session, &kb, "what do you know about rust").unwrap();
        assert_eq!(out.text, "nothing about rust");
        assert_eq!(out.knowledge_misses, vec!["rust".to_string()]);
    }

    #[test]
    fn definition_view_falls_back_to_else_text() {
        let (store, session, kb) = setup(&[(
            "WHAT IS *",
            r#"<kb subject="{0}" view="definition" else="No definition for {0}."/>"#,
        )]);
        let out = run(&Rewriter::default(), &store, &session, &kb, "what is AIML").unwrap();
        assert_eq!(out.text, "No definition for AIML.");
        assert_eq!(out.knowledge_misses, vec!["AIML".to_string()]);

        kb.store_fact(Fact::new("AIML", Predicate::Has, "XML syntax").unwrap());
        let out = run(&Rewriter::default(), &store, &session, &kb, "what is AIML").unwrap();
        assert_eq!(out.text, "No definition for AIML.");

        kb.store_fact(Fact::new("AIML", Predicate::Is, "markup language").unwrap());
        kb.store_fact(Fact::new("aiml", Predicate::Is, "an XML dialect").unwrap());
        let out = run(&Rewriter::default(), &store, &session, &kb, "what is aiml").unwrap();
        assert_eq!(out.text, "AIML is markup language and an XML dialect.");
        assert!(out.knowledge_misses.is_empty());
    }

    #[test]
    fn summary_view_groups_facts_and_relations() {
        let (store, session, kb) = setup(&[(
            "WHAT DO YOU KNOW ABOUT *",
            r#"<kb subject="{0}" view="summary"/>"#,
        )]);
        kb.store_fact(Fact::new("AIML", Predicate::Is, "markup language").unwrap());
        kb.store_fact(Fact::new("AIML", Predicate::Has, "XML syntax").unwrap());
        kb.store_fact(Fact::new("AIML", Predicate::Can, "create chatbots").unwrap());
        kb.store_relation(RelationEdge::new("AIML", Relation::IsA, "markup_language").unwrap());
        kb.store_relation(RelationEdge::new("pandorabots", Relation::UsedFor, "AIML").unwrap());

        let out = run(&Rewriter::default(), &store, &session, &kb, "what do you know about aiml").unwrap();
        assert_eq!(
            out.text,
            "Facts: Is: markup language; Has: XML syntax; Can: create chatbots. \
             Relationships: Is-a: markup_language; Part-of: [none]; Used-for: [none]. \
             Referenced by: pandorabots USED_FOR AIML."
        );
    }

    #[test]
    fn infer_view_lists_direct_and_derived() {
        let (store, session, kb) = setup(&[("INFER *", r#"<kb subject="{0}" view="infer"/>"#)]);
        kb.store_relation(RelationEdge::new("AIML", Relation::IsA, "markup_language").unwrap());
        kb.store_relation(
            RelationEdge::new("markup_language", Relation::IsA, "formal_language").unwrap(),
        );
        let out = run(&Rewriter::default(), &store, &session, &kb, "infer aiml").unwrap();
        assert!(out.text.contains("AIML IS_A markup_language"));
        assert!(out.text.contains("AIML IS_A formal_language (via markup_language)"));
    }

    #[test]
    fn exhausted_time_budget_times_out() {
        let (store, session, kb) = setup(&[("HELLO", r#"<learn name="x" value="1"/>hi"#)]);
        let rw = Rewriter::default().with_timeout(Some(Duration::ZERO));
        let err = run(&rw, &store, &session, &kb, "hello").unwrap_err();
        assert!(matches!(err, RewriteError::Timeout { .. }));

        let rw = Rewriter::default().with_timeout(Some(Duration::from_secs(60)));
        assert_eq!(run(&rw, &store, &session, &kb, "hello").unwrap().text, "hi");
    }
}
