//! Engine facade: owns all subsystems and exposes the load, conversation
//! and administrative interfaces.

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{PandaResult, RewriteError, RuleError, SessionError, WorkflowResult};
use crate::knowledge::{DerivedEdge, Fact, KnowledgeBase, KnowledgeQuery, RelationEdge};
use crate::matcher::Matcher;
use crate::pack::{DefinitionPack, PackReport};
use crate::pattern::store::PatternStore;
use crate::pattern::{Rule, RuleDef, RuleId};
use crate::rewrite::{CommitReport, Rewriter};
use crate::session::{SessionContext, SessionId, SessionManager};
use crate::utterance::Utterance;
use crate::workflow::{
    CandidateId, CandidatePattern, GapTracker, KnowledgeGap, PatternWorkflow, ValidationReport,
    WorkflowStats,
};

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// A rule answered and its effects were committed.
    Answered,
    /// No rule matched; the fallback response was used.
    NoMatch,
    /// A redirect chain looped or ran too deep; nothing was committed.
    Overflow,
    /// The time budget ran out; nothing was committed.
    TimedOut,
}

/// A response with everything the engine knows about how it was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub text: String,
    pub outcome: Outcome,
    /// The rule that matched the top-level utterance, when one did.
    pub rule_id: Option<RuleId>,
    pub committed: CommitReport,
    pub depth_reached: usize,
}

impl Response {
    fn fallback(text: &str, outcome: Outcome) -> Self {
        Self {
            text: text.to_string(),
            outcome,
            rule_id: None,
            committed: CommitReport::default(),
            depth_reached: 0,
        }
    }
}

/// The pandamania dialogue engine.
///
/// Owns the pattern store, knowledge base, sessions, the generation
/// workflow and the gap tracker. All methods take `&self`; the engine can
/// be shared across threads behind an `Arc`.
pub struct Engine {
    config: EngineConfig,
    store: Arc<PatternStore>,
    knowledge: Arc<KnowledgeBase>,
    sessions: SessionManager,
    workflow: PatternWorkflow,
    gaps: GapTracker,
    rewriter: Rewriter,
}

impl Engine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> PandaResult<Self> {
        config.validate()?;

        tracing::info!(
            max_redirect_depth = config.max_redirect_depth,
            timeout_ms = ?config.respond_timeout_ms,
            parallel_threshold = config.parallel_match_threshold,
            "initializing pandamania engine"
        );

        let rewriter = Rewriter::new(config.max_redirect_depth)
            .with_matcher(Matcher::new().with_parallel_threshold(config.parallel_match_threshold))
            .with_timeout(config.respond_timeout());

        let engine = Self {
            store: Arc::new(PatternStore::new()),
            knowledge: Arc::new(
                KnowledgeBase::new().with_max_inference_depth(config.max_inference_depth),
            ),
            sessions: SessionManager::new(config.max_history),
            workflow: PatternWorkflow::new(config.workflow.clone()),
            gaps: GapTracker::new(),
            rewriter,
            config,
        };

        if engine.config.load_core_pack {
            let core = DefinitionPack::core()?;
            engine.load_pack(&core);
        }
        Ok(engine)
    }

    /// An engine with default configuration and no rules.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default()).expect("default config is valid")
    }

    // ── Load interface ──────────────────────────────────────────────────

    /// Load `(pattern, template)` pairs. Results are positional; invalid
    /// rules are reported and the rest still load.
    pub fn load_rules(&self, rules: &[(&str, &str)]) -> Vec<Result<RuleId, RuleError>> {
        let defs: Vec<RuleDef> = rules
            .iter()
            .map(|(pattern, template)| RuleDef::new(*pattern, *template).with_source("api"))
            .collect();
        self.load_rule_defs(&defs)
    }

    pub fn load_rule_defs(&self, defs: &[RuleDef]) -> Vec<Result<RuleId, RuleError>> {
        let results = self.store.insert_batch(defs);
        for (def, result) in defs.iter().zip(&results) {
            if let Err(e) = result {
                tracing::warn!(pattern = %def.pattern, error = %e, "rule rejected");
            }
        }
        results
    }

    /// Store facts, returning how many were new.
    pub fn load_facts(&self, facts: Vec<Fact>) -> usize {
        facts
            .into_iter()
            .filter(|fact| self.knowledge.store_fact(fact.clone()))
            .count()
    }

    /// Store relations, returning how many were new.
    pub fn load_relations(&self, relations: Vec<RelationEdge>) -> usize {
        relations
            .into_iter()
            .filter(|edge| self.knowledge.store_relation(edge.clone()))
            .count()
    }

    /// Load a definition pack's rules, facts and relations.
    pub fn load_pack(&self, pack: &DefinitionPack) -> PackReport {
        let results = self.load_rule_defs(&pack.rules);
        let mut report = PackReport {
            name: pack.name.clone(),
            ..Default::default()
        };
        for (def, result) in pack.rules.iter().zip(results) {
            match result {
                Ok(_) => report.rules_loaded += 1,
                Err(e) => report.rule_errors.push((def.pattern.clone(), e)),
            }
        }

        report.facts_stored = self.load_facts(pack.facts.clone());
        report.facts_skipped = pack.facts.len() - report.facts_stored;
        report.relations_stored = self.load_relations(pack.relations.clone());
        report.relations_skipped = pack.relations.len() - report.relations_stored;

        tracing::info!(
            pack = %pack.name,
            version = %pack.version,
            rules = report.rules_loaded,
            rejected = report.rule_errors.len(),
            facts = report.facts_stored,
            relations = report.relations_stored,
            "loaded definition pack"
        );
        report
    }

    // ── Conversation interface ──────────────────────────────────────────

    pub fn open_session(&self) -> SessionId {
        self.sessions.open()
    }

    /// Respond to an utterance and return only the text.
    pub fn respond(&self, session: SessionId, text: &str) -> Result<String, SessionError> {
        self.respond_detailed(session, text).map(|r| r.text)
    }

    /// Respond to an utterance.
    ///
    /// The session is locked for the whole call. Effects commit only when
    /// the rewrite succeeds; every failure answers with a configured
    /// response and leaves the session and knowledge base untouched.
    pub fn respond_detailed(&self, session: SessionId, text: &str) -> Result<Response, SessionError> {
        self.sessions
            .with_session(session, |ctx| self.respond_locked(session, ctx, text))
    }

    fn respond_locked(&self, session: SessionId, ctx: &mut SessionContext, text: &str) -> Response {
        let utterance = Utterance::normalize(text);
        let rules = self.store.snapshot();

        let response = match self.rewriter.respond(&utterance, &rules, ctx, &self.knowledge) {
            Ok(rewrite) => {
                let committed = rewrite.commit(ctx, &self.knowledge);
                for subject in &rewrite.knowledge_misses {
                    self.gaps.record_miss(subject);
                }
                tracing::debug!(
                    session = %session,
                    rule = %rewrite.rule_id,
                    depth = rewrite.depth_reached,
                    effects = rewrite.effects.len(),
                    "responded"
                );
                Response {
                    text: rewrite.text,
                    outcome: Outcome::Answered,
                    rule_id: Some(rewrite.rule_id),
                    committed,
                    depth_reached: rewrite.depth_reached,
                }
            }
            Err(RewriteError::NoMatch { utterance: failed }) => {
                // Only a miss on what the user actually said is a gap.
                if failed == utterance.text() {
                    self.gaps.record_unmatched(&utterance);
                }
                tracing::debug!(session = %session, utterance = %failed, "no rule matched");
                Response::fallback(&self.config.fallback_response, Outcome::NoMatch)
            }
            Err(e @ RewriteError::RedirectionOverflow { .. }) => {
                tracing::warn!(session = %session, input = %utterance, error = %e, "redirect overflow");
                Response::fallback(&self.config.overflow_response, Outcome::Overflow)
            }
            Err(e @ RewriteError::Timeout { .. }) => {
                tracing::warn!(session = %session, input = %utterance, error = %e, "response timed out");
                Response::fallback(&self.config.fallback_response, Outcome::TimedOut)
            }
        };

        ctx.record_turn(text, response.text.clone());
        response
    }

    pub fn close_session(&self, session: SessionId) -> Result<SessionContext, SessionError> {
        self.sessions.close(session)
    }

    pub fn session_snapshot(&self, session: SessionId) -> Result<SessionContext, SessionError> {
        self.sessions.snapshot(session)
    }

    // ── Administrative interface ────────────────────────────────────────

    pub fn generate_pattern(&self, concept: &str) -> WorkflowResult<CandidateId> {
        self.workflow.generate(concept, &self.store)
    }

    pub fn review(&self, id: CandidateId) -> WorkflowResult<CandidatePattern> {
        self.workflow.review(id)
    }

    /// All candidates in id order.
    pub fn candidates(&self) -> Vec<CandidatePattern> {
        self.workflow.list()
    }

    pub fn amend(&self, id: CandidateId, template: &str) -> WorkflowResult<ValidationReport> {
        self.workflow.amend(id, template, &self.store)
    }

    pub fn approve(&self, id: CandidateId) -> WorkflowResult<RuleId> {
        self.workflow.approve(id, &self.store)
    }

    pub fn reject(&self, id: CandidateId, reason: &str) -> WorkflowResult<()> {
        self.workflow.reject(id, reason)
    }

    pub fn stats(&self) -> WorkflowStats {
        self.workflow.stats()
    }

    /// The most-mentioned concepts nothing answers yet.
    pub fn knowledge_gaps(&self, limit: usize) -> Vec<KnowledgeGap> {
        self.gaps.suggest(
            limit,
            &self.store.snapshot(),
            &self.config.workflow.reflection_prefix,
        )
    }

    pub fn remove_rule(&self, id: RuleId) -> Result<Rule, RuleError> {
        self.store.remove(id)
    }

    // ── Knowledge interface ─────────────────────────────────────────────

    pub fn query(&self, subject: &str) -> KnowledgeQuery {
        self.knowledge.query(subject)
    }

    pub fn infer(&self, subject: &str) -> Vec<DerivedEdge> {
        self.knowledge.infer(subject)
    }

    /// Store every derived IS_A edge for `subject` as a direct relation.
    pub fn persist_inferences(&self, subject: &str) -> usize {
        self.knowledge.persist_inferences(subject)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Summary information about the engine state.
    pub fn info(&self) -> EngineInfo {
        let stats = self.workflow.stats();
        EngineInfo {
            rules: self.store.len(),
            facts: self.knowledge.fact_count(),
            relations: self.knowledge.relation_count(),
            sessions: self.sessions.len(),
            candidates: stats.generated,
            pending_review: stats.pending,
            tracked_gaps: self.gaps.len(),
            max_redirect_depth: self.config.max_redirect_depth,
            respond_timeout_ms: self.config.respond_timeout_ms,
        }
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    pub rules: usize,
    pub facts: usize,
    pub relations: usize,
    pub sessions: usize,
    pub candidates: usize,
    pub pending_review: usize,
    pub tracked_gaps: usize,
    pub max_redirect_depth: usize,
    pub respond_timeout_ms: Option<u64>,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "pandamania engine info")?;
        writeln!(f, "  rules:          {}", self.rules)?;
        writeln!(f, "  facts:          {}", self.facts)?;
        writeln!(f, "  relations:      {}", self.relations)?;
        writeln!(f, "  sessions:       {}", self.sessions)?;
        writeln!(f, "  candidates:     {} ({} pending review)", self.candidates, self.pending_review)?;
        writeln!(f, "  tracked gaps:   {}", self.tracked_gaps)?;
        writeln!(f, "  redirect depth: {}", self.max_redirect_depth)?;
        match self.respond_timeout_ms {
            Some(ms) => writeln!(f, "  timeout:        {ms} ms")?,
            None => writeln!(f, "  timeout:        none")?,
        }
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("rules", &self.store.len())
            .field("facts", &self.knowledge.fact_count())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
