//! Human-gated pattern generation.
//!
//! Candidates move through an explicit state machine:
//!
//! ```text
//! Drafted ──validate──▶ PendingReview ──approve──▶ Approved ──▶ Deployed
//!                             │
//!                             └──reject──▶ Rejected
//! ```
//!
//! Only an explicit [`PatternWorkflow::approve`] on a `PendingReview`
//! candidate can put a rule into the pattern store. Candidates are kept
//! after they finish as an audit trail.

pub mod gap;
pub mod generate;
pub mod validate;

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};
use crate::pattern::store::PatternStore;
use crate::pattern::{Pattern, RuleDef, RuleId};

pub use gap::{GapPriority, GapTracker, KnowledgeGap};
pub use generate::{Draft, TemplateKind};
pub use validate::{QualityScore, QualityWeights, ValidationCheck, ValidationReport};

use validate::ValidationContext;

/// Default security-sensitive vocabulary.
pub const DEFAULT_DISALLOWED_TOKENS: &[&str] = &[
    "PASSWORD",
    "CREDENTIAL",
    "SECRET",
    "TOKEN",
    "EXPLOIT",
    "SUDO",
    "SHELL",
    "DELETE",
    "ADMIN",
];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for candidate generation and review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Confidence assigned to every generated candidate.
    pub baseline_confidence: f32,
    /// Words that may not appear in a candidate's concept, pattern or template.
    pub disallowed_tokens: Vec<String>,
    /// Utterance prefix of the meta-cognitive reflection redirect.
    pub reflection_prefix: String,
    pub weights: QualityWeights,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            baseline_confidence: 0.5,
            disallowed_tokens: DEFAULT_DISALLOWED_TOKENS.iter().map(|s| s.to_string()).collect(),
            reflection_prefix: "METACOGNITIVE PROCESS".into(),
            weights: QualityWeights::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate types
// ---------------------------------------------------------------------------

/// Candidate identifier, displayed as `PG001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(u32);

impl CandidateId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Parse `PG001`, `pg1` or a bare number.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let digits = match text.get(..2) {
            Some(prefix) if prefix.eq_ignore_ascii_case("pg") => &text[2..],
            _ => text,
        };
        digits.parse().ok().map(Self)
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PG{:03}", self.0)
    }
}

/// Lifecycle state of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateState {
    Drafted,
    PendingReview,
    Approved,
    Deployed,
    Rejected,
}

impl CandidateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deployed | Self::Rejected)
    }
}

impl std::fmt::Display for CandidateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drafted => write!(f, "Drafted"),
            Self::PendingReview => write!(f, "PendingReview"),
            Self::Approved => write!(f, "Approved"),
            Self::Deployed => write!(f, "Deployed"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// One entry in a candidate's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: Option<CandidateState>,
    pub to: CandidateState,
    /// Unix timestamp (seconds).
    pub at: u64,
    pub note: Option<String>,
}

/// A generated rule awaiting (or past) human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePattern {
    pub id: CandidateId,
    pub target_concept: String,
    pub template_kind: TemplateKind,
    pub generated_pattern: String,
    pub generated_template: String,
    pub confidence: f32,
    pub quality: QualityScore,
    pub validation: ValidationReport,
    pub state: CandidateState,
    pub history: Vec<StateChange>,
    pub deployed_rule: Option<RuleId>,
    pub rejection_reason: Option<String>,
    /// Concept with marker words removed, used for scoring.
    core: String,
}

impl CandidatePattern {
    fn transition(&mut self, to: CandidateState, note: Option<String>) {
        self.history.push(StateChange {
            from: Some(self.state),
            to,
            at: now_secs(),
            note,
        });
        self.state = to;
    }

    fn invalid(&self, to: CandidateState) -> WorkflowError {
        WorkflowError::InvalidTransition {
            id: self.id.to_string(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    fn require(&self, state: CandidateState, to: CandidateState) -> WorkflowResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }
}

impl std::fmt::Display for CandidatePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pattern review: {}", self.id)?;
        writeln!(f, "Status: {}", self.state)?;
        writeln!(f, "Concept: {}", self.target_concept)?;
        writeln!(f, "Template: {} TEMPLATE", self.template_kind)?;
        writeln!(f, "Pattern: {}", self.generated_pattern)?;
        writeln!(f, "Response: {}", self.generated_template)?;
        writeln!(f, "Confidence: {:.2}", self.confidence)?;
        writeln!(f, "Validation:")?;
        write!(f, "{}", self.validation)?;
        writeln!(f, "Quality:")?;
        write!(f, "{}", self.quality)?;
        if let Some(rule) = self.deployed_rule {
            write!(f, "\nDeployed as {rule}")?;
        }
        if let Some(reason) = &self.rejection_reason {
            write!(f, "\nRejected: {reason}")?;
        }
        Ok(())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate view over all candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowStats {
    pub generated: usize,
    pub drafted: usize,
    pub pending: usize,
    /// Approved or deployed.
    pub approved: usize,
    pub rejected: usize,
    /// `approved / (approved + rejected)`, or 0 when nothing was decided.
    pub approval_rate: f32,
    pub average_quality: f32,
    pub by_kind: BTreeMap<TemplateKind, usize>,
}

impl std::fmt::Display for WorkflowStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Patterns generated: {}", self.generated)?;
        writeln!(f, "Drafted (failed validation): {}", self.drafted)?;
        writeln!(f, "Pending review: {}", self.pending)?;
        writeln!(f, "Approved: {}", self.approved)?;
        writeln!(f, "Rejected: {}", self.rejected)?;
        writeln!(f, "Approval rate: {:.1}%", self.approval_rate * 100.0)?;
        write!(f, "Average quality: {:.2}", self.average_quality)?;
        for kind in TemplateKind::ALL {
            let n = self.by_kind.get(&kind).copied().unwrap_or(0);
            write!(f, "\n  {kind:<13} {n}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Registry of candidates and the operations that move them.
pub struct PatternWorkflow {
    candidates: RwLock<BTreeMap<CandidateId, CandidatePattern>>,
    next_id: AtomicU32,
    config: WorkflowConfig,
}

impl PatternWorkflow {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            candidates: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Draft, validate and score a candidate for a concept.
    ///
    /// The candidate lands in `PendingReview` when every check passes and
    /// stays `Drafted` otherwise. Either way it is recorded.
    pub fn generate(&self, concept: &str, store: &PatternStore) -> WorkflowResult<CandidateId> {
        let concept = concept.trim();
        let draft = generate::draft(concept, &self.config.reflection_prefix)
            .ok_or(WorkflowError::EmptyConcept)?;

        let mut candidates = self.candidates.write().expect("workflow lock poisoned");
        let id = CandidateId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let live = live_patterns(&candidates, None);
        let rules = store.snapshot();
        let validation = validate::validate(
            concept,
            &draft.pattern,
            &draft.template,
            &ValidationContext {
                rules: &rules,
                live_candidates: &live,
                config: &self.config,
            },
        );
        let quality = QualityScore::assess(&validation, &draft.core, &draft.template, &self.config.weights);

        let mut candidate = CandidatePattern {
            id,
            target_concept: concept.to_string(),
            template_kind: draft.kind,
            generated_pattern: draft.pattern,
            generated_template: draft.template,
            confidence: self.config.baseline_confidence,
            quality,
            validation,
            state: CandidateState::Drafted,
            history: vec![StateChange {
                from: None,
                to: CandidateState::Drafted,
                at: now_secs(),
                note: None,
            }],
            deployed_rule: None,
            rejection_reason: None,
            core: draft.core,
        };

        if candidate.validation.passed() {
            candidate.transition(CandidateState::PendingReview, None);
            tracing::info!(
                candidate = %id,
                pattern = %candidate.generated_pattern,
                quality = candidate.quality.composite,
                "candidate pending review"
            );
        } else {
            let failures = candidate.validation.failures();
            tracing::warn!(candidate = %id, ?failures, "candidate failed validation");
        }

        candidates.insert(id, candidate);
        Ok(id)
    }

    /// A copy of a candidate.
    pub fn review(&self, id: CandidateId) -> WorkflowResult<CandidatePattern> {
        self.candidates
            .read()
            .expect("workflow lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| WorkflowError::CandidateNotFound { id: id.to_string() })
    }

    /// All candidates in id order.
    pub fn list(&self) -> Vec<CandidatePattern> {
        self.candidates
            .read()
            .expect("workflow lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Replace a pending candidate's template.
    ///
    /// The new template must pass every check; otherwise the candidate is
    /// left as it was.
    pub fn amend(
        &self,
        id: CandidateId,
        template: &str,
        store: &PatternStore,
    ) -> WorkflowResult<ValidationReport> {
        let mut candidates = self.candidates.write().expect("workflow lock poisoned");
        let live = live_patterns(&candidates, Some(id));
        let candidate = candidates
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::CandidateNotFound { id: id.to_string() })?;
        candidate.require(CandidateState::PendingReview, CandidateState::PendingReview)?;

        let rules = store.snapshot();
        let report = validate::validate(
            &candidate.target_concept,
            &candidate.generated_pattern,
            template,
            &ValidationContext {
                rules: &rules,
                live_candidates: &live,
                config: &self.config,
            },
        );
        if !report.passed() {
            return Err(WorkflowError::AmendRejected {
                id: id.to_string(),
                reasons: report.failures().join("; "),
            });
        }

        candidate.quality = QualityScore::assess(&report, &candidate.core, template, &self.config.weights);
        candidate.generated_template = template.to_string();
        candidate.validation = report.clone();
        candidate.history.push(StateChange {
            from: Some(CandidateState::PendingReview),
            to: CandidateState::PendingReview,
            at: now_secs(),
            note: Some("template amended".into()),
        });
        tracing::info!(candidate = %id, "candidate amended");
        Ok(report)
    }

    /// Deploy a pending candidate as a live rule.
    pub fn approve(&self, id: CandidateId, store: &PatternStore) -> WorkflowResult<RuleId> {
        let mut candidates = self.candidates.write().expect("workflow lock poisoned");
        let candidate = candidates
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::CandidateNotFound { id: id.to_string() })?;
        candidate.require(CandidateState::PendingReview, CandidateState::Approved)?;

        let def = RuleDef::new(&candidate.generated_pattern, &candidate.generated_template)
            .with_source(format!("workflow:{id}"));
        let rule_id = store.insert(&def).map_err(|source| {
            tracing::warn!(candidate = %id, error = %source, "deployment failed");
            WorkflowError::Deployment {
                id: id.to_string(),
                source,
            }
        })?;

        candidate.transition(CandidateState::Approved, None);
        candidate.transition(CandidateState::Deployed, Some(rule_id.to_string()));
        candidate.deployed_rule = Some(rule_id);
        tracing::info!(candidate = %id, rule = %rule_id, pattern = %candidate.generated_pattern, "candidate deployed");
        Ok(rule_id)
    }

    /// Decline a pending candidate.
    pub fn reject(&self, id: CandidateId, reason: &str) -> WorkflowResult<()> {
        let mut candidates = self.candidates.write().expect("workflow lock poisoned");
        let candidate = candidates
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::CandidateNotFound { id: id.to_string() })?;
        candidate.require(CandidateState::PendingReview, CandidateState::Rejected)?;

        let reason = reason.trim();
        let note = (!reason.is_empty()).then(|| reason.to_string());
        candidate.rejection_reason = note.clone();
        candidate.transition(CandidateState::Rejected, note);
        tracing::info!(candidate = %id, reason, "candidate rejected");
        Ok(())
    }

    pub fn stats(&self) -> WorkflowStats {
        let candidates = self.candidates.read().expect("workflow lock poisoned");
        let mut stats = WorkflowStats {
            generated: candidates.len(),
            ..Default::default()
        };
        let mut quality_sum = 0.0;
        for c in candidates.values() {
            match c.state {
                CandidateState::Drafted => stats.drafted += 1,
                CandidateState::PendingReview => stats.pending += 1,
                CandidateState::Approved | CandidateState::Deployed => stats.approved += 1,
                CandidateState::Rejected => stats.rejected += 1,
            }
            *stats.by_kind.entry(c.template_kind).or_default() += 1;
            quality_sum += c.quality.composite;
        }
        let decided = stats.approved + stats.rejected;
        if decided > 0 {
            stats.approval_rate = stats.approved as f32 / decided as f32;
        }
        if stats.generated > 0 {
            stats.average_quality = quality_sum / stats.generated as f32;
        }
        stats
    }
}

/// Patterns of candidates awaiting a decision, optionally excluding one.
fn live_patterns(
    candidates: &BTreeMap<CandidateId, CandidatePattern>,
    except: Option<CandidateId>,
) -> Vec<Pattern> {
    candidates
        .values()
        .filter(|c| Some(c.id) != except)
        .filter(|c| matches!(c.state, CandidateState::PendingReview | CandidateState::Approved))
        .filter_map(|c| Pattern::parse(&c.generated_pattern).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;

    fn store() -> PatternStore {
        let store = PatternStore::new();
        store
            .insert(&RuleDef::new("METACOGNITIVE PROCESS *", "(reflecting on {0})"))
            .unwrap();
        store
    }

    #[test]
    fn candidate_id_format() {
        let id = CandidateId::new(1);
        assert_eq!(id.to_string(), "PG001");
        assert_eq!(CandidateId::parse("pg001"), Some(id));
        assert_eq!(CandidateId::parse("12"), Some(CandidateId::new(12)));
        assert_eq!(CandidateId::parse("PGx"), None);
    }

    #[test]
    fn generate_lands_in_pending_review() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let store = store();
        let id = wf.generate("quantum computing", &store).unwrap();
        let c = wf.review(id).unwrap();
        assert_eq!(c.state, CandidateState::PendingReview);
        assert_eq!(c.confidence, 0.5);
        assert_eq!(c.generated_pattern, "WHAT IS QUANTUM COMPUTING");
        assert_eq!(c.history.len(), 2);
    }

    #[test]
    fn generate_without_reflection_rule_stays_drafted() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let id = wf.generate("quantum computing", &PatternStore::new()).unwrap();
        let c = wf.review(id).unwrap();
        assert_eq!(c.state, CandidateState::Drafted);
        assert!(!c.validation.failures().is_empty());
    }

    #[test]
    fn disallowed_concept_never_passes() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let store = store();
        let id = wf.generate("root password", &store).unwrap();
        let c = wf.review(id).unwrap();
        assert_eq!(c.state, CandidateState::Drafted);
        assert_eq!(c.quality.safety, 0.0);
        assert!(matches!(
            wf.approve(id, &store),
            Err(WorkflowError::InvalidTransition { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_concept_is_an_error() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        assert!(matches!(
            wf.generate("  ?? ", &store()),
            Err(WorkflowError::EmptyConcept)
        ));
    }

    #[test]
    fn second_candidate_for_same_pattern_conflicts() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let store = store();
        wf.generate("quantum computing", &store).unwrap();
        let second = wf.generate("Quantum Computing", &store).unwrap();
        let c = wf.review(second).unwrap();
        assert_eq!(c.state, CandidateState::Drafted);
        assert!(!c.validation.check_passed(ValidationCheck::NoConflict));
    }

    #[test]
    fn approve_deploys_rule() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let store = store();
        let id = wf.generate("quantum computing", &store).unwrap();
        let rule = wf.approve(id, &store).unwrap();

        let c = wf.review(id).unwrap();
        assert_eq!(c.state, CandidateState::Deployed);
        assert_eq!(c.deployed_rule, Some(rule));
        let states: Vec<_> = c.history.iter().map(|h| h.to).collect();
        assert_eq!(
            states,
            vec![
                CandidateState::Drafted,
                CandidateState::PendingReview,
                CandidateState::Approved,
                CandidateState::Deployed
            ]
        );
        assert_eq!(store.get(rule).unwrap().source, "workflow:PG001");

        // Terminal.
        assert!(wf.approve(id, &store).is_err());
        assert!(wf.reject(id, "late").is_err());
    }

    #[test]
    fn deployment_failure_keeps_candidate_pending() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let store = store();
        let id = wf.generate("quantum computing", &store).unwrap();
        // Someone loads the same pattern before approval.
        store
            .insert(&RuleDef::new("WHAT IS QUANTUM COMPUTING", "qc"))
            .unwrap();

        let err = wf.approve(id, &store).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Deployment {
                source: RuleError::DuplicatePattern { .. },
                ..
            }
        ));
        assert_eq!(wf.review(id).unwrap().state, CandidateState::PendingReview);
    }

    #[test]
    fn reject_is_terminal() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let store = store();
        let id = wf.generate("quantum computing", &store).unwrap();
        wf.reject(id, "too vague").unwrap();
        let c = wf.review(id).unwrap();
        assert_eq!(c.state, CandidateState::Rejected);
        assert_eq!(c.rejection_reason.as_deref(), Some("too vague"));
        assert!(matches!(
            wf.approve(id, &store),
            Err(WorkflowError::InvalidTransition { .. })
        ));
        assert!(wf.amend(id, "x", &store).is_err());
    }

    #[test]
    fn amend_validates_and_preserves_on_failure() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let store = store();
        let id = wf.generate("quantum computing", &store).unwrap();
        let before = wf.review(id).unwrap();

        let err = wf.amend(id, "Quantum computing is magic.", &store).unwrap_err();
        assert!(matches!(err, WorkflowError::AmendRejected { .. }));
        assert_eq!(wf.review(id).unwrap(), before);

        let better = "Quantum computing uses qubits. <srai>METACOGNITIVE PROCESS QUANTUM COMPUTING</srai>";
        wf.amend(id, better, &store).unwrap();
        let after = wf.review(id).unwrap();
        assert_eq!(after.generated_template, better);
        assert_eq!(after.state, CandidateState::PendingReview);
        assert!(after.quality.accuracy > before.quality.accuracy);
    }

    #[test]
    fn stats_counts_and_rates() {
        let wf = PatternWorkflow::new(WorkflowConfig::default());
        let store = store();
        let a = wf.generate("quantum computing", &store).unwrap();
        let b = wf.generate("compare Python and Java", &store).unwrap();
        wf.generate("machine learning algorithms", &store).unwrap();
        wf.generate("admin secrets", &store).unwrap();
        wf.approve(a, &store).unwrap();
        wf.reject(b, "duplicate topic").unwrap();

        let stats = wf.stats();
        assert_eq!(stats.generated, 4);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.drafted, 1);
        assert!((stats.approval_rate - 0.5).abs() < f32::EPSILON);
        assert_eq!(stats.by_kind.get(&TemplateKind::Definition), Some(&2));
        assert_eq!(stats.by_kind.get(&TemplateKind::Comparison), Some(&1));
        assert!(stats.average_quality > 0.0);
        // Pure read.
        assert_eq!(wf.stats(), stats);
    }
}
