//! Pattern generation workflow, driven through the engine.
//!
//! # Quality rubric
//!
//! Every candidate is scored on six dimensions, each in `[0, 1]`:
//!
//! | dimension      | heuristic                                                   | default weight |
//! |----------------|-------------------------------------------------------------|----------------|
//! | accuracy       | 0.5 while the template holds a placeholder, 0.9 once edited | 0.20           |
//! | completeness   | fraction of validation checks passed                        | 0.15           |
//! | safety         | 1 if no disallowed token appears, else 0                    | 0.25           |
//! | usefulness     | 0.5 + 0.15 per concept word, up to three words              | 0.15           |
//! | integration    | 1 if every redirect resolves, else 0.3                      | 0.15           |
//! | meta-awareness | 1 if the template reflects via the meta-cognitive redirect  | 0.10           |
//!
//! The composite is the weighted mean. Weights live in
//! `EngineConfig::workflow.weights` and can be changed per deployment;
//! the numbers below pin the defaults.

use pandamania::config::EngineConfig;
use pandamania::engine::Engine;
use pandamania::error::WorkflowError;
use pandamania::workflow::{CandidateId, CandidateState, QualityWeights, TemplateKind, ValidationCheck};

fn core_engine() -> Engine {
    Engine::new(EngineConfig {
        load_core_pack: true,
        ..Default::default()
    })
    .unwrap()
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn default_rubric_for_a_clean_draft() {
    let engine = core_engine();
    let id = engine.generate_pattern("quantum computing").unwrap();
    let c = engine.review(id).unwrap();

    assert_eq!(c.id.to_string(), "PG001");
    assert_eq!(c.template_kind, TemplateKind::Definition);
    assert_close(c.confidence, 0.5);
    assert!(c.validation.passed());

    assert_close(c.quality.accuracy, 0.5);
    assert_close(c.quality.completeness, 1.0);
    assert_close(c.quality.safety, 1.0);
    assert_close(c.quality.usefulness, 0.8);
    assert_close(c.quality.integration, 1.0);
    assert_close(c.quality.meta_awareness, 1.0);
    // .2*.5 + .15*1 + .25*1 + .15*.8 + .15*1 + .1*1
    assert_close(c.quality.composite, 0.87);
}

#[test]
fn default_rubric_for_an_unresolvable_draft() {
    // Without the core pack nothing answers the reflection redirect.
    let engine = Engine::with_defaults();
    let id = engine.generate_pattern("quantum computing").unwrap();
    let c = engine.review(id).unwrap();

    assert_eq!(c.state, CandidateState::Drafted);
    assert!(!c.validation.check_passed(ValidationCheck::RedirectResolvable));
    assert_close(c.quality.completeness, 6.0 / 7.0);
    assert_close(c.quality.integration, 0.3);
    // .1 + .15*(6/7) + .25 + .12 + .15*.3 + .1
    assert_close(c.quality.composite, 0.743_571);
}

#[test]
fn weights_are_configuration() {
    let mut config = EngineConfig {
        load_core_pack: true,
        ..Default::default()
    };
    config.workflow.weights = QualityWeights {
        accuracy: 1.0,
        completeness: 0.0,
        safety: 0.0,
        usefulness: 0.0,
        integration: 0.0,
        meta_awareness: 0.0,
    };
    config.workflow.baseline_confidence = 0.7;
    let engine = Engine::new(config).unwrap();

    let id = engine.generate_pattern("quantum computing").unwrap();
    let c = engine.review(id).unwrap();
    assert_close(c.quality.composite, 0.5);
    assert_close(c.confidence, 0.7);
}

#[test]
fn disallowed_tokens_never_pass() {
    let engine = core_engine();
    let id = engine.generate_pattern("admin password").unwrap();
    let c = engine.review(id).unwrap();

    assert_eq!(c.state, CandidateState::Drafted);
    assert!(!c.validation.check_passed(ValidationCheck::NoDisallowedTokens));
    assert_close(c.quality.safety, 0.0);
    assert!(matches!(
        engine.approve(id),
        Err(WorkflowError::InvalidTransition { .. })
    ));
    assert!(matches!(
        engine.reject(id, "unsafe"),
        Err(WorkflowError::InvalidTransition { .. })
    ));
}

#[test]
fn template_kinds_follow_keywords() {
    let engine = core_engine();
    let cases = [
        ("quantum computing", TemplateKind::Definition, "WHAT IS QUANTUM COMPUTING"),
        ("capabilities of neural networks", TemplateKind::Capability, "WHAT CAN NEURAL NETWORKS DO"),
        ("compare python and java", TemplateKind::Comparison, "COMPARE PYTHON AND JAVA"),
        (
            "relationship between cats and dogs",
            TemplateKind::Relationship,
            "WHAT IS THE RELATIONSHIP BETWEEN CATS AND DOGS",
        ),
        ("how does photosynthesis work", TemplateKind::Process, "HOW DOES PHOTOSYNTHESIS WORK"),
    ];
    for (concept, kind, pattern) in cases {
        let id = engine.generate_pattern(concept).unwrap();
        let c = engine.review(id).unwrap();
        assert_eq!(c.template_kind, kind, "{concept}");
        assert_eq!(c.generated_pattern, pattern, "{concept}");
        assert_eq!(c.state, CandidateState::PendingReview, "{concept}");
    }

    let stats = engine.stats();
    assert_eq!(stats.generated, 5);
    assert_eq!(stats.pending, 5);
    for kind in TemplateKind::ALL {
        assert_eq!(stats.by_kind.get(&kind), Some(&1));
    }
}

#[test]
fn pending_candidates_block_duplicates() {
    let engine = core_engine();
    let first = engine.generate_pattern("quantum computing").unwrap();
    let second = engine.generate_pattern("Quantum Computing").unwrap();

    assert_eq!(engine.review(first).unwrap().state, CandidateState::PendingReview);
    let c = engine.review(second).unwrap();
    assert_eq!(c.state, CandidateState::Drafted);
    assert!(!c.validation.check_passed(ValidationCheck::NoConflict));

    // Once the first is rejected the concept is free again.
    engine.reject(first, "duplicate effort").unwrap();
    let third = engine.generate_pattern("quantum computing").unwrap();
    assert_eq!(engine.review(third).unwrap().state, CandidateState::PendingReview);
}

#[test]
fn amend_revalidates_and_rescores() {
    let engine = core_engine();
    let id = engine.generate_pattern("quantum computing").unwrap();

    let bad = "Quantum computing uses qubits.";
    assert!(matches!(
        engine.amend(id, bad),
        Err(WorkflowError::AmendRejected { .. })
    ));
    let unchanged = engine.review(id).unwrap();
    assert!(unchanged.generated_template.contains("pending human input"));

    let good = "Quantum computing uses qubits. <srai>METACOGNITIVE PROCESS QUANTUM COMPUTING</srai>";
    let report = engine.amend(id, good).unwrap();
    assert!(report.passed());

    let c = engine.review(id).unwrap();
    assert_eq!(c.generated_template, good);
    assert_eq!(c.state, CandidateState::PendingReview);
    assert_close(c.quality.accuracy, 0.9);
    assert_close(c.quality.composite, 0.95);

    engine.approve(id).unwrap();
    let s = engine.open_session();
    assert!(
        engine
            .respond(s, "what is quantum computing")
            .unwrap()
            .starts_with("Quantum computing uses qubits.")
    );

    assert!(matches!(
        engine.amend(id, good),
        Err(WorkflowError::InvalidTransition { .. })
    ));
}

#[test]
fn deployment_failure_keeps_candidate_pending() {
    let engine = core_engine();
    let id = engine.generate_pattern("quantum computing").unwrap();
    engine
        .load_rules(&[("WHAT IS QUANTUM COMPUTING", "Someone got here first.")])
        .remove(0)
        .unwrap();

    assert!(matches!(
        engine.approve(id),
        Err(WorkflowError::Deployment { .. })
    ));
    let c = engine.review(id).unwrap();
    assert_eq!(c.state, CandidateState::PendingReview);
    assert_eq!(c.deployed_rule, None);
}

#[test]
fn approval_rate_counts_decisions_only() {
    let engine = core_engine();
    let a = engine.generate_pattern("quantum computing").unwrap();
    let b = engine.generate_pattern("blockchain").unwrap();
    let _c = engine.generate_pattern("neural networks").unwrap();

    engine.approve(a).unwrap();
    engine.reject(b, "not now").unwrap();
    assert!(matches!(
        engine.approve(a),
        Err(WorkflowError::InvalidTransition { .. })
    ));

    let stats = engine.stats();
    assert_eq!(stats.approved, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.pending, 1);
    assert_close(stats.approval_rate, 0.5);

    let history = engine.review(a).unwrap().history;
    let states: Vec<CandidateState> = history.iter().map(|h| h.to).collect();
    assert_eq!(
        states,
        vec![
            CandidateState::Drafted,
            CandidateState::PendingReview,
            CandidateState::Approved,
            CandidateState::Deployed,
        ]
    );
}

#[test]
fn unknown_candidate_and_empty_concept() {
    let engine = core_engine();
    assert!(matches!(
        engine.review(CandidateId::new(42)),
        Err(WorkflowError::CandidateNotFound { .. })
    ));
    assert!(matches!(
        engine.generate_pattern("  ?! "),
        Err(WorkflowError::EmptyConcept)
    ));
}
