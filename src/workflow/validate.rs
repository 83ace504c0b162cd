//! Structural validation and quality scoring of candidate patterns.

use serde::{Deserialize, Serialize};

use crate::matcher::{align, match_utterance};
use crate::pattern::store::RuleSet;
use crate::pattern::{Pattern, Template};
use crate::utterance::Utterance;

use super::WorkflowConfig;
use super::generate::PLACEHOLDER_MARKER;

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// One structural validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationCheck {
    PatternWellFormed,
    TemplateWellFormed,
    NoDisallowedTokens,
    NoConflict,
    NoSelfRedirect,
    RedirectResolvable,
    MetaCognitiveRedirect,
}

impl std::fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::PatternWellFormed => "pattern well-formed",
            Self::TemplateWellFormed => "template well-formed",
            Self::NoDisallowedTokens => "no disallowed tokens",
            Self::NoConflict => "no pattern conflict",
            Self::NoSelfRedirect => "no self-redirect loop",
            Self::RedirectResolvable => "redirect resolvable",
            Self::MetaCognitiveRedirect => "meta-cognitive redirect present",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: ValidationCheck,
    pub passed: bool,
    /// Why the check failed.
    pub detail: Option<String>,
}

/// Outcome of every check, in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checks: Vec<CheckOutcome>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn check_passed(&self, check: ValidationCheck) -> bool {
        self.checks.iter().any(|c| c.check == check && c.passed)
    }

    pub fn pass_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Human-readable failure reasons.
    pub fn failures(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| match &c.detail {
                Some(detail) => format!("{}: {detail}", c.check),
                None => c.check.to_string(),
            })
            .collect()
    }

    fn record(&mut self, check: ValidationCheck, failure: Option<String>) {
        self.checks.push(CheckOutcome {
            check,
            passed: failure.is_none(),
            detail: failure,
        });
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in &self.checks {
            let mark = if c.passed { "ok  " } else { "FAIL" };
            write!(f, "  [{mark}] {}", c.check)?;
            if let Some(detail) = &c.detail {
                write!(f, " ({detail})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// What a candidate is validated against.
pub struct ValidationContext<'a> {
    pub rules: &'a RuleSet,
    /// Patterns of other candidates still awaiting a decision.
    pub live_candidates: &'a [Pattern],
    pub config: &'a WorkflowConfig,
}

/// Run every check against a candidate's text.
pub fn validate(
    concept: &str,
    pattern_text: &str,
    template_text: &str,
    ctx: &ValidationContext<'_>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let pattern = Pattern::parse(pattern_text);
    report.record(
        ValidationCheck::PatternWellFormed,
        pattern.as_ref().err().map(ToString::to_string),
    );
    let pattern = pattern.ok();

    let template = Template::parse(template_text).and_then(|t| {
        let wildcards = pattern.as_ref().map_or(0, Pattern::wildcard_count);
        match t.max_capture().filter(|&i| i >= wildcards) {
            Some(index) => Err(crate::error::RuleError::CaptureOutOfRange {
                index,
                wildcards,
                pattern: pattern_text.to_string(),
            }),
            None => Ok(t),
        }
    });
    report.record(
        ValidationCheck::TemplateWellFormed,
        template.as_ref().err().map(ToString::to_string),
    );
    let template = template.ok();

    let flagged = disallowed_hits(&[concept, pattern_text, template_text], &ctx.config.disallowed_tokens);
    report.record(
        ValidationCheck::NoDisallowedTokens,
        (!flagged.is_empty()).then(|| format!("contains {}", flagged.join(", "))),
    );

    let conflict = match &pattern {
        None => Some("pattern did not parse".to_string()),
        Some(p) => {
            if let Some(existing) = ctx.rules.contains_pattern(p) {
                Some(format!("\"{p}\" is already live as {existing}"))
            } else if ctx.live_candidates.contains(p) {
                Some(format!("\"{p}\" is already awaiting review"))
            } else {
                None
            }
        }
    };
    report.record(ValidationCheck::NoConflict, conflict);

    let targets: Vec<Utterance> = template
        .as_ref()
        .map(|t| t.literal_redirects().iter().map(|r| Utterance::normalize(r)).collect())
        .unwrap_or_default();

    let self_loop = match &pattern {
        None => Some("pattern did not parse".to_string()),
        Some(p) => targets
            .iter()
            .find(|t| align(p, t.tokens()).is_some())
            .map(|t| format!("\"{t}\" matches the candidate's own pattern")),
    };
    report.record(ValidationCheck::NoSelfRedirect, self_loop);

    let unresolved = match &template {
        None => Some("template did not parse".to_string()),
        Some(_) => targets
            .iter()
            .find(|t| match_utterance(t, ctx.rules).is_none())
            .map(|t| format!("no rule answers \"{t}\"")),
    };
    report.record(ValidationCheck::RedirectResolvable, unresolved);

    let prefix = Utterance::normalize(&ctx.config.reflection_prefix);
    let has_meta = targets
        .iter()
        .any(|t| t.len() > prefix.len() && t.tokens().starts_with(prefix.tokens()));
    report.record(
        ValidationCheck::MetaCognitiveRedirect,
        (!has_meta).then(|| format!("no <srai>{prefix} ...</srai>")),
    );

    report
}

/// Disallowed words or phrases appearing as whole tokens in any of the texts.
pub fn disallowed_hits(texts: &[&str], disallowed: &[String]) -> Vec<String> {
    let tokenized: Vec<Utterance> = texts.iter().map(|t| Utterance::normalize(t)).collect();
    let mut hits: Vec<String> = Vec::new();
    for entry in disallowed {
        let phrase = Utterance::normalize(entry);
        let needle = phrase.tokens();
        if needle.is_empty() {
            continue;
        }
        let found = tokenized
            .iter()
            .any(|text| text.tokens().windows(needle.len()).any(|w| w == needle));
        let word = phrase.text();
        if found && !hits.contains(&word) {
            hits.push(word);
        }
    }
    hits
}

// ---------------------------------------------------------------------------
// Quality rubric
// ---------------------------------------------------------------------------

/// Relative weights of the rubric dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub accuracy: f32,
    pub completeness: f32,
    pub safety: f32,
    pub usefulness: f32,
    pub integration: f32,
    pub meta_awareness: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            accuracy: 0.20,
            completeness: 0.15,
            safety: 0.25,
            usefulness: 0.15,
            integration: 0.15,
            meta_awareness: 0.10,
        }
    }
}

impl QualityWeights {
    pub fn as_array(&self) -> [f32; 6] {
        [
            self.accuracy,
            self.completeness,
            self.safety,
            self.usefulness,
            self.integration,
            self.meta_awareness,
        ]
    }

    pub fn total(&self) -> f32 {
        self.as_array().iter().sum()
    }
}

/// Per-dimension rubric scores, each in `[0, 1]`, and their weighted mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub accuracy: f32,
    pub completeness: f32,
    pub safety: f32,
    pub usefulness: f32,
    pub integration: f32,
    pub meta_awareness: f32,
    pub composite: f32,
}

impl QualityScore {
    /// Score a validated candidate.
    pub fn assess(
        report: &ValidationReport,
        concept_core: &str,
        template_text: &str,
        weights: &QualityWeights,
    ) -> Self {
        let accuracy = if template_text.contains(PLACEHOLDER_MARKER) { 0.5 } else { 0.9 };
        let completeness = if report.checks.is_empty() {
            0.0
        } else {
            report.pass_count() as f32 / report.checks.len() as f32
        };
        let safety = flag(report.check_passed(ValidationCheck::NoDisallowedTokens));
        let words = Utterance::normalize(concept_core).len().min(3) as f32;
        let usefulness = 0.5 + 0.15 * words;
        let integration = if report.check_passed(ValidationCheck::RedirectResolvable) {
            1.0
        } else {
            0.3
        };
        let meta_awareness = flag(report.check_passed(ValidationCheck::MetaCognitiveRedirect));

        let mut score = Self {
            accuracy,
            completeness,
            safety,
            usefulness: usefulness.clamp(0.0, 1.0),
            integration,
            meta_awareness,
            composite: 0.0,
        };
        score.composite = score.weighted(weights);
        score
    }

    fn as_array(&self) -> [f32; 6] {
        [
            self.accuracy,
            self.completeness,
            self.safety,
            self.usefulness,
            self.integration,
            self.meta_awareness,
        ]
    }

    /// Weighted mean of the six dimensions.
    pub fn weighted(&self, weights: &QualityWeights) -> f32 {
        let total = weights.total();
        if total <= 0.0 {
            return 0.0;
        }
        let sum: f32 = self
            .as_array()
            .iter()
            .zip(weights.as_array())
            .map(|(s, w)| s * w)
            .sum();
        (sum / total).clamp(0.0, 1.0)
    }
}

fn flag(passed: bool) -> f32 {
    if passed { 1.0 } else { 0.0 }
}

impl std::fmt::Display for QualityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  accuracy       {:.2}", self.accuracy)?;
        writeln!(f, "  completeness   {:.2}", self.completeness)?;
        writeln!(f, "  safety         {:.2}", self.safety)?;
        writeln!(f, "  usefulness     {:.2}", self.usefulness)?;
        writeln!(f, "  integration    {:.2}", self.integration)?;
        writeln!(f, "  meta-awareness {:.2}", self.meta_awareness)?;
        write!(f, "  composite      {:.2}", self.composite)
    }
}
