//! Draft synthesis: pick a template kind for a concept and write the rule text.

use serde::{Deserialize, Serialize};

use crate::utterance::Utterance;

/// Placeholder marker left in every generated template body.
pub const PLACEHOLDER_MARKER: &str = "pending human input]";

/// Shape of a generated pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TemplateKind {
    Definition,
    Capability,
    Comparison,
    Relationship,
    Process,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 5] = [
        TemplateKind::Definition,
        TemplateKind::Capability,
        TemplateKind::Comparison,
        TemplateKind::Relationship,
        TemplateKind::Process,
    ];

    /// Words that select this kind.
    fn triggers(self) -> &'static [&'static str] {
        match self {
            Self::Definition => &[],
            Self::Capability => &[
                "CAN",
                "CAPABILITY",
                "CAPABILITIES",
                "ABILITY",
                "ABILITIES",
                "ALGORITHM",
                "ALGORITHMS",
                "TOOL",
                "TOOLS",
            ],
            Self::Comparison => &["COMPARE", "COMPARISON", "VS", "VERSUS", "DIFFERENCE"],
            Self::Relationship => &["RELATIONSHIP", "RELATION", "BETWEEN", "RELATED"],
            Self::Process => &["HOW", "PROCESS", "PROCEDURE", "STEPS", "WORKFLOW", "WORK", "WORKS"],
        }
    }

    /// Words dropped from the concept once the kind is chosen.
    fn markers(self) -> &'static [&'static str] {
        match self {
            Self::Definition => &["WHAT", "IS", "ARE", "DEFINE", "DEFINITION", "OF"],
            Self::Capability => &[
                "WHAT", "CAN", "DO", "CAPABILITY", "CAPABILITIES", "ABILITY", "ABILITIES", "OF",
            ],
            Self::Comparison => &["COMPARE", "COMPARISON", "OF", "DIFFERENCE", "BETWEEN"],
            Self::Relationship => &["WHAT", "IS", "THE", "RELATIONSHIP", "RELATION", "BETWEEN"],
            Self::Process => &["HOW", "DOES", "DO", "WORK", "WORKS", "PROCESS", "OF", "THE", "STEPS"],
        }
    }

    /// Pick a kind by keyword.
    ///
    /// Comparison wins only when the concept splits into two sides.
    pub fn infer(concept: &str) -> Self {
        let utterance = Utterance::normalize(concept);
        let tokens = utterance.tokens();
        let hit = |kind: TemplateKind| tokens.iter().any(|t| kind.triggers().contains(&t.as_str()));

        if hit(Self::Comparison) && split_sides(concept).is_some() {
            Self::Comparison
        } else if hit(Self::Relationship) {
            Self::Relationship
        } else if hit(Self::Process) {
            Self::Process
        } else if hit(Self::Capability) {
            Self::Capability
        } else {
            Self::Definition
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Definition => write!(f, "DEFINITION"),
            Self::Capability => write!(f, "CAPABILITY"),
            Self::Comparison => write!(f, "COMPARISON"),
            Self::Relationship => write!(f, "RELATIONSHIP"),
            Self::Process => write!(f, "PROCESS"),
        }
    }
}

/// Generated rule text for one concept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub kind: TemplateKind,
    /// Display form of the concept with marker words removed.
    pub core: String,
    pub pattern: String,
    pub template: String,
}

/// Core concept words for a kind, in the caller's casing.
fn core_words(concept: &str, kind: TemplateKind) -> Vec<String> {
    let utterance = Utterance::normalize(concept);
    let kept: Vec<String> = utterance
        .tokens()
        .iter()
        .zip(utterance.raw_tokens())
        .filter(|(norm, _)| !kind.markers().contains(&norm.as_str()))
        .map(|(_, raw)| raw.clone())
        .collect();
    if kept.is_empty() {
        utterance.raw_tokens().to_vec()
    } else {
        kept
    }
}

/// Split `A and B` / `A vs B` after marker removal.
fn split_sides(concept: &str) -> Option<(String, String)> {
    let words = core_words(concept, TemplateKind::Comparison);
    let pos = words.iter().position(|w| {
        let upper = w.to_uppercase();
        upper == "AND" || upper == "VS" || upper == "VERSUS" || upper == "WITH"
    })?;
    let (left, right) = (&words[..pos], &words[pos + 1..]);
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left.join(" "), right.join(" ")))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Synthesize the pattern and template for a concept.
///
/// Returns `None` when nothing survives normalization.
pub fn draft(concept: &str, reflection_prefix: &str) -> Option<Draft> {
    if Utterance::normalize(concept).is_empty() {
        return None;
    }
    let kind = TemplateKind::infer(concept);
    let prefix = Utterance::normalize(reflection_prefix).text();

    let (core, pattern, body) = match kind {
        TemplateKind::Comparison => {
            let (a, b) = split_sides(concept)?;
            let core = format!("{a} and {b}");
            let pattern = format!(
                "COMPARE {} AND {}",
                Utterance::normalize(&a).text(),
                Utterance::normalize(&b).text()
            );
            let body = format!("{} and {b} differ in [comparison {PLACEHOLDER_MARKER}.", capitalize(&a));
            (core, pattern, body)
        }
        other => {
            let core = core_words(concept, other).join(" ");
            let upper = Utterance::normalize(&core).text();
            let (pattern, body) = match other {
                TemplateKind::Capability => (
                    format!("WHAT CAN {upper} DO"),
                    format!("{} can [capabilities {PLACEHOLDER_MARKER}.", capitalize(&core)),
                ),
                TemplateKind::Relationship => (
                    format!("WHAT IS THE RELATIONSHIP BETWEEN {upper}"),
                    format!("The relationship between {core} is [relationship {PLACEHOLDER_MARKER}."),
                ),
                TemplateKind::Process => (
                    format!("HOW DOES {upper} WORK"),
                    format!("{} works by [process {PLACEHOLDER_MARKER}.", capitalize(&core)),
                ),
                _ => (
                    format!("WHAT IS {upper}"),
                    format!("{} is [definition {PLACEHOLDER_MARKER}.", capitalize(&core)),
                ),
            };
            (core, pattern, body)
        }
    };

    let reflection = format!("{prefix} {}", Utterance::normalize(&core).text());
    Some(Draft {
        kind,
        template: format!("{body} <srai>{reflection}</srai>"),
        core,
        pattern,
    })
}
