//! Rich diagnostic error types for the pandamania engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so operators know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the pandamania engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum PandaError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pack(#[from] PackError),
}

// ---------------------------------------------------------------------------
// Rule errors (the "invalid rule" family)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("empty pattern")]
    #[diagnostic(
        code(panda::rule::empty_pattern),
        help("A pattern needs at least one token, e.g. `WHAT IS *`.")
    )]
    EmptyPattern,

    #[error("pattern \"{pattern}\" has no literal token")]
    #[diagnostic(
        code(panda::rule::no_literal),
        help(
            "Patterns made only of wildcards would shadow every utterance. \
             Anchor the pattern with at least one literal word."
        )
    )]
    NoLiteral { pattern: String },

    #[error("pattern \"{pattern}\" has consecutive multi-wildcards at position {position}")]
    #[diagnostic(
        code(panda::rule::consecutive_wildcards),
        help(
            "Two adjacent `*` wildcards cannot be split unambiguously. \
             Merge them into one `*`, or use `_` for a single-token slot."
        )
    )]
    ConsecutiveWildcards { pattern: String, position: usize },

    #[error("malformed template: {message}")]
    #[diagnostic(
        code(panda::rule::malformed_template),
        help(
            "Templates are text with `{{N}}` capture references and the tags \
             <srai>, <get/>, <learned/>, <kb/>, <learn/>, <prefer/>, <fact/>, <relate/>. \
             Check for unbalanced <srai> tags, unknown tags, or missing attributes."
        )
    )]
    MalformedTemplate { message: String },

    #[error("capture {{{index}}} out of range: pattern \"{pattern}\" has {wildcards} wildcard(s)")]
    #[diagnostic(
        code(panda::rule::capture_out_of_range),
        help("Capture references are 0-based and must name an existing wildcard.")
    )]
    CaptureOutOfRange {
        index: usize,
        wildcards: usize,
        pattern: String,
    },

    #[error("redirect target \"{target}\" does not match any rule")]
    #[diagnostic(
        code(panda::rule::unresolvable_redirect),
        help(
            "A literal <srai> target must be answerable by some rule. \
             Load the target rule first, or in the same batch."
        )
    )]
    UnresolvableRedirect { target: String },

    #[error("pattern \"{pattern}\" is already defined by rule {existing}")]
    #[diagnostic(
        code(panda::rule::duplicate_pattern),
        help("Remove the existing rule first if you mean to replace it.")
    )]
    DuplicatePattern { pattern: String, existing: u64 },

    #[error("rule {id} not found")]
    #[diagnostic(
        code(panda::rule::not_found),
        help("The rule id does not exist in the pattern store. It may have been removed.")
    )]
    NotFound { id: u64 },
}

// ---------------------------------------------------------------------------
// Rewrite errors
// ---------------------------------------------------------------------------

/// Which redirect guard tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowReason {
    /// The redirect chain exceeded the configured depth budget.
    Depth,
    /// The same utterance was re-submitted within one chain.
    Cycle,
}

impl std::fmt::Display for OverflowReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Depth => write!(f, "depth budget exhausted"),
            Self::Cycle => write!(f, "cycle detected"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum RewriteError {
    #[error("no rule matched \"{utterance}\"")]
    #[diagnostic(
        code(panda::rewrite::no_match),
        help("Load a catch-all rule (e.g. `WHAT IS *`) or add a rule for this utterance.")
    )]
    NoMatch { utterance: String },

    #[error("redirection overflow at depth {depth} on \"{utterance}\": {reason}")]
    #[diagnostic(
        code(panda::rewrite::redirection_overflow),
        help(
            "A redirect chain looped or grew too deep. Check the <srai> targets of \
             the rules involved, or raise `max_redirect_depth`."
        )
    )]
    RedirectionOverflow {
        depth: usize,
        utterance: String,
        reason: OverflowReason,
    },

    #[error("response timed out after {elapsed_ms} ms")]
    #[diagnostic(
        code(panda::rewrite::timeout),
        help("Raise `respond_timeout_ms` or simplify the redirect chain.")
    )]
    Timeout { elapsed_ms: u64 },
}

// ---------------------------------------------------------------------------
// Knowledge base errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KnowledgeError {
    #[error("unknown predicate: {name}")]
    #[diagnostic(
        code(panda::knowledge::unknown_predicate),
        help("Valid fact predicates are: is, has, can.")
    )]
    UnknownPredicate { name: String },

    #[error("unknown relation: {name}")]
    #[diagnostic(
        code(panda::knowledge::unknown_relation),
        help("Valid relations are: isa (is-a), partof (part-of), usedfor (used-for).")
    )]
    UnknownRelation { name: String },

    #[error("empty {position} term")]
    #[diagnostic(
        code(panda::knowledge::empty_term),
        help("Subjects and objects must contain at least one non-space character.")
    )]
    EmptyTerm { position: &'static str },
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("unknown session: {id}")]
    #[diagnostic(
        code(panda::session::unknown),
        help("The session was closed or never opened. Call `open_session()` first.")
    )]
    UnknownSession { id: u64 },
}

// ---------------------------------------------------------------------------
// Workflow errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    #[error("candidate pattern not found: {id}")]
    #[diagnostic(
        code(panda::workflow::not_found),
        help("List candidates with `:stats`, or generate one with `:generate <concept>`.")
    )]
    CandidateNotFound { id: String },

    #[error("invalid transition for {id}: {from} -> {to}")]
    #[diagnostic(
        code(panda::workflow::invalid_transition),
        help(
            "Candidates move Drafted -> PendingReview -> Approved -> Deployed, or \
             PendingReview -> Rejected. Only PendingReview candidates can be \
             approved, rejected or amended."
        )
    )]
    InvalidTransition { id: String, from: String, to: String },

    #[error("cannot generate a pattern for an empty concept")]
    #[diagnostic(
        code(panda::workflow::empty_concept),
        help("Name the concept to cover, e.g. `quantum computing`.")
    )]
    EmptyConcept,

    #[error("deploying {id} failed")]
    #[diagnostic(
        code(panda::workflow::deployment),
        help("The candidate stays in PendingReview. Resolve the rule error and approve again.")
    )]
    Deployment {
        id: String,
        #[source]
        source: RuleError,
    },

    #[error("amendment of {id} rejected: {reasons}")]
    #[diagnostic(
        code(panda::workflow::amend_rejected),
        help("The amended template must pass every validation check; the candidate is unchanged.")
    )]
    AmendRejected { id: String, reasons: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    #[diagnostic(
        code(panda::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(panda::config::parse),
        help("The configuration is TOML. Unknown keys are ignored; values must have the documented types.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(panda::config::invalid), help("Check the EngineConfig fields. {message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Definition pack errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PackError {
    #[error("failed to read definition pack {path}")]
    #[diagnostic(
        code(panda::pack::read),
        help("Check that the pack file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse definition pack {name}: {message}")]
    #[diagnostic(
        code(panda::pack::parse),
        help(
            "Packs are TOML with a [pack] header and [[rules]], [[facts]] and \
             [[relations]] tables."
        )
    )]
    Parse { name: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Knowledge(#[from] KnowledgeError),
}

/// Convenience alias for functions returning pandamania results.
pub type PandaResult<T> = std::result::Result<T, PandaError>;

/// Result type for pattern store and rule compilation.
pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// Result type for workflow operations.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
