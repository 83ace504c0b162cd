// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # pandamania
//!
//! A rule-based dialogue engine: prioritized wildcard patterns, recursive
//! template rewriting, session learning, a subject–predicate–object
//! knowledge base with IS_A inference, and human-gated pattern generation.
//!
//! ## Architecture
//!
//! - **Patterns** (`pattern`): parsed patterns and templates, copy-on-write rule store
//! - **Matcher** (`matcher`): backtracking wildcard alignment with priority selection
//! - **Rewriting** (`rewrite`): bounded `<srai>` redirects with all-or-nothing effects
//! - **Sessions** (`session`): per-conversation facts, preferences and history
//! - **Knowledge** (`knowledge`): facts, relation graph (petgraph) and IS_A closure
//! - **Workflow** (`workflow`): draft → review → approve/reject for generated patterns
//! - **Packs** (`pack`): TOML bundles of rules, facts and relations
//!
//! ## Library usage
//!
//! ```no_run
//! use pandamania::engine::Engine;
//!
//! let engine = Engine::with_defaults();
//! engine.load_rules(&[("WHAT IS *", "I don't know what {0} is yet.")]);
//! let session = engine.open_session();
//! let reply = engine.respond(session, "What is AIML?").unwrap();
//! assert_eq!(reply, "I don't know what AIML is yet.");
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod matcher;
pub mod pack;
pub mod pattern;
pub mod rewrite;
pub mod session;
pub mod utterance;
pub mod workflow;

pub use config::EngineConfig;
pub use engine::{Engine, EngineInfo, Outcome, Response};
pub use error::{PandaError, PandaResult};
