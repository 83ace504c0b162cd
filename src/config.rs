//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes:
//!
//! ```toml
//! max_redirect_depth = 12
//! respond_timeout_ms = 250
//! load_core_pack = true
//!
//! [workflow]
//! baseline_confidence = 0.6
//!
//! [workflow.weights]
//! safety = 0.4
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::knowledge::DEFAULT_MAX_INFERENCE_DEPTH;
use crate::matcher::DEFAULT_PARALLEL_THRESHOLD;
use crate::rewrite::DEFAULT_MAX_REDIRECT_DEPTH;
use crate::session::DEFAULT_MAX_HISTORY;
use crate::workflow::WorkflowConfig;

/// Response used when nothing matched or the rewrite timed out.
pub const DEFAULT_FALLBACK_RESPONSE: &str =
    "I'm not sure how to respond to that yet. You can teach me with STORE FACT or STORE RELATIONSHIP.";

/// Response used when a redirect chain overflowed.
pub const DEFAULT_OVERFLOW_RESPONSE: &str =
    "I got lost following my own reasoning there. Could you rephrase that?";

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nested `<srai>` redirects per utterance.
    pub max_redirect_depth: usize,
    pub fallback_response: String,
    pub overflow_response: String,
    /// Wall-clock budget for one top-level response. `None` disables it.
    pub respond_timeout_ms: Option<u64>,
    /// Turns kept per session.
    pub max_history: usize,
    /// Hop bound for IS_A inference.
    pub max_inference_depth: usize,
    /// Rule count at which matching switches to a parallel scan.
    pub parallel_match_threshold: usize,
    pub workflow: WorkflowConfig,
    /// Load the bundled `core` definition pack on startup.
    pub load_core_pack: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_redirect_depth: DEFAULT_MAX_REDIRECT_DEPTH,
            fallback_response: DEFAULT_FALLBACK_RESPONSE.into(),
            overflow_response: DEFAULT_OVERFLOW_RESPONSE.into(),
            respond_timeout_ms: None,
            max_history: DEFAULT_MAX_HISTORY,
            max_inference_depth: DEFAULT_MAX_INFERENCE_DEPTH,
            parallel_match_threshold: DEFAULT_PARALLEL_THRESHOLD,
            workflow: WorkflowConfig::default(),
            load_core_pack: false,
        }
    }
}

impl EngineConfig {
    /// Read a TOML config file. The result is not yet validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Parse TOML text. `origin` names the source in errors.
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_redirect_depth == 0 {
            return Err(invalid("max_redirect_depth must be at least 1"));
        }
        if self.max_history == 0 {
            return Err(invalid("max_history must be at least 1"));
        }
        if self.max_inference_depth == 0 {
            return Err(invalid("max_inference_depth must be at least 1"));
        }

        let confidence = self.workflow.baseline_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(invalid(format!(
                "workflow.baseline_confidence must lie in [0, 1], got {confidence}"
            )));
        }

        let weights = self.workflow.weights.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("workflow.weights must be finite and non-negative"));
        }
        if self.workflow.weights.total() <= 0.0 {
            return Err(invalid("workflow.weights must not all be zero"));
        }
        Ok(())
    }

    pub fn respond_timeout(&self) -> Option<Duration> {
        self.respond_timeout_ms.map(Duration::from_millis)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}
