//! Definition packs: TOML bundles of rules, facts and relations.
//!
//! ```toml
//! [pack]
//! name = "science"
//! version = "1.0.0"
//! description = "Basic science vocabulary"
//!
//! [[rules]]
//! pattern = "WHAT IS PHOTOSYNTHESIS"
//! template = "The process plants use to turn light into chemical energy."
//!
//! [[facts]]
//! subject = "plant"
//! predicate = "can"
//! object = "photosynthesize"
//!
//! [[relations]]
//! subject = "fern"
//! relation = "isa"
//! object = "plant"
//! ```
//!
//! One pack, `core`, is bundled into the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PackError, RuleError};
use crate::knowledge::{Fact, Predicate, Relation, RelationEdge};
use crate::pattern::RuleDef;

const CORE_TOML: &str = include_str!("../data/packs/core.toml");

// ── Data model ──────────────────────────────────────────────────────────

/// Where a pack came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackSource {
    /// Bundled into the binary via `include_str!`.
    Bundled,
    /// Read from a file.
    File(PathBuf),
    /// Parsed from an in-memory string.
    Inline,
}

/// A parsed definition pack.
#[derive(Debug, Clone)]
pub struct DefinitionPack {
    pub name: String,
    pub version: String,
    pub description: String,
    pub rules: Vec<RuleDef>,
    pub facts: Vec<Fact>,
    pub relations: Vec<RelationEdge>,
    pub source: PackSource,
}

/// What loading a pack changed.
#[derive(Debug, Default)]
pub struct PackReport {
    pub name: String,
    pub rules_loaded: usize,
    /// Canonical-ish pattern text and the reason each rejected rule failed.
    pub rule_errors: Vec<(String, RuleError)>,
    pub facts_stored: usize,
    /// Facts already present.
    pub facts_skipped: usize,
    pub relations_stored: usize,
    pub relations_skipped: usize,
}

impl PackReport {
    pub fn is_clean(&self) -> bool {
        self.rule_errors.is_empty()
    }
}

impl std::fmt::Display for PackReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pack \"{}\": {} rule(s) loaded, {} rejected; {} fact(s) stored ({} duplicate); \
             {} relation(s) stored ({} duplicate)",
            self.name,
            self.rules_loaded,
            self.rule_errors.len(),
            self.facts_stored,
            self.facts_skipped,
            self.relations_stored,
            self.relations_skipped
        )
    }
}

// ── TOML deserialization helpers ─────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct PackToml {
    pack: PackMeta,
    #[serde(default)]
    rules: Vec<RuleToml>,
    #[serde(default)]
    facts: Vec<FactToml>,
    #[serde(default)]
    relations: Vec<RelationToml>,
}

#[derive(Debug, Deserialize, Serialize)]
struct PackMeta {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct RuleToml {
    pattern: String,
    template: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct FactToml {
    subject: String,
    predicate: String,
    object: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct RelationToml {
    subject: String,
    relation: String,
    object: String,
}

// ── Parsing ─────────────────────────────────────────────────────────────

impl DefinitionPack {
    /// Parse pack TOML.
    ///
    /// Facts and relations are checked here; rules are only checked when
    /// loaded, so one bad rule does not sink the pack.
    pub fn parse(toml_str: &str, source: PackSource) -> Result<Self, PackError> {
        let parsed: PackToml = toml::from_str(toml_str).map_err(|e| PackError::Parse {
            name: match &source {
                PackSource::File(path) => path.display().to_string(),
                PackSource::Bundled | PackSource::Inline => "(inline)".into(),
            },
            message: e.to_string(),
        })?;

        let name = parsed.pack.name;
        let rules = parsed
            .rules
            .into_iter()
            .map(|r| RuleDef::new(r.pattern, r.template).with_source(name.clone()))
            .collect();
        let facts = parsed
            .facts
            .into_iter()
            .map(|f| Fact::new(&f.subject, Predicate::parse(&f.predicate)?, &f.object))
            .collect::<Result<Vec<_>, _>>()?;
        let relations = parsed
            .relations
            .into_iter()
            .map(|r| RelationEdge::new(&r.subject, Relation::parse(&r.relation)?, &r.object))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            version: parsed.pack.version,
            description: parsed.pack.description,
            rules,
            facts,
            relations,
            source,
        })
    }

    /// Read and parse a pack file.
    pub fn load(path: &Path) -> Result<Self, PackError> {
        let content = std::fs::read_to_string(path).map_err(|source| PackError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, PackSource::File(path.to_path_buf()))
    }

    /// The bundled `core` pack.
    pub fn core() -> Result<Self, PackError> {
        Self::parse(CORE_TOML, PackSource::Bundled)
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String, PackError> {
        let doc = PackToml {
            pack: PackMeta {
                name: self.name.clone(),
                version: self.version.clone(),
                description: self.description.clone(),
            },
            rules: self
                .rules
                .iter()
                .map(|r| RuleToml {
                    pattern: r.pattern.clone(),
                    template: r.template.clone(),
                })
                .collect(),
            facts: self
                .facts
                .iter()
                .map(|f| FactToml {
                    subject: f.subject.clone(),
                    predicate: f.predicate.to_string().to_lowercase(),
                    object: f.object.clone(),
                })
                .collect(),
            relations: self
                .relations
                .iter()
                .map(|r| RelationToml {
                    subject: r.subject.clone(),
                    relation: r.relation.to_string().to_lowercase(),
                    object: r.object.clone(),
                })
                .collect(),
        };
        toml::to_string_pretty(&doc).map_err(|e| PackError::Parse {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }
}
