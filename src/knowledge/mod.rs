//! Process-wide knowledge base of facts and taxonomic relations.
//!
//! Facts (`subject IS|HAS|CAN object`) live in an append-only log with a
//! per-subject index. Relations (`IS_A`, `PART_OF`, `USED_FOR`) live in a
//! `petgraph` directed graph with a `DashMap` node index. Terms compare
//! case-insensitively and are displayed the way they were first stored.
//!
//! Both stores are grow-only. Inserting an existing triple is a no-op that
//! reports `false`.

pub mod infer;

use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

pub use infer::{DEFAULT_MAX_INFERENCE_DEPTH, DerivedEdge};

/// Result type for knowledge base parsing operations.
pub type KnowledgeResult<T> = std::result::Result<T, KnowledgeError>;

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Fact predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Is,
    Has,
    Can,
}

impl Predicate {
    pub const ALL: [Predicate; 3] = [Predicate::Is, Predicate::Has, Predicate::Can];

    pub fn parse(name: &str) -> KnowledgeResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "is" => Ok(Self::Is),
            "has" => Ok(Self::Has),
            "can" => Ok(Self::Can),
            _ => Err(KnowledgeError::UnknownPredicate {
                name: name.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Is => write!(f, "IS"),
            Self::Has => write!(f, "HAS"),
            Self::Can => write!(f, "CAN"),
        }
    }
}

/// Taxonomic relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    #[serde(alias = "is_a")]
    IsA,
    #[serde(alias = "part_of")]
    PartOf,
    #[serde(alias = "used_for")]
    UsedFor,
}

impl Relation {
    /// Accepts `isa`, `is_a`, `is-a` and the like, in any case.
    pub fn parse(name: &str) -> KnowledgeResult<Self> {
        let squashed: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match squashed.as_str() {
            "isa" => Ok(Self::IsA),
            "partof" => Ok(Self::PartOf),
            "usedfor" => Ok(Self::UsedFor),
            _ => Err(KnowledgeError::UnknownRelation {
                name: name.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IsA => write!(f, "IS_A"),
            Self::PartOf => write!(f, "PART_OF"),
            Self::UsedFor => write!(f, "USED_FOR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Triples
// ---------------------------------------------------------------------------

/// A `subject predicate object` fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
}

impl Fact {
    /// Build a fact, trimming both terms.
    pub fn new(
        subject: impl AsRef<str>,
        predicate: Predicate,
        object: impl AsRef<str>,
    ) -> KnowledgeResult<Self> {
        Ok(Self {
            subject: clean_term(subject.as_ref(), "subject")?,
            predicate,
            object: clean_term(object.as_ref(), "object")?,
        })
    }
}

impl std::fmt::Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A `subject relation object` edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationEdge {
    pub subject: String,
    pub relation: Relation,
    pub object: String,
}

impl RelationEdge {
    pub fn new(
        subject: impl AsRef<str>,
        relation: Relation,
        object: impl AsRef<str>,
    ) -> KnowledgeResult<Self> {
        Ok(Self {
            subject: clean_term(subject.as_ref(), "subject")?,
            relation,
            object: clean_term(object.as_ref(), "object")?,
        })
    }
}

impl std::fmt::Display for RelationEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.object)
    }
}

fn clean_term(term: &str, position: &'static str) -> KnowledgeResult<String> {
    let joined = term.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        Err(KnowledgeError::EmptyTerm { position })
    } else {
        Ok(joined)
    }
}

/// Comparison key for a term.
pub fn term_key(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Everything stored about one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnowledgeQuery {
    pub subject: String,
    /// Facts whose subject is the queried term.
    pub facts: Vec<Fact>,
    /// Relations touching the term, as subject or object.
    pub relations: Vec<RelationEdge>,
}

impl KnowledgeQuery {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.relations.is_empty()
    }

    /// Objects of facts with the given predicate.
    pub fn objects(&self, predicate: Predicate) -> Vec<&str> {
        self.facts
            .iter()
            .filter(|f| f.predicate == predicate)
            .map(|f| f.object.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

/// Thread-safe, grow-only knowledge base.
pub struct KnowledgeBase {
    /// Term key → display form (first stored wins).
    terms: DashMap<String, String>,
    /// Append-only fact log, in insertion order.
    fact_log: RwLock<Vec<Fact>>,
    /// Subject key → that subject's facts. The entry guard serializes
    /// check-and-append per subject.
    fact_index: DashMap<String, Vec<Fact>>,
    /// Relation graph; nodes are term keys.
    graph: RwLock<DiGraph<String, Relation>>,
    /// Term key → graph node.
    node_index: DashMap<String, NodeIndex>,
    relation_count: AtomicUsize,
    max_inference_depth: usize,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self {
            terms: DashMap::new(),
            fact_log: RwLock::new(Vec::new()),
            fact_index: DashMap::new(),
            graph: RwLock::new(DiGraph::new()),
            node_index: DashMap::new(),
            relation_count: AtomicUsize::new(0),
            max_inference_depth: DEFAULT_MAX_INFERENCE_DEPTH,
        }
    }

    pub fn with_max_inference_depth(mut self, depth: usize) -> Self {
        self.max_inference_depth = depth.max(1);
        self
    }

    pub fn max_inference_depth(&self) -> usize {
        self.max_inference_depth
    }

    /// Register a term's display form, returning the canonical display.
    fn display(&self, term: &str) -> String {
        self.terms
            .entry(term_key(term))
            .or_insert_with(|| term.to_string())
            .value()
            .clone()
    }

    /// Display form for a term key, if the term is known.
    pub fn display_of(&self, term: &str) -> Option<String> {
        self.terms.get(&term_key(term)).map(|d| d.value().clone())
    }

    /// Store a fact. Returns `false` if an equivalent fact already exists.
    pub fn store_fact(&self, fact: Fact) -> bool {
        let subject_key = term_key(&fact.subject);
        let object_key = term_key(&fact.object);

        let mut entry = self.fact_index.entry(subject_key).or_default();
        if entry
            .iter()
            .any(|f| f.predicate == fact.predicate && term_key(&f.object) == object_key)
        {
            return false;
        }

        let stored = Fact {
            subject: self.display(&fact.subject),
            predicate: fact.predicate,
            object: self.display(&fact.object),
        };
        tracing::debug!(fact = %stored, "stored fact");
        entry.push(stored.clone());
        self.fact_log
            .write()
            .expect("fact log lock poisoned")
            .push(stored);
        true
    }

    /// Store a relation. Returns `false` if the same edge already exists.
    pub fn store_relation(&self, edge: RelationEdge) -> bool {
        let subject_key = term_key(&edge.subject);
        let object_key = term_key(&edge.object);

        let mut graph = self.graph.write().expect("relation graph lock poisoned");
        let from = self.node_in(&mut graph, &subject_key);
        let to = self.node_in(&mut graph, &object_key);
        if graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == edge.relation)
        {
            return false;
        }
        graph.add_edge(from, to, edge.relation);
        self.relation_count.fetch_add(1, Ordering::Relaxed);

        self.display(&edge.subject);
        self.display(&edge.object);
        tracing::debug!(relation = %edge, "stored relation");
        true
    }

    /// Node for a term key; the caller holds the graph write lock.
    fn node_in(&self, graph: &mut DiGraph<String, Relation>, key: &str) -> NodeIndex {
        if let Some(idx) = self.node_index.get(key) {
            return *idx.value();
        }
        let idx = graph.add_node(key.to_string());
        self.node_index.insert(key.to_string(), idx);
        idx
    }

    /// Everything stored about a subject.
    pub fn query(&self, subject: &str) -> KnowledgeQuery {
        let key = term_key(subject);
        let facts = self
            .fact_index
            .get(&key)
            .map(|f| f.value().clone())
            .unwrap_or_default();

        let relations = match self.node_index.get(&key).map(|i| *i.value()) {
            Some(node) => {
                let graph = self.graph.read().expect("relation graph lock poisoned");
                let mut edges: Vec<EdgeIndex> = graph
                    .edges_directed(node, Direction::Outgoing)
                    .chain(graph.edges_directed(node, Direction::Incoming))
                    .map(|e| e.id())
                    .collect();
                edges.sort();
                edges.dedup();
                edges
                    .into_iter()
                    .filter_map(|e| self.edge_at(&graph, e))
                    .collect()
            }
            None => Vec::new(),
        };

        KnowledgeQuery {
            subject: self.display_of(subject).unwrap_or_else(|| subject.trim().to_string()),
            facts,
            relations,
        }
    }

    /// Whether anything at all is stored about the term.
    pub fn knows(&self, subject: &str) -> bool {
        let key = term_key(subject);
        self.fact_index.get(&key).is_some_and(|f| !f.is_empty())
            || self.node_index.contains_key(&key)
    }

    pub(crate) fn edge_at(
        &self,
        graph: &DiGraph<String, Relation>,
        edge: EdgeIndex,
    ) -> Option<RelationEdge> {
        let (from, to) = graph.edge_endpoints(edge)?;
        let relation = *graph.edge_weight(edge)?;
        Some(RelationEdge {
            subject: self.display_key(&graph[from]),
            relation,
            object: self.display_key(&graph[to]),
        })
    }

    fn display_key(&self, key: &str) -> String {
        self.terms
            .get(key)
            .map(|d| d.value().clone())
            .unwrap_or_else(|| key.to_string())
    }

    pub fn fact_count(&self) -> usize {
        self.fact_log.read().expect("fact log lock poisoned").len()
    }

    pub fn relation_count(&self) -> usize {
        self.relation_count.load(Ordering::Relaxed)
    }

    /// All facts in insertion order.
    pub fn all_facts(&self) -> Vec<Fact> {
        self.fact_log.read().expect("fact log lock poisoned").clone()
    }

    /// All relations in insertion order.
    pub fn all_relations(&self) -> Vec<RelationEdge> {
        let graph = self.graph.read().expect("relation graph lock poisoned");
        graph
            .edge_indices()
            .filter_map(|e| self.edge_at(&graph, e))
            .collect()
    }

    /// Whether the exact fact is stored.
    pub fn has_fact(&self, fact: &Fact) -> bool {
        let object_key = term_key(&fact.object);
        self.fact_index.get(&term_key(&fact.subject)).is_some_and(|facts| {
            facts
                .iter()
                .any(|f| f.predicate == fact.predicate && term_key(&f.object) == object_key)
        })
    }

    /// Whether the exact edge is stored.
    pub fn has_relation(&self, edge: &RelationEdge) -> bool {
        let (Some(from), Some(to)) = (
            self.node_index.get(&term_key(&edge.subject)).map(|i| *i.value()),
            self.node_index.get(&term_key(&edge.object)).map(|i| *i.value()),
        ) else {
            return false;
        };
        let graph = self.graph.read().expect("relation graph lock poisoned");
        graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == edge.relation)
    }
}
