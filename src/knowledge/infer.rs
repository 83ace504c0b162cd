//! Transitive `IS_A` inference.
//!
//! Breadth-first search from a subject along `IS_A` edges. Every node first
//! reached at two or more hops yields a derived `subject IS_A node` edge.
//! Nodes reached in one hop are direct edges and are not reported.

use std::collections::{HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;

use super::{KnowledgeBase, Relation, RelationEdge, term_key};

/// Default bound on inference hops.
pub const DEFAULT_MAX_INFERENCE_DEPTH: usize = 16;

/// An `IS_A` edge implied by a chain of stored edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedEdge {
    pub edge: RelationEdge,
    /// Length of the shortest supporting chain.
    pub hops: usize,
    /// Intermediate terms along that chain, nearest first.
    pub via: Vec<String>,
}

impl std::fmt::Display for DerivedEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (via {})", self.edge, self.via.join(" -> "))
    }
}

impl KnowledgeBase {
    /// Derive transitive `IS_A` edges from `subject` with the configured depth bound.
    ///
    /// Order is BFS order, with siblings in edge insertion order.
    pub fn infer(&self, subject: &str) -> Vec<DerivedEdge> {
        self.infer_with_depth(subject, self.max_inference_depth())
    }

    pub fn infer_with_depth(&self, subject: &str, max_depth: usize) -> Vec<DerivedEdge> {
        let Some(start) = self.node_index.get(&term_key(subject)).map(|i| *i.value()) else {
            return Vec::new();
        };
        let graph = self.graph.read().expect("relation graph lock poisoned");

        let subject_display = self.display_key(&graph[start]);
        let mut derived = Vec::new();
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        // (node, hops, intermediate path)
        let mut queue: VecDeque<(NodeIndex, usize, Vec<NodeIndex>)> = VecDeque::new();
        queue.push_back((start, 0, Vec::new()));

        while let Some((node, hops, path)) = queue.pop_front() {
            if hops >= max_depth {
                continue;
            }

            let mut edges: Vec<(EdgeIndex, NodeIndex)> = graph
                .edges_directed(node, Direction::Outgoing)
                .filter(|e| *e.weight() == Relation::IsA)
                .map(|e| (e.id(), e.target()))
                .collect();
            edges.sort_by_key(|(id, _)| *id);

            for (_, next) in edges {
                if !visited.insert(next) {
                    continue;
                }
                let next_hops = hops + 1;
                if next_hops >= 2 {
                    derived.push(DerivedEdge {
                        edge: RelationEdge {
                            subject: subject_display.clone(),
                            relation: Relation::IsA,
                            object: self.display_key(&graph[next]),
                        },
                        hops: next_hops,
                        via: path.iter().map(|n| self.display_key(&graph[*n])).collect(),
                    });
                }
                let mut next_path = path.clone();
                next_path.push(next);
                queue.push_back((next, next_hops, next_path));
            }
        }

        tracing::debug!(subject = %subject_display, derived = derived.len(), "inferred IS_A closure");
        derived
    }

    /// Store every derived edge for `subject` as a direct relation.
    ///
    /// Returns the number of edges newly stored.
    pub fn persist_inferences(&self, subject: &str) -> usize {
        let derived = self.infer(subject);
        let stored = derived
            .into_iter()
            .filter(|d| self.store_relation(d.edge.clone()))
            .count();
        if stored > 0 {
            tracing::info!(subject, stored, "persisted inferred relations");
        }
        stored
    }
}
