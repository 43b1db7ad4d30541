//! Definition validation — run this before activating or executing a workflow.
//!
//! Rules checked (all of them, every problem is reported):
//! 1. `nodes`, `edges` and `entry_point` are present (an empty `entry_point` counts as missing).
//! 2. There is at least one node.
//! 3. Every node has an `id` not used by an earlier node, a `capability` and an `action`.
//! 4. Every edge has a `from` and a `to` naming declared nodes.
//! 5. `entry_point`, if set, names a declared node.
//!
//! Cycles are allowed. [`is_acyclic`] exists for callers that want to warn
//! about them; runs over cyclic graphs are bounded by the step budget.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{models::WorkflowDefinition, DefinitionError};

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<DefinitionError>,
}

impl ValidationReport {
    /// Human-readable error messages, in the order they were found.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Structurally validate a definition. Pure; never fails.
pub fn validate(definition: &WorkflowDefinition) -> ValidationReport {
    let mut errors = Vec::new();

    if definition.nodes.is_none() {
        errors.push(DefinitionError::MissingField("nodes"));
    }
    if definition.edges.is_none() {
        errors.push(DefinitionError::MissingField("edges"));
    }
    if present(&definition.entry_point).is_none() {
        errors.push(DefinitionError::MissingField("entry_point"));
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------
    let nodes = definition.nodes.as_deref().unwrap_or_default();
    if definition.nodes.is_some() && nodes.is_empty() {
        errors.push(DefinitionError::NoNodes);
    }

    let mut declared: HashSet<&str> = HashSet::new();
    for (index, node) in nodes.iter().enumerate() {
        match present(&node.id) {
            None => errors.push(DefinitionError::NodeMissingField { index, field: "id" }),
            Some(id) => {
                if !declared.insert(id) {
                    errors.push(DefinitionError::DuplicateNodeId(id.to_owned()));
                }
            }
        }
        if present(&node.capability).is_none() {
            errors.push(DefinitionError::NodeMissingField { index, field: "capability" });
        }
        if present(&node.action).is_none() {
            errors.push(DefinitionError::NodeMissingField { index, field: "action" });
        }
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------
    for (index, edge) in definition.edges.as_deref().unwrap_or_default().iter().enumerate() {
        for (side, endpoint) in [("from", &edge.from), ("to", &edge.to)] {
            match present(endpoint) {
                None => errors.push(DefinitionError::EdgeMissingEndpoint { index, side }),
                Some(id) if !declared.contains(id) => {
                    errors.push(DefinitionError::UnknownNodeReference {
                        index,
                        node_id: id.to_owned(),
                        side,
                    });
                }
                Some(_) => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------------
    if let Some(entry) = present(&definition.entry_point) {
        if !declared.contains(entry) {
            errors.push(DefinitionError::UnknownEntryPoint(entry.to_owned()));
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

/// Whether the edge graph has no cycle (Kahn's algorithm).
///
/// Only meaningful for a definition that passed [`validate`]; dangling
/// endpoints are ignored.
pub fn is_acyclic(definition: &WorkflowDefinition) -> bool {
    let nodes = definition.nodes.as_deref().unwrap_or_default();
    let edges = definition.edges.as_deref().unwrap_or_default();

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for id in nodes.iter().filter_map(|n| present(&n.id)) {
        adjacency.entry(id).or_default();
        in_degree.entry(id).or_insert(0);
    }

    for edge in edges {
        let (Some(from), Some(to)) = (present(&edge.from), present(&edge.to)) else {
            continue;
        };
        if !in_degree.contains_key(from) || !in_degree.contains_key(to) {
            continue;
        }
        adjacency.entry(from).or_default().push(to);
        *in_degree.entry(to).or_insert(0) += 1;
    }

    // Seed the queue with nodes that have no incoming edges.
    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0usize;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                if let Some(deg) = in_degree.get_mut(neighbour) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(neighbour);
                    }
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    visited == in_degree.len()
}
