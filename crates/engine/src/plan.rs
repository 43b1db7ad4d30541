//! Graph compilation — turns a validated definition into an executable plan.
//!
//! The plan holds:
//! - a node registry: node id → [`BoundStep`];
//! - an adjacency map: node id → outgoing [`Transition`]s in declaration order;
//! - the set of terminal nodes (never the `from` of any edge), which complete
//!   their path once they have run.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::conditions::ConditionRegistry;
use crate::config::EngineConfig;
use crate::execution::Execution;
use crate::models::WorkflowDefinition;
use crate::step::BoundStep;
use crate::EngineError;

/// One outgoing edge of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: String,
    pub condition: Option<String>,
}

/// Where traversal goes after a node has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Continue with this node.
    Next(&'a str),
    /// The node has no outgoing edges.
    Terminal,
    /// The node has edges but none of them matched.
    NoMatch,
}

/// A compiled workflow.
#[derive(Debug, Clone)]
pub struct ExecutablePlan {
    entry_point: String,
    steps: HashMap<String, BoundStep>,
    transitions: HashMap<String, Vec<Transition>>,
    terminals: HashSet<String>,
}

impl ExecutablePlan {
    /// Compile `definition` with `settings` supplying step timeouts and retry limits.
    ///
    /// Expects a definition that passed [`crate::validate`]; a missing part
    /// is reported as [`EngineError::Incomplete`] rather than guessed at.
    pub fn compile(definition: &WorkflowDefinition, settings: &EngineConfig) -> Result<Self, EngineError> {
        let nodes = definition.nodes.as_ref().ok_or(EngineError::Incomplete("nodes"))?;
        let edges = definition.edges.as_ref().ok_or(EngineError::Incomplete("edges"))?;
        let entry_point = definition
            .entry_point
            .clone()
            .ok_or(EngineError::Incomplete("entry_point"))?;

        let mut steps = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id.clone().ok_or(EngineError::Incomplete("node id"))?;
            let step = BoundStep {
                id: id.clone(),
                capability: node.capability.clone().ok_or(EngineError::Incomplete("node capability"))?,
                action: node.action.clone().ok_or(EngineError::Incomplete("node action"))?,
                config: node.config.clone(),
                timeout: settings.node_timeout(&node.config),
                max_retries: settings.node_max_retries(&node.config),
            };
            steps.insert(id, step);
        }

        let mut transitions: HashMap<String, Vec<Transition>> = HashMap::new();
        for edge in edges {
            let from = edge.from.clone().ok_or(EngineError::Incomplete("edge source"))?;
            let to = edge.to.clone().ok_or(EngineError::Incomplete("edge target"))?;
            transitions.entry(from).or_default().push(Transition {
                to,
                condition: edge.condition.clone(),
            });
        }

        let terminals: HashSet<String> = steps
            .keys()
            .filter(|id| !transitions.contains_key(id.as_str()))
            .cloned()
            .collect();

        debug!(
            nodes = steps.len(),
            edges = edges.len(),
            terminals = terminals.len(),
            "compiled workflow plan"
        );

        Ok(Self {
            entry_point,
            steps,
            transitions,
            terminals,
        })
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn step(&self, node_id: &str) -> Option<&BoundStep> {
        self.steps.get(node_id)
    }

    /// Outgoing edges of `node_id`, in declaration order.
    pub fn transitions(&self, node_id: &str) -> &[Transition] {
        self.transitions.get(node_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_terminal(&self, node_id: &str) -> bool {
        self.terminals.contains(node_id)
    }

    /// Choose the next node after `node_id` has run.
    ///
    /// Edges are tried in declaration order; an unguarded edge always
    /// matches, a guarded one matches when its condition holds. The first
    /// match wins.
    pub fn route(&self, node_id: &str, execution: &Execution, conditions: &ConditionRegistry) -> Route<'_> {
        if self.is_terminal(node_id) {
            return Route::Terminal;
        }

        self.transitions(node_id)
            .iter()
            .find(|t| match &t.condition {
                None => true,
                Some(name) => conditions.evaluate(name, execution),
            })
            .map(|t| Route::Next(t.to.as_str()))
            .unwrap_or(Route::NoMatch)
    }
}
