//! Engine-level error types.

use thiserror::Error;

use crate::execution::ExecutionStatus;

/// A structural problem in a workflow definition.
///
/// The validator collects every one it finds rather than stopping at the first.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// `nodes`, `edges` or `entry_point` is absent (or empty, for `entry_point`).
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// The node list is empty.
    #[error("workflow must declare at least one node")]
    NoNodes,

    /// A node lacks `id`, `capability` or `action`.
    #[error("node {index}: missing '{field}'")]
    NodeMissingField { index: usize, field: &'static str },

    /// Two or more nodes share the same ID (reported once per repeat).
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge lacks `from` or `to`.
    #[error("edge {index}: missing '{side}'")]
    EdgeMissingEndpoint { index: usize, side: &'static str },

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge {index} references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        index: usize,
        node_id: String,
        side: &'static str,
    },

    /// `entry_point` names a node that doesn't exist.
    #[error("entry_point references unknown node '{0}'")]
    UnknownEntryPoint(String),
}

/// Failures of the engine itself, as opposed to failures of a single step.
///
/// None of these escape [`crate::WorkflowExecutor::execute`]; they are folded
/// into a `failed` result.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The plan was asked to compile a definition lacking a required part.
    #[error("cannot compile workflow: missing {0}")]
    Incomplete(&'static str),

    /// Traversal reached a node id the compiled plan doesn't know.
    #[error("node '{0}' is not part of the compiled plan")]
    UnknownNode(String),

    /// The run hit its `max_steps` safety bound.
    #[error("step budget of {0} exhausted")]
    StepBudgetExhausted(u32),

    /// A state change the execution lifecycle forbids.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// Something panicked during compilation or traversal.
    #[error("engine panicked: {0}")]
    Panicked(String),

    /// Engine configuration could not be parsed.
    #[error("invalid engine config: {0}")]
    Config(#[from] toml::de::Error),
}
