//! Workflow definition models.
//!
//! A definition arrives from outside (API payload, stored JSON, a file on
//! disk) and may be structurally broken, so every field the validator checks
//! is optional here. [`crate::validate`] decides whether it is usable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// NodeSpec
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: Option<String>,
    /// Name of the capability provider that performs the step.
    pub capability: Option<String>,
    /// Action requested from the provider.
    pub action: Option<String>,
    /// Opaque configuration forwarded to the provider.
    ///
    /// `timeout_ms` and `max_retries` are also read by the engine.
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, capability: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            capability: Some(capability.into()),
            action: Some(action.into()),
            config: Map::new(),
        }
    }

    /// Set one config entry.
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// EdgeSpec
// ---------------------------------------------------------------------------

/// Directed edge from one node to another, optionally guarded by a named condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl EdgeSpec {
    /// Unconditional edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
            condition: None,
        }
    }

    /// Edge taken only when `condition` holds.
    pub fn when(from: impl Into<String>, to: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            condition: Some(condition.into()),
            ..Self::new(from, to)
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

fn default_version() -> u32 {
    1
}

/// A versioned workflow definition. Immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    pub nodes: Option<Vec<NodeSpec>>,
    pub edges: Option<Vec<EdgeSpec>>,
    pub entry_point: Option<String>,
}

impl WorkflowDefinition {
    /// Convenience constructor.
    pub fn new(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>, entry_point: impl Into<String>) -> Self {
        Self {
            name: None,
            version: default_version(),
            nodes: Some(nodes),
            edges: Some(edges),
            entry_point: Some(entry_point.into()),
        }
    }

    /// Chain `ids` with unconditional edges, entering at the first one.
    /// Every node uses `capability` and the action `run`.
    pub fn linear(ids: &[&str], capability: &str) -> Self {
        let nodes = ids.iter().map(|id| NodeSpec::new(*id, capability, "run")).collect();
        let edges = ids.windows(2).map(|w| EdgeSpec::new(w[0], w[1])).collect();
        Self::new(nodes, edges, ids.first().copied().unwrap_or_default())
    }
}
