//! Named edge conditions.
//!
//! Edges refer to predicates by name; the registry maps each name to a
//! function of the live [`Execution`]. Built-ins:
//!
//! | name       | true when                         |
//! |------------|-----------------------------------|
//! | `success`  | no error has been recorded        |
//! | `error`    | at least one error is recorded    |
//! | `has_data` | `current_data` is non-empty       |
//!
//! A name with no registered predicate evaluates to `true`, so an edge with
//! an unknown condition is always taken.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::execution::Execution;

/// A condition evaluated against the execution state.
pub type Predicate = Arc<dyn Fn(&Execution) -> bool + Send + Sync>;

/// Name → predicate dispatch table.
#[derive(Clone)]
pub struct ConditionRegistry {
    predicates: HashMap<String, Predicate>,
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("ConditionRegistry").field("names", &names).finish()
    }
}

impl ConditionRegistry {
    /// A registry with no predicates at all.
    pub fn empty() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    /// A registry holding `success`, `error` and `has_data`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("success", |e: &Execution| e.errors.is_empty());
        registry.register("error", |e: &Execution| !e.errors.is_empty());
        registry.register("has_data", |e: &Execution| has_data(&e.current_data));
        registry
    }

    /// Register (or replace) the predicate for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Execution) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Evaluate `name` against `execution`. Unknown names are `true`.
    pub fn evaluate(&self, name: &str, execution: &Execution) -> bool {
        match self.predicates.get(name) {
            Some(predicate) => predicate(execution),
            None => {
                debug!(condition = name, "unknown condition, edge taken");
                true
            }
        }
    }
}

/// `null`, `{}`, `[]` and `""` are empty; everything else carries data.
pub fn has_data(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
