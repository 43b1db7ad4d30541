//! `MockInvoker` — a test double for `CapabilityInvoker`.
//!
//! Behaviour is looked up by step id first, then by capability name, so a
//! test can script individual nodes even when they share a capability.
//! Anything unscripted answers `{ "step": <step_id> }`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{CapabilityError, CapabilityInvoker, CapabilityRequest};

/// Behaviour injected into `MockInvoker` for a step or capability.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail with `Retryable` for the first `failures` calls, then return `value`.
    Flaky { failures: usize, value: Value },
    /// Sleep before returning `value`.
    Delay { duration: Duration, value: Value },
    /// Panic inside the call.
    Panic(String),
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub capability: String,
    pub tenant_id: String,
    pub request: CapabilityRequest,
}

/// A mock invoker that records every call it receives and returns
/// programmer-specified results.
#[derive(Default, Clone)]
pub struct MockInvoker {
    behaviours: HashMap<String, MockBehaviour>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behaviour for a step id or capability name.
    pub fn on(mut self, key: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.behaviours.insert(key.into(), behaviour);
        self
    }

    /// Shorthand for `on(key, MockBehaviour::ReturnValue(value))`.
    pub fn returning(self, key: impl Into<String>, value: Value) -> Self {
        self.on(key, MockBehaviour::ReturnValue(value))
    }

    /// Shorthand for `on(key, MockBehaviour::FailFatal(msg))`.
    pub fn failing(self, key: impl Into<String>, msg: impl Into<String>) -> Self {
        self.on(key, MockBehaviour::FailFatal(msg.into()))
    }

    /// Every call seen so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Total number of calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Step ids in the order they were invoked.
    pub fn invoked_steps(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.request.step_id.clone())
            .collect()
    }

    fn attempts_for(&self, step_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.request.step_id == step_id)
            .count()
    }
}

#[async_trait]
impl CapabilityInvoker for MockInvoker {
    async fn invoke(
        &self,
        capability: &str,
        tenant_id: &str,
        request: CapabilityRequest,
    ) -> Result<Value, CapabilityError> {
        let step_id = request.step_id.clone();
        self.calls.lock().unwrap().push(MockCall {
            capability: capability.to_owned(),
            tenant_id: tenant_id.to_owned(),
            request,
        });

        let behaviour = self
            .behaviours
            .get(&step_id)
            .or_else(|| self.behaviours.get(capability));

        match behaviour {
            None => Ok(json!({ "step": step_id })),
            Some(MockBehaviour::ReturnValue(v)) => Ok(v.clone()),
            Some(MockBehaviour::FailRetryable(msg)) => Err(CapabilityError::Retryable(msg.clone())),
            Some(MockBehaviour::FailFatal(msg)) => Err(CapabilityError::Fatal(msg.clone())),
            Some(MockBehaviour::Flaky { failures, value }) => {
                // The current call has already been recorded.
                if self.attempts_for(&step_id) <= *failures {
                    Err(CapabilityError::Retryable(format!("{step_id} is flaky")))
                } else {
                    Ok(value.clone())
                }
            }
            Some(MockBehaviour::Delay { duration, value }) => {
                tokio::time::sleep(*duration).await;
                Ok(value.clone())
            }
            Some(MockBehaviour::Panic(msg)) => panic!("{msg}"),
        }
    }
}
