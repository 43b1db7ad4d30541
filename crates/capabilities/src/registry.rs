//! In-process capability providers.
//!
//! A [`CapabilityRegistry`] maps capability names to [`Capability`] handlers
//! and is itself a [`CapabilityInvoker`], so the engine can run against local
//! handlers exactly as it would against a remote provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{CapabilityError, CapabilityInvoker, CapabilityRequest};

/// A provider implemented inside this process.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Perform `request.action` for `tenant_id` and return the raw response.
    async fn call(&self, tenant_id: &str, request: CapabilityRequest) -> Result<Value, CapabilityError>;
}

/// Name → handler dispatch table.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in `echo` capability.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", Arc::new(EchoCapability));
        registry
    }

    /// Register (or replace) the handler for `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn Capability>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered capability names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl CapabilityInvoker for CapabilityRegistry {
    async fn invoke(
        &self,
        capability: &str,
        tenant_id: &str,
        request: CapabilityRequest,
    ) -> Result<Value, CapabilityError> {
        let handler = self
            .handlers
            .get(capability)
            .ok_or_else(|| CapabilityError::UnknownCapability(capability.to_owned()))?;

        debug!(capability, action = %request.action, step = %request.step_id, "dispatching in-process capability");
        handler.call(tenant_id, request).await
    }
}

/// Returns its input under `data`, tagged with the action that was requested.
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    async fn call(&self, tenant_id: &str, request: CapabilityRequest) -> Result<Value, CapabilityError> {
        Ok(json!({
            "action": request.action,
            "tenant_id": tenant_id,
            "data": request.input,
        }))
    }
}
