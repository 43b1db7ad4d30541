//! The `CapabilityInvoker` trait — the contract every provider transport must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CapabilityError;

/// The request handed to a provider for one workflow step.
///
/// Defined here (in the capabilities crate) so both the engine and provider
/// transports can import it without a circular dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// Action the provider should perform (e.g. `classify`).
    pub action: String,
    /// Payload threaded from the previous step (or the run input).
    pub input: Value,
    /// Node configuration, forwarded verbatim.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Execution this call belongs to.
    pub execution_id: uuid::Uuid,
    /// Node id inside the workflow definition.
    pub step_id: String,
}

/// Executes a single step's action on behalf of a tenant.
///
/// Implementations own their transport and connection pools; the engine
/// treats the response as opaque JSON.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    async fn invoke(
        &self,
        capability: &str,
        tenant_id: &str,
        request: CapabilityRequest,
    ) -> Result<Value, CapabilityError>;
}
