//! Remote capability providers reached over HTTP.
//!
//! Each call is a `POST {base_url}/capabilities/{capability}/invoke` carrying
//! the [`CapabilityRequest`] as JSON and the tenant in `X-Tenant-Id`. The
//! response body is returned as-is.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::{CapabilityError, CapabilityInvoker, CapabilityRequest};

pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// HTTP transport shared by every execution in the process.
///
/// `reqwest::Client` pools connections internally, so one invoker should be
/// built per process and cloned/shared behind an `Arc`.
pub struct HttpInvoker {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpInvoker {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
        }
    }

    fn endpoint(&self, capability: &str) -> String {
        format!("{}/capabilities/{}/invoke", self.base_url, capability)
    }
}

/// Map a non-success status onto the retry taxonomy.
fn classify_status(status: StatusCode, capability: &str, body: &str) -> CapabilityError {
    let message = format!("capability '{capability}' returned {status}: {body}");
    if status == StatusCode::NOT_FOUND {
        CapabilityError::UnknownCapability(capability.to_owned())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        CapabilityError::Retryable(message)
    } else {
        CapabilityError::Fatal(message)
    }
}

#[async_trait]
impl CapabilityInvoker for HttpInvoker {
    async fn invoke(
        &self,
        capability: &str,
        tenant_id: &str,
        request: CapabilityRequest,
    ) -> Result<Value, CapabilityError> {
        let url = self.endpoint(capability);
        debug!(%url, step = %request.step_id, "invoking remote capability");

        let mut req = self
            .client
            .post(&url)
            .header(TENANT_HEADER, tenant_id)
            .json(&request);

        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CapabilityError::Retryable(format!("request to capability '{capability}' failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, capability, &body));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| CapabilityError::Fatal(format!("capability '{capability}' sent an invalid response: {e}")))
    }
}
