//! Step execution — runs exactly one node against the execution state.
//!
//! [`BoundStep::execute`] never fails: a provider error becomes an entry in
//! `execution.errors` plus a `failed` step log, and whether that ends the run
//! is left to the edges the coordinator can still take.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use capabilities::{CapabilityError, CapabilityInvoker, CapabilityRequest};

use crate::execution::{Execution, StepError, StepLog, StepStatus};
use crate::extract::OutputExtractor;
use crate::sink::{best_effort, PersistenceSink};

/// A compiled node: everything needed to run it, bound at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStep {
    pub id: String,
    pub capability: String,
    pub action: String,
    pub config: Map<String, Value>,
    /// Deadline for each capability call.
    pub timeout: Duration,
    /// Retries allowed after a retryable failure.
    pub max_retries: u32,
}

/// Collaborators shared by every step of one run.
pub struct StepContext<'a> {
    pub invoker: &'a dyn CapabilityInvoker,
    pub sink: &'a dyn PersistenceSink,
    pub extractor: &'a OutputExtractor,
    pub tenant_id: &'a str,
    pub retry_base_delay: Duration,
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

impl BoundStep {
    /// The provider request for the current state.
    pub fn request(&self, execution: &Execution) -> CapabilityRequest {
        CapabilityRequest {
            action: self.action.clone(),
            input: execution.current_data.clone(),
            config: self.config.clone(),
            execution_id: execution.id,
            step_id: self.id.clone(),
        }
    }

    /// Run the node, retrying retryable failures, and fold the outcome into `execution`.
    #[instrument(skip_all, fields(step = %self.id, capability = %self.capability))]
    pub async fn execute(&self, ctx: &StepContext<'_>, execution: &mut Execution) {
        execution.current_step = Some(self.id.clone());
        let input = execution.current_data.clone();
        let mut attempt = 0u32;

        loop {
            let started_at = Utc::now();
            let clock = Instant::now();
            let outcome = self.call(ctx, self.request(execution)).await;
            let elapsed = clock.elapsed();

            match outcome {
                Ok(response) => {
                    execution.current_data = (ctx.extractor)(&response);
                    execution.results.insert(self.id.clone(), response.clone());
                    execution.step_count += 1;

                    info!(attempt, elapsed_ms = elapsed.as_millis() as u64, "step succeeded");
                    let entry = self.log(input, Some(response), StepStatus::Success, None, attempt, started_at, elapsed);
                    record(ctx, execution, entry).await;
                    return;
                }

                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    execution.retry_count += 1;
                    let delay = backoff(ctx.retry_base_delay, attempt);

                    warn!(
                        "step '{}' retryable error (attempt {}/{}), retrying in {:?}: {}",
                        self.id, attempt, self.max_retries, delay, err
                    );
                    let entry = self.log(
                        input.clone(),
                        None,
                        StepStatus::Retrying,
                        Some(err.to_string()),
                        attempt - 1,
                        started_at,
                        elapsed,
                    );
                    record(ctx, execution, entry).await;

                    tokio::time::sleep(delay).await;
                }

                Err(err) => {
                    let message = err.to_string();
                    warn!(attempt, error = %message, "step failed");

                    execution
                        .errors
                        .push(StepError::step(&self.id, &self.capability, &message));
                    execution.step_count += 1;

                    let entry = self.log(input, None, StepStatus::Failed, Some(message), attempt, started_at, elapsed);
                    record(ctx, execution, entry).await;
                    return;
                }
            }
        }
    }

    /// One invoker call under this step's deadline.
    async fn call(&self, ctx: &StepContext<'_>, request: CapabilityRequest) -> Result<Value, CapabilityError> {
        let invocation = ctx.invoker.invoke(&self.capability, ctx.tenant_id, request);
        match tokio::time::timeout(self.timeout, invocation).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CapabilityError::Retryable(format!(
                "capability '{}' timed out after {}ms",
                self.capability,
                self.timeout.as_millis()
            ))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn log(
        &self,
        input: Value,
        output: Option<Value>,
        status: StepStatus,
        error: Option<String>,
        retry_attempt: u32,
        started_at: chrono::DateTime<Utc>,
        elapsed: Duration,
    ) -> StepLog {
        StepLog {
            // Assigned by `Execution::append_log`.
            step_index: 0,
            step_id: self.id.clone(),
            capability: self.capability.clone(),
            action: self.action.clone(),
            input,
            output,
            status,
            error,
            retry_attempt,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            started_at,
            completed_at: Some(Utc::now()),
        }
    }
}

/// Append to the execution's own log, then forward to the sink best-effort.
async fn record(ctx: &StepContext<'_>, execution: &mut Execution, entry: StepLog) {
    let entry = execution.append_log(entry).clone();
    let what = format!("persist step log {}", entry.step_index);
    best_effort(&what, ctx.sink.append_step_log(execution.id, &entry)).await;
}
