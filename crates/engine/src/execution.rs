//! The execution record and its step log.
//!
//! An [`Execution`] is owned by the coordinator for the duration of a run and
//! mutated by exactly one task at a time. Step logs are appended through
//! [`Execution::append_log`], the single point that assigns `step_index`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::control::ControlSignal;
use crate::EngineError;

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// Lifecycle of one run.
///
/// ```text
/// pending ──► running ──► completed | failed
///    │           ├──────► paused | canceled   (external control signal)
///    └──────────────────► failed              (definition rejected)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
    Canceled,
}

impl ExecutionStatus {
    /// Whether the engine may move from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Paused)
                | (Running, Canceled)
        )
    }

    /// `completed`, `failed` and `canceled` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Paused => write!(f, "paused"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "paused"    => Ok(Self::Paused),
            "canceled"  => Ok(Self::Canceled),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Step log
// ---------------------------------------------------------------------------

/// Outcome recorded for one step log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Retrying,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending  => write!(f, "pending"),
            Self::Running  => write!(f, "running"),
            Self::Success  => write!(f, "success"),
            Self::Failed   => write!(f, "failed"),
            Self::Skipped  => write!(f, "skipped"),
            Self::Retrying => write!(f, "retrying"),
        }
    }
}

/// One append-only audit record for a node attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    /// 0-based, strictly increasing within an execution.
    pub step_index: u32,
    pub step_id: String,
    pub capability: String,
    pub action: String,
    pub input: Value,
    pub output: Option<Value>,
    pub status: StepStatus,
    pub error: Option<String>,
    pub retry_attempt: u32,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepLog {
    /// How long the attempt took.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

// ---------------------------------------------------------------------------
// Errors carried by an execution
// ---------------------------------------------------------------------------

/// One entry of [`Execution::errors`].
///
/// `step` and `capability` are set for step failures and left empty for
/// definition errors and engine faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub step: Option<String>,
    pub capability: Option<String>,
    pub error: String,
}

impl StepError {
    pub fn step(step: impl Into<String>, capability: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            capability: Some(capability.into()),
            error: error.into(),
        }
    }

    pub fn engine(error: impl Into<String>) -> Self {
        Self {
            step: None,
            capability: None,
            error: error.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// In-flight state of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub tenant_id: String,
    pub status: ExecutionStatus,
    pub current_step: Option<String>,
    /// Nodes executed so far, whatever their outcome.
    pub step_count: u32,
    pub input: Value,
    /// Payload threaded from node to node.
    pub current_data: Value,
    /// Raw provider response per node id.
    pub results: BTreeMap<String, Value>,
    pub errors: Vec<StepError>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub step_logs: Vec<StepLog>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// A fresh `pending` execution.
    pub fn new(id: Uuid, workflow_id: Uuid, tenant_id: impl Into<String>, input: Value) -> Self {
        Self {
            id,
            workflow_id,
            tenant_id: tenant_id.into(),
            status: ExecutionStatus::Pending,
            current_step: None,
            step_count: 0,
            current_data: input.clone(),
            input,
            results: BTreeMap::new(),
            errors: Vec::new(),
            retry_count: 0,
            max_retries: 0,
            step_logs: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `next`, enforcing the lifecycle.
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// `pending` → `running`.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Settle a still-running execution as `completed` or `failed` depending
    /// on whether any error was recorded. Paused or canceled runs are left alone.
    pub fn finish(&mut self) -> Result<(), EngineError> {
        if self.status != ExecutionStatus::Running {
            return Ok(());
        }
        let outcome = if self.errors.is_empty() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        self.transition(outcome)
    }

    /// Reject a `pending` execution whose definition failed validation.
    pub fn reject(&mut self, errors: impl IntoIterator<Item = String>) -> Result<(), EngineError> {
        self.errors.extend(errors.into_iter().map(StepError::engine));
        self.transition(ExecutionStatus::Failed)
    }

    /// Stop a running execution on behalf of an external control signal.
    pub fn interrupt(&mut self, signal: ControlSignal) -> Result<(), EngineError> {
        let next = match signal {
            ControlSignal::Pause => ExecutionStatus::Paused,
            ControlSignal::Cancel => ExecutionStatus::Canceled,
        };
        self.transition(next)
    }

    /// Record an engine fault. Only a panic is charged to `current_step`;
    /// budget, plan and transition faults happen between nodes.
    pub fn record_fault(&mut self, fault: &EngineError) {
        let step = match fault {
            EngineError::Panicked(_) => self.current_step.clone(),
            _ => None,
        };
        self.errors.push(StepError {
            step,
            capability: None,
            error: fault.to_string(),
        });
    }

    /// Append a step log entry, assigning it the next `step_index`.
    pub fn append_log(&mut self, mut entry: StepLog) -> &StepLog {
        entry.step_index = u32::try_from(self.step_logs.len()).unwrap_or(u32::MAX);
        self.step_logs.push(entry);
        &self.step_logs[self.step_logs.len() - 1]
    }

    /// Snapshot of the fields a persistence sink records.
    pub fn snapshot(&self) -> ExecutionUpdate {
        ExecutionUpdate {
            status: self.status,
            current_step: self.current_step.clone(),
            step_count: self.step_count,
            output: self.current_data.clone(),
            results: self.results.clone(),
            errors: self.errors.clone(),
            retry_count: self.retry_count,
            finished_at: self.finished_at,
        }
    }

    /// The caller-facing result.
    pub fn result(&self) -> ExecutionResult {
        ExecutionResult {
            execution_id: self.id,
            status: self.status,
            output: self.current_data.clone(),
            results: self.results.clone(),
            errors: self.errors.clone(),
            step_count: self.step_count,
            current_step: self.current_step.clone(),
        }
    }
}

/// Fields handed to [`crate::sink::PersistenceSink::update_execution`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub current_step: Option<String>,
    pub step_count: u32,
    pub output: Value,
    pub results: BTreeMap<String, Value>,
    pub errors: Vec<StepError>,
    pub retry_count: u32,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What every call to [`crate::WorkflowExecutor::execute`] returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub output: Value,
    pub results: BTreeMap<String, Value>,
    pub errors: Vec<StepError>,
    pub step_count: u32,
    pub current_step: Option<String>,
}
