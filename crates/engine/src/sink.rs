//! Persistence sinks for the execution audit trail.
//!
//! The coordinator reports to a [`PersistenceSink`] on a best-effort basis:
//! a failing or absent sink costs observability, never the outcome of a run.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;
use uuid::Uuid;

use db::models::{ExecutionChanges, StepLogRow};
use db::DbPool;

use crate::execution::{Execution, ExecutionUpdate, StepLog};

/// Where execution state and step logs are recorded.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Append one step log entry.
    async fn append_step_log(&self, execution_id: Uuid, entry: &StepLog) -> anyhow::Result<()>;

    /// Record the current state of an execution.
    async fn update_execution(&self, execution_id: Uuid, update: &ExecutionUpdate) -> anyhow::Result<()>;

    /// Called once when a run starts, before any step log.
    async fn begin_execution(&self, execution: &Execution) -> anyhow::Result<()> {
        self.update_execution(execution.id, &execution.snapshot()).await
    }
}

/// Await one sink call. An error or a panic is logged and swallowed.
pub(crate) async fn best_effort<F>(what: &str, call: F)
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("failed to {what}: {e:#}"),
        Err(_) => warn!("persistence sink panicked trying to {what}"),
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl PersistenceSink for NoopSink {
    async fn append_step_log(&self, _execution_id: Uuid, _entry: &StepLog) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_execution(&self, _execution_id: Uuid, _update: &ExecutionUpdate) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Keeps everything in memory. Can be told to fail every call.
#[derive(Debug, Default)]
pub struct MemorySink {
    step_logs: Mutex<Vec<(Uuid, StepLog)>>,
    updates: Mutex<Vec<(Uuid, ExecutionUpdate)>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call returns an error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Step logs recorded for `execution_id`, in arrival order.
    pub fn step_logs(&self, execution_id: Uuid) -> Vec<StepLog> {
        self.step_logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(id, _)| *id == execution_id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Execution updates recorded for `execution_id`, in arrival order.
    pub fn updates(&self, execution_id: Uuid) -> Vec<ExecutionUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(id, _)| *id == execution_id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("memory sink configured to fail"));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn append_step_log(&self, execution_id: Uuid, entry: &StepLog) -> anyhow::Result<()> {
        self.check()?;
        self.step_logs
            .lock()
            .map_err(|_| anyhow!("step log buffer poisoned"))?
            .push((execution_id, entry.clone()));
        Ok(())
    }

    async fn update_execution(&self, execution_id: Uuid, update: &ExecutionUpdate) -> anyhow::Result<()> {
        self.check()?;
        self.updates
            .lock()
            .map_err(|_| anyhow!("update buffer poisoned"))?
            .push((execution_id, update.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PgSink
// ---------------------------------------------------------------------------

/// Writes to the `workflow_executions` / `step_logs` tables.
#[derive(Debug, Clone)]
pub struct PgSink {
    pool: DbPool,
}

impl PgSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn step_log_row(execution_id: Uuid, entry: &StepLog) -> StepLogRow {
    StepLogRow {
        id: Uuid::new_v4(),
        execution_id,
        step_index: to_i32(entry.step_index),
        step_id: entry.step_id.clone(),
        capability: entry.capability.clone(),
        action: entry.action.clone(),
        input: entry.input.clone(),
        output: entry.output.clone(),
        status: entry.status.to_string(),
        error: entry.error.clone(),
        retry_attempt: to_i32(entry.retry_attempt),
        duration_ms: i64::try_from(entry.duration_ms).unwrap_or(i64::MAX),
        started_at: entry.started_at,
        completed_at: entry.completed_at,
    }
}

fn execution_changes(update: &ExecutionUpdate) -> anyhow::Result<ExecutionChanges> {
    Ok(ExecutionChanges {
        status: update.status.to_string(),
        current_step: update.current_step.clone(),
        step_count: to_i32(update.step_count),
        output: Some(update.output.clone()),
        results: Some(serde_json::to_value(&update.results)?),
        errors: Some(serde_json::to_value(&update.errors)?),
        retry_count: to_i32(update.retry_count),
        finished_at: update.finished_at,
    })
}

#[async_trait]
impl PersistenceSink for PgSink {
    async fn append_step_log(&self, execution_id: Uuid, entry: &StepLog) -> anyhow::Result<()> {
        db::repository::executions::insert_step_log(&self.pool, &step_log_row(execution_id, entry))
            .await
            .with_context(|| format!("inserting step log {} for {execution_id}", entry.step_index))
    }

    async fn update_execution(&self, execution_id: Uuid, update: &ExecutionUpdate) -> anyhow::Result<()> {
        let changes = execution_changes(update)?;
        db::repository::executions::update_execution(&self.pool, execution_id, &changes)
            .await
            .with_context(|| format!("updating execution {execution_id}"))
    }

    async fn begin_execution(&self, execution: &Execution) -> anyhow::Result<()> {
        db::repository::executions::create_execution(
            &self.pool,
            execution.id,
            execution.workflow_id,
            &execution.tenant_id,
            &execution.status.to_string(),
            &execution.input,
            execution.started_at.unwrap_or_else(chrono::Utc::now),
        )
        .await
        .with_context(|| format!("recording start of execution {}", execution.id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::StepStatus;
    use chrono::Utc;
    use serde_json::json;

    fn entry(index: u32) -> StepLog {
        StepLog {
            step_index: index,
            step_id: "a".into(),
            capability: "echo".into(),
            action: "run".into(),
            input: json!({}),
            output: Some(json!({ "ok": true })),
            status: StepStatus::Retrying,
            error: Some("flaky".into()),
            retry_attempt: 2,
            duration_ms: 40,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn memory_sink_separates_executions() {
        let sink = MemorySink::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        sink.append_step_log(a, &entry(0)).await.unwrap();
        sink.append_step_log(b, &entry(0)).await.unwrap();
        sink.append_step_log(a, &entry(1)).await.unwrap();

        let logs: Vec<u32> = sink.step_logs(a).iter().map(|l| l.step_index).collect();
        assert_eq!(logs, vec![0, 1]);
        assert_eq!(sink.step_logs(b).len(), 1);
    }

    #[tokio::test]
    async fn failing_sink_errors_on_every_call() {
        let sink = MemorySink::failing();
        assert!(sink.append_step_log(Uuid::new_v4(), &entry(0)).await.is_err());
        assert!(sink.step_logs(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn step_log_row_uses_lowercase_status() {
        let id = Uuid::new_v4();
        let row = step_log_row(id, &entry(3));
        assert_eq!(row.execution_id, id);
        assert_eq!(row.step_index, 3);
        assert_eq!(row.status, "retrying");
        assert_eq!(row.retry_attempt, 2);
        assert_eq!(row.duration_ms, 40);
    }
}
