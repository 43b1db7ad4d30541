//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate; statuses are stored as the
//! lowercase strings the engine's enums display as.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// A persisted workflow execution row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub tenant_id: String,
    pub status: String,
    pub current_step: Option<String>,
    pub step_count: i32,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub results: serde_json::Value,
    pub errors: serde_json::Value,
    pub retry_count: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Fields written when an execution changes state.
///
/// `None` leaves the stored column untouched.
#[derive(Debug, Clone)]
pub struct ExecutionChanges {
    pub status: String,
    pub current_step: Option<String>,
    pub step_count: i32,
    pub output: Option<serde_json::Value>,
    pub results: Option<serde_json::Value>,
    pub errors: Option<serde_json::Value>,
    pub retry_count: i32,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// step_logs
// ---------------------------------------------------------------------------

/// A persisted step log row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepLogRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_index: i32,
    pub step_id: String,
    pub capability: String,
    pub action: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub status: String,
    pub error: Option<String>,
    pub retry_attempt: i32,
    pub duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
