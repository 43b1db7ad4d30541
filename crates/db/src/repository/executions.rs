//! Execution and step-log repository functions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionChanges, ExecutionRow, StepLogRow},
};

const EXECUTION_COLUMNS: &str = "id, workflow_id, tenant_id, status, current_step, step_count, \
     input, output, results, errors, retry_count, started_at, finished_at";

const STEP_LOG_COLUMNS: &str = "id, execution_id, step_index, step_id, capability, action, \
     input, output, status, error, retry_attempt, duration_ms, started_at, completed_at";

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// Record an execution, or reset the status of one the caller already created.
pub async fn create_execution(
    pool: &PgPool,
    id: Uuid,
    workflow_id: Uuid,
    tenant_id: &str,
    status: &str,
    input: &serde_json::Value,
    started_at: DateTime<Utc>,
) -> Result<ExecutionRow, DbError> {
    let sql = format!(
        r#"
        INSERT INTO workflow_executions (id, workflow_id, tenant_id, status, input, started_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, started_at = EXCLUDED.started_at
        RETURNING {EXECUTION_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(id)
        .bind(workflow_id)
        .bind(tenant_id)
        .bind(status)
        .bind(input)
        .bind(started_at)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Apply `changes` to an execution row.
///
/// Returns `DbError::NotFound` if no row was updated.
pub async fn update_execution(
    pool: &PgPool,
    execution_id: Uuid,
    changes: &ExecutionChanges,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status       = $1,
            current_step = COALESCE($2, current_step),
            step_count   = $3,
            output       = COALESCE($4, output),
            results      = COALESCE($5, results),
            errors       = COALESCE($6, errors),
            retry_count  = $7,
            finished_at  = COALESCE($8, finished_at)
        WHERE id = $9
        "#,
    )
    .bind(&changes.status)
    .bind(&changes.current_step)
    .bind(changes.step_count)
    .bind(&changes.output)
    .bind(&changes.results)
    .bind(&changes.errors)
    .bind(changes.retry_count)
    .bind(changes.finished_at)
    .bind(execution_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound { table: "workflow_executions", id: execution_id });
    }

    Ok(())
}

/// Fetch a single execution by its primary key.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<ExecutionRow, DbError> {
    let sql = format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = $1");

    sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound { table: "workflow_executions", id })
}

// ---------------------------------------------------------------------------
// step_logs
// ---------------------------------------------------------------------------

/// Append one step log entry.
///
/// `(execution_id, step_index)` is unique, so replaying the same entry fails
/// instead of duplicating the audit trail.
pub async fn insert_step_log(pool: &PgPool, row: &StepLogRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO step_logs
            (id, execution_id, step_index, step_id, capability, action, input, output,
             status, error, retry_attempt, duration_ms, started_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(row.id)
    .bind(row.execution_id)
    .bind(row.step_index)
    .bind(&row.step_id)
    .bind(&row.capability)
    .bind(&row.action)
    .bind(&row.input)
    .bind(&row.output)
    .bind(&row.status)
    .bind(&row.error)
    .bind(row.retry_attempt)
    .bind(row.duration_ms)
    .bind(row.started_at)
    .bind(row.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Return an execution's step logs in `step_index` order.
pub async fn list_step_logs(pool: &PgPool, execution_id: Uuid) -> Result<Vec<StepLogRow>, DbError> {
    let sql = format!(
        "SELECT {STEP_LOG_COLUMNS} FROM step_logs WHERE execution_id = $1 ORDER BY step_index ASC"
    );

    let rows = sqlx::query_as::<_, StepLogRow>(&sql)
        .bind(execution_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
