use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn, Level};
use logging_timer::timer;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cluster::{SnapshotCluster, SnapshotCreateRequest};
use crate::config::SnapshotOptions;
use crate::error::SnapSchedError;
use crate::schedules::{ExecutionOutcome, ScheduleExecution, SnapshotSchedule};
use crate::snapshot::planner::get_indices_needing_snapshot;

const CREATED_BY: &str = "scheduled_job";

/// What one execution of a schedule did. Failures are reported here with
/// `success = false`; an empty plan is a success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub schedule_id: i64,
    pub schedule_name: String,
    pub snapshot_name: Option<String>,
    pub indices_snapshotted: Vec<String>,
    pub skipped_write_indices: Vec<String>,
    pub already_snapshotted_count: usize,
    pub success: bool,
    pub message: String,
}

impl ExecutionResult {
    fn failed(schedule: &SnapshotSchedule, message: String) -> Self {
        ExecutionResult {
            schedule_id: schedule.schedule_id,
            schedule_name: schedule.name.clone(),
            snapshot_name: None,
            indices_snapshotted: Vec::new(),
            skipped_write_indices: Vec::new(),
            already_snapshotted_count: 0,
            success: false,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkExecutionSummary {
    pub results: Vec<ExecutionResult>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Plan, then issue the snapshot-create call. Errors here are turned into a
/// failed execution by the caller.
async fn attempt_schedule<C>(
    cluster: &C,
    schedule: &SnapshotSchedule,
    options: &SnapshotOptions,
) -> Result<(ExecutionOutcome, ExecutionResult), SnapSchedError>
where
    C: SnapshotCluster + ?Sized,
{
    let plan = get_indices_needing_snapshot(cluster, schedule).await?;
    let already_snapshotted_count = plan.already_snapshotted_indices.len();

    if plan.is_empty() {
        let message = plan.skip_reason();
        return Ok((
            ExecutionOutcome::Skipped,
            ExecutionResult {
                schedule_id: schedule.schedule_id,
                schedule_name: schedule.name.clone(),
                snapshot_name: None,
                indices_snapshotted: Vec::new(),
                skipped_write_indices: plan.skipped_write_indices,
                already_snapshotted_count,
                success: true,
                message,
            },
        ));
    }

    let snapshot_name = schedule.generate_snapshot_name(Utc::now());
    let request = SnapshotCreateRequest {
        repository: schedule.repository.clone(),
        snapshot_name: snapshot_name.clone(),
        indices: plan.indices_to_snapshot.clone(),
        ignore_unavailable: options.ignore_unavailable,
        include_global_state: schedule.include_global_state,
        partial: options.partial,
        wait_for_completion: options.wait_for_completion,
        metadata: json!({
            "schedule_id": schedule.schedule_id,
            "schedule_name": schedule.name,
            "created_by": CREATED_BY,
            "skipped_write_indices": plan.skipped_write_indices,
            "already_snapshotted_count": already_snapshotted_count,
        }),
    };

    let created = cluster.create_snapshot(&request).await?;

    let result = if created.success {
        let mut message = format!(
            "Created snapshot {} with {} indices",
            snapshot_name,
            request.indices.len()
        );
        if let Some(shards) = created.shards {
            message.push_str(&format!(
                " ({}/{} shards successful)",
                shards.successful, shards.total
            ));
        }

        ExecutionResult {
            schedule_id: schedule.schedule_id,
            schedule_name: schedule.name.clone(),
            snapshot_name: Some(snapshot_name),
            indices_snapshotted: plan.indices_to_snapshot,
            skipped_write_indices: plan.skipped_write_indices,
            already_snapshotted_count,
            success: true,
            message,
        }
    } else {
        ExecutionResult {
            schedule_id: schedule.schedule_id,
            schedule_name: schedule.name.clone(),
            snapshot_name: None,
            indices_snapshotted: Vec::new(),
            skipped_write_indices: plan.skipped_write_indices,
            already_snapshotted_count,
            success: false,
            message: created.message,
        }
    };

    let outcome = if result.success {
        ExecutionOutcome::Success
    } else {
        ExecutionOutcome::Failed
    };

    Ok((outcome, result))
}

/// Persist the execution. A failure here is logged and never changes the
/// outcome reported to the caller.
fn record_execution(conn: &Connection, outcome: ExecutionOutcome, result: &ExecutionResult) {
    let execution = ScheduleExecution {
        snapshot_name: result.snapshot_name.clone(),
        indices_snapshotted: result.indices_snapshotted.clone(),
        skipped_write_indices: result.skipped_write_indices.clone(),
        already_snapshotted_count: result.already_snapshotted_count as i64,
        ..ScheduleExecution::new(result.schedule_id, outcome, result.message.clone())
    };

    match execution.record(conn) {
        Ok(execution_id) => debug!(
            "Recorded execution {} of schedule {}: {}",
            execution_id,
            result.schedule_id,
            execution.status_label()
        ),
        Err(e) => error!(
            "Failed to record execution of schedule {}: {}",
            result.schedule_id, e
        ),
    }
}

async fn run_schedule<C>(
    cluster: &C,
    conn: &mut Connection,
    schedule: &SnapshotSchedule,
    options: &SnapshotOptions,
    timeout: Option<Duration>,
) -> ExecutionResult
where
    C: SnapshotCluster + ?Sized,
{
    let attempt = match timeout {
        Some(limit) => {
            match tokio::time::timeout(limit, attempt_schedule(cluster, schedule, options)).await {
                Ok(attempt) => attempt.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
            }
        }
        None => attempt_schedule(cluster, schedule, options)
            .await
            .map_err(|e| e.to_string()),
    };

    let (outcome, result) = match attempt {
        Ok(attempt) => attempt,
        Err(message) => (
            ExecutionOutcome::Failed,
            ExecutionResult::failed(schedule, message),
        ),
    };

    record_execution(conn, outcome, &result);

    match outcome {
        ExecutionOutcome::Success => info!(
            "Schedule '{}' ({}): {}",
            schedule.name, schedule.schedule_id, result.message
        ),
        ExecutionOutcome::Skipped => info!(
            "Schedule '{}' ({}) skipped: {}",
            schedule.name, schedule.schedule_id, result.message
        ),
        ExecutionOutcome::Failed => warn!(
            "Schedule '{}' ({}) failed: {}",
            schedule.name, schedule.schedule_id, result.message
        ),
    }

    result
}

/// Execute one schedule now: plan, create the snapshot and record the outcome.
pub async fn execute_snapshot_schedule<C>(
    cluster: &C,
    conn: &mut Connection,
    schedule: &SnapshotSchedule,
    options: &SnapshotOptions,
) -> ExecutionResult
where
    C: SnapshotCluster + ?Sized,
{
    run_schedule(cluster, conn, schedule, options, None).await
}

/// Execute every enabled schedule in id order. Each schedule is independent:
/// a failure (or a timeout, when `timeout` is set) is recorded and the sweep
/// moves on. Only the initial schedule query can fail the call.
pub async fn execute_all_enabled_schedules<C>(
    cluster: &C,
    conn: &mut Connection,
    options: &SnapshotOptions,
    timeout: Option<Duration>,
) -> Result<BulkExecutionSummary, SnapSchedError>
where
    C: SnapshotCluster + ?Sized,
{
    let _tmr = timer!(Level::Trace; "execute_all_enabled_schedules");

    let schedules = SnapshotSchedule::list_enabled(conn)?;
    let mut results = Vec::with_capacity(schedules.len());

    for schedule in &schedules {
        results.push(run_schedule(cluster, conn, schedule, options, timeout).await);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let summary = BulkExecutionSummary {
        total: results.len(),
        succeeded,
        failed: results.len() - succeeded,
        results,
    };

    info!(
        "Executed {} enabled schedules: {} succeeded, {} failed",
        summary.total, summary.succeeded, summary.failed
    );

    Ok(summary)
}
