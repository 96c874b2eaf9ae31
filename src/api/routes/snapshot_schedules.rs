use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::AppState;
use crate::database::Database;
use crate::error::SnapSchedError;
use crate::schedules::{
    CreateSnapshotScheduleParams, ScheduleExecution, SnapshotSchedule,
    UpdateSnapshotScheduleParams, DEFAULT_SNAPSHOT_PREFIX,
};
use crate::snapshot::{
    cleanup_old_snapshots, execute_all_enabled_schedules, execute_snapshot_schedule,
    get_indices_needing_snapshot, BulkExecutionSummary, ExecutionResult, RetentionResult,
    SnapshotPlan,
};

const DEFAULT_EXECUTION_LIMIT: i64 = 20;
const MAX_EXECUTION_LIMIT: i64 = 500;

fn default_true() -> bool {
    true
}

fn default_snapshot_prefix() -> String {
    DEFAULT_SNAPSHOT_PREFIX.to_string()
}

// Distinguishes an explicit `null` (Some(None)) from an absent field (None)
fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// Request body for creating a schedule
#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub index_pattern: String,
    pub repository: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,
    #[serde(default)]
    pub include_global_state: bool,
    #[serde(default = "default_true")]
    pub skip_write_indices: bool,
    #[serde(default)]
    pub retention_days: Option<i64>,
}

/// Request body for a partial update. Absent fields are left unchanged;
/// `"retention_days": null` clears the retention policy.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateScheduleRequest {
    pub name: Option<String>,
    pub index_pattern: Option<String>,
    pub repository: Option<String>,
    pub enabled: Option<bool>,
    pub snapshot_prefix: Option<String>,
    pub include_global_state: Option<bool>,
    pub skip_write_indices: Option<bool>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub retention_days: Option<Option<i64>>,
}

/// Request body for toggling schedule enabled status
#[derive(Debug, Deserialize)]
pub struct ToggleScheduleRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    pub limit: Option<i64>,
}

/// Error response structure with user-friendly message
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn status_for(e: &SnapSchedError) -> StatusCode {
    match e {
        SnapSchedError::Validation(_) => StatusCode::BAD_REQUEST,
        SnapSchedError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn with_message(e: SnapSchedError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&e);
    let error = match e {
        SnapSchedError::Validation(msg) | SnapSchedError::NotFound(msg) => msg,
        // Internal details stay in the log
        _ => "Internal server error".to_string(),
    };
    (status, Json(ErrorResponse { error }))
}

fn connection() -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, StatusCode>
{
    Database::get_connection().map_err(|e| {
        log::error!("Database error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn load_schedule(
    conn: &rusqlite::Connection,
    schedule_id: i64,
) -> Result<SnapshotSchedule, StatusCode> {
    SnapshotSchedule::get_by_id(conn, schedule_id)
        .map_err(|e| {
            log::error!("Failed to get schedule: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or_else(|| {
            log::warn!("Schedule {} not found", schedule_id);
            StatusCode::NOT_FOUND
        })
}

/// GET /api/snapshot-schedules
/// List all schedules with their last execution
pub async fn list_schedules() -> Result<Json<Vec<SnapshotSchedule>>, StatusCode> {
    let conn = connection()?;

    let schedules = SnapshotSchedule::list_all(&conn).map_err(|e| {
        log::error!("Failed to list schedules: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(schedules))
}

/// POST /api/snapshot-schedules
/// Create a new schedule
pub async fn create_schedule(
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<SnapshotSchedule>), (StatusCode, Json<ErrorResponse>)> {
    let conn = Database::get_connection().map_err(|e| {
        log::error!("Database error: {}", e);
        with_message(e)
    })?;

    let schedule = SnapshotSchedule::create(
        &conn,
        CreateSnapshotScheduleParams {
            name: request.name,
            index_pattern: request.index_pattern,
            repository: request.repository,
            enabled: request.enabled,
            snapshot_prefix: request.snapshot_prefix,
            include_global_state: request.include_global_state,
            skip_write_indices: request.skip_write_indices,
            retention_days: request.retention_days,
        },
    )
    .map_err(|e| {
        log::error!("Failed to create schedule: {}", e);
        with_message(e)
    })?;

    log::info!(
        "Created snapshot schedule '{}' (id: {})",
        schedule.name,
        schedule.schedule_id
    );

    Ok((StatusCode::CREATED, Json(schedule)))
}

/// GET /api/snapshot-schedules/{id}
pub async fn get_schedule(
    Path(schedule_id): Path<i64>,
) -> Result<Json<SnapshotSchedule>, StatusCode> {
    let conn = connection()?;
    Ok(Json(load_schedule(&conn, schedule_id)?))
}

/// PATCH /api/snapshot-schedules/{id}
/// Update only the provided fields
pub async fn update_schedule(
    Path(schedule_id): Path<i64>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<SnapshotSchedule>, (StatusCode, Json<ErrorResponse>)> {
    let conn = Database::get_connection().map_err(|e| {
        log::error!("Database error: {}", e);
        with_message(e)
    })?;

    let updated = SnapshotSchedule::update(
        &conn,
        schedule_id,
        UpdateSnapshotScheduleParams {
            name: request.name,
            index_pattern: request.index_pattern,
            repository: request.repository,
            enabled: request.enabled,
            snapshot_prefix: request.snapshot_prefix,
            include_global_state: request.include_global_state,
            skip_write_indices: request.skip_write_indices,
            retention_days: request.retention_days,
        },
    )
    .map_err(|e| {
        log::error!("Failed to update schedule {}: {}", schedule_id, e);
        with_message(e)
    })?;

    Ok(Json(updated))
}

/// DELETE /api/snapshot-schedules/{id}
/// Delete a schedule and its execution history. Snapshots are kept.
pub async fn delete_schedule(Path(schedule_id): Path<i64>) -> Result<StatusCode, StatusCode> {
    let conn = connection()?;

    SnapshotSchedule::delete(&conn, schedule_id).map_err(|e| {
        log::error!("Failed to delete schedule {}: {}", schedule_id, e);
        status_for(&e)
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/snapshot-schedules/{id}/toggle
/// Toggle schedule enabled status
pub async fn toggle_schedule(
    Path(schedule_id): Path<i64>,
    Json(request): Json<ToggleScheduleRequest>,
) -> Result<StatusCode, StatusCode> {
    let conn = connection()?;

    SnapshotSchedule::set_enabled(&conn, schedule_id, request.enabled).map_err(|e| {
        log::error!("Failed to toggle schedule {}: {}", schedule_id, e);
        status_for(&e)
    })?;

    Ok(StatusCode::OK)
}

/// GET /api/snapshot-schedules/{id}/plan
/// What an execution would capture right now, without creating anything
pub async fn plan_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
) -> Result<Json<SnapshotPlan>, StatusCode> {
    let schedule = {
        let conn = connection()?;
        load_schedule(&conn, schedule_id)?
    };

    let plan = get_indices_needing_snapshot(state.cluster.as_ref(), &schedule)
        .await
        .map_err(|e| {
            log::error!("Failed to plan schedule {}: {}", schedule_id, e);
            StatusCode::BAD_GATEWAY
        })?;

    Ok(Json(plan))
}

/// POST /api/snapshot-schedules/{id}/execute
/// Execute one schedule now. Failures are reported in the result body.
pub async fn execute_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
) -> Result<Json<ExecutionResult>, StatusCode> {
    let mut conn = connection()?;
    let schedule = load_schedule(&conn, schedule_id)?;

    let _guard = state.run_lock.lock().await;
    let result = execute_snapshot_schedule(
        state.cluster.as_ref(),
        &mut conn,
        &schedule,
        &state.snapshot_options,
    )
    .await;

    Ok(Json(result))
}

/// POST /api/snapshot-schedules/{id}/cleanup
/// Apply the schedule's retention policy now
pub async fn cleanup_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
) -> Result<Json<RetentionResult>, StatusCode> {
    let schedule = {
        let conn = connection()?;
        load_schedule(&conn, schedule_id)?
    };

    let _guard = state.run_lock.lock().await;
    let result = cleanup_old_snapshots(state.cluster.as_ref(), &schedule)
        .await
        .map_err(|e| {
            log::error!("Retention cleanup failed for schedule {}: {}", schedule_id, e);
            StatusCode::BAD_GATEWAY
        })?;

    Ok(Json(result))
}

/// GET /api/snapshot-schedules/{id}/executions?limit=N
/// Latest execution records, newest first
pub async fn list_executions(
    Path(schedule_id): Path<i64>,
    Query(query): Query<ExecutionsQuery>,
) -> Result<Json<Vec<ScheduleExecution>>, StatusCode> {
    let conn = connection()?;
    load_schedule(&conn, schedule_id)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_EXECUTION_LIMIT)
        .clamp(1, MAX_EXECUTION_LIMIT);

    let executions = ScheduleExecution::list_for_schedule(&conn, schedule_id, limit).map_err(|e| {
        log::error!("Failed to list executions for schedule {}: {}", schedule_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(executions))
}

/// POST /api/snapshot-schedules/execute-all
/// Execute every enabled schedule now
pub async fn execute_all(
    State(state): State<AppState>,
) -> Result<Json<BulkExecutionSummary>, StatusCode> {
    let mut conn = connection()?;

    let _guard = state.run_lock.lock().await;
    let summary = execute_all_enabled_schedules(
        state.cluster.as_ref(),
        &mut conn,
        &state.snapshot_options,
        state.execution_timeout,
    )
    .await
    .map_err(|e| {
        log::error!("Failed to execute enabled schedules: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(summary))
}
