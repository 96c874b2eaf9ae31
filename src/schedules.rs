use chrono::{DateTime, Utc};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::SnapSchedError;
use crate::indices::split_patterns;

pub const DEFAULT_SNAPSHOT_PREFIX: &str = "scheduled";

// Characters the cluster refuses in snapshot names
const INVALID_SNAPSHOT_NAME_CHARS: [char; 10] = ['\\', '/', '*', '?', '"', '<', '>', '|', ',', '#'];

// The `YYYYMMDD_HHMMSS` suffix of a generated snapshot name
static SNAPSHOT_TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{8}_\d{6}$").expect("static snapshot timestamp regex is valid")
});

/// Lowercase and replace spaces with underscores, the normalisation applied
/// to every generated snapshot name
fn normalize_snapshot_name(raw: &str) -> String {
    raw.to_lowercase().replace(' ', "_")
}

/// Parameters for creating a new schedule
#[derive(Debug, Clone)]
pub struct CreateSnapshotScheduleParams {
    pub name: String,
    pub index_pattern: String,
    pub repository: String,
    pub enabled: bool,
    pub snapshot_prefix: String,
    pub include_global_state: bool,
    pub skip_write_indices: bool,
    pub retention_days: Option<i64>,
}

/// Partial update: only `Some` fields are replaced.
/// `retention_days: Some(None)` clears the retention policy.
#[derive(Debug, Clone, Default)]
pub struct UpdateSnapshotScheduleParams {
    pub name: Option<String>,
    pub index_pattern: Option<String>,
    pub repository: Option<String>,
    pub enabled: Option<bool>,
    pub snapshot_prefix: Option<String>,
    pub include_global_state: Option<bool>,
    pub skip_write_indices: Option<bool>,
    pub retention_days: Option<Option<i64>>,
}

/// A recurring snapshot policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSchedule {
    pub schedule_id: i64,
    pub name: String,
    pub index_pattern: String,
    pub repository: String,
    pub enabled: bool,
    pub snapshot_prefix: String,
    pub include_global_state: bool,
    pub skip_write_indices: bool,
    pub retention_days: Option<i64>,

    // Projection of the execution records, not stored on the schedule row
    pub last_execution_time: Option<i64>,
    pub last_snapshot_name: Option<String>,
    pub last_execution_status: Option<String>,

    // Metadata
    pub created_at: i64, // Unix timestamp (UTC)
    pub updated_at: i64, // Unix timestamp (UTC)
}

const SCHEDULE_SELECT: &str = "SELECT
        s.schedule_id, s.name, s.index_pattern, s.repository, s.enabled,
        s.snapshot_prefix, s.include_global_state, s.skip_write_indices, s.retention_days,
        s.created_at, s.updated_at,
        le.executed_at, le.outcome, le.message,
        (SELECT e.snapshot_name FROM schedule_executions e
            WHERE e.schedule_id = s.schedule_id AND e.outcome = 0 AND e.snapshot_name IS NOT NULL
            ORDER BY e.execution_id DESC LIMIT 1)
    FROM snapshot_schedules s
    LEFT JOIN schedule_executions le ON le.execution_id = (
        SELECT MAX(e.execution_id) FROM schedule_executions e WHERE e.schedule_id = s.schedule_id
    )";

impl SnapshotSchedule {
    /// Validate field invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if self.repository.trim().is_empty() {
            return Err("repository cannot be empty".to_string());
        }
        if self.snapshot_prefix.trim().is_empty() {
            return Err("snapshot_prefix cannot be empty".to_string());
        }
        if self.index_patterns().is_empty() {
            return Err("index_pattern cannot be empty".to_string());
        }
        if let Some(days) = self.retention_days {
            if days <= 0 {
                return Err(format!("retention_days must be positive, got: {}", days));
            }
        }

        let prefix = self.snapshot_name_prefix();
        if let Some(c) = prefix
            .chars()
            .find(|c| INVALID_SNAPSHOT_NAME_CHARS.contains(c) || c.is_whitespace())
        {
            return Err(format!(
                "snapshot name prefix '{}' contains invalid character '{}'",
                prefix, c
            ));
        }

        Ok(())
    }

    /// `"{snapshot_prefix}_{name}_"`, normalised. Every snapshot this schedule
    /// creates starts with it, and history lookups recognise the schedule's
    /// snapshots by it.
    pub fn snapshot_name_prefix(&self) -> String {
        normalize_snapshot_name(&format!("{}_{}_", self.snapshot_prefix, self.name))
    }

    /// Snapshot name for an execution at `at`: the prefix followed by a UTC
    /// `YYYYMMDD_HHMMSS` timestamp
    pub fn generate_snapshot_name(&self, at: DateTime<Utc>) -> String {
        format!("{}{}", self.snapshot_name_prefix(), at.format("%Y%m%d_%H%M%S"))
    }

    /// True when `snapshot_name` is exactly this schedule's prefix followed by
    /// a generated timestamp. Schedule `daily` does not own
    /// `scheduled_daily_logs_20250101_000000`.
    pub fn owns_snapshot(&self, snapshot_name: &str) -> bool {
        snapshot_name
            .strip_prefix(&self.snapshot_name_prefix())
            .is_some_and(|suffix| SNAPSHOT_TIMESTAMP_RE.is_match(suffix))
    }

    /// The entries of the comma-separated `index_pattern`
    pub fn index_patterns(&self) -> Vec<String> {
        split_patterns(&self.index_pattern)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let outcome = row
            .get::<_, Option<i32>>(12)?
            .map(|v| {
                ExecutionOutcome::from_i32(v).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(
                        12,
                        "outcome".to_string(),
                        rusqlite::types::Type::Integer,
                    )
                })
            })
            .transpose()?;
        let message: Option<String> = row.get(13)?;

        Ok(SnapshotSchedule {
            schedule_id: row.get(0)?,
            name: row.get(1)?,
            index_pattern: row.get(2)?,
            repository: row.get(3)?,
            enabled: row.get(4)?,
            snapshot_prefix: row.get(5)?,
            include_global_state: row.get(6)?,
            skip_write_indices: row.get(7)?,
            retention_days: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            last_execution_time: row.get(11)?,
            last_execution_status: outcome
                .map(|o| o.status_label(message.as_deref().unwrap_or_default())),
            last_snapshot_name: row.get(14)?,
        })
    }

    // ========================================
    // Database operations
    // ========================================

    /// Validate and insert a new schedule
    pub fn create(
        conn: &Connection,
        params: CreateSnapshotScheduleParams,
    ) -> Result<Self, SnapSchedError> {
        let now = Utc::now().timestamp();

        let schedule = SnapshotSchedule {
            schedule_id: 0, // Will be set by database
            name: params.name.trim().to_owned(),
            index_pattern: params.index_pattern.trim().to_owned(),
            repository: params.repository.trim().to_owned(),
            enabled: params.enabled,
            snapshot_prefix: params.snapshot_prefix.trim().to_owned(),
            include_global_state: params.include_global_state,
            skip_write_indices: params.skip_write_indices,
            retention_days: params.retention_days,
            last_execution_time: None,
            last_snapshot_name: None,
            last_execution_status: None,
            created_at: now,
            updated_at: now,
        };

        schedule.validate().map_err(SnapSchedError::Validation)?;

        let schedule_id: i64 = conn.query_row(
            "INSERT INTO snapshot_schedules (
                name, index_pattern, repository, enabled, snapshot_prefix,
                include_global_state, skip_write_indices, retention_days,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING schedule_id",
            rusqlite::params![
                schedule.name,
                schedule.index_pattern,
                schedule.repository,
                schedule.enabled,
                schedule.snapshot_prefix,
                schedule.include_global_state,
                schedule.skip_write_indices,
                schedule.retention_days,
                schedule.created_at,
                schedule.updated_at,
            ],
            |row| row.get(0),
        )?;

        Ok(SnapshotSchedule {
            schedule_id,
            ..schedule
        })
    }

    /// Get a schedule by ID
    pub fn get_by_id(conn: &Connection, schedule_id: i64) -> Result<Option<Self>, SnapSchedError> {
        conn.query_row(
            &format!("{} WHERE s.schedule_id = ?", SCHEDULE_SELECT),
            [schedule_id],
            Self::from_row,
        )
        .optional()
        .map_err(SnapSchedError::DatabaseError)
    }

    /// All schedules ordered by id
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>, SnapSchedError> {
        Self::query_list(conn, &format!("{} ORDER BY s.schedule_id ASC", SCHEDULE_SELECT))
    }

    /// Schedules with `enabled = true`, ordered by id
    pub fn list_enabled(conn: &Connection) -> Result<Vec<Self>, SnapSchedError> {
        Self::query_list(
            conn,
            &format!("{} WHERE s.enabled = 1 ORDER BY s.schedule_id ASC", SCHEDULE_SELECT),
        )
    }

    fn query_list(conn: &Connection, sql: &str) -> Result<Vec<Self>, SnapSchedError> {
        let mut stmt = conn.prepare(sql)?;
        let schedules = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// Apply a partial update and return the updated schedule
    pub fn update(
        conn: &Connection,
        schedule_id: i64,
        params: UpdateSnapshotScheduleParams,
    ) -> Result<Self, SnapSchedError> {
        Database::immediate_transaction(conn, |c| {
            let existing = Self::get_by_id(c, schedule_id)?.ok_or_else(|| {
                SnapSchedError::NotFound(format!("Schedule {} not found", schedule_id))
            })?;

            let updated = SnapshotSchedule {
                name: params
                    .name
                    .map(|v| v.trim().to_owned())
                    .unwrap_or_else(|| existing.name.clone()),
                index_pattern: params
                    .index_pattern
                    .map(|v| v.trim().to_owned())
                    .unwrap_or_else(|| existing.index_pattern.clone()),
                repository: params
                    .repository
                    .map(|v| v.trim().to_owned())
                    .unwrap_or_else(|| existing.repository.clone()),
                enabled: params.enabled.unwrap_or(existing.enabled),
                snapshot_prefix: params
                    .snapshot_prefix
                    .map(|v| v.trim().to_owned())
                    .unwrap_or_else(|| existing.snapshot_prefix.clone()),
                include_global_state: params
                    .include_global_state
                    .unwrap_or(existing.include_global_state),
                skip_write_indices: params
                    .skip_write_indices
                    .unwrap_or(existing.skip_write_indices),
                retention_days: params.retention_days.unwrap_or(existing.retention_days),
                updated_at: Utc::now().timestamp(),
                ..existing.clone()
            };

            updated.validate().map_err(SnapSchedError::Validation)?;

            if updated.snapshot_name_prefix() != existing.snapshot_name_prefix() {
                warn!(
                    "Schedule {} snapshot prefix changed from '{}' to '{}': existing snapshots will no longer be recognised as taken by this schedule",
                    schedule_id,
                    existing.snapshot_name_prefix(),
                    updated.snapshot_name_prefix()
                );
            }

            c.execute(
                "UPDATE snapshot_schedules SET
                    name = ?,
                    index_pattern = ?,
                    repository = ?,
                    enabled = ?,
                    snapshot_prefix = ?,
                    include_global_state = ?,
                    skip_write_indices = ?,
                    retention_days = ?,
                    updated_at = ?
                WHERE schedule_id = ?",
                rusqlite::params![
                    updated.name,
                    updated.index_pattern,
                    updated.repository,
                    updated.enabled,
                    updated.snapshot_prefix,
                    updated.include_global_state,
                    updated.skip_write_indices,
                    updated.retention_days,
                    updated.updated_at,
                    schedule_id,
                ],
            )?;

            Ok(updated)
        })
    }

    /// Enable or disable a schedule
    pub fn set_enabled(
        conn: &Connection,
        schedule_id: i64,
        enabled: bool,
    ) -> Result<(), SnapSchedError> {
        let rows_affected = conn.execute(
            "UPDATE snapshot_schedules SET enabled = ?, updated_at = ? WHERE schedule_id = ?",
            rusqlite::params![enabled, Utc::now().timestamp(), schedule_id],
        )?;

        if rows_affected == 0 {
            return Err(SnapSchedError::NotFound(format!(
                "Schedule {} not found",
                schedule_id
            )));
        }

        Ok(())
    }

    /// Delete a schedule together with its execution records.
    /// Snapshots already in the repository are left untouched.
    pub fn delete(conn: &Connection, schedule_id: i64) -> Result<(), SnapSchedError> {
        Database::immediate_transaction(conn, |c| {
            c.execute(
                "DELETE FROM schedule_executions WHERE schedule_id = ?",
                [schedule_id],
            )?;

            let rows_affected = c.execute(
                "DELETE FROM snapshot_schedules WHERE schedule_id = ?",
                [schedule_id],
            )?;

            if rows_affected == 0 {
                return Err(SnapSchedError::NotFound(format!(
                    "Schedule {} not found",
                    schedule_id
                )));
            }

            Ok(())
        })
    }
}

/// How an execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExecutionOutcome {
    Success = 0,
    Skipped = 1,
    Failed = 2,
}

impl ExecutionOutcome {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::Skipped),
            2 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// `SUCCESS`, `SKIPPED: <message>` or `FAILED: <message>`
    pub fn status_label(self, message: &str) -> String {
        match self {
            Self::Success => "SUCCESS".to_string(),
            Self::Skipped => format!("SKIPPED: {}", message),
            Self::Failed => format!("FAILED: {}", message),
        }
    }
}

/// Immutable record of one schedule execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleExecution {
    pub execution_id: i64,
    pub schedule_id: i64,
    pub executed_at: i64, // Unix timestamp (UTC)
    pub outcome: ExecutionOutcome,
    pub message: String,
    pub snapshot_name: Option<String>,
    pub indices_snapshotted: Vec<String>,
    pub skipped_write_indices: Vec<String>,
    pub already_snapshotted_count: i64,
}

impl ScheduleExecution {
    pub fn new(schedule_id: i64, outcome: ExecutionOutcome, message: impl Into<String>) -> Self {
        ScheduleExecution {
            execution_id: 0, // Will be set by database
            schedule_id,
            executed_at: Utc::now().timestamp(),
            outcome,
            message: message.into(),
            snapshot_name: None,
            indices_snapshotted: Vec::new(),
            skipped_write_indices: Vec::new(),
            already_snapshotted_count: 0,
        }
    }

    pub fn status_label(&self) -> String {
        self.outcome.status_label(&self.message)
    }

    /// Insert the record and return its id
    pub fn record(&self, conn: &Connection) -> Result<i64, SnapSchedError> {
        let indices_snapshotted = serde_json::to_string(&self.indices_snapshotted)?;
        let skipped_write_indices = serde_json::to_string(&self.skipped_write_indices)?;

        let execution_id = conn.query_row(
            "INSERT INTO schedule_executions (
                schedule_id, executed_at, outcome, message, snapshot_name,
                indices_snapshotted, skipped_write_indices, already_snapshotted_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING execution_id",
            rusqlite::params![
                self.schedule_id,
                self.executed_at,
                self.outcome.as_i32(),
                self.message,
                self.snapshot_name,
                indices_snapshotted,
                skipped_write_indices,
                self.already_snapshotted_count,
            ],
            |row| row.get(0),
        )?;

        Ok(execution_id)
    }

    /// Latest executions of a schedule, newest first
    pub fn list_for_schedule(
        conn: &Connection,
        schedule_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, SnapSchedError> {
        let mut stmt = conn.prepare(
            "SELECT
                execution_id, schedule_id, executed_at, outcome, message, snapshot_name,
                indices_snapshotted, skipped_write_indices, already_snapshotted_count
            FROM schedule_executions
            WHERE schedule_id = ?
            ORDER BY execution_id DESC
            LIMIT ?",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![schedule_id, limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(
                    execution_id,
                    schedule_id,
                    executed_at,
                    outcome,
                    message,
                    snapshot_name,
                    indices_json,
                    skipped_json,
                    already_snapshotted_count,
                )| {
                    let outcome = ExecutionOutcome::from_i32(outcome).ok_or_else(|| {
                        SnapSchedError::Error(format!(
                            "Invalid outcome {} for execution {}",
                            outcome, execution_id
                        ))
                    })?;

                    Ok(ScheduleExecution {
                        execution_id,
                        schedule_id,
                        executed_at,
                        outcome,
                        message,
                        snapshot_name,
                        indices_snapshotted: serde_json::from_str(&indices_json)?,
                        skipped_write_indices: serde_json::from_str(&skipped_json)?,
                        already_snapshotted_count,
                    })
                },
            )
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn params(name: &str, index_pattern: &str) -> CreateSnapshotScheduleParams {
        CreateSnapshotScheduleParams {
            name: name.to_string(),
            index_pattern: index_pattern.to_string(),
            repository: "backups".to_string(),
            enabled: true,
            snapshot_prefix: DEFAULT_SNAPSHOT_PREFIX.to_string(),
            include_global_state: false,
            skip_write_indices: true,
            retention_days: None,
        }
    }

    /// Unsaved schedule for tests that never touch the database
    pub fn schedule(name: &str, index_pattern: &str) -> SnapshotSchedule {
        SnapshotSchedule {
            schedule_id: 1,
            name: name.to_string(),
            index_pattern: index_pattern.to_string(),
            repository: "backups".to_string(),
            enabled: true,
            snapshot_prefix: DEFAULT_SNAPSHOT_PREFIX.to_string(),
            include_global_state: false,
            skip_write_indices: true,
            retention_days: None,
            last_execution_time: None,
            last_snapshot_name: None,
            last_execution_status: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{params, schedule};
    use super::*;
    use crate::database::test_support::memory_connection;
    use chrono::TimeZone;
    use regex::Regex;

    fn at_base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).single().unwrap()
    }

    #[test]
    fn test_execution_outcome_conversion() {
        assert_eq!(ExecutionOutcome::from_i32(0), Some(ExecutionOutcome::Success));
        assert_eq!(ExecutionOutcome::from_i32(2), Some(ExecutionOutcome::Failed));
        assert_eq!(ExecutionOutcome::from_i32(7), None);
        assert_eq!(ExecutionOutcome::Skipped.as_i32(), 1);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ExecutionOutcome::Success.status_label("ignored"), "SUCCESS");
        assert_eq!(
            ExecutionOutcome::Skipped.status_label("nothing new"),
            "SKIPPED: nothing new"
        );
        assert_eq!(ExecutionOutcome::Failed.status_label("boom"), "FAILED: boom");
    }

    #[test]
    fn test_snapshot_name_prefix_is_normalized() {
        let mut s = schedule("Daily Wazuh", "wazuh_*");
        s.snapshot_prefix = "Nightly".to_string();
        assert_eq!(s.snapshot_name_prefix(), "nightly_daily_wazuh_");
    }

    #[test]
    fn test_generated_name_format() {
        let s = schedule("daily", "logs_*");
        let name = s.generate_snapshot_name(at_base_time());
        assert_eq!(name, "scheduled_daily_20250115_103000");

        let re = Regex::new(r"^scheduled_daily_\d{8}_\d{6}$").unwrap();
        assert!(re.is_match(&s.generate_snapshot_name(Utc::now())));
    }

    #[test]
    fn test_generated_names_are_owned_by_schedule() {
        let s = schedule("My Daily", "logs_*");
        let name = s.generate_snapshot_name(at_base_time());
        assert!(s.owns_snapshot(&name));
        assert!(!schedule("daily", "logs_*").owns_snapshot(&name));
        assert!(!s.owns_snapshot("manual-backup-1"));
    }

    #[test]
    fn test_longer_schedule_name_is_not_owned() {
        let daily = schedule("daily", "logs_*");
        let daily_logs = schedule("daily_logs", "logs_*");
        let name = daily_logs.generate_snapshot_name(at_base_time());

        assert!(daily_logs.owns_snapshot(&name));
        assert!(!daily.owns_snapshot(&name));
        assert!(!daily.owns_snapshot("scheduled_daily_20250115_103000_copy"));
        assert!(!daily.owns_snapshot("scheduled_daily_"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(schedule("daily", "logs_*").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut s = schedule("daily", "  ");
        assert!(s.validate().is_err());

        s = schedule("daily", " , ");
        assert!(s.validate().is_err());

        s = schedule("", "logs_*");
        assert!(s.validate().is_err());

        s = schedule("daily", "logs_*");
        s.repository = " ".to_string();
        assert!(s.validate().is_err());

        s = schedule("daily", "logs_*");
        s.retention_days = Some(0);
        assert!(s.validate().is_err());
        s.retention_days = Some(-3);
        assert!(s.validate().is_err());
        s.retention_days = Some(30);
        assert!(s.validate().is_ok());

        s = schedule("daily/backup", "logs_*");
        assert!(s.validate().is_err());

        s = schedule("daily\tbackup", "logs_*");
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_create_and_get() {
        let conn = memory_connection();
        let created = SnapshotSchedule::create(&conn, params("daily", "logs_*")).unwrap();
        assert!(created.schedule_id > 0);

        let fetched = SnapshotSchedule::get_by_id(&conn, created.schedule_id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched, created);
        assert!(fetched.last_execution_status.is_none());
    }

    #[test]
    fn test_create_rejects_invalid() {
        let conn = memory_connection();
        let mut p = params("daily", "logs_*");
        p.retention_days = Some(0);
        let err = SnapshotSchedule::create(&conn, p).unwrap_err();
        assert!(matches!(err, SnapSchedError::Validation(_)));
        assert!(SnapshotSchedule::list_all(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_get_missing_returns_none() {
        let conn = memory_connection();
        assert!(SnapshotSchedule::get_by_id(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn test_list_enabled_filters_disabled() {
        let conn = memory_connection();
        let a = SnapshotSchedule::create(&conn, params("a", "a_*")).unwrap();
        let b = SnapshotSchedule::create(&conn, params("b", "b_*")).unwrap();
        SnapshotSchedule::set_enabled(&conn, a.schedule_id, false).unwrap();

        let all = SnapshotSchedule::list_all(&conn).unwrap();
        assert_eq!(all.len(), 2);

        let enabled = SnapshotSchedule::list_enabled(&conn).unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].schedule_id, b.schedule_id);
    }

    #[test]
    fn test_partial_update() {
        let conn = memory_connection();
        let mut p = params("daily", "logs_*");
        p.retention_days = Some(14);
        let created = SnapshotSchedule::create(&conn, p).unwrap();

        let updated = SnapshotSchedule::update(
            &conn,
            created.schedule_id,
            UpdateSnapshotScheduleParams {
                index_pattern: Some("logs_*,audit_*".to_string()),
                skip_write_indices: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.name, "daily");
        assert_eq!(updated.index_pattern, "logs_*,audit_*");
        assert!(!updated.skip_write_indices);
        assert_eq!(updated.retention_days, Some(14));

        let cleared = SnapshotSchedule::update(
            &conn,
            created.schedule_id,
            UpdateSnapshotScheduleParams {
                retention_days: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cleared.retention_days, None);

        let fetched = SnapshotSchedule::get_by_id(&conn, created.schedule_id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.index_pattern, "logs_*,audit_*");
        assert_eq!(fetched.retention_days, None);
    }

    #[test]
    fn test_update_validation_failure_leaves_row_untouched() {
        let conn = memory_connection();
        let created = SnapshotSchedule::create(&conn, params("daily", "logs_*")).unwrap();

        let result = SnapshotSchedule::update(
            &conn,
            created.schedule_id,
            UpdateSnapshotScheduleParams {
                index_pattern: Some("".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(SnapSchedError::Validation(_))));

        let fetched = SnapshotSchedule::get_by_id(&conn, created.schedule_id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.index_pattern, "logs_*");
    }

    #[test]
    fn test_update_and_toggle_missing_schedule() {
        let conn = memory_connection();
        let result = SnapshotSchedule::update(&conn, 9, UpdateSnapshotScheduleParams::default());
        assert!(matches!(result, Err(SnapSchedError::NotFound(_))));
        assert!(matches!(
            SnapshotSchedule::set_enabled(&conn, 9, true),
            Err(SnapSchedError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_schedule_and_executions() {
        let conn = memory_connection();
        let created = SnapshotSchedule::create(&conn, params("daily", "logs_*")).unwrap();
        ScheduleExecution::new(created.schedule_id, ExecutionOutcome::Skipped, "nothing")
            .record(&conn)
            .unwrap();

        SnapshotSchedule::delete(&conn, created.schedule_id).unwrap();
        assert!(SnapshotSchedule::get_by_id(&conn, created.schedule_id)
            .unwrap()
            .is_none());
        assert!(ScheduleExecution::list_for_schedule(&conn, created.schedule_id, 10)
            .unwrap()
            .is_empty());

        assert!(matches!(
            SnapshotSchedule::delete(&conn, created.schedule_id),
            Err(SnapSchedError::NotFound(_))
        ));
    }

    #[test]
    fn test_last_execution_projection() {
        let conn = memory_connection();
        let created = SnapshotSchedule::create(&conn, params("daily", "logs_*")).unwrap();

        let mut success = ScheduleExecution::new(created.schedule_id, ExecutionOutcome::Success, "ok");
        success.executed_at = 100;
        success.snapshot_name = Some("scheduled_daily_20250115_103000".to_string());
        success.indices_snapshotted = vec!["logs_1".to_string()];
        success.record(&conn).unwrap();

        let mut failed =
            ScheduleExecution::new(created.schedule_id, ExecutionOutcome::Failed, "cluster down");
        failed.executed_at = 200;
        failed.record(&conn).unwrap();

        let fetched = SnapshotSchedule::get_by_id(&conn, created.schedule_id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.last_execution_time, Some(200));
        assert_eq!(
            fetched.last_execution_status.as_deref(),
            Some("FAILED: cluster down")
        );
        // Only successful executions update the last snapshot name
        assert_eq!(
            fetched.last_snapshot_name.as_deref(),
            Some("scheduled_daily_20250115_103000")
        );
    }

    #[test]
    fn test_execution_history_newest_first() {
        let conn = memory_connection();
        let created = SnapshotSchedule::create(&conn, params("daily", "logs_*")).unwrap();

        for i in 0..3 {
            let mut e = ScheduleExecution::new(
                created.schedule_id,
                ExecutionOutcome::Success,
                format!("run {}", i),
            );
            e.skipped_write_indices = vec![format!("logs_{}", i)];
            e.already_snapshotted_count = i;
            e.record(&conn).unwrap();
        }

        let history = ScheduleExecution::list_for_schedule(&conn, created.schedule_id, 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "run 2");
        assert_eq!(history[0].skipped_write_indices, vec!["logs_2".to_string()]);
        assert_eq!(history[1].already_snapshotted_count, 1);
    }
}
