use chrono::Utc;
use log::{error, info, warn, Level};
use logging_timer::timer;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::cluster::SnapshotCluster;
use crate::error::SnapSchedError;
use crate::schedules::SnapshotSchedule;

const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionResult {
    pub deleted: usize,
    pub message: String,
}

/// Outcome of a retention pass over all enabled schedules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSweepSummary {
    pub schedules_checked: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete this schedule's snapshots older than its retention window
pub async fn cleanup_old_snapshots<C>(
    cluster: &C,
    schedule: &SnapshotSchedule,
) -> Result<RetentionResult, SnapSchedError>
where
    C: SnapshotCluster + ?Sized,
{
    cleanup_old_snapshots_at(cluster, schedule, Utc::now().timestamp_millis()).await
}

/// Retention relative to `now_ms` (epoch milliseconds).
///
/// A snapshot is expired when it carries the schedule's prefix and finished
/// strictly before `now_ms - retention_days`. Snapshots with no end time are
/// kept. A failed delete is logged and the remaining snapshots are still
/// attempted; a failed listing is returned as an error.
pub async fn cleanup_old_snapshots_at<C>(
    cluster: &C,
    schedule: &SnapshotSchedule,
    now_ms: i64,
) -> Result<RetentionResult, SnapSchedError>
where
    C: SnapshotCluster + ?Sized,
{
    let Some(retention_days) = schedule.retention_days else {
        return Ok(RetentionResult {
            deleted: 0,
            message: "No retention policy configured".to_string(),
        });
    };

    let cutoff = now_ms.saturating_sub(retention_days.saturating_mul(MS_PER_DAY));

    let expired: Vec<String> = cluster
        .list_snapshots(&schedule.repository)
        .await?
        .into_iter()
        .filter(|s| schedule.owns_snapshot(&s.snapshot))
        .filter(|s| s.end_time_in_millis.is_some_and(|end| end < cutoff))
        .map(|s| s.snapshot)
        .collect();

    let mut deleted = 0;
    for snapshot in &expired {
        match cluster.delete_snapshot(&schedule.repository, snapshot).await {
            Ok(()) => {
                info!(
                    "Deleted expired snapshot {}/{} for schedule {}",
                    schedule.repository, snapshot, schedule.schedule_id
                );
                deleted += 1;
            }
            Err(e) => warn!(
                "Failed to delete expired snapshot {}/{}: {}",
                schedule.repository, snapshot, e
            ),
        }
    }

    Ok(RetentionResult {
        deleted,
        message: format!("Deleted {} of {} expired snapshots", deleted, expired.len()),
    })
}

/// Apply retention for every enabled schedule that has a retention policy.
/// A schedule whose cleanup fails is logged and counted; the others still run.
pub async fn cleanup_all_enabled_schedules<C>(
    cluster: &C,
    conn: &mut Connection,
) -> Result<RetentionSweepSummary, SnapSchedError>
where
    C: SnapshotCluster + ?Sized,
{
    let _tmr = timer!(Level::Trace; "cleanup_all_enabled_schedules");

    let schedules = SnapshotSchedule::list_enabled(conn)?;
    let mut summary = RetentionSweepSummary::default();

    for schedule in schedules.iter().filter(|s| s.retention_days.is_some()) {
        summary.schedules_checked += 1;
        match cleanup_old_snapshots(cluster, schedule).await {
            Ok(result) => summary.deleted += result.deleted,
            Err(e) => {
                error!(
                    "Retention cleanup failed for schedule '{}' ({}): {}",
                    schedule.name, schedule.schedule_id, e
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        "Retention sweep: {} schedules checked, {} snapshots deleted, {} failures",
        summary.schedules_checked, summary.deleted, summary.failed
    );

    Ok(summary)
}
