use std::collections::HashSet;

use log::{debug, warn};

use crate::cluster::SnapshotCluster;
use crate::schedules::SnapshotSchedule;

const FAILED_STATE: &str = "FAILED";

/// Union of the indices covered by every snapshot this schedule has taken.
///
/// Snapshots are attributed to the schedule by name prefix. Snapshots in
/// state `FAILED` do not count. A failed listing is logged and treated as
/// "no history", so the next plan may re-capture indices rather than miss
/// them.
pub async fn get_already_snapshotted_indices<C>(
    cluster: &C,
    schedule: &SnapshotSchedule,
) -> HashSet<String>
where
    C: SnapshotCluster + ?Sized,
{
    let snapshots = match cluster.list_snapshots(&schedule.repository).await {
        Ok(snapshots) => snapshots,
        Err(e) => {
            warn!(
                "Could not list snapshots in repository '{}' for schedule {}: {}",
                schedule.repository, schedule.schedule_id, e
            );
            return HashSet::new();
        }
    };

    let mut indices = HashSet::new();
    let mut owned = 0usize;

    for snapshot in snapshots
        .into_iter()
        .filter(|s| schedule.owns_snapshot(&s.snapshot))
        .filter(|s| s.state.as_deref() != Some(FAILED_STATE))
    {
        owned += 1;
        indices.extend(snapshot.indices);
    }

    debug!(
        "Schedule {}: {} prior snapshots cover {} indices",
        schedule.schedule_id,
        owned,
        indices.len()
    );

    indices
}
