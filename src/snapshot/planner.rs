use std::collections::HashSet;

use log::{debug, Level};
use logging_timer::timer;
use serde::{Deserialize, Serialize};

use crate::cluster::SnapshotCluster;
use crate::error::SnapSchedError;
use crate::indices::{identify_write_indices, match_indices, IndexWriteStatus};
use crate::schedules::SnapshotSchedule;
use crate::snapshot::history::get_already_snapshotted_indices;

/// Partition of a schedule's matching indices. The three lists are disjoint
/// and together contain every matching index exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPlan {
    pub indices_to_snapshot: Vec<String>,
    pub skipped_write_indices: Vec<String>,
    pub already_snapshotted_indices: Vec<String>,
}

impl SnapshotPlan {
    pub fn is_empty(&self) -> bool {
        self.indices_to_snapshot.is_empty()
    }

    /// Reason recorded when the plan has nothing to capture
    pub fn skip_reason(&self) -> String {
        format!(
            "No new indices to snapshot ({} write indices skipped, {} already snapshotted)",
            self.skipped_write_indices.len(),
            self.already_snapshotted_indices.len()
        )
    }
}

/// Assign each matching index to one bucket of the plan, in input order.
/// A write index is only skipped when `skip_write_indices` is set; otherwise
/// it is treated like any other index.
pub fn partition_indices(
    matching: &[String],
    statuses: &[IndexWriteStatus],
    history: &HashSet<String>,
    skip_write_indices: bool,
) -> SnapshotPlan {
    let write_indices: HashSet<&str> = statuses
        .iter()
        .filter(|s| s.is_write_index)
        .map(|s| s.index_name.as_str())
        .collect();

    let mut plan = SnapshotPlan::default();
    for index in matching {
        if skip_write_indices && write_indices.contains(index.as_str()) {
            plan.skipped_write_indices.push(index.clone());
        } else if history.contains(index) {
            plan.already_snapshotted_indices.push(index.clone());
        } else {
            plan.indices_to_snapshot.push(index.clone());
        }
    }
    plan
}

/// Decide which of a schedule's indices need capturing now.
///
/// The live index list is fetched once; a failure there is a planning
/// failure and propagates. Write status is computed over the whole live list
/// so a family's write index is found even when the pattern only selects
/// part of the family.
pub async fn get_indices_needing_snapshot<C>(
    cluster: &C,
    schedule: &SnapshotSchedule,
) -> Result<SnapshotPlan, SnapSchedError>
where
    C: SnapshotCluster + ?Sized,
{
    let _tmr = timer!(Level::Trace; "get_indices_needing_snapshot", "{}", schedule.schedule_id);

    let live = cluster.list_indices().await?;
    let patterns = schedule.index_patterns();
    let matching = match_indices(&live, Some(patterns.as_slice()))?;
    let statuses = identify_write_indices(&live);
    let history = get_already_snapshotted_indices(cluster, schedule).await;

    let plan = partition_indices(&matching, &statuses, &history, schedule.skip_write_indices);

    debug!(
        "Schedule {} plan: {} to snapshot, {} write indices skipped, {} already snapshotted",
        schedule.schedule_id,
        plan.indices_to_snapshot.len(),
        plan.skipped_write_indices.len(),
        plan.already_snapshotted_indices.len()
    );

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::schedules::test_support::schedule;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_daily_logs_scenario() {
        let cluster = FakeCluster::with_indices(&["logs_1", "logs_2", "logs_3"]);
        let plan = get_indices_needing_snapshot(&cluster, &schedule("daily", "logs_*"))
            .await
            .unwrap();

        assert_eq!(plan.indices_to_snapshot, names(&["logs_1", "logs_2"]));
        assert_eq!(plan.skipped_write_indices, names(&["logs_3"]));
        assert!(plan.already_snapshotted_indices.is_empty());
    }

    #[tokio::test]
    async fn test_history_excludes_captured_indices() {
        let cluster = FakeCluster::with_indices(&["logs_1", "logs_2", "logs_3"]);
        cluster.add_snapshot("backups", "scheduled_daily_20250101_000000", &["logs_1"], Some(1));

        let plan = get_indices_needing_snapshot(&cluster, &schedule("daily", "logs_*"))
            .await
            .unwrap();

        assert_eq!(plan.indices_to_snapshot, names(&["logs_2"]));
        assert_eq!(plan.already_snapshotted_indices, names(&["logs_1"]));
        assert_eq!(plan.skipped_write_indices, names(&["logs_3"]));
    }

    #[tokio::test]
    async fn test_write_index_kept_when_skipping_disabled() {
        let cluster = FakeCluster::with_indices(&["logs_1", "logs_2"]);
        let mut s = schedule("daily", "logs_*");
        s.skip_write_indices = false;

        let plan = get_indices_needing_snapshot(&cluster, &s).await.unwrap();
        assert_eq!(plan.indices_to_snapshot, names(&["logs_1", "logs_2"]));
        assert!(plan.skipped_write_indices.is_empty());
    }

    #[tokio::test]
    async fn test_write_status_uses_whole_live_list() {
        // The pattern selects only logs_2, but logs_3 is the family's write index
        let cluster = FakeCluster::with_indices(&["logs_2", "logs_3"]);
        let plan = get_indices_needing_snapshot(&cluster, &schedule("daily", "logs_2"))
            .await
            .unwrap();
        assert_eq!(plan.indices_to_snapshot, names(&["logs_2"]));
    }

    #[tokio::test]
    async fn test_comma_separated_patterns() {
        let cluster = FakeCluster::with_indices(&["wazuh_1", "wazuh_2", "graylog_1", "graylog_2"]);
        let plan = get_indices_needing_snapshot(&cluster, &schedule("daily", "wazuh_*, graylog_*"))
            .await
            .unwrap();
        assert_eq!(plan.indices_to_snapshot, names(&["wazuh_1", "graylog_1"]));
        assert_eq!(plan.skipped_write_indices, names(&["wazuh_2", "graylog_2"]));
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let cluster = FakeCluster::with_indices(&["logs_1"]);
        cluster.fail_list_indices(true);
        assert!(get_indices_needing_snapshot(&cluster, &schedule("daily", "logs_*"))
            .await
            .is_err());
    }

    #[test]
    fn test_skip_reason() {
        let plan = SnapshotPlan {
            indices_to_snapshot: vec![],
            skipped_write_indices: names(&["logs_3"]),
            already_snapshotted_indices: names(&["logs_1", "logs_2"]),
        };
        assert!(plan.is_empty());
        assert_eq!(
            plan.skip_reason(),
            "No new indices to snapshot (1 write indices skipped, 2 already snapshotted)"
        );
    }

    proptest! {
        #[test]
        fn prop_partition_covers_matching_exactly_once(
            live in proptest::collection::btree_set("[ab]_[0-9]{1,2}|[a-c]{1,3}", 0..24),
            history_mask in proptest::collection::vec(any::<bool>(), 24),
            skip_write in any::<bool>(),
        ) {
            let live: Vec<String> = live.into_iter().collect();
            let history: HashSet<String> = live
                .iter()
                .zip(history_mask.iter())
                .filter(|(_, in_history)| **in_history)
                .map(|(name, _)| name.clone())
                .collect();
            let statuses = identify_write_indices(&live);

            let plan = partition_indices(&live, &statuses, &history, skip_write);

            let total = plan.indices_to_snapshot.len()
                + plan.skipped_write_indices.len()
                + plan.already_snapshotted_indices.len();
            prop_assert_eq!(total, live.len());

            for index in &live {
                let hits = [
                    &plan.indices_to_snapshot,
                    &plan.skipped_write_indices,
                    &plan.already_snapshotted_indices,
                ]
                .iter()
                .filter(|bucket| bucket.contains(index))
                .count();
                prop_assert_eq!(hits, 1);
            }

            if !skip_write {
                prop_assert!(plan.skipped_write_indices.is_empty());
            }
            for index in &plan.indices_to_snapshot {
                prop_assert!(!history.contains(index));
            }
        }
    }
}
