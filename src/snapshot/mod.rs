//! Snapshot planning, execution and retention for persisted schedules.
//!
//! The planner consults the live index list and the repository's snapshot
//! history on every pass; nothing about the cluster is cached locally.

pub mod executor;
pub mod history;
pub mod planner;
pub mod retention;

pub use executor::{
    execute_all_enabled_schedules, execute_snapshot_schedule, BulkExecutionSummary,
    ExecutionResult,
};
pub use planner::{get_indices_needing_snapshot, SnapshotPlan};
pub use retention::{cleanup_all_enabled_schedules, cleanup_old_snapshots, RetentionResult};
