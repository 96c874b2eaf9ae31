pub mod indices;
pub mod snapshot_schedules;
pub mod state;
