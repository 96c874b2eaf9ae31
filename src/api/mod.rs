pub mod routes;

// Re-export route handlers for convenience
pub use routes::indices;
pub use routes::snapshot_schedules;
pub use routes::state::AppState;
