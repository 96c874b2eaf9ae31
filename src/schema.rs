pub const SCHEMA_VERSION: &str = "1";

pub const CREATE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1');

CREATE TABLE IF NOT EXISTS snapshot_schedules (
    schedule_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    index_pattern TEXT NOT NULL,
    repository TEXT NOT NULL,
    enabled BOOLEAN NOT NULL DEFAULT 1,
    snapshot_prefix TEXT NOT NULL DEFAULT 'scheduled',
    include_global_state BOOLEAN NOT NULL DEFAULT 0,
    skip_write_indices BOOLEAN NOT NULL DEFAULT 1,
    retention_days INTEGER,                 -- NULL disables retention cleanup
    created_at INTEGER NOT NULL,            -- Unix timestamp (UTC)
    updated_at INTEGER NOT NULL             -- Unix timestamp (UTC)
);

CREATE INDEX IF NOT EXISTS idx_snapshot_schedules_enabled ON snapshot_schedules (enabled);

-- One immutable row per execution. The schedule's last_* fields are read from here.
CREATE TABLE IF NOT EXISTS schedule_executions (
    execution_id INTEGER PRIMARY KEY AUTOINCREMENT,
    schedule_id INTEGER NOT NULL,
    executed_at INTEGER NOT NULL,           -- Unix timestamp (UTC)
    outcome INTEGER NOT NULL,               -- 0 = Success, 1 = Skipped, 2 = Failed
    message TEXT NOT NULL,
    snapshot_name TEXT,
    indices_snapshotted TEXT NOT NULL,      -- JSON array of index names
    skipped_write_indices TEXT NOT NULL,    -- JSON array of index names
    already_snapshotted_count INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (schedule_id) REFERENCES snapshot_schedules(schedule_id)
);

CREATE INDEX IF NOT EXISTS idx_schedule_executions_schedule ON schedule_executions (schedule_id, execution_id);
"#;
