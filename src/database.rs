use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use once_cell::sync::OnceCell;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::SnapSchedError;
use crate::schema::{CREATE_SCHEMA_SQL, SCHEMA_VERSION};

const DB_FILENAME: &str = "snapsched.db";
const POOL_SIZE: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static POOL: OnceCell<Pool<SqliteConnectionManager>> = OnceCell::new();

pub struct Database;

impl Database {
    /// Path of the database file within a data directory
    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join(DB_FILENAME)
    }

    /// Open (creating if needed) the database in `data_dir` and install the
    /// global connection pool. Safe to call more than once; later calls are no-ops.
    pub fn init(data_dir: &Path) -> Result<(), SnapSchedError> {
        if POOL.get().is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(data_dir)?;
        let db_path = Self::db_path(data_dir);

        let pool = Self::build_pool(&db_path)?;
        {
            let conn = pool.get()?;
            Self::ensure_schema(&conn)?;
        }

        info!("Database opened at: {}", db_path.display());
        // A concurrent init may have won the race - either pool is equivalent
        let _ = POOL.set(pool);
        Ok(())
    }

    fn build_pool(db_path: &Path) -> Result<Pool<SqliteConnectionManager>, SnapSchedError> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|c| {
            c.busy_timeout(BUSY_TIMEOUT)?;
            c.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            c.pragma_update(None, "foreign_keys", true)
        });

        Ok(Pool::builder().max_size(POOL_SIZE).build(manager)?)
    }

    /// Get a pooled connection. Fails if `init` has not been called.
    pub fn get_connection() -> Result<PooledConnection<SqliteConnectionManager>, SnapSchedError> {
        let pool = POOL
            .get()
            .ok_or_else(|| SnapSchedError::Error("Database has not been initialized".into()))?;
        Ok(pool.get()?)
    }

    /// Create tables if missing and verify the stored schema version
    pub fn ensure_schema(conn: &Connection) -> Result<(), SnapSchedError> {
        conn.execute_batch(CREATE_SCHEMA_SQL)?;

        match Self::get_schema_version_locked(conn)?.as_deref() {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(SnapSchedError::Error(format!(
                "Schema version mismatch: database is at version {}, expected {}",
                other, SCHEMA_VERSION
            ))),
            None => Err(SnapSchedError::Error("Schema version missing".to_string())),
        }
    }

    fn get_schema_version_locked(conn: &Connection) -> Result<Option<String>, SnapSchedError> {
        conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(SnapSchedError::DatabaseError)
    }

    /// Run `func` inside a `BEGIN IMMEDIATE` transaction. Commits on `Ok`,
    /// rolls back on `Err`.
    pub fn immediate_transaction<T, F>(conn: &Connection, func: F) -> Result<T, SnapSchedError>
    where
        F: FnOnce(&Connection) -> Result<T, SnapSchedError>,
    {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let value = func(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
