use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::cluster::SnapshotCluster;
use crate::config::SnapshotOptions;

/// Shared application state passed to all Axum handlers via `.with_state()`.
#[derive(Clone)]
pub struct AppState {
    pub cluster: Arc<dyn SnapshotCluster>,
    pub snapshot_options: SnapshotOptions,
    pub execution_timeout: Option<Duration>,
    /// Held for the duration of any execution or retention pass so manual
    /// actions and the background sweep never interleave
    pub run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        cluster: Arc<dyn SnapshotCluster>,
        snapshot_options: SnapshotOptions,
        execution_timeout: Option<Duration>,
    ) -> Self {
        Self {
            cluster,
            snapshot_options,
            execution_timeout,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}
