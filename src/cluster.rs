//! Search-cluster collaborator: index listing and the snapshot repository API.
//!
//! `SnapshotCluster` is the seam the planner, executor and retention sweep
//! talk through. `HttpCluster` implements it against the
//! Elasticsearch/OpenSearch REST API; tests use the in-memory `FakeCluster`.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ClusterConfig;
use crate::error::SnapSchedError;

/// One entry of a repository's snapshot listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub snapshot: String,
    #[serde(default)]
    pub indices: Vec<String>,
    #[serde(default)]
    pub end_time_in_millis: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
}

/// A snapshot-create call scoped to a concrete list of indices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotCreateRequest {
    pub repository: String,
    pub snapshot_name: String,
    pub indices: Vec<String>,
    pub ignore_unavailable: bool,
    pub include_global_state: bool,
    pub partial: bool,
    pub wait_for_completion: bool,
    pub metadata: Value,
}

impl SnapshotCreateRequest {
    /// Request body for `PUT /_snapshot/{repository}/{snapshot}`
    pub fn body(&self) -> Value {
        json!({
            "indices": self.indices.join(","),
            "ignore_unavailable": self.ignore_unavailable,
            "include_global_state": self.include_global_state,
            "partial": self.partial,
            "metadata": self.metadata,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCounts {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

/// Result of a snapshot-create call. A rejection is reported here with
/// `success = false` rather than as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCreateOutcome {
    pub success: bool,
    pub message: String,
    pub shards: Option<ShardCounts>,
}

impl SnapshotCreateOutcome {
    pub fn rejected(message: impl Into<String>) -> Self {
        SnapshotCreateOutcome {
            success: false,
            message: message.into(),
            shards: None,
        }
    }
}

#[async_trait]
pub trait SnapshotCluster: Send + Sync {
    /// Names of every index currently in the cluster
    async fn list_indices(&self) -> Result<Vec<String>, SnapSchedError>;

    /// Every snapshot held in `repository`
    async fn list_snapshots(&self, repository: &str) -> Result<Vec<SnapshotInfo>, SnapSchedError>;

    async fn create_snapshot(
        &self,
        request: &SnapshotCreateRequest,
    ) -> Result<SnapshotCreateOutcome, SnapSchedError>;

    async fn delete_snapshot(&self, repository: &str, snapshot: &str)
        -> Result<(), SnapSchedError>;
}

#[derive(Debug, Deserialize)]
struct CatIndexRow {
    index: String,
}

#[derive(Debug, Deserialize)]
struct SnapshotListing {
    #[serde(default)]
    snapshots: Vec<SnapshotInfo>,
}

/// Client for an Elasticsearch/OpenSearch compatible cluster
#[derive(Clone)]
pub struct HttpCluster {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
    allow_partial: bool,
}

impl HttpCluster {
    pub fn new(config: &ClusterConfig, allow_partial: bool) -> Result<Self, SnapSchedError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(HttpCluster {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_owned(), pass.to_owned())),
            allow_partial,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("Cluster request: {} {}", method, url);

        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    /// Turn a non-success response into a `Cluster` error carrying the
    /// cluster's own error reason
    async fn check(response: Response, what: &str) -> Result<Response, SnapSchedError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(SnapSchedError::Cluster(format!(
            "{} failed with status {}: {}",
            what,
            status,
            error_reason(&body)
        )))
    }
}

/// Pull `error.reason` out of a cluster error body, falling back to the raw text
fn error_reason(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/reason")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or_else(|| v.get("error").and_then(Value::as_str).map(str::to_owned))
        })
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Interpret the body of a successful snapshot-create response.
///
/// Asynchronous requests answer `{"accepted": true}`. Synchronous requests
/// answer with the finished snapshot, whose state decides the outcome.
pub fn parse_create_response(body: &Value, allow_partial: bool) -> SnapshotCreateOutcome {
    if body.get("accepted").and_then(Value::as_bool) == Some(true) {
        return SnapshotCreateOutcome {
            success: true,
            message: "Snapshot creation started".to_string(),
            shards: None,
        };
    }

    let Some(snapshot) = body.get("snapshot") else {
        return SnapshotCreateOutcome::rejected(format!(
            "Unexpected snapshot create response: {}",
            body
        ));
    };

    let shards = snapshot
        .get("shards")
        .and_then(|s| serde_json::from_value::<ShardCounts>(s.clone()).ok());
    let state = snapshot
        .get("state")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN");

    let success = state == "SUCCESS" || (allow_partial && state == "PARTIAL");
    let message = match shards {
        Some(s) => format!(
            "Snapshot finished with state {} ({}/{} shards successful, {} failed)",
            state, s.successful, s.total, s.failed
        ),
        None => format!("Snapshot finished with state {}", state),
    };

    SnapshotCreateOutcome {
        success,
        message,
        shards,
    }
}

#[async_trait]
impl SnapshotCluster for HttpCluster {
    async fn list_indices(&self) -> Result<Vec<String>, SnapSchedError> {
        let response = self
            .request(Method::GET, "_cat/indices?format=json&h=index")
            .send()
            .await?;
        let rows: Vec<CatIndexRow> = Self::check(response, "Index listing")
            .await?
            .json()
            .await?;

        let mut indices: Vec<String> = rows.into_iter().map(|r| r.index).collect();
        // _cat output order is arbitrary
        indices.sort();
        Ok(indices)
    }

    async fn list_snapshots(&self, repository: &str) -> Result<Vec<SnapshotInfo>, SnapSchedError> {
        let response = self
            .request(Method::GET, &format!("_snapshot/{}/_all", repository))
            .send()
            .await?;
        let listing: SnapshotListing = Self::check(response, "Snapshot listing")
            .await?
            .json()
            .await?;
        Ok(listing.snapshots)
    }

    async fn create_snapshot(
        &self,
        request: &SnapshotCreateRequest,
    ) -> Result<SnapshotCreateOutcome, SnapSchedError> {
        let path = format!(
            "_snapshot/{}/{}?wait_for_completion={}",
            request.repository, request.snapshot_name, request.wait_for_completion
        );
        let response = self
            .request(Method::PUT, &path)
            .json(&request.body())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Snapshot {} rejected by cluster ({}): {}",
                request.snapshot_name, status, body
            );
            return Ok(SnapshotCreateOutcome::rejected(format!(
                "Failed to create snapshot: {}",
                error_reason(&body)
            )));
        }

        let body: Value = response.json().await?;
        Ok(parse_create_response(&body, self.allow_partial))
    }

    async fn delete_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
    ) -> Result<(), SnapSchedError> {
        let response = self
            .request(Method::DELETE, &format!("_snapshot/{}/{}", repository, snapshot))
            .send()
            .await?;
        Self::check(response, "Snapshot delete").await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeClusterState {
        indices: Vec<String>,
        snapshots: HashMap<String, Vec<SnapshotInfo>>,
        fail_list_indices: bool,
        fail_list_snapshots: bool,
        fail_deletes: HashSet<String>,
        reject_create: Option<String>,
        reject_create_in: HashMap<String, String>,
        create_delay: Option<Duration>,
        created: Vec<SnapshotCreateRequest>,
        deleted: Vec<String>,
    }

    /// In-memory cluster. Created snapshots become visible in later listings.
    #[derive(Clone, Default)]
    pub struct FakeCluster {
        inner: Arc<Mutex<FakeClusterState>>,
    }

    impl FakeCluster {
        pub fn with_indices(indices: &[&str]) -> Self {
            let cluster = Self::default();
            cluster.set_indices(indices);
            cluster
        }

        pub fn set_indices(&self, indices: &[&str]) {
            self.inner.lock().unwrap().indices = indices.iter().map(|s| s.to_string()).collect();
        }

        pub fn add_snapshot(
            &self,
            repository: &str,
            snapshot: &str,
            indices: &[&str],
            end_time_in_millis: Option<i64>,
        ) {
            self.inner
                .lock()
                .unwrap()
                .snapshots
                .entry(repository.to_string())
                .or_default()
                .push(SnapshotInfo {
                    snapshot: snapshot.to_string(),
                    indices: indices.iter().map(|s| s.to_string()).collect(),
                    end_time_in_millis,
                    state: Some("SUCCESS".to_string()),
                });
        }

        pub fn set_snapshot_state(&self, repository: &str, snapshot: &str, state: &str) {
            let mut inner = self.inner.lock().unwrap();
            if let Some(info) = inner
                .snapshots
                .get_mut(repository)
                .and_then(|list| list.iter_mut().find(|s| s.snapshot == snapshot))
            {
                info.state = Some(state.to_string());
            }
        }

        pub fn fail_list_indices(&self, fail: bool) {
            self.inner.lock().unwrap().fail_list_indices = fail;
        }

        pub fn fail_list_snapshots(&self, fail: bool) {
            self.inner.lock().unwrap().fail_list_snapshots = fail;
        }

        pub fn fail_delete_of(&self, snapshot: &str) {
            self.inner
                .lock()
                .unwrap()
                .fail_deletes
                .insert(snapshot.to_string());
        }

        pub fn reject_creates(&self, message: &str) {
            self.inner.lock().unwrap().reject_create = Some(message.to_string());
        }

        pub fn reject_creates_in(&self, repository: &str, message: &str) {
            self.inner
                .lock()
                .unwrap()
                .reject_create_in
                .insert(repository.to_string(), message.to_string());
        }

        pub fn delay_creates(&self, delay: Duration) {
            self.inner.lock().unwrap().create_delay = Some(delay);
        }

        pub fn created(&self) -> Vec<SnapshotCreateRequest> {
            self.inner.lock().unwrap().created.clone()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.inner.lock().unwrap().deleted.clone()
        }

        pub fn snapshot_names(&self, repository: &str) -> Vec<String> {
            self.inner
                .lock()
                .unwrap()
                .snapshots
                .get(repository)
                .map(|s| s.iter().map(|i| i.snapshot.clone()).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SnapshotCluster for FakeCluster {
        async fn list_indices(&self) -> Result<Vec<String>, SnapSchedError> {
            let state = self.inner.lock().unwrap();
            if state.fail_list_indices {
                return Err(SnapSchedError::Cluster("index listing unavailable".into()));
            }
            Ok(state.indices.clone())
        }

        async fn list_snapshots(
            &self,
            repository: &str,
        ) -> Result<Vec<SnapshotInfo>, SnapSchedError> {
            let state = self.inner.lock().unwrap();
            if state.fail_list_snapshots {
                return Err(SnapSchedError::Cluster("snapshot listing unavailable".into()));
            }
            Ok(state.snapshots.get(repository).cloned().unwrap_or_default())
        }

        async fn create_snapshot(
            &self,
            request: &SnapshotCreateRequest,
        ) -> Result<SnapshotCreateOutcome, SnapSchedError> {
            let delay = self.inner.lock().unwrap().create_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.inner.lock().unwrap();
            state.created.push(request.clone());
            if let Some(message) = state
                .reject_create_in
                .get(&request.repository)
                .or(state.reject_create.as_ref())
            {
                return Ok(SnapshotCreateOutcome::rejected(message.clone()));
            }

            let end_time = chrono::Utc::now().timestamp_millis();
            state
                .snapshots
                .entry(request.repository.clone())
                .or_default()
                .push(SnapshotInfo {
                    snapshot: request.snapshot_name.clone(),
                    indices: request.indices.clone(),
                    end_time_in_millis: Some(end_time),
                    state: Some("SUCCESS".to_string()),
                });

            Ok(SnapshotCreateOutcome {
                success: true,
                message: "Snapshot creation started".to_string(),
                shards: None,
            })
        }

        async fn delete_snapshot(
            &self,
            repository: &str,
            snapshot: &str,
        ) -> Result<(), SnapSchedError> {
            let mut state = self.inner.lock().unwrap();
            if state.fail_deletes.contains(snapshot) {
                return Err(SnapSchedError::Cluster(format!(
                    "cannot delete snapshot {}",
                    snapshot
                )));
            }
            if let Some(list) = state.snapshots.get_mut(repository) {
                list.retain(|s| s.snapshot != snapshot);
            }
            state.deleted.push(snapshot.to_string());
            Ok(())
        }
    }
}
