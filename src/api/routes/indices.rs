use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::indices::{
    identify_write_indices, match_indices, resolve_indices, split_patterns, IndexWriteStatus,
};

/// Query parameters for the index endpoints
#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    /// Comma-separated glob list; absent means every index
    pub pattern: Option<String>,
}

impl IndexQuery {
    fn patterns(&self) -> Option<Vec<String>> {
        self.pattern.as_deref().map(split_patterns)
    }
}

/// GET /api/indices?pattern=
/// Write-index classification of the live indices matching `pattern`.
/// Write status is judged against the whole cluster, not just the matches.
pub async fn list_indices(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Vec<IndexWriteStatus>>, StatusCode> {
    let live = state.cluster.list_indices().await.map_err(|e| {
        log::error!("Failed to list cluster indices: {}", e);
        StatusCode::BAD_GATEWAY
    })?;

    let patterns = query.patterns();
    let matched = match_indices(&live, patterns.as_deref()).map_err(|e| {
        log::error!("Failed to match index pattern: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let mut by_name: HashMap<String, IndexWriteStatus> = identify_write_indices(&live)
        .into_iter()
        .map(|s| (s.index_name.clone(), s))
        .collect();

    let statuses = matched
        .iter()
        .filter_map(|name| by_name.remove(name))
        .collect();

    Ok(Json(statuses))
}

/// GET /api/indices/resolve?pattern=
/// Names of the live indices a pattern expands to
pub async fn resolve_pattern(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Vec<String>>, StatusCode> {
    let patterns = query.patterns();
    let resolved = resolve_indices(state.cluster.as_ref(), patterns.as_deref())
        .await
        .map_err(|e| {
            log::error!("Failed to resolve index pattern: {}", e);
            StatusCode::BAD_GATEWAY
        })?;

    Ok(Json(resolved))
}
