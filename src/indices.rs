use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cluster::SnapshotCluster;
use crate::error::SnapSchedError;

// "<base>_<digits>" with the base taking everything up to the final underscore-digits group
static ROTATED_INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)_(\d+)$").expect("static index name regex is valid"));

/// Write-index classification of a single live index.
///
/// Derived fresh from the live index list on every planning pass and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexWriteStatus {
    pub index_name: String,
    pub is_write_index: bool,
    pub index_number: Option<u64>,
    pub base_name: Option<String>,
}

/// Split a rotated index name such as `wazuh_12` into `("wazuh", 12)`.
///
/// Names without a trailing `_<digits>` group (or whose digits overflow a
/// u64) return `(None, None)` and never take part in write-index detection.
pub fn parse_index_name(index_name: &str) -> (Option<String>, Option<u64>) {
    let Some(caps) = ROTATED_INDEX_RE.captures(index_name) else {
        return (None, None);
    };

    match caps[2].parse::<u64>() {
        Ok(number) => (Some(caps[1].to_string()), Some(number)),
        Err(_) => (None, None),
    }
}

/// Classify every index in `index_names`.
///
/// Indices sharing a base name form a rotation family; the member with the
/// highest sequence number is the write index. When several members share
/// the highest number the lexicographically greatest name wins. Output order
/// follows input order.
pub fn identify_write_indices(index_names: &[String]) -> Vec<IndexWriteStatus> {
    let parsed: Vec<(Option<String>, Option<u64>)> = index_names
        .iter()
        .map(|name| parse_index_name(name))
        .collect();

    // base_name -> (number, name) of the current write candidate
    let mut write_by_base: HashMap<&str, (u64, &str)> = HashMap::new();
    for (name, (base, number)) in index_names.iter().zip(parsed.iter()) {
        let (Some(base), Some(number)) = (base, number) else {
            continue;
        };

        let candidate = (*number, name.as_str());
        write_by_base
            .entry(base.as_str())
            .and_modify(|current| {
                if candidate > *current {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    index_names
        .iter()
        .zip(parsed.iter())
        .map(|(name, (base, number))| {
            let is_write_index = base
                .as_deref()
                .and_then(|b| write_by_base.get(b))
                .is_some_and(|(_, write_name)| *write_name == name.as_str());

            IndexWriteStatus {
                index_name: name.clone(),
                is_write_index,
                index_number: *number,
                base_name: base.clone(),
            }
        })
        .collect()
}

/// Split a comma-separated pattern list, dropping empty entries
pub fn split_patterns(pattern_list: &str) -> Vec<String> {
    pattern_list
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

fn glob_to_regex(pattern: &str) -> Result<Regex, SnapSchedError> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    Regex::new(&format!("^{}$", body))
        .map_err(|e| SnapSchedError::Error(format!("Invalid index pattern '{}': {}", pattern, e)))
}

/// Expand `patterns` against the live index list.
///
/// A pattern containing `*` is a glob where `*` matches any run of
/// characters and everything else is literal; any other pattern is an exact
/// index name. Patterns that match nothing contribute nothing. With no
/// patterns every live index is returned. Results are de-duplicated in
/// first-seen order.
pub fn match_indices(
    live_indices: &[String],
    patterns: Option<&[String]>,
) -> Result<Vec<String>, SnapSchedError> {
    let Some(patterns) = patterns else {
        return Ok(live_indices.to_vec());
    };

    let mut seen: HashSet<&str> = HashSet::new();
    let mut matched = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') {
            let re = glob_to_regex(pattern)?;
            for index in live_indices {
                if re.is_match(index) && seen.insert(index.as_str()) {
                    matched.push(index.clone());
                }
            }
        } else if let Some(index) = live_indices.iter().find(|i| *i == pattern) {
            if seen.insert(index.as_str()) {
                matched.push(index.clone());
            }
        }
    }

    Ok(matched)
}

/// Fetch the live index list from the cluster and expand `patterns` against it
pub async fn resolve_indices<C>(
    cluster: &C,
    patterns: Option<&[String]>,
) -> Result<Vec<String>, SnapSchedError>
where
    C: SnapshotCluster + ?Sized,
{
    let live = cluster.list_indices().await?;
    match_indices(&live, patterns)
}
