//! Baseline Detector (spec §4.9): matches a live schema against a
//! directory of declared snapshots, exact-match first, then best fuzzy
//! match by similarity ratio.
//!
//! Grounded in `original_source/core/baseline_detector.py`'s
//! `find_matching_snapshot` — same exact-then-fuzzy strategy, same default
//! threshold.

use std::path::Path;

use crate::error::{Error, Result, SchemaError};
use crate::normalize;
use crate::similarity;

pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// One entry of the snapshots directory: a version plus its normalized
/// (and fingerprinted) declared text.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: String,
    pub normalized: String,
    pub fingerprint: String,
}

impl Snapshot {
    pub fn from_raw(version: impl Into<String>, raw_sql: &str) -> Self {
        let normalized = normalize::normalize(raw_sql);
        let fingerprint = normalize::fingerprint(&normalized);
        Snapshot {
            version: version.into(),
            normalized,
            fingerprint,
        }
    }
}

/// Outcome of matching a live schema against a set of snapshots.
#[derive(Debug, Clone)]
pub enum MatchResult {
    Exact { version: String },
    Fuzzy { version: String, ratio: f64 },
    NoMatch { closest: Option<(String, f64)> },
}

/// Load every `*.sql` file in `dir` as a [`Snapshot`], keyed by filename
/// stem (expected to be `<version>_<name>`, version taken up to the first
/// `_`).
pub fn load_snapshots(dir: &Path) -> Result<Vec<Snapshot>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Config(crate::error::ConfigError::Io {
            path: dir.to_path_buf(),
            source: e,
        })
    })?;

    let mut snapshots = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let version = stem.split('_').next().unwrap_or(stem).to_string();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(crate::error::ConfigError::Io {
                path: path.clone(),
                source: e,
            })
        })?;
        snapshots.push(Snapshot::from_raw(version, &raw));
    }
    snapshots.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(snapshots)
}

/// Find the snapshot matching `live_sql` (already concatenated
/// `CREATE TABLE` text from the Catalog Introspector). Exact fingerprint
/// match wins outright; otherwise the best fuzzy match is returned if its
/// ratio meets `threshold`.
pub fn find_matching_snapshot(
    live_sql: &str,
    snapshots: &[Snapshot],
    threshold: f64,
) -> MatchResult {
    let live_normalized = normalize::normalize(live_sql);
    let live_fingerprint = normalize::fingerprint(&live_normalized);

    if let Some(snap) = snapshots.iter().find(|s| s.fingerprint == live_fingerprint) {
        return MatchResult::Exact {
            version: snap.version.clone(),
        };
    }

    let mut best: Option<(&Snapshot, f64)> = None;
    for snap in snapshots {
        let ratio = similarity::ratio(&live_normalized, &snap.normalized);
        if best.map(|(_, r)| ratio > r).unwrap_or(true) {
            best = Some((snap, ratio));
        }
    }

    match best {
        Some((snap, ratio)) if ratio >= threshold => MatchResult::Fuzzy {
            version: snap.version.clone(),
            ratio,
        },
        Some((snap, ratio)) => MatchResult::NoMatch {
            closest: Some((snap.version.clone(), ratio)),
        },
        None => MatchResult::NoMatch { closest: None },
    }
}

/// Build a declared snapshot from the DDL parser's structural facts,
/// wrapping parse/IO failures as `SchemaError::SnapshotBuildFailed`.
pub fn build_snapshot(version: &str, declared_sql: &str) -> Result<Snapshot> {
    if declared_sql.trim().is_empty() {
        return Err(Error::Schema(SchemaError::SnapshotBuildFailed {
            message: "declared schema text is empty".to_string(),
        }));
    }
    Ok(Snapshot::from_raw(version, declared_sql))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_normalized_match_wins_over_fuzzy() {
        let snapshots = vec![
            Snapshot::from_raw("001", "create table users (id int);"),
            Snapshot::from_raw("002", "CREATE   TABLE   users  ( id   int );"),
        ];
        let result = find_matching_snapshot("create table users (id int);", &snapshots, DEFAULT_THRESHOLD);
        assert!(matches!(result, MatchResult::Exact { version } if version == "001" || version == "002"));
    }

    #[test]
    fn near_miss_below_threshold_reports_closest_for_diagnostics() {
        let snapshots = vec![Snapshot::from_raw("001", "create table users (id int, email text);")];
        let result = find_matching_snapshot("create table products (sku text);", &snapshots, DEFAULT_THRESHOLD);
        match result {
            MatchResult::NoMatch { closest: Some((version, ratio)) } => {
                assert_eq!(version, "001");
                assert!(ratio < DEFAULT_THRESHOLD);
            }
            other => panic!("expected NoMatch with closest, got {other:?}"),
        }
    }

    #[test]
    fn intermediate_drift_still_matches_above_threshold() {
        let base = "create table users (id int primary key, email text not null, name text);";
        let drifted = "create table users (id int primary key, email text not null, name text, nickname text);";
        let snapshots = vec![Snapshot::from_raw("005", base)];
        let result = find_matching_snapshot(drifted, &snapshots, DEFAULT_THRESHOLD);
        assert!(matches!(result, MatchResult::Fuzzy { version, ratio } if version == "005" && ratio >= DEFAULT_THRESHOLD));
    }
}
