//! CK-062: Drift detection, comparing files on disk to cached fingerprints.

use crate::core::state::FingerprintCache;
use crate::fingerprint::hasher;
use serde::Serialize;
use std::path::Path;

/// A file whose contents no longer match its cached fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftFinding {
    pub path: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

/// Check one file. `name` is the cache key, `full` where it lives on disk.
pub fn check_file_drift(name: &str, full: &Path, expected_hash: &str) -> Option<DriftFinding> {
    if !full.exists() {
        return Some(DriftFinding {
            path: name.to_string(),
            expected_hash: expected_hash.to_string(),
            actual_hash: "MISSING".to_string(),
            detail: format!("{} does not exist", name),
        });
    }

    let actual = hasher::hash_file(full).unwrap_or_else(|e| format!("ERROR:{}", e));
    if actual == expected_hash {
        return None;
    }
    Some(DriftFinding {
        path: name.to_string(),
        expected_hash: expected_hash.to_string(),
        actual_hash: actual,
        detail: format!("{} content changed", name),
    })
}

/// Check every cached file, paths taken relative to `root`.
pub fn detect_drift(cache: &FingerprintCache, root: &Path) -> Vec<DriftFinding> {
    cache
        .files
        .iter()
        .filter_map(|(name, rec)| check_file_drift(name, &root.join(name), &rec.fingerprint))
        .collect()
}
