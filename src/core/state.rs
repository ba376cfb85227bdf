//! CK-040: Fingerprint cache: load, save (atomic), effective mtimes.
//!
//! For files handled by fingerprinting recipes the resolver compares
//! *effective* mtimes instead of raw ones. A file rewritten with identical
//! contents keeps its previous effective mtime, so its dependents stay up
//! to date.

use super::fs::{FileStat, FileSystem, Mtime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the cache remembers about one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Raw mtime when the fingerprint was taken.
    pub stat_mtime: Mtime,
    pub effective_mtime: Mtime,
    /// `"blake3:{hex}"`
    pub fingerprint: String,
    /// Hash of the ingredient list the file was last built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintCache {
    pub schema: String,
    pub generated_at: String,
    pub generator: String,
    pub files: IndexMap<String, FingerprintRecord>,
    #[serde(skip)]
    dirty: bool,
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of asking for a file's effective mtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effective {
    pub mtime: Mtime,
    /// Contents differ from the last recorded fingerprint (or there was
    /// no record).
    pub changed: bool,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self {
            schema: "1.0".to_string(),
            generated_at: crate::fingerprint::eventlog::now_iso8601(),
            generator: format!("cook {}", env!("CARGO_PKG_VERSION")),
            files: IndexMap::new(),
            dirty: false,
        }
    }

    pub fn get(&self, path: &str) -> Option<&FingerprintRecord> {
        self.files.get(path)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Effective mtime of `path`.
    ///
    /// * same raw mtime as recorded: trust the record, no rehash
    /// * raw mtime moved, same fingerprint: keep the recorded effective mtime
    /// * raw mtime moved, new fingerprint: `max(raw, previous effective + 1)`
    ///
    /// With `write` false the cache is consulted but never updated.
    pub fn effective(
        &mut self,
        fs: &dyn FileSystem,
        path: &str,
        stat: FileStat,
        write: bool,
    ) -> Result<Effective, String> {
        if let Some(rec) = self.files.get(path) {
            if rec.stat_mtime == stat.mtime {
                return Ok(Effective {
                    mtime: rec.effective_mtime,
                    changed: false,
                });
            }
        }
        let fingerprint = fs.fingerprint(path)?;
        let (effective, changed, ingredients) = match self.files.get(path) {
            Some(rec) if rec.fingerprint == fingerprint => {
                (rec.effective_mtime, false, rec.ingredients.clone())
            }
            Some(rec) => (
                stat.mtime.max(Mtime(rec.effective_mtime.0 + 1)),
                true,
                rec.ingredients.clone(),
            ),
            None => (stat.mtime, true, None),
        };
        if write {
            self.files.insert(
                path.to_string(),
                FingerprintRecord {
                    stat_mtime: stat.mtime,
                    effective_mtime: effective,
                    fingerprint,
                    ingredients,
                },
            );
            self.dirty = true;
        }
        Ok(Effective {
            mtime: effective,
            changed,
        })
    }

    pub fn ingredients_hash(&self, path: &str) -> Option<&str> {
        self.files.get(path).and_then(|r| r.ingredients.as_deref())
    }

    /// Remember the ingredient list `path` was built from. Needs a record,
    /// so call [`FingerprintCache::effective`] first.
    pub fn set_ingredients_hash(&mut self, path: &str, hash: String) {
        if let Some(rec) = self.files.get_mut(path) {
            if rec.ingredients.as_deref() != Some(hash.as_str()) {
                rec.ingredients = Some(hash);
                self.dirty = true;
            }
        }
    }

    pub fn forget(&mut self, path: &str) {
        if self.files.shift_remove(path).is_some() {
            self.dirty = true;
        }
    }
}

/// Derive the cache file path within the state directory.
pub fn cache_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join("fingerprints.yaml")
}

/// Load the cache. A missing file is an empty cache.
pub fn load_cache(state_dir: &Path) -> Result<FingerprintCache, String> {
    let path = cache_file_path(state_dir);
    if !path.exists() {
        return Ok(FingerprintCache::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let cache: FingerprintCache = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid fingerprint cache {}: {}", path.display(), e))?;
    Ok(cache)
}

/// Save the cache atomically (write to temp, then rename).
pub fn save_cache(state_dir: &Path, cache: &FingerprintCache) -> Result<(), String> {
    let path = cache_file_path(state_dir);
    std::fs::create_dir_all(state_dir)
        .map_err(|e| format!("cannot create dir {}: {}", state_dir.display(), e))?;

    let mut snapshot = cache.clone();
    snapshot.generated_at = crate::fingerprint::eventlog::now_iso8601();
    let yaml =
        serde_yaml_ng::to_string(&snapshot).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::MemFs;

    fn stat(fs: &MemFs, p: &str) -> FileStat {
        fs.stat(p).unwrap()
    }

    #[test]
    fn test_ck040_first_sight_is_changed() {
        let fs = MemFs::new();
        fs.write_at("a.o", "v1", 10);
        let mut cache = FingerprintCache::new();
        let e = cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        assert_eq!(e, Effective { mtime: Mtime(10), changed: true });
        assert!(cache.is_dirty());
    }

    #[test]
    fn test_ck040_same_mtime_trusts_record() {
        let fs = MemFs::new();
        fs.write_at("a.o", "v1", 10);
        let mut cache = FingerprintCache::new();
        cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        // content swapped behind our back without an mtime change
        fs.write_at("a.o", "v2", 10);
        let e = cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        assert_eq!(e, Effective { mtime: Mtime(10), changed: false });
    }

    #[test]
    fn test_ck040_same_content_keeps_effective_mtime() {
        let fs = MemFs::new();
        fs.write_at("a.o", "v1", 10);
        let mut cache = FingerprintCache::new();
        cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        fs.write_at("a.o", "v1", 50);
        let e = cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        assert_eq!(e, Effective { mtime: Mtime(10), changed: false });
        assert_eq!(cache.get("a.o").unwrap().stat_mtime, Mtime(50));
    }

    #[test]
    fn test_ck040_new_content_is_newer() {
        let fs = MemFs::new();
        fs.write_at("a.o", "v1", 10);
        let mut cache = FingerprintCache::new();
        cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        fs.write_at("a.o", "v1", 20);
        cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        // clock skew: raw mtime goes backwards but content changed
        fs.write_at("a.o", "v2", 5);
        let e = cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        assert_eq!(e, Effective { mtime: Mtime(11), changed: true });
    }

    #[test]
    fn test_ck040_nowrite_leaves_cache() {
        let fs = MemFs::new();
        fs.write_at("a.o", "v1", 10);
        let mut cache = FingerprintCache::new();
        cache.effective(&fs, "a.o", stat(&fs, "a.o"), false).unwrap();
        assert!(cache.get("a.o").is_none());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_ck040_ingredients_hash() {
        let fs = MemFs::new();
        fs.write_at("app", "bin", 10);
        let mut cache = FingerprintCache::new();
        cache.set_ingredients_hash("app", "blake3:x".into());
        assert!(cache.ingredients_hash("app").is_none());
        cache.effective(&fs, "app", stat(&fs, "app"), true).unwrap();
        cache.set_ingredients_hash("app", "blake3:x".into());
        assert_eq!(cache.ingredients_hash("app"), Some("blake3:x"));
        // survives a content change
        fs.write_at("app", "bin2", 20);
        cache.effective(&fs, "app", stat(&fs, "app"), true).unwrap();
        assert_eq!(cache.ingredients_hash("app"), Some("blake3:x"));
        cache.forget("app");
        assert!(cache.get("app").is_none());
    }

    #[test]
    fn test_ck040_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = MemFs::new();
        fs.write_at("a.o", "v1", 10);
        let mut cache = FingerprintCache::new();
        cache.effective(&fs, "a.o", stat(&fs, "a.o"), true).unwrap();
        save_cache(dir.path(), &cache).unwrap();
        assert!(!dir.path().join("fingerprints.yaml.tmp").exists());
        let loaded = load_cache(dir.path()).unwrap();
        assert_eq!(loaded.get("a.o"), cache.get("a.o"));
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_ck040_load_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_cache(dir.path()).unwrap().files.is_empty());
        std::fs::write(cache_file_path(dir.path()), "files: [not a map").unwrap();
        assert!(load_cache(dir.path()).unwrap_err().contains("invalid fingerprint cache"));
    }
}
