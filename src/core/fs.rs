//! CK-007: Filesystem access used by the resolver and the walk.
//!
//! The core only stats files, creates directories for `mkdir` recipes,
//! removes outputs for `unlink`/non-precious recipes, and fingerprints
//! files. Everything else a recipe does happens in its commands.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Modification time in nanoseconds since the epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Mtime(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub mtime: Mtime,
    pub size: u64,
}

pub trait FileSystem: Send + Sync {
    /// `None` when the path does not exist.
    fn stat(&self, path: &str) -> Option<FileStat>;

    fn mkdir_recursive(&self, path: &str) -> Result<(), String>;

    fn remove_file(&self, path: &str) -> Result<(), String>;

    /// `"blake3:{hex}"` of the file contents.
    fn fingerprint(&self, path: &str) -> Result<String, String>;

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_some()
    }
}

/// The real filesystem, with relative paths taken from `root`.
#[derive(Debug, Clone)]
pub struct HostFs {
    root: PathBuf,
}

impl HostFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl FileSystem for HostFs {
    fn stat(&self, path: &str) -> Option<FileStat> {
        let meta = std::fs::metadata(self.full(path)).ok()?;
        let nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        Some(FileStat {
            mtime: Mtime(nanos),
            size: meta.len(),
        })
    }

    fn mkdir_recursive(&self, path: &str) -> Result<(), String> {
        let full = self.full(path);
        std::fs::create_dir_all(&full)
            .map_err(|e| format!("cannot create dir {}: {}", full.display(), e))
    }

    fn remove_file(&self, path: &str) -> Result<(), String> {
        let full = self.full(path);
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("cannot remove {}: {}", full.display(), e)),
        }
    }

    fn fingerprint(&self, path: &str) -> Result<String, String> {
        crate::fingerprint::hasher::hash_file(&self.full(path))
    }
}

#[derive(Debug, Clone)]
struct MemFile {
    mtime: Mtime,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemState {
    files: BTreeMap<String, MemFile>,
    dirs: Vec<String>,
    clock: u64,
}

/// In-memory filesystem with a logical clock. Every write advances the
/// clock, so later writes are always newer.
#[derive(Debug, Default)]
pub struct MemFs {
    state: Mutex<MemState>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a file stamped with the next clock tick.
    pub fn write(&self, path: &str, content: impl Into<Vec<u8>>) -> Mtime {
        let mut st = self.state.lock();
        st.clock += 1;
        let mtime = Mtime(st.clock);
        st.files.insert(
            path.to_string(),
            MemFile {
                mtime,
                content: content.into(),
            },
        );
        mtime
    }

    /// Write a file with an explicit mtime. The clock moves past it.
    pub fn write_at(&self, path: &str, content: impl Into<Vec<u8>>, mtime: u64) {
        let mut st = self.state.lock();
        st.clock = st.clock.max(mtime);
        st.files.insert(
            path.to_string(),
            MemFile {
                mtime: Mtime(mtime),
                content: content.into(),
            },
        );
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).map(|f| f.content.clone())
    }

    pub fn dirs(&self) -> Vec<String> {
        self.state.lock().dirs.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }
}

impl FileSystem for MemFs {
    fn stat(&self, path: &str) -> Option<FileStat> {
        self.state.lock().files.get(path).map(|f| FileStat {
            mtime: f.mtime,
            size: f.content.len() as u64,
        })
    }

    fn mkdir_recursive(&self, path: &str) -> Result<(), String> {
        let mut st = self.state.lock();
        if !st.dirs.iter().any(|d| d == path) {
            st.dirs.push(path.to_string());
        }
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<(), String> {
        self.state.lock().files.remove(path);
        Ok(())
    }

    fn fingerprint(&self, path: &str) -> Result<String, String> {
        let st = self.state.lock();
        let file = st
            .files
            .get(path)
            .ok_or_else(|| format!("cannot open {}: not found", path))?;
        Ok(crate::fingerprint::hasher::hash_bytes(&file.content))
    }
}

/// Directory part of a path, `None` for a bare file name.
pub fn parent_dir(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) => None,
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ck007_memfs_clock_orders_writes() {
        let fs = MemFs::new();
        let a = fs.write("a", "1");
        let b = fs.write("b", "2");
        assert!(b > a);
        fs.write_at("c", "3", 100);
        assert!(fs.write("d", "4") > Mtime(100));
        assert_eq!(fs.stat("a").unwrap().size, 1);
        assert!(fs.stat("zz").is_none());
    }

    #[test]
    fn test_ck007_memfs_remove_and_fingerprint() {
        let fs = MemFs::new();
        fs.write("x.o", "obj");
        let h = fs.fingerprint("x.o").unwrap();
        assert!(h.starts_with("blake3:"));
        fs.remove_file("x.o").unwrap();
        assert!(!fs.exists("x.o"));
        assert!(fs.fingerprint("x.o").is_err());
    }

    #[test]
    fn test_ck007_hostfs_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = HostFs::new(dir.path());
        fs.mkdir_recursive("out/obj").unwrap();
        std::fs::write(dir.path().join("out/obj/a.o"), "obj").unwrap();
        let st = fs.stat("out/obj/a.o").unwrap();
        assert_eq!(st.size, 3);
        assert!(st.mtime > Mtime(0));
        assert!(fs.fingerprint("out/obj/a.o").unwrap().starts_with("blake3:"));
        fs.remove_file("out/obj/a.o").unwrap();
        fs.remove_file("out/obj/a.o").unwrap();
        assert!(!fs.exists("out/obj/a.o"));
    }

    #[test]
    fn test_ck007_parent_dir() {
        assert_eq!(parent_dir("a/b/c.o"), Some("a/b"));
        assert_eq!(parent_dir("c.o"), None);
        assert_eq!(parent_dir("/c.o"), None);
    }
}
