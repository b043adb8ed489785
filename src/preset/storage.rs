//! String key-value storage port.
//!
//! The preset store never touches a global; it is handed a [`Storage`]
//! implementation. Two ship with the crate:
//!
//! - [`MemoryStorage`]: a plain in-process map, used by tests and as the
//!   runner's default.
//! - [`FileStorage`]: the whole map persisted as one JSON object, written
//!   through on every change by replacing the file atomically. Concurrent
//!   writers are not coordinated; the last write wins.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PatternError, Result};

/// A string-keyed, string-valued store.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: String) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    /// Every key currently stored.
    fn keys(&self) -> Result<Vec<String>>;

    /// Bytes used by all entries except `key`, counted as key length plus
    /// value length.
    fn usage_excluding(&self, key: &str) -> Result<usize> {
        let mut total = 0;
        for k in self.keys()? {
            if k == key {
                continue;
            }
            let value_len = self.get(&k)?.map_or(0, |v| v.len());
            total += k.len() + value_len;
        }
        Ok(total)
    }
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }

    fn usage_excluding(&self, key: &str) -> Result<usize> {
        (**self).usage_excluding(key)
    }
}

/// In-memory storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// Storage backed by a single JSON file.
///
/// The file is read once on [`open`](Self::open); every mutation rewrites
/// it. A missing or empty file opens as an empty store. [`open`](Self::open)
/// refuses a file that is not a JSON string map;
/// [`open_or_empty`](Self::open_or_empty) sets it aside and starts empty.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(json) if json.trim().is_empty() => BTreeMap::new(),
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        log::debug!("opened storage {:?} with {} keys", path, entries.len());
        Ok(Self { path, entries })
    }

    /// Like [`open`](Self::open), but a file that does not parse is renamed
    /// to `<path>.corrupt` and the store starts empty. IO errors still fail.
    pub fn open_or_empty(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::open(path) {
            Err(PatternError::Json(e)) => {
                let backup = sibling(path, ".corrupt");
                log::warn!(
                    "Storage file {:?} is corrupt ({}); moved to {:?}, starting empty",
                    path,
                    e,
                    backup
                );
                fs::rename(path, &backup)?;
                Ok(Self {
                    path: path.to_path_buf(),
                    entries: BTreeMap::new(),
                })
            }
            other => other,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        // Write beside the target and rename over it, so a crash mid-write
        // never leaves a truncated store behind.
        let tmp = sibling(&self.path, ".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.persist()
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_path(tag: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("patternkit-storage-{}-{}-{}.json", tag, std::process::id(), n))
    }

    #[test]
    fn test_memory_storage_basics() {
        let mut s = MemoryStorage::new();
        assert_eq!(s.get("a").unwrap(), None);

        s.set("a", "1".into()).unwrap();
        s.set("b", "22".into()).unwrap();
        assert_eq!(s.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(s.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        s.remove("a").unwrap();
        assert_eq!(s.len(), 1);
        s.clear().unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn test_usage_excluding() {
        let mut s = MemoryStorage::new();
        s.set("ab", "1234".into()).unwrap();
        s.set("presets", "[]".into()).unwrap();
        assert_eq!(s.usage_excluding("presets").unwrap(), 6);
        assert_eq!(s.usage_excluding("other").unwrap(), 6 + 9);
    }

    #[test]
    fn test_boxed_storage_delegates() {
        let mut boxed: Box<dyn Storage> = Box::new(MemoryStorage::new());
        boxed.set("k", "value".into()).unwrap();
        assert_eq!(boxed.get("k").unwrap().as_deref(), Some("value"));
        assert_eq!(boxed.usage_excluding("other").unwrap(), 6);
    }

    #[test]
    fn test_file_storage_persists() {
        let path = temp_path("persist");
        {
            let mut s = FileStorage::open(&path).unwrap();
            s.set("pattern-presets", "[]".into()).unwrap();
            s.set("theme", "dark".into()).unwrap();
            s.remove("theme").unwrap();
        }
        let s = FileStorage::open(&path).unwrap();
        assert_eq!(s.get("pattern-presets").unwrap().as_deref(), Some("[]"));
        assert_eq!(s.get("theme").unwrap(), None);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_storage_missing_and_empty() {
        let path = temp_path("missing");
        let s = FileStorage::open(&path).unwrap();
        assert!(s.keys().unwrap().is_empty());

        fs::write(&path, "  \n").unwrap();
        let s = FileStorage::open(&path).unwrap();
        assert!(s.keys().unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_storage_corrupt_is_error() {
        let path = temp_path("corrupt");
        fs::write(&path, "{not json").unwrap();
        assert!(FileStorage::open(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_storage_open_or_empty_sets_corrupt_file_aside() {
        let path = temp_path("recover");
        fs::write(&path, "{\"pattern-presets\": [trunc").unwrap();

        let mut s = FileStorage::open_or_empty(&path).unwrap();
        assert!(s.keys().unwrap().is_empty());
        let backup = sibling(&path, ".corrupt");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "{\"pattern-presets\": [trunc");

        s.set("pattern-presets", "[]".into()).unwrap();
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("pattern-presets").unwrap().as_deref(), Some("[]"));
        assert!(!sibling(&path, ".tmp").exists());

        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(&backup);
    }

    #[test]
    fn test_file_storage_open_or_empty_keeps_good_file() {
        let path = temp_path("recover-good");
        fs::write(&path, "{\"theme\": \"dark\"}").unwrap();
        let s = FileStorage::open_or_empty(&path).unwrap();
        assert_eq!(s.get("theme").unwrap().as_deref(), Some("dark"));
        assert!(!sibling(&path, ".corrupt").exists());
        let _ = fs::remove_file(&path);
    }
}
