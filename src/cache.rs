//! # Cache Store
//! Keyed `{value, ts}` persistence so a restarted process can paint the last
//! known metric without touching the network.
//!
//! Both stores fail soft: a read that cannot be completed or parsed is a miss,
//! a write that cannot be completed is dropped. Keys are plain strings; callers
//! pick their own prefixes.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A persisted metric value and the wall-clock time it was written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedValue {
    pub value: f64,
    /// Milliseconds since the UNIX epoch.
    #[serde(rename = "ts")]
    pub timestamp: i64,
}

impl CachedValue {
    /// Valid while `now - timestamp < ttl`.
    pub fn is_valid(&self, ttl: Duration, now_ms: i64) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) < ttl_ms
    }
}

pub trait CacheStore: Send + Sync {
    /// Raw read, no TTL applied. `None` on any storage or decode problem.
    fn load(&self, key: &str) -> Option<CachedValue>;

    /// Raw write. Silently dropped when storage is unavailable.
    fn store(&self, key: &str, entry: CachedValue);

    /// TTL-checked read: expired or non-finite entries are treated as absent.
    fn get(&self, key: &str, ttl: Duration, now_ms: i64) -> Option<CachedValue> {
        self.load(key)
            .filter(|c| c.value.is_finite() && c.is_valid(ttl, now_ms))
    }

    fn set(&self, key: &str, value: f64, now_ms: i64) {
        if !value.is_finite() {
            return;
        }
        self.store(
            key,
            CachedValue {
                value,
                timestamp: now_ms,
            },
        );
    }
}

/// Process-local store. Shared between feeds through an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, CachedValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Option<CachedValue> {
        self.inner.lock().ok()?.get(key).copied()
    }

    fn store(&self, key: &str, entry: CachedValue) {
        if let Ok(mut g) = self.inner.lock() {
            g.insert(key.to_string(), entry);
        }
    }
}

/// JSON file holding every key: `{"feed:price": {"value": 0.8, "ts": 1700000000000}}`.
///
/// Writes go through a temp file + rename so a crash never leaves a torn document.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> io::Result<HashMap<String, CachedValue>> {
        let s = fs::read_to_string(&self.path)?;
        serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write_all(&self, doc: &HashMap<String, CachedValue>) -> io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json =
            serde_json::to_vec(doc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&json)?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

impl CacheStore for FileStore {
    fn load(&self, key: &str) -> Option<CachedValue> {
        match self.read_all() {
            Ok(mut doc) => doc.remove(key),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(path = %self.path.display(), error = %e, "cache read failed");
                }
                None
            }
        }
    }

    fn store(&self, key: &str, entry: CachedValue) {
        let Ok(_guard) = self.write_lock.lock() else {
            return;
        };
        // A corrupt document is replaced rather than blocking every later write.
        let mut doc = self.read_all().unwrap_or_default();
        doc.insert(key.to_string(), entry);
        if let Err(e) = self.write_all(&doc) {
            tracing::debug!(path = %self.path.display(), error = %e, "cache write dropped");
        }
    }
}
