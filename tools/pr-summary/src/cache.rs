//! Content-addressed classification cache.
//!
//! Key: blake3 hex digest of the full (untruncated) diff. One directory holds, per key,
//! `<hash>.json` (record + timestamp) and `<hash>.summary.txt` (plain summary text).
//! Writes are whole-file, last-writer-wins; no locking unless a caller asks for a [`KeyLock`].

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use pr_risk::ClassificationRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;

/// Hex digest identifying one diff's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiffHash(pub String);

impl DiffHash {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for DiffHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Hash of the full diff blob. Truncation for the outbound request never changes it.
pub fn diff_hash(blob: &[u8]) -> DiffHash {
  DiffHash(blake3::hash(blob).to_hex().to_string())
}

/// When stored entries stop counting as hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
  #[default]
  Never,
  /// Entries older than this are misses and get pruned.
  MaxAge(Duration),
  /// Keep at most this many entries, dropping the oldest on prune.
  MaxEntries(usize),
}

/// Key-value view the pipeline depends on.
pub trait CacheStore {
  /// Pure read; no side effects.
  fn lookup(&self, hash: &DiffHash) -> Result<Option<ClassificationRecord>, CacheError>;

  fn store(&self, hash: &DiffHash, record: &ClassificationRecord) -> Result<(), CacheError>;

  /// Advisory per-key lock held across classify + store. Stores without locking return `None`.
  fn lock_key(&self, _hash: &DiffHash) -> Result<Option<KeyLock>, CacheError> {
    Ok(None)
  }
}

/// On-disk entry: the record plus when it was written.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
  #[serde(flatten)]
  record: ClassificationRecord,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  cached_at: Option<DateTime<Utc>>,
}

pub struct FileCache {
  dir: PathBuf,
  policy: EvictionPolicy,
}

impl FileCache {
  pub fn new(dir: impl Into<PathBuf>, policy: EvictionPolicy) -> Self {
    Self {
      dir: dir.into(),
      policy,
    }
  }

  fn json_path(&self, hash: &DiffHash) -> PathBuf {
    self.dir.join(format!("{}.json", hash))
  }

  fn summary_path(&self, hash: &DiffHash) -> PathBuf {
    self.dir.join(format!("{}.summary.txt", hash))
  }

  fn lock_path(&self, hash: &DiffHash) -> PathBuf {
    self.dir.join(format!("{}.lock", hash))
  }

  /// Plain-text summary for callers that skip the JSON record.
  pub fn read_summary_text(&self, hash: &DiffHash) -> Result<Option<String>, CacheError> {
    let path = self.summary_path(hash);
    match fs::read_to_string(&path) {
      Ok(text) => Ok(Some(text)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(CacheError::io(&path, e)),
    }
  }

  /// Advisory exclusive lock on one key; blocks until acquired, released on drop.
  pub fn lock(&self, hash: &DiffHash) -> Result<KeyLock, CacheError> {
    fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
    let path = self.lock_path(hash);
    let file = OpenOptions::new()
      .create(true)
      .truncate(false)
      .write(true)
      .open(&path)
      .map_err(|e| CacheError::io(&path, e))?;
    file.lock_exclusive().map_err(|e| CacheError::io(&path, e))?;
    debug!(hash = %hash, "acquired cache key lock");
    Ok(KeyLock { file, path })
  }

  fn is_expired(&self, cached_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let EvictionPolicy::MaxAge(max_age) = self.policy else {
      return false;
    };
    // Entries without a timestamp predate the policy; treat them as expired.
    let Some(cached_at) = cached_at else {
      return true;
    };
    let age = now.signed_duration_since(cached_at);
    age.to_std().map(|age| age > max_age).unwrap_or(false)
  }

  /// Remove entries the policy no longer wants. Returns how many were removed.
  pub fn prune(&self) -> Result<usize, CacheError> {
    if self.policy == EvictionPolicy::Never {
      return Ok(0);
    }
    let now = Utc::now();
    let mut entries = self.list_entries()?;
    let mut doomed = Vec::new();

    match self.policy {
      EvictionPolicy::Never => {}
      EvictionPolicy::MaxAge(_) => {
        entries.retain(|(hash, cached_at)| {
          if self.is_expired(*cached_at, now) {
            doomed.push(hash.clone());
            false
          } else {
            true
          }
        });
      }
      EvictionPolicy::MaxEntries(max) => {
        if entries.len() > max {
          // Oldest first; missing timestamps sort before everything.
          entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
          let excess = entries.len() - max;
          doomed.extend(entries.drain(..excess).map(|(hash, _)| hash));
        }
      }
    }

    for hash in &doomed {
      for path in [self.json_path(hash), self.summary_path(hash), self.lock_path(hash)] {
        if let Err(e) = fs::remove_file(&path) {
          if e.kind() != std::io::ErrorKind::NotFound {
            return Err(CacheError::io(&path, e));
          }
        }
      }
    }
    if !doomed.is_empty() {
      debug!(removed = doomed.len(), "pruned cache entries");
    }
    Ok(doomed.len())
  }

  fn list_entries(&self) -> Result<Vec<(DiffHash, Option<DateTime<Utc>>)>, CacheError> {
    let read_dir = match fs::read_dir(&self.dir) {
      Ok(rd) => rd,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(CacheError::io(&self.dir, e)),
    };
    let mut out = Vec::new();
    for entry in read_dir {
      let entry = entry.map_err(|e| CacheError::io(&self.dir, e))?;
      let name = entry.file_name().to_string_lossy().into_owned();
      let Some(stem) = name.strip_suffix(".json") else {
        continue;
      };
      let hash = DiffHash(stem.to_string());
      let cached_at = fs::read_to_string(entry.path())
        .ok()
        .and_then(|raw| serde_json::from_str::<StoredEntry>(&raw).ok())
        .and_then(|stored| stored.cached_at);
      out.push((hash, cached_at));
    }
    Ok(out)
  }
}

impl CacheStore for FileCache {
  fn lookup(&self, hash: &DiffHash) -> Result<Option<ClassificationRecord>, CacheError> {
    let path = self.json_path(hash);
    let raw = match fs::read_to_string(&path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(CacheError::io(&path, e)),
    };
    let stored: StoredEntry = match serde_json::from_str(&raw) {
      Ok(stored) => stored,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "corrupt cache entry; treating as miss");
        return Ok(None);
      }
    };
    if self.is_expired(stored.cached_at, Utc::now()) {
      debug!(hash = %hash, "cache entry expired");
      return Ok(None);
    }
    Ok(Some(stored.record))
  }

  fn store(&self, hash: &DiffHash, record: &ClassificationRecord) -> Result<(), CacheError> {
    fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
    let stored = StoredEntry {
      record: record.clone(),
      cached_at: Some(Utc::now()),
    };
    let json = serde_json::to_vec_pretty(&stored)?;
    write_whole(&self.json_path(hash), &json)?;
    write_whole(&self.summary_path(hash), record.summary.as_bytes())?;
    self.prune()?;
    Ok(())
  }

  fn lock_key(&self, hash: &DiffHash) -> Result<Option<KeyLock>, CacheError> {
    self.lock(hash).map(Some)
  }
}

/// Write to a sibling temp file, then rename over the target.
fn write_whole(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
  let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
  fs::write(&tmp, bytes).map_err(|e| CacheError::io(&tmp, e))?;
  fs::rename(&tmp, path).map_err(|e| CacheError::io(path, e))
}

/// Held advisory lock on one cache key.
pub struct KeyLock {
  file: File,
  path: PathBuf,
}

impl Drop for KeyLock {
  fn drop(&mut self) {
    if let Err(e) = FileExt::unlock(&self.file) {
      warn!(path = %self.path.display(), error = %e, "failed to release cache key lock");
    }
  }
}
