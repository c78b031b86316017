//! Diff collection against the base branch via the git CLI.
//!
//! Every git failure degrades to zero stats and an empty blob; collection never aborts a run.

use std::path::{Path, PathBuf};
use std::process::Command;

use pr_risk::DiffStats;
use tracing::{debug, warn};

/// Immutable diff view for the rest of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSnapshot {
  pub stats: DiffStats,
  pub paths: Vec<String>,
  /// Full, untruncated diff bytes exactly as git wrote them. The cache key covers these.
  pub raw: Vec<u8>,
  /// Text view of `raw` (invalid UTF-8 replaced) for heuristics and the outbound payload.
  pub blob: String,
}

impl DiffSnapshot {
  pub fn new(stats: DiffStats, paths: Vec<String>, raw: Vec<u8>) -> Self {
    let blob = String::from_utf8_lossy(&raw).into_owned();
    Self {
      stats,
      paths,
      raw,
      blob,
    }
  }

  /// Outbound copy of the blob, cut to at most `max_bytes` on a char boundary.
  pub fn truncated(&self, max_bytes: usize) -> &str {
    truncate_to_bytes(&self.blob, max_bytes)
  }
}

pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
  if text.len() <= max_bytes {
    return text;
  }
  let mut end = max_bytes;
  while !text.is_char_boundary(end) {
    end -= 1;
  }
  &text[..end]
}

/// Parse `git diff --numstat` output into stats + paths.
///
/// Binary files (`-\t-\tpath`) count as changed with zero lines.
pub fn parse_numstat(raw: &str) -> (DiffStats, Vec<String>) {
  let mut stats = DiffStats::default();
  let mut paths = Vec::new();
  for line in raw.lines() {
    let mut parts = line.splitn(3, '\t');
    let (Some(added), Some(removed), Some(path)) = (parts.next(), parts.next(), parts.next())
    else {
      continue;
    };
    stats.files_changed += 1;
    stats.lines_added += added.trim().parse::<u64>().unwrap_or(0);
    stats.lines_removed += removed.trim().parse::<u64>().unwrap_or(0);
    paths.push(path.to_string());
  }
  (stats, paths)
}

pub struct DiffCollector {
  repo_dir: PathBuf,
  remote: String,
}

impl DiffCollector {
  pub fn new(repo_dir: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
    Self {
      repo_dir: repo_dir.into(),
      remote: remote.into(),
    }
  }

  /// Fetch the base (best effort), then diff the working tree against it.
  pub fn collect(&self, base_ref: &str) -> DiffSnapshot {
    if let Err(e) = git(&self.repo_dir, &["fetch", "--no-tags", &self.remote, base_ref]) {
      warn!(base_ref, error = %e, "git fetch failed; using local refs");
    }

    let remote_ref = format!("{}/{}", self.remote, base_ref);
    for against in [remote_ref.as_str(), base_ref] {
      match self.diff_against(against) {
        Ok(snapshot) => {
          debug!(
            against,
            files = snapshot.stats.files_changed,
            added = snapshot.stats.lines_added,
            removed = snapshot.stats.lines_removed,
            "collected diff"
          );
          return snapshot;
        }
        Err(e) => warn!(against, error = %e, "git diff failed"),
      }
    }

    warn!(base_ref, "no usable base; continuing with empty diff");
    DiffSnapshot::default()
  }

  fn diff_against(&self, base: &str) -> Result<DiffSnapshot, String> {
    let numstat = git(&self.repo_dir, &["diff", "--numstat", base])?;
    let raw = git(&self.repo_dir, &["diff", base])?;
    let (stats, paths) = parse_numstat(&String::from_utf8_lossy(&numstat));
    Ok(DiffSnapshot::new(stats, paths, raw))
  }
}

fn git(dir: &Path, args: &[&str]) -> Result<Vec<u8>, String> {
  let output = Command::new("git")
    .args(args)
    .current_dir(dir)
    .output()
    .map_err(|e| format!("spawn git: {}", e))?;
  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(format!("git {} exited {}: {}", args[0], output.status, stderr.trim()));
  }
  Ok(output.stdout)
}
