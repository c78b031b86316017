//! Heuristic risk score and breaking-change markers derived from diff stats, paths and text.

use crate::types::{DiffStats, HeuristicAssessment, RiskLevel};

/// Dependency / build manifests (lowercase filename substrings).
const MANIFEST_PATTERNS: &[&str] = &[
  "package.json",
  "package-lock.json",
  "yarn.lock",
  "pnpm-lock",
  "npm-shrinkwrap",
  "cargo.toml",
  "cargo.lock",
  "go.mod",
  "go.sum",
  "pom.xml",
  "build.gradle",
  "settings.gradle",
  "requirements.txt",
  "pipfile",
  "poetry.lock",
  "pyproject.toml",
  "gemfile",
  "composer.json",
  "composer.lock",
];

/// Case-insensitive markers for schema or API breakage.
const BREAKING_MARKERS: &[&str] = &[
  "breaking change",
  "breaking-change",
  "drop table",
  "alter table",
  "drop column",
  "rename column",
  "migration",
];

fn is_manifest(path: &str) -> bool {
  let p = path.to_lowercase();
  MANIFEST_PATTERNS.iter().any(|m| p.contains(m))
}

/// Paths named in `diff --git a/.. b/..` headers of a unified diff.
pub fn paths_from_diff(diff_text: &str) -> Vec<String> {
  diff_text
    .lines()
    .filter_map(|line| line.strip_prefix("diff --git "))
    .filter_map(|rest| rest.rsplit_once(" b/").map(|(_, b)| b.to_string()))
    .collect()
}

/// True if any changed path (or diff header) names a dependency/build manifest.
pub fn touches_manifest(paths: &[String], diff_text: &str) -> bool {
  paths.iter().any(|p| is_manifest(p))
    || paths_from_diff(diff_text).iter().any(|p| is_manifest(p))
}

/// True if the diff text carries any breaking-change marker.
pub fn has_breaking_marker(diff_text: &str) -> bool {
  let text = diff_text.to_lowercase();
  BREAKING_MARKERS.iter().any(|m| text.contains(m))
}

/// Additive score, starting at 0:
/// +2 manifest touch; +2 if >500 lines else +1 if >200; +1 if >10 files;
/// +1 if removals dominate and exceed 100 lines.
pub fn assess(stats: &DiffStats, paths: &[String], diff_text: &str) -> HeuristicAssessment {
  let mut score = 0;
  let mut reasons = Vec::new();
  let total = stats.total_lines();

  if touches_manifest(paths, diff_text) {
    score += 2;
    reasons.push("Touched dependency manifests or lockfiles".to_string());
  }
  if total > 500 {
    score += 2;
    reasons.push(format!("Large change ({} lines)", total));
  } else if total > 200 {
    score += 1;
    reasons.push(format!("Moderate change ({} lines)", total));
  }
  if stats.files_changed > 10 {
    score += 1;
    reasons.push(format!("Many files changed ({})", stats.files_changed));
  }
  if stats.lines_removed > stats.lines_added && stats.lines_removed > 100 {
    score += 1;
    reasons.push(format!("Mostly removals ({} lines removed)", stats.lines_removed));
  }

  let breaking = has_breaking_marker(diff_text);
  if breaking {
    reasons.push("Diff contains schema or API breaking markers".to_string());
  }

  HeuristicAssessment {
    score,
    breaking,
    reasons,
  }
}

/// Tier for a heuristic score on its own: 0 low, 1-2 medium, 3+ high.
pub fn risk_from_score(score: i64) -> RiskLevel {
  match score {
    i64::MIN..=0 => RiskLevel::Low,
    1..=2 => RiskLevel::Medium,
    _ => RiskLevel::High,
  }
}

/// Deterministic stats sentence used when no service summary is available.
pub fn fallback_summary(stats: &DiffStats) -> String {
  format!(
    "This pull request changes {} lines (+{} / -{}) across {} files.",
    stats.total_lines(),
    stats.lines_added,
    stats.lines_removed,
    stats.files_changed
  )
}
