//! Shared data model for classification, fusion and labels (JSON contracts + internal models).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Diff statistics
// ---------------------------------------------------------------------------

/// Numeric diff stats for one run. All-zero is the degraded value when git fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
  pub files_changed: u64,
  pub lines_added: u64,
  pub lines_removed: u64,
}

impl DiffStats {
  pub fn new(files_changed: u64, lines_added: u64, lines_removed: u64) -> Self {
    Self {
      files_changed,
      lines_added,
      lines_removed,
    }
  }

  pub fn total_lines(&self) -> u64 {
    self.lines_added.saturating_add(self.lines_removed)
  }
}

// ---------------------------------------------------------------------------
// Risk tier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
  Low,
  Medium,
  High,
}

impl RiskLevel {
  /// Loose parse of a reported tier. Unknown tokens count as medium.
  pub fn from_token(s: &str) -> Self {
    match s.trim().to_ascii_lowercase().as_str() {
      "low" => Self::Low,
      "high" => Self::High,
      _ => Self::Medium,
    }
  }

  pub fn numeric(self) -> i64 {
    match self {
      Self::Low => 0,
      Self::Medium => 1,
      Self::High => 2,
    }
  }

  /// Tier for a combined fusion value: <=0 low, >=2 high.
  pub fn from_combined(combined: i64) -> Self {
    if combined <= 0 {
      Self::Low
    } else if combined >= 2 {
      Self::High
    } else {
      Self::Medium
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
    }
  }

  pub fn label(self) -> String {
    format!("risk: {}", self.as_str())
  }
}

impl Default for RiskLevel {
  fn default() -> Self {
    Self::Medium
  }
}

impl std::fmt::Display for RiskLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ---------------------------------------------------------------------------
// Size tier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeLabel {
  XS,
  Small,
  Medium,
  Large,
  XL,
}

impl SizeLabel {
  /// Lower bounds are inclusive: 50 is Small, 2000 is XL.
  pub fn from_total_lines(total: u64) -> Self {
    match total {
      0..=49 => Self::XS,
      50..=199 => Self::Small,
      200..=499 => Self::Medium,
      500..=1999 => Self::Large,
      _ => Self::XL,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::XS => "XS",
      Self::Small => "Small",
      Self::Medium => "Medium",
      Self::Large => "Large",
      Self::XL => "XL",
    }
  }

  pub fn label(self) -> String {
    format!("size: {}", self.as_str())
  }
}

impl std::fmt::Display for SizeLabel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Label applied when the final breaking flag is set.
pub const BREAKING_LABEL: &str = "breaking-change";

/// True for labels this engine owns (size, risk, breaking).
pub fn is_managed_label(name: &str) -> bool {
  name.starts_with("size: ") || name.starts_with("risk: ") || name == BREAKING_LABEL
}

// ---------------------------------------------------------------------------
// Classification record
// ---------------------------------------------------------------------------

/// Summary + risk for one diff, from the summary service or the local fallback.
/// Write-once: cached by diff hash, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
  pub summary: String,
  #[serde(default)]
  pub breaking_change: bool,
  #[serde(default)]
  pub risk: RiskLevel,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Heuristic + fused output
// ---------------------------------------------------------------------------

/// Independent local assessment of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeuristicAssessment {
  pub score: i64,
  pub breaking: bool,
  pub reasons: Vec<String>,
}

/// Final per-run result. Recomputed every run, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FusedResult {
  pub final_risk: RiskLevel,
  pub final_breaking: bool,
  pub size_label: SizeLabel,
}

impl FusedResult {
  /// Ordered label set: size, risk, then breaking-change if flagged.
  pub fn labels(&self) -> Vec<String> {
    let mut labels = vec![self.size_label.label(), self.final_risk.label()];
    if self.final_breaking {
      labels.push(BREAKING_LABEL.to_string());
    }
    labels
  }
}

// ---------------------------------------------------------------------------
// Binary contract (stdin / stdout)
// ---------------------------------------------------------------------------

/// Input: one JSON object on stdin.
#[derive(Debug, Deserialize)]
pub struct Input {
  pub stats: DiffStats,
  #[serde(default)]
  pub paths: Vec<String>,
  #[serde(default)]
  pub diff_text: Option<String>,
  /// Tier reported by the summary service; absent means the heuristic stands alone.
  #[serde(default)]
  pub ai_risk: Option<String>,
  #[serde(default)]
  pub ai_breaking: bool,
}

/// Output: one JSON object on stdout.
#[derive(Debug, Serialize)]
pub struct Output {
  pub heuristic: HeuristicAssessment,
  pub fused: FusedResult,
  pub labels: Vec<String>,
}
