//! Fusion of the reported risk tier with the heuristic score, plus size mapping.

use crate::types::{DiffStats, FusedResult, RiskLevel, SizeLabel};

/// Integer-only fusion: floor((heuristic + reported) / 2), then banded.
pub fn fuse_risk(heuristic_score: i64, reported: RiskLevel) -> RiskLevel {
  let combined = (heuristic_score + reported.numeric()).div_euclid(2);
  RiskLevel::from_combined(combined)
}

/// Final risk, breaking flag (OR of both sources) and size tier for one run.
pub fn fuse(
  heuristic_score: i64,
  reported_risk: RiskLevel,
  reported_breaking: bool,
  heuristic_breaking: bool,
  stats: &DiffStats,
) -> FusedResult {
  FusedResult {
    final_risk: fuse_risk(heuristic_score, reported_risk),
    final_breaking: reported_breaking || heuristic_breaking,
    size_label: SizeLabel::from_total_lines(stats.total_lines()),
  }
}
