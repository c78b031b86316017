//! PR Risk Engine: heuristic scoring, risk fusion and label mapping; no DB, no network.
//! Used by the pr-summary pipeline as a library and by the binary for stdin/stdout.

pub mod fusion;
pub mod heuristics;
pub mod types;

pub use fusion::{fuse, fuse_risk};
pub use types::{
  ClassificationRecord, DiffStats, FusedResult, HeuristicAssessment, Input, Output, RiskLevel,
  SizeLabel,
};

/// Run the engine on parsed input and return the output (no I/O).
///
/// Without a reported tier the heuristic score stands in for it.
pub fn run(input: &Input) -> Output {
  let diff_text = input.diff_text.as_deref().unwrap_or("");
  let heuristic = heuristics::assess(&input.stats, &input.paths, diff_text);
  let reported = match &input.ai_risk {
    Some(token) => RiskLevel::from_token(token),
    None => heuristics::risk_from_score(heuristic.score),
  };
  let fused = fuse(
    heuristic.score,
    reported,
    input.ai_breaking,
    heuristic.breaking,
    &input.stats,
  );
  let labels = fused.labels();

  Output {
    heuristic,
    fused,
    labels,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn run_returns_valid_output_shape() {
    let input = Input {
      stats: DiffStats::new(2, 550, 50),
      paths: vec!["src/db.rs".to_string(), "Cargo.lock".to_string()],
      diff_text: Some("+ALTER TABLE users ADD COLUMN age int;".to_string()),
      ai_risk: Some("low".to_string()),
      ai_breaking: false,
    };
    let out = run(&input);
    assert_eq!(out.heuristic.score, 4);
    assert_eq!(out.fused.final_risk, RiskLevel::High);
    assert!(out.fused.final_breaking);
    assert_eq!(out.fused.size_label, SizeLabel::Large);
    assert_eq!(out.labels.len(), 3);
  }

  #[test]
  fn missing_reported_risk_uses_heuristic_tier() {
    let input = Input {
      stats: DiffStats::new(1, 10, 0),
      paths: vec![],
      diff_text: None,
      ai_risk: None,
      ai_breaking: false,
    };
    let out = run(&input);
    assert_eq!(out.fused.final_risk, RiskLevel::Low);
    assert_eq!(out.labels, vec!["size: XS", "risk: low"]);
  }
}
