//! Trigger context: which pull request, against which base.

use std::path::Path;

use serde::Deserialize;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext {
  pub pr_number: u64,
  pub base_ref: String,
  pub head_sha: Option<String>,
  /// "owner/name".
  pub repository: Option<String>,
}

/// The parts of a pull_request event payload we read. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct EventPayload {
  #[serde(default)]
  pub number: Option<u64>,
  #[serde(default)]
  pub pull_request: Option<EventPullRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventPullRequest {
  #[serde(default)]
  pub number: Option<u64>,
  #[serde(default)]
  pub base: Option<EventRef>,
  #[serde(default)]
  pub head: Option<EventRef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventRef {
  #[serde(default, rename = "ref")]
  pub git_ref: Option<String>,
  #[serde(default)]
  pub sha: Option<String>,
}

impl EventPayload {
  pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
    let raw = std::fs::read_to_string(path)
      .map_err(|e| PipelineError::context(format!("read event {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
      .map_err(|e| PipelineError::context(format!("parse event {}: {}", path.display(), e)))
  }

  fn pr_number(&self) -> Option<u64> {
    self
      .pull_request
      .as_ref()
      .and_then(|pr| pr.number)
      .or(self.number)
  }

  fn base_ref(&self) -> Option<String> {
    self
      .pull_request
      .as_ref()
      .and_then(|pr| pr.base.as_ref())
      .and_then(|b| b.git_ref.clone())
  }

  fn head_sha(&self) -> Option<String> {
    self
      .pull_request
      .as_ref()
      .and_then(|pr| pr.head.as_ref())
      .and_then(|h| h.sha.clone())
  }
}

/// Explicit values that take precedence over the event payload.
#[derive(Debug, Default, Clone)]
pub struct ContextOverrides {
  pub pr_number: Option<u64>,
  pub base_ref: Option<String>,
  pub repository: Option<String>,
}

/// Merge overrides with the event payload. A missing PR number is fatal.
pub fn resolve(
  event: Option<&EventPayload>,
  overrides: &ContextOverrides,
) -> Result<TriggerContext, PipelineError> {
  let pr_number = overrides
    .pr_number
    .or_else(|| event.and_then(EventPayload::pr_number))
    .filter(|n| *n > 0)
    .ok_or(PipelineError::MissingPullRequest)?;

  let base_ref = overrides
    .base_ref
    .clone()
    .filter(|s| !s.trim().is_empty())
    .or_else(|| event.and_then(EventPayload::base_ref))
    .unwrap_or_else(|| "main".to_string());

  Ok(TriggerContext {
    pr_number,
    base_ref,
    head_sha: event.and_then(EventPayload::head_sha),
    repository: overrides.repository.clone().filter(|s| !s.trim().is_empty()),
  })
}
