//! Comment + label reconciliation against the pull request host.
//!
//! Exactly one comment carries [`COMMENT_MARKER`]; reruns update it in place. Writes are
//! retried a bounded number of times and never abort the run.

use std::time::Duration;

use pr_risk::types::is_managed_label;
use pr_risk::{ClassificationRecord, DiffStats, FusedResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::HostError;

/// Locates the one comment this pipeline owns.
pub const COMMENT_MARKER: &str = "<!-- pr-summary:marker -->";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
  pub id: u64,
  pub author: String,
  pub body: String,
}

/// The calls the pipeline issues against the hosting platform.
pub trait PullRequestHost {
  fn list_comments(&self, pr: u64) -> Result<Vec<Comment>, HostError>;
  fn create_comment(&self, pr: u64, body: &str) -> Result<Comment, HostError>;
  fn update_comment(&self, comment_id: u64, body: &str) -> Result<Comment, HostError>;
  fn add_labels(&self, pr: u64, labels: &[String]) -> Result<(), HostError>;
  fn list_labels(&self, pr: u64) -> Result<Vec<String>, HostError>;
  fn remove_label(&self, pr: u64, label: &str) -> Result<(), HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentAction {
  Created,
  Updated,
  Failed,
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
  pub comment: CommentAction,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub comment_id: Option<u64>,
  pub labels_applied: Vec<String>,
  pub labels_removed: Vec<String>,
  pub errors: Vec<String>,
}

impl PublishReport {
  pub fn skipped(labels: &[String]) -> Self {
    Self {
      comment: CommentAction::Skipped,
      comment_id: None,
      labels_applied: labels.to_vec(),
      labels_removed: Vec::new(),
      errors: Vec::new(),
    }
  }
}

/// Markdown body for the summary comment. Always contains the marker.
pub fn render_comment(
  record: &ClassificationRecord,
  fused: &FusedResult,
  stats: &DiffStats,
  reasons: &[String],
) -> String {
  let mut body = String::new();
  body.push_str(COMMENT_MARKER);
  body.push_str("\n## Pull request summary\n\n");
  body.push_str(record.summary.trim());
  body.push_str("\n\n");
  body.push_str("| | |\n|---|---|\n");
  body.push_str(&format!("| Risk | **{}** |\n", fused.final_risk));
  body.push_str(&format!(
    "| Breaking change | {} |\n",
    if fused.final_breaking { "**yes**" } else { "no" }
  ));
  body.push_str(&format!("| Size | {} |\n", fused.size_label));
  body.push_str(&format!(
    "| Diff | {} files, +{} / -{} |\n",
    stats.files_changed, stats.lines_added, stats.lines_removed
  ));

  if !reasons.is_empty() {
    body.push_str("\n**Risk signals**\n\n");
    for reason in reasons {
      body.push_str(&format!("- {}\n", reason));
    }
  }
  if let Some(notes) = record.notes.as_deref().filter(|n| !n.trim().is_empty()) {
    body.push_str(&format!("\n**Notes:** {}\n", notes.trim()));
  }
  body
}

pub struct Publisher<H> {
  host: H,
  bot_login: String,
  write_attempts: u32,
  write_backoff: Duration,
  reconcile_labels: bool,
}

impl<H: PullRequestHost> Publisher<H> {
  pub fn new(host: H, bot_login: impl Into<String>) -> Self {
    Self {
      host,
      bot_login: bot_login.into(),
      write_attempts: 3,
      write_backoff: Duration::from_secs(2),
      reconcile_labels: false,
    }
  }

  pub fn with_retries(mut self, attempts: u32, backoff: Duration) -> Self {
    self.write_attempts = attempts.max(1);
    self.write_backoff = backoff;
    self
  }

  pub fn with_label_reconciliation(mut self, enabled: bool) -> Self {
    self.reconcile_labels = enabled;
    self
  }

  /// Comment first, then labels. Failures are collected into the report.
  pub fn publish(&self, pr: u64, body: &str, labels: &[String]) -> PublishReport {
    let mut report = PublishReport {
      comment: CommentAction::Failed,
      comment_id: None,
      labels_applied: Vec::new(),
      labels_removed: Vec::new(),
      errors: Vec::new(),
    };

    match self.upsert_comment(pr, body) {
      Ok((action, id)) => {
        info!(pr, comment_id = id, ?action, "summary comment published");
        report.comment = action;
        report.comment_id = Some(id);
      }
      Err(e) => {
        warn!(pr, error = %e, "failed to publish summary comment");
        report.errors.push(format!("comment: {}", e));
      }
    }

    if self.reconcile_labels {
      match self.remove_stale_labels(pr, labels) {
        Ok(removed) => report.labels_removed = removed,
        Err(e) => {
          warn!(pr, error = %e, "failed to reconcile labels");
          report.errors.push(format!("labels: {}", e));
        }
      }
    }

    match self.retrying("add labels", || self.host.add_labels(pr, labels)) {
      Ok(()) => {
        info!(pr, labels = ?labels, "labels applied");
        report.labels_applied = labels.to_vec();
      }
      Err(e) => {
        warn!(pr, error = %e, "failed to apply labels");
        report.errors.push(format!("labels: {}", e));
      }
    }

    report
  }

  fn owns(&self, comment: &Comment) -> bool {
    comment.body.contains(COMMENT_MARKER)
      && (self.bot_login.is_empty() || comment.author == self.bot_login)
  }

  fn upsert_comment(&self, pr: u64, body: &str) -> Result<(CommentAction, u64), HostError> {
    let comments = self.retrying("list comments", || self.host.list_comments(pr))?;
    match comments.iter().find(|c| self.owns(c)) {
      Some(existing) => {
        let updated =
          self.retrying("update comment", || self.host.update_comment(existing.id, body))?;
        Ok((CommentAction::Updated, updated.id))
      }
      None => {
        let created = self.retrying("create comment", || self.host.create_comment(pr, body))?;
        Ok((CommentAction::Created, created.id))
      }
    }
  }

  fn remove_stale_labels(&self, pr: u64, wanted: &[String]) -> Result<Vec<String>, HostError> {
    let current = self.retrying("list labels", || self.host.list_labels(pr))?;
    let mut removed = Vec::new();
    for label in current {
      if is_managed_label(&label) && !wanted.contains(&label) {
        self.retrying("remove label", || self.host.remove_label(pr, &label))?;
        removed.push(label);
      }
    }
    Ok(removed)
  }

  /// Bounded retry with linear backoff; every call here is idempotent.
  fn retrying<R>(
    &self,
    operation: &str,
    mut call: impl FnMut() -> Result<R, HostError>,
  ) -> Result<R, HostError> {
    let mut attempt = 1;
    loop {
      match call() {
        Ok(value) => return Ok(value),
        Err(e) if attempt < self.write_attempts => {
          warn!(operation, attempt, error = %e, "host call failed; retrying");
          let delay = self.write_backoff * attempt;
          if !delay.is_zero() {
            std::thread::sleep(delay);
          }
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}
