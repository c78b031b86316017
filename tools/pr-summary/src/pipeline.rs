//! One strictly sequential run: collect, look up, classify or fall back, fuse, publish.

use pr_risk::heuristics;
use pr_risk::{fuse, ClassificationRecord, FusedResult, HeuristicAssessment};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{diff_hash, CacheStore, DiffHash, KeyLock};
use crate::client::{CompletionTransport, SummaryClient};
use crate::collector::{DiffCollector, DiffSnapshot};
use crate::context::TriggerContext;
use crate::error::PipelineError;
use crate::publisher::{render_comment, PublishReport, Publisher, PullRequestHost};

/// Recorded in `notes` when the summary service gave nothing usable.
pub const FALLBACK_NOTE: &str =
  "fallback: heuristic-only summary (summary service unavailable or unparseable)";

/// Where the diff comes from. The git collector in production, fixed snapshots in tests.
pub trait DiffSource {
  fn collect(&self, base_ref: &str) -> DiffSnapshot;
}

impl DiffSource for DiffCollector {
  fn collect(&self, base_ref: &str) -> DiffSnapshot {
    DiffCollector::collect(self, base_ref)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
  Cache,
  Service,
  Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub pr_number: u64,
  pub diff_hash: String,
  pub source: RecordSource,
  pub record: ClassificationRecord,
  pub heuristic_score: i64,
  pub fused: FusedResult,
  pub labels: Vec<String>,
  pub comment_body: String,
  pub publish: PublishReport,
}

/// Local record used when every summary attempt failed. Cached like any other record.
pub fn fallback_record(
  snapshot: &DiffSnapshot,
  heuristic: &HeuristicAssessment,
) -> ClassificationRecord {
  ClassificationRecord {
    summary: heuristics::fallback_summary(&snapshot.stats),
    breaking_change: heuristic.breaking,
    risk: heuristics::risk_from_score(heuristic.score),
    notes: Some(FALLBACK_NOTE.to_string()),
  }
}

pub struct Pipeline<D, C, T, H> {
  source: D,
  cache: C,
  client: SummaryClient<T>,
  /// `None` is a dry run: everything is computed, nothing is written to the host.
  publisher: Option<Publisher<H>>,
  max_diff_bytes: usize,
  use_lock: bool,
}

impl<D, C, T, H> Pipeline<D, C, T, H>
where
  D: DiffSource,
  C: CacheStore,
  T: CompletionTransport,
  H: PullRequestHost,
{
  pub fn new(
    source: D,
    cache: C,
    client: SummaryClient<T>,
    publisher: Option<Publisher<H>>,
    max_diff_bytes: usize,
  ) -> Self {
    Self {
      source,
      cache,
      client,
      publisher,
      max_diff_bytes,
      use_lock: false,
    }
  }

  pub fn with_cache_lock(mut self, enabled: bool) -> Self {
    self.use_lock = enabled;
    self
  }

  pub fn run(&self, ctx: &TriggerContext) -> Result<RunReport, PipelineError> {
    if ctx.pr_number == 0 {
      return Err(PipelineError::MissingPullRequest);
    }

    let snapshot = self.source.collect(&ctx.base_ref);
    let hash = diff_hash(&snapshot.raw);
    info!(
      pr = ctx.pr_number,
      base = %ctx.base_ref,
      hash = %hash,
      files = snapshot.stats.files_changed,
      total_lines = snapshot.stats.total_lines(),
      "diff collected"
    );

    // Always computed; independent of the cache.
    let heuristic = heuristics::assess(&snapshot.stats, &snapshot.paths, &snapshot.blob);
    let (record, source) = self.classification(&hash, &snapshot, &heuristic);

    let fused = fuse(
      heuristic.score,
      record.risk,
      record.breaking_change,
      heuristic.breaking,
      &snapshot.stats,
    );
    let labels = fused.labels();
    let comment_body = render_comment(&record, &fused, &snapshot.stats, &heuristic.reasons);
    info!(
      ?source,
      heuristic_score = heuristic.score,
      risk = %fused.final_risk,
      breaking = fused.final_breaking,
      size = %fused.size_label,
      "classification fused"
    );

    let publish = match &self.publisher {
      Some(publisher) => publisher.publish(ctx.pr_number, &comment_body, &labels),
      None => PublishReport::skipped(&labels),
    };

    Ok(RunReport {
      pr_number: ctx.pr_number,
      diff_hash: hash.to_string(),
      source,
      record,
      heuristic_score: heuristic.score,
      fused,
      labels,
      comment_body,
      publish,
    })
  }

  fn lookup(&self, hash: &DiffHash) -> Option<ClassificationRecord> {
    match self.cache.lookup(hash) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(hash = %hash, error = %e, "cache lookup failed; treating as miss");
        None
      }
    }
  }

  fn classification(
    &self,
    hash: &DiffHash,
    snapshot: &DiffSnapshot,
    heuristic: &HeuristicAssessment,
  ) -> (ClassificationRecord, RecordSource) {
    if let Some(record) = self.lookup(hash) {
      info!(hash = %hash, "cache hit; skipping summary service");
      return (record, RecordSource::Cache);
    }

    let _lock: Option<KeyLock> = if self.use_lock {
      match self.cache.lock_key(hash) {
        Ok(lock) => lock,
        Err(e) => {
          warn!(hash = %hash, error = %e, "cache lock unavailable; continuing unlocked");
          None
        }
      }
    } else {
      None
    };
    if self.use_lock {
      // Another run may have stored while we waited.
      if let Some(record) = self.lookup(hash) {
        info!(hash = %hash, "cache filled while waiting for lock");
        return (record, RecordSource::Cache);
      }
    }

    let payload = snapshot.truncated(self.max_diff_bytes);
    let (record, source) = match self.client.classify(payload) {
      Ok(record) => (record, RecordSource::Service),
      Err(e) => {
        warn!(error = %e, "summary service exhausted; using heuristic fallback");
        (fallback_record(snapshot, heuristic), RecordSource::Fallback)
      }
    };

    if let Err(e) = self.cache.store(hash, &record) {
      warn!(hash = %hash, error = %e, "cache store failed");
    }
    (record, source)
  }
}
