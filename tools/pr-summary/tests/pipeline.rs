//! End-to-end pipeline tests with in-memory diff source, transport and host.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use pr_risk::{DiffStats, RiskLevel, SizeLabel};
use pr_summary::client::ChatRequest;
use pr_summary::pipeline::FALLBACK_NOTE;
use pr_summary::publisher::CommentAction;
use pr_summary::{
  diff_hash, CacheStore, ClientError, Comment, CompletionTransport, Config, DiffSnapshot,
  DiffSource, EvictionPolicy, FileCache, HostError, Pipeline, PullRequestHost, Publisher,
  RecordSource, SummaryClient, TriggerContext, COMMENT_MARKER,
};

const BOT: &str = "github-actions[bot]";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FixedSource(DiffSnapshot);

impl DiffSource for FixedSource {
  fn collect(&self, _base_ref: &str) -> DiffSnapshot {
    self.0.clone()
  }
}

#[derive(Clone, Default)]
struct FakeTransport {
  reply: Option<String>,
  calls: Rc<RefCell<Vec<ChatRequest>>>,
}

impl FakeTransport {
  fn replying(body: &str) -> Self {
    Self {
      reply: Some(body.to_string()),
      ..Self::default()
    }
  }

  fn failing() -> Self {
    Self::default()
  }

  fn call_count(&self) -> usize {
    self.calls.borrow().len()
  }
}

impl CompletionTransport for FakeTransport {
  fn send(&self, request: &ChatRequest) -> Result<String, ClientError> {
    self.calls.borrow_mut().push(request.clone());
    match &self.reply {
      Some(body) => Ok(body.clone()),
      None => Err(ClientError::Status { status: 502 }),
    }
  }
}

#[derive(Default)]
struct HostState {
  comments: Vec<Comment>,
  labels: Vec<String>,
  next_id: u64,
  label_failures_left: u32,
  add_label_calls: u32,
}

#[derive(Clone, Default)]
struct FakeHost(Rc<RefCell<HostState>>);

impl FakeHost {
  fn comments(&self) -> Vec<Comment> {
    self.0.borrow().comments.clone()
  }

  fn labels(&self) -> Vec<String> {
    self.0.borrow().labels.clone()
  }

  fn seed_comment(&self, author: &str, body: &str) {
    let mut s = self.0.borrow_mut();
    s.next_id += 1;
    let id = s.next_id;
    s.comments.push(Comment {
      id,
      author: author.to_string(),
      body: body.to_string(),
    });
  }
}

impl PullRequestHost for FakeHost {
  fn list_comments(&self, _pr: u64) -> Result<Vec<Comment>, HostError> {
    Ok(self.comments())
  }

  fn create_comment(&self, _pr: u64, body: &str) -> Result<Comment, HostError> {
    self.seed_comment(BOT, body);
    Ok(self.0.borrow().comments.last().cloned().unwrap())
  }

  fn update_comment(&self, comment_id: u64, body: &str) -> Result<Comment, HostError> {
    let mut s = self.0.borrow_mut();
    let c = s.comments.iter_mut().find(|c| c.id == comment_id).unwrap();
    c.body = body.to_string();
    Ok(c.clone())
  }

  fn add_labels(&self, _pr: u64, labels: &[String]) -> Result<(), HostError> {
    let mut s = self.0.borrow_mut();
    s.add_label_calls += 1;
    if s.label_failures_left > 0 {
      s.label_failures_left -= 1;
      return Err(HostError::Status {
        operation: "add labels".to_string(),
        status: 500,
        message: "boom".to_string(),
      });
    }
    for l in labels {
      if !s.labels.contains(l) {
        s.labels.push(l.clone());
      }
    }
    Ok(())
  }

  fn list_labels(&self, _pr: u64) -> Result<Vec<String>, HostError> {
    Ok(self.labels())
  }

  fn remove_label(&self, _pr: u64, label: &str) -> Result<(), HostError> {
    self.0.borrow_mut().labels.retain(|l| l != label);
    Ok(())
  }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> Config {
  Config {
    retry_delay: Duration::ZERO,
    write_backoff: Duration::ZERO,
    ..Config::default()
  }
}

fn ctx() -> TriggerContext {
  TriggerContext {
    pr_number: 17,
    base_ref: "main".to_string(),
    head_sha: None,
    repository: Some("acme/widgets".to_string()),
  }
}

fn snapshot(added: u64, removed: u64, paths: &[&str], blob: &str) -> DiffSnapshot {
  DiffSnapshot::new(
    DiffStats::new(paths.len() as u64, added, removed),
    paths.iter().map(|s| s.to_string()).collect(),
    blob.as_bytes().to_vec(),
  )
}

type TestPipeline = Pipeline<FixedSource, FileCache, FakeTransport, FakeHost>;

fn pipeline(
  snap: DiffSnapshot,
  cache_dir: &std::path::Path,
  transport: FakeTransport,
  host: FakeHost,
) -> TestPipeline {
  let cfg = config();
  Pipeline::new(
    FixedSource(snap),
    FileCache::new(cache_dir, EvictionPolicy::Never),
    SummaryClient::new(transport, &cfg),
    Some(Publisher::new(host, BOT).with_retries(cfg.write_attempts, cfg.write_backoff)),
    cfg.max_diff_bytes,
  )
}

const SERVICE_REPLY: &str =
  r#"{"choices":[{"message":{"content":"{\"summary\":\"Adds retries.\",\"risk\":\"low\",\"breaking_change\":false}"}}]}"#;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn second_run_on_same_diff_hits_cache() {
  let dir = tempfile::tempdir().unwrap();
  let transport = FakeTransport::replying(SERVICE_REPLY);
  let host = FakeHost::default();
  let snap = snapshot(30, 5, &["src/retry.rs"], "diff --git a/src/retry.rs b/src/retry.rs\n+x\n");

  let first = pipeline(snap.clone(), dir.path(), transport.clone(), host.clone())
    .run(&ctx())
    .unwrap();
  let second = pipeline(snap, dir.path(), transport.clone(), host.clone())
    .run(&ctx())
    .unwrap();

  assert_eq!(first.source, RecordSource::Service);
  assert_eq!(second.source, RecordSource::Cache);
  assert_eq!(first.record, second.record);
  assert_eq!(first.diff_hash, second.diff_hash);
  assert_eq!(transport.call_count(), 1);
  assert_eq!(second.record.summary, "Adds retries.");
}

#[test]
fn repeated_runs_leave_exactly_one_marked_comment() {
  let dir = tempfile::tempdir().unwrap();
  let host = FakeHost::default();
  host.seed_comment("octocat", "LGTM");
  host.seed_comment("octocat", &format!("quoting {}", COMMENT_MARKER));

  let blobs = ["diff one", "diff two", "diff three"];
  let mut last = None;
  for (i, blob) in blobs.iter().enumerate() {
    let snap = snapshot(10 * (i as u64 + 1), 0, &["a.rs"], blob);
    let report = pipeline(snap, dir.path(), FakeTransport::replying(SERVICE_REPLY), host.clone())
      .run(&ctx())
      .unwrap();
    let expected = if i == 0 {
      CommentAction::Created
    } else {
      CommentAction::Updated
    };
    assert_eq!(report.publish.comment, expected);
    last = Some(report);
  }

  let ours: Vec<Comment> = host
    .comments()
    .into_iter()
    .filter(|c| c.author == BOT && c.body.contains(COMMENT_MARKER))
    .collect();
  assert_eq!(ours.len(), 1);
  assert_eq!(ours[0].body, last.unwrap().comment_body);
  assert!(ours[0].body.contains("+30 / -0"));
  assert_eq!(host.comments().len(), 3);
}

#[test]
fn exhausted_service_falls_back_to_heuristics_and_caches_it() {
  let dir = tempfile::tempdir().unwrap();
  let transport = FakeTransport::failing();
  let snap = snapshot(450, 150, &["Cargo.lock", "src/lib.rs"], "diff --git a/Cargo.lock b/Cargo.lock\n");

  let report = pipeline(snap.clone(), dir.path(), transport.clone(), FakeHost::default())
    .run(&ctx())
    .unwrap();

  assert_eq!(transport.call_count(), 4);
  assert_eq!(report.source, RecordSource::Fallback);
  assert_eq!(report.record.notes.as_deref(), Some(FALLBACK_NOTE));
  assert_eq!(report.record.risk, RiskLevel::High);
  assert_eq!(
    report.record.summary,
    "This pull request changes 600 lines (+450 / -150) across 2 files."
  );
  assert_eq!(report.heuristic_score, 4);
  assert_eq!(report.fused.final_risk, RiskLevel::High);
  assert_eq!(report.fused.size_label, SizeLabel::Large);

  let cache = FileCache::new(dir.path(), EvictionPolicy::Never);
  let hash = diff_hash(&snap.raw);
  assert_eq!(cache.lookup(&hash).unwrap(), Some(report.record.clone()));
  assert_eq!(
    cache.read_summary_text(&hash).unwrap().as_deref(),
    Some(report.record.summary.as_str())
  );

  // Baked in until the diff changes.
  let again = pipeline(snap, dir.path(), transport.clone(), FakeHost::default())
    .run(&ctx())
    .unwrap();
  assert_eq!(again.source, RecordSource::Cache);
  assert_eq!(transport.call_count(), 4);
}

#[test]
fn rate_limit_envelopes_fall_back_instead_of_caching_placeholder() {
  let dir = tempfile::tempdir().unwrap();
  let transport = FakeTransport::replying(r#"{"error":{"message":"Rate limit exceeded"}}"#);
  let snap = snapshot(20, 2, &["src/lib.rs"], "diff --git a/src/lib.rs b/src/lib.rs\n");

  let report = pipeline(snap, dir.path(), transport.clone(), FakeHost::default())
    .run(&ctx())
    .unwrap();

  assert_eq!(transport.call_count(), 4);
  assert_eq!(report.source, RecordSource::Fallback);
  assert_eq!(report.record.notes.as_deref(), Some(FALLBACK_NOTE));
  assert_eq!(report.record.risk, RiskLevel::Low);
}

#[test]
fn cache_key_covers_bytes_beyond_truncation() {
  let dir = tempfile::tempdir().unwrap();
  let transport = FakeTransport::replying(SERVICE_REPLY);
  let prefix = "x".repeat(32_768);
  let a = snapshot(1, 0, &["a.rs"], &format!("{}tail-a", prefix));
  let b = snapshot(1, 0, &["a.rs"], &format!("{}tail-b", prefix));

  let ra = pipeline(a, dir.path(), transport.clone(), FakeHost::default())
    .run(&ctx())
    .unwrap();
  let rb = pipeline(b, dir.path(), transport.clone(), FakeHost::default())
    .run(&ctx())
    .unwrap();

  assert_ne!(ra.diff_hash, rb.diff_hash);
  assert_eq!(rb.source, RecordSource::Service);
  assert_eq!(transport.call_count(), 2);
  for req in transport.calls.borrow().iter() {
    assert_eq!(req.messages.last().unwrap().content, prefix);
  }
}

#[test]
fn prose_wrapped_reply_parses_like_bare_json() {
  let dir = tempfile::tempdir().unwrap();
  let wrapped = "Here you go:\n```json\n{\"summary\":\"x\",\"risk\":\"low\",\"breaking_change\":false}\n```";
  let transport = FakeTransport::replying(wrapped);
  let report = pipeline(snapshot(1, 1, &["a.rs"], "d"), dir.path(), transport, FakeHost::default())
    .run(&ctx())
    .unwrap();

  assert_eq!(report.source, RecordSource::Service);
  assert_eq!(report.record.summary, "x");
  assert_eq!(report.record.risk, RiskLevel::Low);
  assert!(!report.record.breaking_change);
}

#[test]
fn labels_are_additive_by_default() {
  let dir = tempfile::tempdir().unwrap();
  let host = FakeHost::default();
  host.0.borrow_mut().labels = vec!["size: Large".to_string(), "needs-review".to_string()];

  let report = pipeline(
    snapshot(3, 1, &["a.rs"], "small"),
    dir.path(),
    FakeTransport::replying(SERVICE_REPLY),
    host.clone(),
  )
  .run(&ctx())
  .unwrap();

  assert_eq!(report.labels, vec!["size: XS", "risk: low"]);
  assert_eq!(
    host.labels(),
    vec!["size: Large", "needs-review", "size: XS", "risk: low"]
  );
}

#[test]
fn reconciliation_removes_stale_managed_labels_only() {
  let dir = tempfile::tempdir().unwrap();
  let host = FakeHost::default();
  host.0.borrow_mut().labels = vec![
    "size: Large".to_string(),
    "risk: high".to_string(),
    "breaking-change".to_string(),
    "needs-review".to_string(),
  ];
  let cfg = config();
  let pipeline = Pipeline::new(
    FixedSource(snapshot(3, 1, &["a.rs"], "small")),
    FileCache::new(dir.path(), EvictionPolicy::Never),
    SummaryClient::new(FakeTransport::replying(SERVICE_REPLY), &cfg),
    Some(
      Publisher::new(host.clone(), BOT)
        .with_retries(1, Duration::ZERO)
        .with_label_reconciliation(true),
    ),
    cfg.max_diff_bytes,
  );

  let report = pipeline.run(&ctx()).unwrap();
  assert_eq!(
    report.publish.labels_removed,
    vec!["size: Large", "risk: high", "breaking-change"]
  );
  assert_eq!(host.labels(), vec!["needs-review", "size: XS", "risk: low"]);
}

#[test]
fn label_writes_are_retried_then_reported_not_fatal() {
  let dir = tempfile::tempdir().unwrap();

  let flaky = FakeHost::default();
  flaky.0.borrow_mut().label_failures_left = 2;
  let report = pipeline(
    snapshot(1, 0, &["a.rs"], "d1"),
    dir.path(),
    FakeTransport::replying(SERVICE_REPLY),
    flaky.clone(),
  )
  .run(&ctx())
  .unwrap();
  assert!(report.publish.errors.is_empty());
  assert_eq!(flaky.0.borrow().add_label_calls, 3);
  assert_eq!(report.publish.labels_applied.len(), 2);

  let broken = FakeHost::default();
  broken.0.borrow_mut().label_failures_left = 10;
  let report = pipeline(
    snapshot(1, 0, &["a.rs"], "d2"),
    dir.path(),
    FakeTransport::replying(SERVICE_REPLY),
    broken.clone(),
  )
  .run(&ctx())
  .unwrap();
  assert_eq!(report.publish.errors.len(), 1);
  assert!(report.publish.labels_applied.is_empty());
  assert_eq!(report.publish.comment, CommentAction::Created);
  assert_eq!(broken.0.borrow().add_label_calls, 3);
}

#[test]
fn dry_run_skips_host_writes() {
  let dir = tempfile::tempdir().unwrap();
  let cfg = config();
  let pipeline: TestPipeline = Pipeline::new(
    FixedSource(snapshot(120, 0, &["a.rs"], "d")),
    FileCache::new(dir.path(), EvictionPolicy::Never),
    SummaryClient::new(FakeTransport::replying(SERVICE_REPLY), &cfg),
    None,
    cfg.max_diff_bytes,
  );
  let report = pipeline.run(&ctx()).unwrap();
  assert_eq!(report.publish.comment, CommentAction::Skipped);
  assert_eq!(report.labels, vec!["size: Small", "risk: low"]);
  assert!(report.comment_body.contains(COMMENT_MARKER));
}

#[test]
fn locked_runs_classify_once() {
  let dir = tempfile::tempdir().unwrap();
  let transport = FakeTransport::replying(SERVICE_REPLY);
  let snap = snapshot(5, 5, &["a.rs"], "locked diff");
  for _ in 0..2 {
    pipeline(snap.clone(), dir.path(), transport.clone(), FakeHost::default())
      .with_cache_lock(true)
      .run(&ctx())
      .unwrap();
  }
  assert_eq!(transport.call_count(), 1);
}

#[test]
fn zero_pr_number_is_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let mut bad = ctx();
  bad.pr_number = 0;
  let err = pipeline(
    snapshot(1, 0, &[], "d"),
    dir.path(),
    FakeTransport::failing(),
    FakeHost::default(),
  )
  .run(&bad)
  .unwrap_err();
  assert!(matches!(err, pr_summary::PipelineError::MissingPullRequest));
}
