//! Pipeline configuration with defaults matching the CI workflow.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::EvictionPolicy;

pub const DEFAULT_ENDPOINT: &str = "https://text.pollinations.ai/openai";
pub const DEFAULT_MODEL: &str = "openai";
pub const DEFAULT_REFERRER: &str = "github.com";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_BOT_LOGIN: &str = "github-actions[bot]";

/// Tunables for one pipeline run. Every field can be overridden from the CLI / environment.
#[derive(Debug, Clone)]
pub struct Config {
  /// Text-generation endpoint (chat-completions shaped).
  pub endpoint: String,
  pub model: String,
  /// Sent as `reasoning_effort`; omitted when empty.
  pub reasoning_effort: String,
  /// Attribution query parameter appended to the endpoint.
  pub referrer: String,
  /// Outbound diff payload cap; the cache key always covers the full diff.
  pub max_diff_bytes: usize,
  pub max_attempts: u32,
  /// Fixed sleep between summary attempts.
  pub retry_delay: Duration,
  pub request_timeout: Duration,

  pub repo_dir: PathBuf,
  pub remote: String,

  pub cache_dir: PathBuf,
  pub eviction: EvictionPolicy,
  /// Hold an advisory per-hash lock around classify + store.
  pub cache_lock: bool,

  pub github_api: String,
  pub github_token: Option<String>,
  /// Only comments by this login are considered ours. Empty disables the filter.
  pub bot_login: String,
  pub write_attempts: u32,
  /// Linear backoff unit between host write attempts.
  pub write_backoff: Duration,
  /// Remove stale managed labels instead of only adding.
  pub reconcile_labels: bool,
  pub dry_run: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      endpoint: DEFAULT_ENDPOINT.to_string(),
      model: DEFAULT_MODEL.to_string(),
      reasoning_effort: "low".to_string(),
      referrer: DEFAULT_REFERRER.to_string(),
      max_diff_bytes: 32_768,
      max_attempts: 4,
      retry_delay: Duration::from_secs(20),
      request_timeout: Duration::from_secs(120),
      repo_dir: PathBuf::from("."),
      remote: "origin".to_string(),
      cache_dir: PathBuf::from(".pr-summary-cache"),
      eviction: EvictionPolicy::Never,
      cache_lock: false,
      github_api: DEFAULT_GITHUB_API.to_string(),
      github_token: None,
      bot_login: DEFAULT_BOT_LOGIN.to_string(),
      write_attempts: 3,
      write_backoff: Duration::from_secs(2),
      reconcile_labels: false,
      dry_run: false,
    }
  }
}
