//! pr-summary: summarize and label the current pull request from CI.
//!
//! Reads the pull-request event (GITHUB_EVENT_PATH), diffs against the base branch, and
//! publishes one summary comment plus size / risk / breaking-change labels. Logs go to
//! stderr; the run report is written to stdout as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pr_summary::context::{self, ContextOverrides, EventPayload};
use pr_summary::{
  Config, DiffCollector, EvictionPolicy, FileCache, GitHubHost, HttpTransport, Pipeline,
  Publisher, SummaryClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum LogFormat {
  #[default]
  Human,
  Json,
}

#[derive(Debug, Parser)]
#[command(name = "pr-summary", version, about = "Summarize and label a pull request")]
struct Cli {
  /// Pull-request event payload.
  #[arg(long, env = "GITHUB_EVENT_PATH")]
  event_path: Option<PathBuf>,
  #[arg(long, env = "PR_SUMMARY_PR_NUMBER")]
  pr_number: Option<u64>,
  #[arg(long, env = "GITHUB_BASE_REF")]
  base_ref: Option<String>,
  /// owner/name
  #[arg(long, env = "GITHUB_REPOSITORY")]
  repository: Option<String>,

  #[arg(long, env = "PR_SUMMARY_REPO_DIR")]
  repo_dir: Option<PathBuf>,
  #[arg(long, env = "PR_SUMMARY_REMOTE")]
  remote: Option<String>,

  #[arg(long, env = "PR_SUMMARY_ENDPOINT")]
  endpoint: Option<String>,
  #[arg(long, env = "PR_SUMMARY_MODEL")]
  model: Option<String>,
  #[arg(long, env = "PR_SUMMARY_REASONING_EFFORT")]
  reasoning_effort: Option<String>,
  #[arg(long, env = "PR_SUMMARY_REFERRER")]
  referrer: Option<String>,
  #[arg(long, env = "PR_SUMMARY_MAX_DIFF_BYTES")]
  max_diff_bytes: Option<usize>,
  #[arg(long, env = "PR_SUMMARY_MAX_ATTEMPTS")]
  max_attempts: Option<u32>,
  #[arg(long, env = "PR_SUMMARY_RETRY_DELAY_SECS")]
  retry_delay_secs: Option<u64>,
  #[arg(long, env = "PR_SUMMARY_REQUEST_TIMEOUT_SECS")]
  request_timeout_secs: Option<u64>,

  #[arg(long, env = "PR_SUMMARY_CACHE_DIR")]
  cache_dir: Option<PathBuf>,
  /// Treat cache entries older than this as misses.
  #[arg(long, env = "PR_SUMMARY_CACHE_MAX_AGE_SECS", conflicts_with = "cache_max_entries")]
  cache_max_age_secs: Option<u64>,
  #[arg(long, env = "PR_SUMMARY_CACHE_MAX_ENTRIES")]
  cache_max_entries: Option<usize>,
  /// Hold an advisory lock per diff hash while classifying.
  #[arg(long, env = "PR_SUMMARY_CACHE_LOCK")]
  cache_lock: bool,

  #[arg(long, env = "GITHUB_API_URL")]
  github_api: Option<String>,
  #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
  github_token: Option<String>,
  #[arg(long, env = "PR_SUMMARY_BOT_LOGIN")]
  bot_login: Option<String>,
  #[arg(long, env = "PR_SUMMARY_WRITE_ATTEMPTS")]
  write_attempts: Option<u32>,
  #[arg(long, env = "PR_SUMMARY_WRITE_BACKOFF_SECS")]
  write_backoff_secs: Option<u64>,
  /// Remove stale size/risk/breaking labels instead of only adding.
  #[arg(long, env = "PR_SUMMARY_RECONCILE_LABELS")]
  reconcile_labels: bool,
  /// Compute everything, write nothing to the host.
  #[arg(long, env = "PR_SUMMARY_DRY_RUN")]
  dry_run: bool,

  #[arg(short, long)]
  verbose: bool,
  #[arg(long, value_enum, default_value_t = LogFormat::Human, env = "PR_SUMMARY_LOG_FORMAT")]
  log_format: LogFormat,
}

impl Cli {
  fn into_config(self) -> (Config, ContextArgs) {
    let mut config = Config::default();
    if let Some(v) = self.repo_dir {
      config.repo_dir = v;
    }
    if let Some(v) = self.remote {
      config.remote = v;
    }
    if let Some(v) = self.endpoint {
      config.endpoint = v;
    }
    if let Some(v) = self.model {
      config.model = v;
    }
    if let Some(v) = self.reasoning_effort {
      config.reasoning_effort = v;
    }
    if let Some(v) = self.referrer {
      config.referrer = v;
    }
    if let Some(v) = self.max_diff_bytes {
      config.max_diff_bytes = v;
    }
    if let Some(v) = self.max_attempts {
      config.max_attempts = v;
    }
    if let Some(v) = self.retry_delay_secs {
      config.retry_delay = Duration::from_secs(v);
    }
    if let Some(v) = self.request_timeout_secs {
      config.request_timeout = Duration::from_secs(v);
    }
    if let Some(v) = self.cache_dir {
      config.cache_dir = v;
    }
    if let Some(v) = self.cache_max_age_secs {
      config.eviction = EvictionPolicy::MaxAge(Duration::from_secs(v));
    } else if let Some(v) = self.cache_max_entries {
      config.eviction = EvictionPolicy::MaxEntries(v);
    }
    config.cache_lock = self.cache_lock;
    if let Some(v) = self.github_api {
      config.github_api = v;
    }
    config.github_token = self.github_token.filter(|t| !t.trim().is_empty());
    if let Some(v) = self.bot_login {
      config.bot_login = v;
    }
    if let Some(v) = self.write_attempts {
      config.write_attempts = v;
    }
    if let Some(v) = self.write_backoff_secs {
      config.write_backoff = Duration::from_secs(v);
    }
    config.reconcile_labels = self.reconcile_labels;
    config.dry_run = self.dry_run;

    let ctx = ContextArgs {
      event_path: self.event_path,
      overrides: ContextOverrides {
        pr_number: self.pr_number,
        base_ref: self.base_ref,
        repository: self.repository,
      },
    };
    (config, ctx)
  }
}

struct ContextArgs {
  event_path: Option<PathBuf>,
  overrides: ContextOverrides,
}

fn init_logging(verbose: bool, format: LogFormat) {
  let default_level = if verbose { "debug" } else { "info" };
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr);
  match format {
    LogFormat::Human => builder.init(),
    LogFormat::Json => builder.json().init(),
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose, cli.log_format);
  let (config, ctx_args) = cli.into_config();

  let event = match &ctx_args.event_path {
    Some(path) if path.exists() => Some(EventPayload::from_file(path)?),
    _ => None,
  };
  let ctx = context::resolve(event.as_ref(), &ctx_args.overrides)?;
  info!(pr = ctx.pr_number, base = %ctx.base_ref, dry_run = config.dry_run, "starting run");

  let publisher = if config.dry_run {
    None
  } else {
    let repository = ctx
      .repository
      .as_deref()
      .context("GITHUB_REPOSITORY (owner/name) is required unless --dry-run")?;
    let token = config
      .github_token
      .as_deref()
      .context("GITHUB_TOKEN is required unless --dry-run")?;
    let host = GitHubHost::new(&config.github_api, repository, token)?;
    Some(
      Publisher::new(host, config.bot_login.clone())
        .with_retries(config.write_attempts, config.write_backoff)
        .with_label_reconciliation(config.reconcile_labels),
    )
  };

  let transport = HttpTransport::from_config(&config)?;
  let pipeline = Pipeline::new(
    DiffCollector::new(&config.repo_dir, &config.remote),
    FileCache::new(&config.cache_dir, config.eviction),
    SummaryClient::new(transport, &config),
    publisher,
    config.max_diff_bytes,
  )
  .with_cache_lock(config.cache_lock);

  let report = pipeline.run(&ctx)?;
  if !report.publish.errors.is_empty() {
    tracing::warn!(errors = ?report.publish.errors, "publish finished with errors");
  }
  println!("{}", serde_json::to_string_pretty(&report)?);
  Ok(())
}
