//! PR Summary Pipeline: diff → content-addressed cache → summary service (with local
//! fallback) → heuristic fusion → one idempotent comment plus labels on the pull request.
//!
//! Sequential and blocking by design; the only waits are the summary request and the
//! fixed delay between its attempts.

pub mod cache;
pub mod client;
pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod github;
pub mod parse;
pub mod pipeline;
pub mod publisher;

pub use cache::{diff_hash, CacheStore, DiffHash, EvictionPolicy, FileCache};
pub use client::{ChatRequest, CompletionTransport, HttpTransport, SummaryClient};
pub use collector::{DiffCollector, DiffSnapshot};
pub use config::Config;
pub use context::{ContextOverrides, EventPayload, TriggerContext};
pub use error::{CacheError, ClientError, HostError, PipelineError};
pub use github::GitHubHost;
pub use pipeline::{DiffSource, Pipeline, RecordSource, RunReport};
pub use publisher::{Comment, PublishReport, Publisher, PullRequestHost, COMMENT_MARKER};
