//! Structured error types for the summary pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache io: {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("cache json: {0}")]
  Json(#[from] serde_json::Error),
}

impl CacheError {
  pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
    Self::Io {
      path: path.display().to_string(),
      source,
    }
  }
}

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("endpoint returned status {status}")]
  Status { status: u16 },

  #[error("no parseable response after {attempts} attempts")]
  Exhausted { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum HostError {
  #[error("host request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("host {operation} failed with status {status}: {message}")]
  Status {
    operation: String,
    status: u16,
    message: String,
  },

  #[error("invalid host configuration: {0}")]
  Config(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("no pull request number in trigger context")]
  MissingPullRequest,

  #[error("context: {0}")]
  Context(String),
}

impl PipelineError {
  pub fn context(msg: impl Into<String>) -> Self {
    Self::Context(msg.into())
  }
}
