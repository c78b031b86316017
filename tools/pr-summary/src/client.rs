//! Summary client for the external text-generation endpoint.
//!
//! The endpoint is treated as an unreliable text oracle: transport failures count as empty
//! responses, attempts are spaced by a fixed delay, and the first parseable reply wins.

use std::time::Duration;

use pr_risk::ClassificationRecord;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ClientError;
use crate::parse;

pub const SYSTEM_INSTRUCTION: &str = "You review pull request diffs. Respond ONLY with a JSON \
object, no prose and no markdown. Keys: summary (string, 2-4 sentences describing what the \
change does), breaking_change (boolean), risk (one of \"low\", \"medium\", \"high\"), notes \
(string, optional reviewer hints).";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
  pub role: String,
  pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
  pub model: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reasoning_effort: Option<String>,
  pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
  /// System instruction first, diff last.
  pub fn for_diff(model: &str, reasoning_effort: &str, diff_text: &str) -> Self {
    let effort = reasoning_effort.trim();
    Self {
      model: model.to_string(),
      reasoning_effort: (!effort.is_empty()).then(|| effort.to_string()),
      messages: vec![
        ChatMessage {
          role: "system".to_string(),
          content: SYSTEM_INSTRUCTION.to_string(),
        },
        ChatMessage {
          role: "user".to_string(),
          content: diff_text.to_string(),
        },
      ],
    }
  }
}

/// One round trip to the endpoint, returning the raw response body.
pub trait CompletionTransport {
  fn send(&self, request: &ChatRequest) -> Result<String, ClientError>;
}

/// Blocking HTTPS transport.
pub struct HttpTransport {
  http: reqwest::blocking::Client,
  endpoint: String,
  referrer: String,
}

impl HttpTransport {
  pub fn new(
    endpoint: impl Into<String>,
    referrer: impl Into<String>,
    timeout: Duration,
  ) -> Result<Self, ClientError> {
    let http = reqwest::blocking::Client::builder()
      .connect_timeout(Duration::from_secs(15))
      .timeout(timeout)
      .user_agent(concat!("pr-summary/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self {
      http,
      endpoint: endpoint.into(),
      referrer: referrer.into(),
    })
  }

  pub fn from_config(config: &Config) -> Result<Self, ClientError> {
    Self::new(&config.endpoint, &config.referrer, config.request_timeout)
  }
}

impl CompletionTransport for HttpTransport {
  fn send(&self, request: &ChatRequest) -> Result<String, ClientError> {
    let response = self
      .http
      .post(&self.endpoint)
      .query(&[("referrer", self.referrer.as_str())])
      .json(request)
      .send()?;
    let status = response.status();
    if !status.is_success() {
      return Err(ClientError::Status {
        status: status.as_u16(),
      });
    }
    Ok(response.text()?)
  }
}

pub struct SummaryClient<T> {
  transport: T,
  model: String,
  reasoning_effort: String,
  max_attempts: u32,
  retry_delay: Duration,
}

impl<T: CompletionTransport> SummaryClient<T> {
  pub fn new(transport: T, config: &Config) -> Self {
    Self {
      transport,
      model: config.model.clone(),
      reasoning_effort: config.reasoning_effort.clone(),
      max_attempts: config.max_attempts.max(1),
      retry_delay: config.retry_delay,
    }
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  /// Classify a (possibly truncated) diff. Fails only after every attempt is spent.
  pub fn classify(&self, diff_text: &str) -> Result<ClassificationRecord, ClientError> {
    let request = ChatRequest::for_diff(&self.model, &self.reasoning_effort, diff_text);

    for attempt in 1..=self.max_attempts {
      let body = match self.transport.send(&request) {
        Ok(body) => body,
        Err(e) => {
          warn!(attempt, error = %e, "summary request failed");
          String::new()
        }
      };

      if let Some(content) = parse::extract_content(&body) {
        if let Some((strategy, record)) = parse::parse_record(&content) {
          info!(attempt, strategy, risk = %record.risk, "summary parsed");
          return Ok(record);
        }
        debug!(attempt, bytes = content.len(), "summary response not parseable");
      } else {
        debug!(attempt, "empty summary response");
      }

      if attempt < self.max_attempts && !self.retry_delay.is_zero() {
        std::thread::sleep(self.retry_delay);
      }
    }

    Err(ClientError::Exhausted {
      attempts: self.max_attempts,
    })
  }
}
