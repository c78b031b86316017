//! GitHub REST implementation of [`PullRequestHost`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::HostError;
use crate::publisher::{Comment, PullRequestHost};

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct GithubUser {
  login: String,
}

#[derive(Debug, Deserialize)]
struct GithubComment {
  id: u64,
  #[serde(default)]
  body: Option<String>,
  #[serde(default)]
  user: Option<GithubUser>,
}

impl From<GithubComment> for Comment {
  fn from(c: GithubComment) -> Self {
    Self {
      id: c.id,
      author: c.user.map(|u| u.login).unwrap_or_default(),
      body: c.body.unwrap_or_default(),
    }
  }
}

#[derive(Debug, Deserialize)]
struct GithubLabel {
  name: String,
}

pub struct GitHubHost {
  http: reqwest::blocking::Client,
  api_base: String,
  /// "owner/name".
  repository: String,
}

impl GitHubHost {
  pub fn new(api_base: &str, repository: &str, token: &str) -> Result<Self, HostError> {
    if repository.split('/').filter(|s| !s.is_empty()).count() != 2 {
      return Err(HostError::Config(format!(
        "repository must be owner/name, got {:?}",
        repository
      )));
    }
    if token.trim().is_empty() {
      return Err(HostError::Config("github token must not be empty".to_string()));
    }

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("pr-summary"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
    let auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
      .map_err(|_| HostError::Config("github token is not a valid header value".to_string()))?;
    headers.insert(AUTHORIZATION, auth);

    let http = reqwest::blocking::Client::builder()
      .default_headers(headers)
      .connect_timeout(Duration::from_secs(15))
      .timeout(Duration::from_secs(60))
      .build()?;

    Ok(Self {
      http,
      api_base: api_base.trim_end_matches('/').to_string(),
      repository: repository.to_string(),
    })
  }

  fn issue_url(&self, pr: u64, tail: &str) -> String {
    format!("{}/repos/{}/issues/{}/{}", self.api_base, self.repository, pr, tail)
  }

  /// Label names may contain spaces and colons; encoded as a single path segment.
  fn label_url(&self, pr: u64, label: &str) -> String {
    self.issue_url(pr, &format!("labels/{}", urlencoding::encode(label)))
  }

  fn check(
    operation: &str,
    response: reqwest::blocking::Response,
  ) -> Result<reqwest::blocking::Response, HostError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message: String = body.chars().take(400).collect();
    Err(HostError::Status {
      operation: operation.to_string(),
      status: status.as_u16(),
      message,
    })
  }
}

impl PullRequestHost for GitHubHost {
  fn list_comments(&self, pr: u64) -> Result<Vec<Comment>, HostError> {
    let mut rows = Vec::new();
    let mut page = 1_u32;
    loop {
      let response = self
        .http
        .get(self.issue_url(pr, "comments"))
        .query(&[("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())])
        .send()?;
      let chunk: Vec<GithubComment> = Self::check("list comments", response)?.json()?;
      let chunk_len = chunk.len();
      rows.extend(chunk.into_iter().map(Comment::from));
      if chunk_len < PAGE_SIZE {
        break;
      }
      page = page.saturating_add(1);
    }
    debug!(pr, count = rows.len(), "listed comments");
    Ok(rows)
  }

  fn create_comment(&self, pr: u64, body: &str) -> Result<Comment, HostError> {
    let response = self
      .http
      .post(self.issue_url(pr, "comments"))
      .json(&json!({ "body": body }))
      .send()?;
    let created: GithubComment = Self::check("create comment", response)?.json()?;
    Ok(created.into())
  }

  fn update_comment(&self, comment_id: u64, body: &str) -> Result<Comment, HostError> {
    let url = format!(
      "{}/repos/{}/issues/comments/{}",
      self.api_base, self.repository, comment_id
    );
    let response = self.http.patch(url).json(&json!({ "body": body })).send()?;
    let updated: GithubComment = Self::check("update comment", response)?.json()?;
    Ok(updated.into())
  }

  fn add_labels(&self, pr: u64, labels: &[String]) -> Result<(), HostError> {
    if labels.is_empty() {
      return Ok(());
    }
    let response = self
      .http
      .post(self.issue_url(pr, "labels"))
      .json(&json!({ "labels": labels }))
      .send()?;
    Self::check("add labels", response)?;
    Ok(())
  }

  fn list_labels(&self, pr: u64) -> Result<Vec<String>, HostError> {
    let response = self
      .http
      .get(self.issue_url(pr, "labels"))
      .query(&[("per_page", PAGE_SIZE.to_string())])
      .send()?;
    let labels: Vec<GithubLabel> = Self::check("list labels", response)?.json()?;
    Ok(labels.into_iter().map(|l| l.name).collect())
  }

  fn remove_label(&self, pr: u64, label: &str) -> Result<(), HostError> {
    let response = self
      .http
      .delete(self.label_url(pr, label))
      .send()?;
    // Already gone is fine.
    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(());
    }
    Self::check("remove label", response)?;
    Ok(())
  }
}
