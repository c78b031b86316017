//! Tolerant extraction of a classification record from model output.
//!
//! Providers wrap JSON in prose or code fences often enough that parsing is an ordered
//! list of strategies; the first one yielding a JSON object wins.

use pr_risk::{ClassificationRecord, RiskLevel};
use serde_json::{Map, Value};

pub const DEFAULT_SUMMARY: &str = "No summary was provided.";

type Strategy = fn(&str) -> Option<Map<String, Value>>;

/// Tried in order.
const STRATEGIES: &[(&str, Strategy)] = &[("whole", parse_whole), ("braced", parse_braced)];

/// Whole content is a JSON object.
fn parse_whole(content: &str) -> Option<Map<String, Value>> {
  match serde_json::from_str::<Value>(content.trim()) {
    Ok(Value::Object(map)) => Some(map),
    _ => None,
  }
}

/// Strip fence markers, then take the first `{` through the last `}`.
fn parse_braced(content: &str) -> Option<Map<String, Value>> {
  let stripped = content.replace("```json", "").replace("```", "");
  let start = stripped.find('{')?;
  let end = stripped.rfind('}')?;
  if end <= start {
    return None;
  }
  parse_whole(&stripped[start..=end])
}

/// Keys that mark a JSON body as a record rather than a provider envelope.
const RECORD_KEYS: &[&str] = &["summary", "risk", "breaking_change"];

/// Message text out of a response body.
///
/// Chat-completions envelopes and a few other common shapes are unwrapped. A JSON body
/// is only taken as the message itself when it carries a record key; empty-content and
/// error envelopes yield `None`. Non-JSON bodies pass through for the strategies.
pub fn extract_content(body: &str) -> Option<String> {
  let trimmed = body.trim();
  if trimmed.is_empty() {
    return None;
  }
  let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
    return Some(trimmed.to_string());
  };

  let candidate_paths = [
    "/choices/0/message/content",
    "/choices/0/text",
    "/message/content",
    "/content",
    "/text",
    "/response",
  ];
  for path in candidate_paths {
    if let Some(text) = value.pointer(path).and_then(Value::as_str) {
      if !text.trim().is_empty() {
        return Some(text.to_string());
      }
    }
  }

  let is_record = value
    .as_object()
    .is_some_and(|map| RECORD_KEYS.iter().any(|key| map.contains_key(*key)));
  is_record.then(|| trimmed.to_string())
}

/// Run the strategies in order; returns the winning strategy name and record.
pub fn parse_record(content: &str) -> Option<(&'static str, ClassificationRecord)> {
  STRATEGIES
    .iter()
    .find_map(|(name, strategy)| strategy(content).map(|map| (*name, record_from_map(&map))))
}

fn record_from_map(map: &Map<String, Value>) -> ClassificationRecord {
  let summary = map
    .get("summary")
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .unwrap_or(DEFAULT_SUMMARY)
    .to_string();

  let risk = map
    .get("risk")
    .and_then(Value::as_str)
    .map(RiskLevel::from_token)
    .unwrap_or(RiskLevel::Medium);

  let breaking_change = match map.get("breaking_change") {
    Some(Value::Bool(b)) => *b,
    Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
    _ => false,
  };

  let notes = match map.get("notes") {
    Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Some(Value::Array(items)) if !items.is_empty() => Some(
      items
        .iter()
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .collect::<Vec<_>>()
        .join("; "),
    ),
    _ => None,
  };

  ClassificationRecord {
    summary,
    breaking_change,
    risk,
    notes,
  }
}
