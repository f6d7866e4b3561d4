//! Stream records
//!
//! Every non-blank line pushed by the provider is one JSON object. Most are
//! status events that get persisted; the rest are control messages about the
//! stream itself (limit notices, stall warnings, disconnects, deletions).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Top-level keys that mark a single-key object as a control message
const CONTROL_KEYS: &[&str] = &[
    "limit",
    "warning",
    "disconnect",
    "delete",
    "scrub_geo",
    "status_withheld",
    "user_withheld",
];

/// A line from the feed that could not be parsed as a JSON object
#[derive(Debug, Error)]
#[error("malformed payload: {reason}")]
pub struct MalformedPayload {
    pub reason: String,
}

/// One received stream event, kept exactly as the provider sent it
///
/// Key order is preserved (`serde_json` is built with `preserve_order`), so
/// serializing a record reproduces the received object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord {
    fields: Map<String, Value>,
}

impl EventRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Language tag assigned by the provider
    pub fn lang(&self) -> Option<&str> {
        self.fields.get("lang").and_then(Value::as_str)
    }

    pub fn text(&self) -> Option<&str> {
        self.fields.get("text").and_then(Value::as_str)
    }

    pub fn user_screen_name(&self) -> Option<&str> {
        self.user_field("screen_name")
    }

    pub fn user_location(&self) -> Option<&str> {
        self.user_field("location")
    }

    /// Hashtag texts from `entities.hashtags`, empty when absent
    pub fn hashtags(&self) -> Vec<&str> {
        self.fields
            .get("entities")
            .and_then(|e| e.get("hashtags"))
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(|t| t.get("text").and_then(Value::as_str)).collect())
            .unwrap_or_default()
    }

    /// Short one-line description for debug logs
    pub fn summary(&self) -> String {
        let mut out = format!("@{}", self.user_screen_name().unwrap_or("?"));
        if let Some(location) = self.user_location().filter(|l| !l.is_empty()) {
            out.push_str(&format!(" ({})", location));
        }
        let text: String = self.text().unwrap_or("").chars().take(60).collect();
        out.push_str(&format!(": {}", text));

        let tags = self.hashtags();
        if !tags.is_empty() {
            out.push_str(&format!(" [#{}]", tags.join(" #")));
        }
        out
    }

    fn user_field(&self, key: &str) -> Option<&str> {
        self.fields.get("user").and_then(|u| u.get(key)).and_then(Value::as_str)
    }
}

/// A parsed line from the feed
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// A status event, candidate for persistence
    Event(EventRecord),
    /// The provider withheld `undelivered` matching events since the connection opened
    Limit { undelivered: u64 },
    /// Stall warning; the client is falling behind
    Warning { code: String, message: String },
    /// The provider is about to close the connection
    Disconnect { code: u64, reason: String },
    /// Any other control message (deletions, withheld content, ...)
    Notice { kind: String },
}

impl StreamMessage {
    pub fn parse(line: &str) -> Result<Self, MalformedPayload> {
        let value: Value = serde_json::from_str(line).map_err(|e| MalformedPayload { reason: e.to_string() })?;

        let Value::Object(fields) = value else {
            return Err(MalformedPayload {
                reason: format!("expected a JSON object, got: {}", truncate(line, 80)),
            });
        };

        if fields.len() == 1
            && let Some((kind, body)) = fields.iter().next()
            && CONTROL_KEYS.contains(&kind.as_str())
        {
            return Ok(Self::control(kind, body));
        }

        Ok(Self::Event(EventRecord::new(fields)))
    }

    fn control(kind: &str, body: &Value) -> Self {
        let str_field = |key: &str| body.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        match kind {
            "limit" => Self::Limit {
                undelivered: body.get("track").and_then(Value::as_u64).unwrap_or(0),
            },
            "warning" => Self::Warning {
                code: str_field("code"),
                message: str_field("message"),
            },
            "disconnect" => Self::Disconnect {
                code: body.get("code").and_then(Value::as_u64).unwrap_or(0),
                reason: str_field("reason"),
            },
            other => Self::Notice { kind: other.to_string() },
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}
