//! Wire-level domain types for runscope
//!
//! These mirror the payloads a trace server pushes to viewers. Every entity
//! except [`Run`] belongs to exactly one run.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Run** | One top-level execution session of an agent |
//! | **Message** | One entry of the run's conversation; its id is also its position |
//! | **Section** | A named span `[from_message, to_message)` over message ids |
//! | **ToolCall** | A tool invocation owned by exactly one message |
//! | **Stream part** | A content fragment appended to a message or tool call |
//!
//! Servers are lax about nulls (a freshly started run has no tag, a streamed
//! message has no content yet), so string and number fields deserialize
//! `null` to their default value.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a run.
pub type RunId = i64;
/// Identifier of a message within a run. Also defines display order.
pub type MessageId = i64;
/// Identifier of a section within a run.
pub type SectionId = i64;

// ============================================
// Run
// ============================================

/// Metadata of one run. Always delivered as a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    #[serde(default, deserialize_with = "string_or_null")]
    pub model: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub tag: String,
    #[serde(default, deserialize_with = "timestamp_text")]
    pub started_at: Option<String>,
    #[serde(default, deserialize_with = "timestamp_text")]
    pub stopped_at: Option<String>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub state: String,
    /// Opaque; usually JSON but not guaranteed to be.
    #[serde(default, deserialize_with = "string_or_null")]
    pub configuration: String,
}

impl Run {
    /// Configuration text for display.
    ///
    /// JSON configurations are pretty-printed; anything else is returned
    /// verbatim.
    pub fn configuration_display(&self) -> String {
        match serde_json::from_str::<serde_json::Value>(&self.configuration) {
            Ok(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| self.configuration.clone())
            }
            Err(_) => self.configuration.clone(),
        }
    }

    /// Whether the run has finished.
    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }
}

// ============================================
// Section
// ============================================

/// A labeled span over the message axis.
///
/// `to_message == None` means the section is still open and extends past the
/// last message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub name: String,
    /// Seconds
    #[serde(default, deserialize_with = "seconds_or_null")]
    pub duration: f64,
    pub from_message: MessageId,
    #[serde(default)]
    pub to_message: Option<MessageId>,
}

// ============================================
// Message
// ============================================

/// Full snapshot of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub content: String,
    /// Seconds
    #[serde(default, deserialize_with = "seconds_or_null")]
    pub duration: f64,
    #[serde(default, deserialize_with = "count_or_null")]
    pub tokens_query: i64,
    #[serde(default, deserialize_with = "count_or_null")]
    pub tokens_response: i64,
}

/// A content fragment for a message that is still being produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStreamPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub message_id: MessageId,
    /// Only `append` is produced today; absent means append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub content: String,
}

// ============================================
// Tool calls
// ============================================

/// Full snapshot of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within the owning message. Numbers are accepted and stringified.
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub message_id: MessageId,
    #[serde(default, deserialize_with = "string_or_null")]
    pub function_name: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub state: String,
    /// Seconds
    #[serde(default, deserialize_with = "seconds_or_null")]
    pub duration: f64,
    #[serde(default, deserialize_with = "string_or_null")]
    pub arguments: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub result_text: String,
}

/// A content fragment for a tool call's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallStreamPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub message_id: MessageId,
    #[serde(deserialize_with = "id_text")]
    pub tool_call_id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub content: String,
}

// ============================================
// Lenient field decoding
// ============================================

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn seconds_or_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

fn count_or_null<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Int(i64),
}

fn id_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Text(text) => text,
        IdRepr::Int(n) => n.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Text(String),
    Unix(f64),
}

/// Timestamps arrive as database text or as UNIX seconds depending on which
/// path the server took; keep them as text.
fn timestamp_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<TimestampRepr>::deserialize(deserializer)? {
        None => None,
        Some(TimestampRepr::Text(text)) => Some(text),
        Some(TimestampRepr::Unix(secs)) => {
            let millis = (secs * 1000.0).round() as i64;
            Some(
                DateTime::<Utc>::from_timestamp_millis(millis)
                    .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
                    .unwrap_or_else(|| secs.to_string()),
            )
        }
    })
}

/// A point in time written either as text or as UNIX seconds.
pub(crate) fn timestamp_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match TimestampRepr::deserialize(deserializer)? {
        TimestampRepr::Text(text) => crate::format::parse_timestamp(&text)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp {text:?}"))),
        TimestampRepr::Unix(secs) => {
            DateTime::<Utc>::from_timestamp_millis((secs * 1000.0).round() as i64)
                .ok_or_else(|| D::Error::custom(format!("timestamp {secs} out of range")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run_with_configuration(configuration: &str) -> Run {
        Run {
            id: 1,
            model: "gpt-4o".to_string(),
            tag: String::new(),
            started_at: None,
            stopped_at: None,
            state: "in progress".to_string(),
            configuration: configuration.to_string(),
        }
    }

    #[test]
    fn test_configuration_display_falls_back_to_raw_text() {
        let run = run_with_configuration("not json");
        assert_eq!(run.configuration_display(), "not json");
    }

    #[test]
    fn test_configuration_display_pretty_prints_json() {
        let run = run_with_configuration(r#"{"max_turns":10}"#);
        assert_eq!(run.configuration_display(), "{\n  \"max_turns\": 10\n}");
    }

    #[test]
    fn test_run_accepts_nulls_and_numeric_timestamps() {
        let run: Run = serde_json::from_value(json!({
            "id": 3,
            "model": "gpt-4o",
            "tag": null,
            "started_at": 0.0,
            "stopped_at": null,
            "state": "in progress",
            "configuration": null
        }))
        .unwrap();

        assert_eq!(run.tag, "");
        assert_eq!(run.started_at.as_deref(), Some("1970-01-01 00:00:00.000"));
        assert!(!run.is_stopped());
        assert_eq!(run.configuration, "");
    }

    #[test]
    fn test_tool_call_ids_accept_numbers() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": 4,
            "message_id": 2,
            "function_name": "exec_command",
            "state": "success",
            "duration": 0.5,
            "arguments": "ls",
            "result_text": null
        }))
        .unwrap();

        assert_eq!(call.id, "4");
        assert_eq!(call.result_text, "");
    }

    #[test]
    fn test_open_section_has_no_upper_bound() {
        let section: Section = serde_json::from_value(json!({
            "id": 0,
            "run_id": 1,
            "name": "round 1",
            "duration": 0,
            "from_message": 5,
            "to_message": null
        }))
        .unwrap();

        assert_eq!(section.to_message, None);
        assert_eq!(section.run_id, Some(1));
    }
}
