//! Frame encoding for the viewer channel
//!
//! Every frame, in both directions, is a JSON text message of the form
//! `{"type": <string>, "data": <object>}`. Inbound frames may also carry an
//! `epoch` echoed back by servers that support stale-event tagging.
//!
//! Decoding happens in two steps so that the error taxonomy stays precise:
//! the envelope first (malformed JSON), then the payload for the named type
//! (unknown type vs. payload that does not match its type).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Message, MessageStreamPart, Run, RunId, Section, ToolCall, ToolCallStreamPart};

/// The inbound event types a viewer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Run,
    Section,
    Message,
    MessageStreamPart,
    ToolCall,
    ToolCallStreamPart,
}

impl EventKind {
    /// Returns the wire name of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Run => "Run",
            EventKind::Section => "Section",
            EventKind::Message => "Message",
            EventKind::MessageStreamPart => "MessageStreamPart",
            EventKind::ToolCall => "ToolCall",
            EventKind::ToolCallStreamPart => "ToolCallStreamPart",
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Run" => Ok(EventKind::Run),
            "Section" => Ok(EventKind::Section),
            "Message" => Ok(EventKind::Message),
            "MessageStreamPart" => Ok(EventKind::MessageStreamPart),
            "ToolCall" => Ok(EventKind::ToolCall),
            "ToolCallStreamPart" => Ok(EventKind::ToolCallStreamPart),
            other => Err(Error::UnknownEventType(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The raw `{type, data}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Run(Run),
    Section(Section),
    Message(Message),
    MessageStreamPart(MessageStreamPart),
    ToolCall(ToolCall),
    ToolCallStreamPart(ToolCallStreamPart),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Run(_) => EventKind::Run,
            InboundEvent::Section(_) => EventKind::Section,
            InboundEvent::Message(_) => EventKind::Message,
            InboundEvent::MessageStreamPart(_) => EventKind::MessageStreamPart,
            InboundEvent::ToolCall(_) => EventKind::ToolCall,
            InboundEvent::ToolCallStreamPart(_) => EventKind::ToolCallStreamPart,
        }
    }

    /// The run this event belongs to, when the payload says so.
    ///
    /// For [`InboundEvent::Run`] this is the run's own id.
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            InboundEvent::Run(run) => Some(run.id),
            InboundEvent::Section(section) => section.run_id,
            InboundEvent::Message(message) => message.run_id,
            InboundEvent::MessageStreamPart(part) => part.run_id,
            InboundEvent::ToolCall(call) => call.run_id,
            InboundEvent::ToolCallStreamPart(part) => part.run_id,
        }
    }

    /// Wrap the event into its wire envelope.
    pub fn to_envelope(&self, epoch: Option<u64>) -> Result<Envelope> {
        let data = match self {
            InboundEvent::Run(run) => serde_json::to_value(run)?,
            InboundEvent::Section(section) => serde_json::to_value(section)?,
            InboundEvent::Message(message) => serde_json::to_value(message)?,
            InboundEvent::MessageStreamPart(part) => serde_json::to_value(part)?,
            InboundEvent::ToolCall(call) => serde_json::to_value(call)?,
            InboundEvent::ToolCallStreamPart(part) => serde_json::to_value(part)?,
        };
        Ok(Envelope {
            kind: self.kind().as_str().to_string(),
            data,
            epoch,
        })
    }

    /// Encode the event as a text frame.
    pub fn to_frame_text(&self, epoch: Option<u64>) -> Result<String> {
        Ok(serde_json::to_string(&self.to_envelope(epoch)?)?)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: InboundEvent,
    /// Selection epoch echoed by the server, if any.
    pub epoch: Option<u64>,
}

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<Frame> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let kind: EventKind = envelope.kind.parse()?;

    let payload = |e: serde_json::Error| Error::Protocol {
        kind: kind.to_string(),
        message: e.to_string(),
    };

    let data = envelope.data;
    let event = match kind {
        EventKind::Run => InboundEvent::Run(serde_json::from_value(data).map_err(payload)?),
        EventKind::Section => {
            InboundEvent::Section(serde_json::from_value(data).map_err(payload)?)
        }
        EventKind::Message => {
            InboundEvent::Message(serde_json::from_value(data).map_err(payload)?)
        }
        EventKind::MessageStreamPart => {
            InboundEvent::MessageStreamPart(serde_json::from_value(data).map_err(payload)?)
        }
        EventKind::ToolCall => {
            InboundEvent::ToolCall(serde_json::from_value(data).map_err(payload)?)
        }
        EventKind::ToolCallStreamPart => {
            InboundEvent::ToolCallStreamPart(serde_json::from_value(data).map_err(payload)?)
        }
    };

    Ok(Frame {
        event,
        epoch: envelope.epoch,
    })
}

/// Subscription request for a run's full backlog and live updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub follow_run: RunId,
    /// Selection epoch, for servers that echo it back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
}

/// Frames a viewer sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundRequest {
    MessageRequest(MessageRequest),
}

impl OutboundRequest {
    pub fn follow_run(run_id: RunId, epoch: u64) -> Self {
        OutboundRequest::MessageRequest(MessageRequest {
            follow_run: run_id,
            epoch: Some(epoch),
        })
    }

    /// Encode the request as a text frame.
    pub fn to_frame_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message_stream_part() {
        let frame = decode_frame(
            r#"{"type":"MessageStreamPart","data":{"run_id":3,"message_id":42,"action":"append","content":"he"}}"#,
        )
        .unwrap();

        assert_eq!(frame.epoch, None);
        assert_eq!(frame.event.kind(), EventKind::MessageStreamPart);
        assert_eq!(frame.event.run_id(), Some(3));
        match frame.event {
            InboundEvent::MessageStreamPart(part) => {
                assert_eq!(part.message_id, 42);
                assert_eq!(part.content, "he");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_keeps_epoch() {
        let frame = decode_frame(
            r#"{"type":"Section","epoch":4,"data":{"id":1,"name":"s","duration":0.1,"from_message":1,"to_message":5}}"#,
        )
        .unwrap();
        assert_eq!(frame.epoch, Some(4));
    }

    #[test]
    fn test_decode_errors_are_classified() {
        assert!(matches!(decode_frame("{not json"), Err(Error::Json(_))));
        assert!(matches!(
            decode_frame(r#"{"type":"Heartbeat","data":{}}"#),
            Err(Error::UnknownEventType(kind)) if kind == "Heartbeat"
        ));
        assert!(matches!(
            decode_frame(r#"{"type":"Message","data":{"content":"no id"}}"#),
            Err(Error::Protocol { kind, .. }) if kind == "Message"
        ));
    }

    #[test]
    fn test_message_request_encoding() {
        let text = OutboundRequest::follow_run(7, 2).to_frame_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "MessageRequest", "data": {"follow_run": 7, "epoch": 2}})
        );
    }

    #[test]
    fn test_event_frame_text_decodes_back() {
        let event = InboundEvent::ToolCallStreamPart(ToolCallStreamPart {
            run_id: Some(1),
            message_id: 2,
            tool_call_id: "call_0".to_string(),
            content: "output".to_string(),
        });
        let text = event.to_frame_text(Some(9)).unwrap();
        let frame = decode_frame(&text).unwrap();
        assert_eq!(frame.event, event);
        assert_eq!(frame.epoch, Some(9));
    }
}
