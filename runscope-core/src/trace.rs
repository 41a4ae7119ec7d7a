//! Message and tool call tree of the selected run
//!
//! The tree is rebuilt from events that may arrive in any order: a stream
//! fragment can precede the snapshot of the message it belongs to, and a tool
//! call can precede its message. Nodes are created on first reference and
//! filled in as more events arrive.
//!
//! Merge rules:
//! - Fragments append.
//! - Snapshots overwrite text fields only when they carry a non-empty value,
//!   so streamed content is never wiped by an earlier-built snapshot.
//! - Metadata (role, duration, token counts, state) is always taken from the
//!   latest snapshot.

use std::collections::BTreeMap;

use crate::types::{Message, MessageId, MessageStreamPart, ToolCall, ToolCallStreamPart};

/// A tool call under its owning message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallNode {
    pub id: String,
    pub function_name: String,
    pub state: String,
    /// `None` until a snapshot arrives.
    pub duration: Option<f64>,
    pub arguments: String,
    pub result_text: String,
}

impl ToolCallNode {
    fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Whether only fragments have been seen so far.
    pub fn is_placeholder(&self) -> bool {
        self.duration.is_none()
    }

    fn merge(&mut self, call: &ToolCall) {
        if !call.function_name.is_empty() {
            self.function_name = call.function_name.clone();
        }
        self.state = call.state.clone();
        self.duration = Some(call.duration);
        if !call.arguments.is_empty() {
            self.arguments = call.arguments.clone();
        }
        if !call.result_text.is_empty() {
            self.result_text = call.result_text.clone();
        }
    }
}

/// A message node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageNode {
    pub id: MessageId,
    /// `None` while the message is a placeholder.
    pub role: Option<String>,
    pub conversation: Option<String>,
    pub content: String,
    pub duration: Option<f64>,
    pub tokens_query: Option<i64>,
    pub tokens_response: Option<i64>,
    /// In order of first appearance.
    pub tool_calls: Vec<ToolCallNode>,
}

impl MessageNode {
    fn placeholder(id: MessageId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Whether no snapshot has been seen for this message yet.
    pub fn is_placeholder(&self) -> bool {
        self.duration.is_none()
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCallNode> {
        self.tool_calls.iter().find(|call| call.id == id)
    }

    fn tool_call_mut(&mut self, id: &str) -> &mut ToolCallNode {
        let index = match self.tool_calls.iter().position(|call| call.id == id) {
            Some(index) => index,
            None => {
                self.tool_calls.push(ToolCallNode::placeholder(id));
                self.tool_calls.len() - 1
            }
        };
        &mut self.tool_calls[index]
    }

    fn merge(&mut self, message: &Message) {
        if message.role.is_some() {
            self.role = message.role.clone();
        }
        if message.conversation.is_some() {
            self.conversation = message.conversation.clone();
        }
        if !message.content.is_empty() {
            self.content = message.content.clone();
        }
        self.duration = Some(message.duration);
        self.tokens_query = Some(message.tokens_query);
        self.tokens_response = Some(message.tokens_response);
    }
}

/// Reconstructed messages of one run, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct TraceTree {
    messages: BTreeMap<MessageId, MessageNode>,
}

impl TraceTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_mut(&mut self, id: MessageId) -> &mut MessageNode {
        self.messages
            .entry(id)
            .or_insert_with(|| MessageNode::placeholder(id))
    }

    pub fn apply_message(&mut self, message: &Message) {
        self.node_mut(message.id).merge(message);
    }

    pub fn apply_message_fragment(&mut self, part: &MessageStreamPart) {
        if let Some(action) = part.action.as_deref() {
            if action != "append" {
                tracing::debug!(
                    message_id = part.message_id,
                    action,
                    "Treating unknown stream action as append"
                );
            }
        }
        self.node_mut(part.message_id)
            .content
            .push_str(&part.content);
    }

    pub fn apply_tool_call(&mut self, call: &ToolCall) {
        self.node_mut(call.message_id)
            .tool_call_mut(&call.id)
            .merge(call);
    }

    pub fn apply_tool_call_fragment(&mut self, part: &ToolCallStreamPart) {
        self.node_mut(part.message_id)
            .tool_call_mut(&part.tool_call_id)
            .result_text
            .push_str(&part.content);
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn get(&self, id: MessageId) -> Option<&MessageNode> {
        self.messages.get(&id)
    }

    /// Messages in id order.
    pub fn messages(&self) -> impl Iterator<Item = &MessageNode> {
        self.messages.values()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn first_message_id(&self) -> Option<MessageId> {
        self.messages.keys().next().copied()
    }

    pub fn last_message_id(&self) -> Option<MessageId> {
        self.messages.keys().next_back().copied()
    }

    /// First and last known message ids within `[from, to)`.
    pub fn bounds_within(&self, from: MessageId, to: MessageId) -> Option<(MessageId, MessageId)> {
        if from >= to {
            return None;
        }
        let mut ids = self.messages.range(from..to).map(|(id, _)| *id);
        let first = ids.next()?;
        Some((first, ids.next_back().unwrap_or(first)))
    }
}
