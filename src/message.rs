//! Conversation data model shared by the agent loop and provider adapters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single piece of message content.
///
/// Every consumer matches this enum exhaustively, so adding a variant forces
/// each provider adapter to decide how (or whether) it goes over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        value: String,
    },
    ToolCallRequest {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolCallResult {
        id: String,
        value: String,
        is_error: bool,
    },
    ApprovalRequest {
        id: String,
        tool_call_id: String,
    },
    ApprovalResponse {
        id: String,
        approved: bool,
    },
}

impl ContentItem {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

impl From<ToolCall> for ContentItem {
    fn from(call: ToolCall) -> Self {
        ContentItem::ToolCallRequest {
            id: call.id,
            name: call.name,
            arguments: call.arguments,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: Vec<ContentItem>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentItem>) -> Self {
        Self { role, content }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentItem::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentItem::text(text)])
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &[ContentItem] {
        &self.content
    }

    /// Concatenated `Text` items, or `None` when the message carries no text.
    pub fn text(&self) -> Option<String> {
        let parts = self
            .content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { value } => Some(value.as_str()),
                ContentItem::ToolCallRequest { .. }
                | ContentItem::ToolCallResult { .. }
                | ContentItem::ApprovalRequest { .. }
                | ContentItem::ApprovalResponse { .. } => None,
            })
            .collect::<Vec<_>>();

        if parts.is_empty() {
            None
        } else {
            Some(parts.concat())
        }
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::ToolCallRequest {
                    id,
                    name,
                    arguments,
                } => Some(ToolCall::new(id.clone(), name.clone(), arguments.clone())),
                ContentItem::Text { .. }
                | ContentItem::ToolCallResult { .. }
                | ContentItem::ApprovalRequest { .. }
                | ContentItem::ApprovalResponse { .. } => None,
            })
            .collect()
    }
}

/// Append-only message history owned by a single agent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.items()
            .filter_map(|item| match item {
                ContentItem::ToolCallRequest { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.items()
            .filter_map(|item| match item {
                ContentItem::ToolCallResult { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool call ids that have no matching result yet.
    pub fn unmatched_tool_calls(&self) -> Vec<&str> {
        let results = self.tool_result_ids();
        self.tool_call_ids()
            .into_iter()
            .filter(|id| !results.contains(id))
            .collect()
    }

    fn items(&self) -> impl Iterator<Item = &ContentItem> {
        self.messages.iter().flat_map(|message| message.content.iter())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn text_joins_only_text_items() {
        let message = Message::new(
            Role::Assistant,
            vec![
                ContentItem::text("The "),
                ToolCall::new("call_1", "lookup", json!({})).into(),
                ContentItem::text("answer"),
            ],
        );

        assert_eq!(message.text().as_deref(), Some("The answer"));
        assert_eq!(message.tool_calls().len(), 1);
    }

    #[test]
    fn unmatched_tool_calls_lists_ids_without_results() {
        let mut conversation = Conversation::new();
        conversation.push(Message::new(
            Role::Assistant,
            vec![
                ToolCall::new("call_1", "a", json!({})).into(),
                ToolCall::new("call_2", "b", json!({})).into(),
            ],
        ));
        conversation.push(Message::new(
            Role::Tool,
            vec![ContentItem::ToolCallResult {
                id: "call_2".to_string(),
                value: "ok".to_string(),
                is_error: false,
            }],
        ));

        assert_eq!(conversation.unmatched_tool_calls(), vec!["call_1"]);
    }

    #[test]
    fn content_item_serializes_with_type_tag() {
        let value = serde_json::to_value(ContentItem::ApprovalResponse {
            id: "approval_1".to_string(),
            approved: true,
        })
        .expect("serializes");

        assert_eq!(value["type"], "approval_response");
        assert_eq!(value["approved"], true);
    }
}
