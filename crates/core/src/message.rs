//! Message domain types.
//!
//! A conversation is an ordered sequence of `Message` values. The enum is a
//! closed set: plain chat envelopes, tool-call requests coming back from a
//! provider, and the results of executing those calls. Provider adapters
//! match on the variant exhaustively, so an unmappable message kind cannot
//! exist at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Model-authored content on providers that distinguish it from assistant
    Model,
    /// Tool execution result
    Tool,
    /// System instructions
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Model => "model",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

/// Message content: plain text or a structured JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(Value),
}

impl Content {
    /// The text form of this content, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Structured(_) => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Content::Text(text) => Value::String(text.clone()),
            Content::Structured(value) => value.clone(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Fold another usage report into this one.
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Citation metadata attached to assistant content.
///
/// Absent index fields are omitted on serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u32>,
}

/// A plain chat envelope: one turn of user, assistant, or system content.
///
/// Role and content are fixed at construction. Usage, metadata, and
/// annotations are append-only mutations applied after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    role: Role,
    content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<Annotation>,
    created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: Option<Content>) -> Self {
        Self {
            role,
            content,
            usage: None,
            metadata: Map::new(),
            annotations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    /// Create a new system message.
    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    /// The text content, or `""` when the content is absent or structured.
    pub fn text(&self) -> &str {
        self.content
            .as_ref()
            .and_then(Content::as_text)
            .unwrap_or_default()
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    pub fn set_usage(&mut self, usage: Usage) -> &mut Self {
        self.usage = Some(usage);
        self
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> &mut Self {
        self.annotations.push(annotation);
        self
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Serialize to a provider-facing payload: metadata merged with role,
    /// content, and usage-if-present. Role, content, and usage always win
    /// over metadata keys of the same name. Annotations and timestamps are
    /// local bookkeeping and never leave the process this way.
    pub fn to_payload(&self) -> Value {
        let mut map = self.metadata.clone();
        map.insert("role".into(), Value::String(self.role.as_str().into()));
        map.insert(
            "content".into(),
            self.content
                .as_ref()
                .map(Content::to_value)
                .unwrap_or(Value::Null),
        );
        if let Some(usage) = &self.usage {
            map.insert(
                "usage".into(),
                serde_json::json!({
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                }),
            );
        }
        Value::Object(map)
    }
}

/// A single tool invocation requested by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id; echoed back with the result.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Parsed arguments. Malformed argument JSON degrades to `Value::Null`.
    pub arguments: Value,
}

/// The outcome of executing one requested tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call: ToolCall,
    pub content: String,
}

/// An assistant turn that requests one or more tool invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallMessage {
    envelope: ChatMessage,
    calls: Vec<ToolCall>,
}

impl ToolCallMessage {
    pub fn new(content: Option<Content>, calls: Vec<ToolCall>) -> Self {
        Self {
            envelope: ChatMessage::new(Role::Assistant, content),
            calls,
        }
    }

    pub fn envelope(&self) -> &ChatMessage {
        &self.envelope
    }

    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    pub fn set_usage(&mut self, usage: Usage) -> &mut Self {
        self.envelope.set_usage(usage);
        self
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.envelope.add_metadata(key, value);
        self
    }
}

/// The executed counterpart of a [`ToolCallMessage`]: one result per
/// requested call, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResultMessage {
    results: Vec<ToolResult>,
}

impl ToolCallResultMessage {
    pub fn new(results: Vec<ToolResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[ToolResult] {
        &self.results
    }

    /// One tool-role payload per result, tagged with the originating call id.
    pub fn to_payloads(&self) -> Vec<Value> {
        self.results
            .iter()
            .map(|result| {
                serde_json::json!({
                    "role": Role::Tool.as_str(),
                    "tool_call_id": result.call.id,
                    "content": result.content,
                })
            })
            .collect()
    }
}

/// A single entry in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Chat(ChatMessage),
    ToolCall(ToolCallMessage),
    ToolResult(ToolCallResultMessage),
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<Content>) -> Self {
        Message::Chat(ChatMessage::user(content))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<Content>) -> Self {
        Message::Chat(ChatMessage::assistant(content))
    }

    /// Create a new system message.
    pub fn system(content: impl Into<Content>) -> Self {
        Message::Chat(ChatMessage::system(content))
    }

    /// The role this entry occupies in the conversation.
    pub fn role(&self) -> Role {
        match self {
            Message::Chat(message) => message.role(),
            Message::ToolCall(_) => Role::Assistant,
            Message::ToolResult(_) => Role::Tool,
        }
    }

    /// Rough token estimate (4 chars ≈ 1 token), used for history windowing.
    pub fn estimated_tokens(&self) -> usize {
        let chars = match self {
            Message::Chat(message) => message.text().len(),
            Message::ToolCall(message) => {
                message.envelope().text().len()
                    + message
                        .calls()
                        .iter()
                        .map(|call| call.arguments.to_string().len())
                        .sum::<usize>()
            }
            Message::ToolResult(message) => message
                .results()
                .iter()
                .map(|result| result.content.len())
                .sum(),
        };
        chars / 4
    }
}

impl From<ChatMessage> for Message {
    fn from(message: ChatMessage) -> Self {
        Message::Chat(message)
    }
}

impl From<ToolCallMessage> for Message {
    fn from(message: ToolCallMessage) -> Self {
        Message::ToolCall(message)
    }
}

impl From<ToolCallResultMessage> for Message {
    fn from(message: ToolCallResultMessage) -> Self {
        Message::ToolResult(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Model).unwrap(), "\"model\"");
    }

    #[test]
    fn payload_merges_metadata_role_content() {
        let mut msg = ChatMessage::user("Hello");
        msg.add_metadata("id", Value::String("msg_1".into()));

        let payload = msg.to_payload();
        assert_eq!(payload["id"], "msg_1");
        assert_eq!(payload["role"], "user");
        assert_eq!(payload["content"], "Hello");
        assert!(payload.get("usage").is_none());
    }

    #[test]
    fn payload_role_wins_over_metadata() {
        let mut msg = ChatMessage::user("Hello");
        msg.add_metadata("role", Value::String("impostor".into()));

        let payload = msg.to_payload();
        assert_eq!(payload["role"], "user");
    }

    #[test]
    fn payload_includes_usage_when_set() {
        let mut msg = ChatMessage::assistant("Hi");
        msg.set_usage(Usage::new(12, 7));

        let payload = msg.to_payload();
        assert_eq!(payload["usage"]["input_tokens"], 12);
        assert_eq!(payload["usage"]["output_tokens"], 7);
    }

    #[test]
    fn payload_null_content() {
        let msg = ChatMessage::new(Role::Assistant, None);
        assert_eq!(msg.to_payload()["content"], Value::Null);
    }

    #[test]
    fn annotation_omits_absent_indices() {
        let annotation = Annotation {
            url: "https://example.com".into(),
            title: "Example".into(),
            start_index: None,
            end_index: Some(10),
        };
        let json = serde_json::to_value(&annotation).unwrap();
        assert!(json.get("start_index").is_none());
        assert_eq!(json["end_index"], 10);
    }

    #[test]
    fn usage_accumulates() {
        let mut usage = Usage::default();
        usage.add(&Usage::new(3, 5));
        usage.add(&Usage::new(1, 2));
        assert_eq!(usage, Usage::new(4, 7));
    }

    #[test]
    fn tool_result_message_expands_per_tool() {
        let calls = vec![
            ToolCall {
                id: "call_1".into(),
                name: "search".into(),
                arguments: serde_json::json!({"q": "rust"}),
            },
            ToolCall {
                id: "call_2".into(),
                name: "calc".into(),
                arguments: serde_json::json!({"expr": "2+2"}),
            },
        ];
        let results = calls
            .iter()
            .map(|call| ToolResult {
                call: call.clone(),
                content: format!("result of {}", call.name),
            })
            .collect();

        let message = ToolCallResultMessage::new(results);
        let payloads = message.to_payloads();

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["role"], "tool");
        assert_eq!(payloads[0]["tool_call_id"], "call_1");
        assert_eq!(payloads[1]["tool_call_id"], "call_2");
        assert_eq!(payloads[1]["content"], "result of calc");
    }

    #[test]
    fn message_roles_by_variant() {
        assert_eq!(Message::user("hi").role(), Role::User);

        let tool_call = ToolCallMessage::new(None, vec![]);
        assert_eq!(Message::ToolCall(tool_call).role(), Role::Assistant);

        let tool_result = ToolCallResultMessage::new(vec![]);
        assert_eq!(Message::ToolResult(tool_result).role(), Role::Tool);
    }

    #[test]
    fn structured_content_round_trips() {
        let content = Content::Structured(serde_json::json!({"parts": [1, 2]}));
        let msg = ChatMessage::new(Role::User, Some(content));
        assert_eq!(msg.text(), "");
        assert_eq!(msg.to_payload()["content"]["parts"][0], 1);
    }
}
