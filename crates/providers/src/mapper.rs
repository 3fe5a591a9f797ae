//! Message mapper: domain messages to OpenAI-compatible wire payloads.
//!
//! Dispatch is exhaustive over the closed message enum, so the only runtime
//! mapping failures left are malformed payloads (e.g. an empty tool-result
//! batch). The mapper accumulates into an internal list and is meant to be
//! constructed fresh per request; a single instance must not be shared
//! across overlapping `map` calls.

use neurite_core::error::ProviderError;
use neurite_core::message::{Message, ToolCall, ToolCallMessage, ToolCallResultMessage};
use serde_json::{Value, json};

pub struct MessageMapper {
    mapping: Vec<Value>,
}

impl MessageMapper {
    pub fn new() -> Self {
        Self {
            mapping: Vec::new(),
        }
    }

    /// Map an ordered message sequence into wire payloads, in order.
    pub fn map(&mut self, messages: &[Message]) -> Result<Vec<Value>, ProviderError> {
        for message in messages {
            match message {
                Message::Chat(message) => {
                    self.mapping.push(strip_usage(message.to_payload()));
                }
                Message::ToolCall(message) => self.map_tool_call(message),
                Message::ToolResult(message) => self.map_tool_result(message)?,
            }
        }

        Ok(self.mapping.clone())
    }

    fn map_tool_call(&mut self, message: &ToolCallMessage) {
        let mut payload = strip_usage(message.envelope().to_payload());
        drop_keys(&mut payload, &["type", "tools"]);

        // Prefer the raw provider-shaped tool_calls stashed in metadata;
        // synthesize it for locally constructed messages.
        if payload.get("tool_calls").is_none() {
            payload["tool_calls"] = Value::Array(
                message.calls().iter().map(wire_tool_call).collect(),
            );
        }

        self.mapping.push(payload);
    }

    fn map_tool_result(&mut self, message: &ToolCallResultMessage) -> Result<(), ProviderError> {
        if message.results().is_empty() {
            return Err(ProviderError::Mapping(
                "tool result message carries no results".into(),
            ));
        }
        self.mapping.extend(message.to_payloads());
        Ok(())
    }
}

impl Default for MessageMapper {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_usage(mut payload: Value) -> Value {
    drop_keys(&mut payload, &["usage"]);
    payload
}

fn drop_keys(payload: &mut Value, keys: &[&str]) {
    if let Value::Object(map) = payload {
        for key in keys {
            map.remove(*key);
        }
    }
}

fn wire_tool_call(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": call.arguments.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurite_core::message::{ChatMessage, Content, ToolResult, Usage};

    fn tool_call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: json!({"q": "rust"}),
        }
    }

    #[test]
    fn plain_message_maps_without_usage() {
        let mut message = ChatMessage::assistant("Hello!");
        message.set_usage(Usage::new(10, 5));

        let mut mapper = MessageMapper::new();
        let mapped = mapper.map(&[Message::Chat(message)]).unwrap();

        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0]["role"], "assistant");
        assert_eq!(mapped[0]["content"], "Hello!");
        assert!(mapped[0].get("usage").is_none());
    }

    #[test]
    fn metadata_travels_with_the_payload() {
        let mut message = ChatMessage::user("question");
        message.add_metadata("name", Value::String("alice".into()));

        let mut mapper = MessageMapper::new();
        let mapped = mapper.map(&[Message::Chat(message)]).unwrap();
        assert_eq!(mapped[0]["name"], "alice");
    }

    #[test]
    fn tool_call_synthesizes_wire_form() {
        let message = ToolCallMessage::new(None, vec![tool_call("call_1", "search")]);

        let mut mapper = MessageMapper::new();
        let mapped = mapper.map(&[Message::ToolCall(message)]).unwrap();

        assert_eq!(mapped[0]["role"], "assistant");
        assert_eq!(mapped[0]["content"], Value::Null);
        assert_eq!(mapped[0]["tool_calls"][0]["id"], "call_1");
        assert_eq!(mapped[0]["tool_calls"][0]["type"], "function");
        assert_eq!(mapped[0]["tool_calls"][0]["function"]["name"], "search");
        assert_eq!(
            mapped[0]["tool_calls"][0]["function"]["arguments"],
            r#"{"q":"rust"}"#
        );
    }

    #[test]
    fn tool_call_prefers_raw_metadata_and_drops_bookkeeping() {
        let raw = json!([{"id": "call_raw", "type": "function",
                          "function": {"name": "search", "arguments": "{}"}}]);
        let mut message = ToolCallMessage::new(None, vec![tool_call("call_1", "search")]);
        message.add_metadata("tool_calls", raw.clone());
        message.add_metadata("tools", json!(["internal"]));
        message.set_usage(Usage::new(1, 1));

        let mut mapper = MessageMapper::new();
        let mapped = mapper.map(&[Message::ToolCall(message)]).unwrap();

        assert_eq!(mapped[0]["tool_calls"], raw);
        assert!(mapped[0].get("tools").is_none());
        assert!(mapped[0].get("usage").is_none());
    }

    #[test]
    fn tool_results_expand_one_entry_per_tool() {
        let results = vec![
            ToolResult {
                call: tool_call("call_1", "search"),
                content: "first".into(),
            },
            ToolResult {
                call: tool_call("call_2", "calc"),
                content: "second".into(),
            },
        ];
        let message = ToolCallResultMessage::new(results);

        let mut mapper = MessageMapper::new();
        let mapped = mapper.map(&[Message::ToolResult(message)]).unwrap();

        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0]["role"], "tool");
        assert_eq!(mapped[0]["tool_call_id"], "call_1");
        assert_eq!(mapped[1]["tool_call_id"], "call_2");
        assert_eq!(mapped[1]["content"], "second");
    }

    #[test]
    fn empty_tool_result_batch_is_a_mapping_error() {
        let message = ToolCallResultMessage::new(vec![]);
        let mut mapper = MessageMapper::new();
        let err = mapper.map(&[Message::ToolResult(message)]).unwrap_err();
        assert!(matches!(err, ProviderError::Mapping(_)));
    }

    #[test]
    fn mixed_sequence_preserves_order() {
        let call = tool_call("call_1", "search");
        let messages = vec![
            Message::user("find rust docs"),
            Message::ToolCall(ToolCallMessage::new(
                Some(Content::Text("looking".into())),
                vec![call.clone()],
            )),
            Message::ToolResult(ToolCallResultMessage::new(vec![ToolResult {
                call,
                content: "docs.rs".into(),
            }])),
            Message::assistant("Here you go."),
        ];

        let mut mapper = MessageMapper::new();
        let mapped = mapper.map(&messages).unwrap();

        assert_eq!(mapped.len(), 4);
        assert_eq!(mapped[0]["role"], "user");
        assert_eq!(mapped[1]["role"], "assistant");
        assert_eq!(mapped[2]["role"], "tool");
        assert_eq!(mapped[3]["role"], "assistant");
    }
}
