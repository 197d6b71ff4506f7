//! Conversion between canonical types and the `OpenAI` chat wire format

use serde_json::Value;

use crate::protocol::openai as wire;
use crate::types::{
    Choice, ContentPart, Delta, Event, FinishReason, FunctionCall, Message, Request, Response, Role,
    Tool, ToolCall, ToolChoice, Usage,
};

use super::unix_now;

/// Encode a canonical request into the chat wire format
pub fn encode_request(request: &Request, model: &str, stream: bool) -> wire::ChatRequest {
    wire::ChatRequest {
        model: model.to_owned(),
        messages: request.messages.iter().map(encode_message).collect(),
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        stop: request.stop.clone(),
        stream: stream.then_some(true),
        stream_options: stream.then_some(wire::StreamOptions { include_usage: true }),
        tools: request
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(encode_tool).collect()),
        tool_choice: request.tool_choice.as_ref().map(encode_tool_choice),
    }
}

fn encode_message(message: &Message) -> wire::ChatMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let content = match &message.parts {
        Some(parts) => wire::ChatContent::Parts(parts.iter().map(encode_part).collect()),
        None => wire::ChatContent::Text(message.content.clone()),
    };

    let tool_calls = message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|call| wire::ChatToolCall {
                id: call.id.clone(),
                kind: "function".to_owned(),
                function: wire::ChatFunctionCall {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                },
            })
            .collect()
    });

    wire::ChatMessage {
        role: role.to_owned(),
        content: Some(content),
        name: message.name.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn encode_part(part: &ContentPart) -> wire::ChatContentPart {
    match part {
        ContentPart::Text { text } => wire::ChatContentPart::Text { text: text.clone() },
        ContentPart::Image { media_type, data } => wire::ChatContentPart::ImageUrl {
            image_url: wire::ImageUrl {
                url: format!("data:{media_type};base64,{data}"),
            },
        },
    }
}

fn encode_tool(tool: &Tool) -> wire::ChatTool {
    wire::ChatTool {
        kind: tool.kind.clone(),
        function: wire::ChatFunction {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: tool.function.parameters.clone(),
        },
    }
}

fn encode_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        // Mode names match the wire strings exactly
        ToolChoice::Mode(mode) => serde_json::to_value(mode).unwrap_or(Value::Null),
        ToolChoice::Function(named) => serde_json::json!({
            "type": "function",
            "function": {"name": named.function.name},
        }),
    }
}

/// Decode a chat response into the canonical shape
pub fn decode_response(response: wire::ChatResponse, provider: &str) -> Response {
    let choices = response
        .choices
        .into_iter()
        .map(|choice| {
            let tool_calls = choice.message.tool_calls.map(decode_tool_calls);

            let mut finish_reason = choice.finish_reason.as_deref().and_then(decode_finish_reason);
            if tool_calls.as_ref().is_some_and(|calls| !calls.is_empty()) {
                finish_reason = Some(FinishReason::ToolCalls);
            }

            Choice {
                index: choice.index,
                message: Some(Message {
                    role: Role::Assistant,
                    content: choice.message.content.unwrap_or_default(),
                    parts: None,
                    name: None,
                    tool_calls,
                    tool_call_id: None,
                }),
                delta: None,
                finish_reason,
            }
        })
        .collect();

    Response {
        id: response.id,
        object: "chat.completion".to_owned(),
        created: if response.created == 0 { unix_now() } else { response.created },
        model: response.model,
        provider: provider.to_owned(),
        choices,
        usage: response.usage.map(decode_usage),
    }
}

fn decode_tool_calls(calls: Vec<wire::ChatToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            index: None,
            function: FunctionCall {
                name: call.function.name,
                arguments: call.function.arguments,
            },
        })
        .collect()
}

fn decode_usage(usage: wire::ChatUsage) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

pub(crate) fn decode_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Accumulates streaming chunks and re-emits them as canonical events
///
/// Content and tool-call fragments pass through as they arrive; the final
/// response handed to the `Done` event is assembled from the accumulated
/// state, grouping tool-call fragments by their array index.
#[derive(Debug)]
pub struct ChatStreamState {
    id: String,
    model: String,
    created: u64,
    content: String,
    tool_calls: Vec<PendingToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

#[derive(Debug)]
struct PendingToolCall {
    index: u32,
    id: String,
    name: String,
    arguments: String,
}

impl ChatStreamState {
    /// Start assembling a stream for the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            model: model.into(),
            created: 0,
            content: String::new(),
            tool_calls: Vec::new(),
            finish_reason: None,
            usage: None,
        }
    }

    /// Fold one chunk into the state, returning the events to emit
    pub fn apply(&mut self, chunk: &wire::ChatChunk) -> Vec<Event> {
        let mut events = Vec::new();

        if !chunk.id.is_empty() {
            self.id.clone_from(&chunk.id);
        }
        if !chunk.model.is_empty() {
            self.model.clone_from(&chunk.model);
        }
        if chunk.created != 0 {
            self.created = chunk.created;
        }
        if let Some(usage) = &chunk.usage {
            self.usage = Some(decode_usage(*usage));
        }

        for choice in &chunk.choices {
            if let Some(text) = &choice.delta.content
                && !text.is_empty()
            {
                self.content.push_str(text);
                events.push(Event::ContentDelta { text: text.clone() });
            }

            if let Some(fragments) = &choice.delta.tool_calls
                && !fragments.is_empty()
            {
                let tool_calls = fragments.iter().map(|fragment| self.merge(fragment)).collect();
                events.push(Event::ToolCallDelta {
                    delta: Delta {
                        role: None,
                        content: None,
                        tool_calls,
                    },
                });
            }

            if let Some(reason) = choice.finish_reason.as_deref().and_then(decode_finish_reason) {
                self.finish_reason = Some(reason);
            }
        }

        events
    }

    /// Merge a fragment into the pending call it belongs to, returning the
    /// canonical fragment to re-emit
    fn merge(&mut self, fragment: &wire::ChunkToolCall) -> ToolCall {
        let position = match self.tool_calls.iter().position(|call| call.index == fragment.index) {
            Some(position) => position,
            None => {
                self.tool_calls.push(PendingToolCall {
                    index: fragment.index,
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                });
                self.tool_calls.len() - 1
            }
        };
        let pending = &mut self.tool_calls[position];

        if let Some(id) = &fragment.id
            && !id.is_empty()
        {
            pending.id.clone_from(id);
        }

        let mut name = String::new();
        let mut arguments = String::new();
        if let Some(function) = &fragment.function {
            if let Some(fragment_name) = &function.name
                && !fragment_name.is_empty()
            {
                pending.name.clone_from(fragment_name);
                name.clone_from(fragment_name);
            }
            if let Some(fragment_args) = &function.arguments {
                pending.arguments.push_str(fragment_args);
                arguments.clone_from(fragment_args);
            }
        }

        ToolCall {
            id: fragment.id.clone().unwrap_or_default(),
            index: Some(fragment.index),
            function: FunctionCall { name, arguments },
        }
    }

    /// Assemble the final response for the `Done` event
    pub fn into_response(self, provider: &str) -> Response {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .map(|pending| ToolCall {
                id: pending.id,
                index: Some(pending.index),
                function: FunctionCall {
                    name: pending.name,
                    arguments: pending.arguments,
                },
            })
            .collect();

        let finish_reason = if tool_calls.is_empty() {
            self.finish_reason
        } else {
            Some(FinishReason::ToolCalls)
        };

        Response {
            id: self.id,
            object: "chat.completion".to_owned(),
            created: if self.created == 0 { unix_now() } else { self.created },
            model: self.model,
            provider: provider.to_owned(),
            choices: vec![Choice {
                index: 0,
                message: Some(Message {
                    role: Role::Assistant,
                    content: self.content,
                    parts: None,
                    name: None,
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                    tool_call_id: None,
                }),
                delta: None,
                finish_reason,
            }],
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(json: Value) -> wire::ChatChunk {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn encode_maps_roles_and_tool_results() {
        let request = Request::new(
            "",
            vec![
                Message::system("be brief"),
                Message::user("hi"),
                Message::assistant_with_tool_calls(
                    "",
                    vec![ToolCall {
                        id: "c1".into(),
                        index: None,
                        function: FunctionCall {
                            name: "f".into(),
                            arguments: "{}".into(),
                        },
                    }],
                ),
                Message::tool("c1", "{\"ok\":true}"),
            ],
        );

        let encoded = encode_request(&request, "gpt-4o", false);
        assert_eq!(encoded.model, "gpt-4o");
        assert_eq!(encoded.messages.len(), 4);
        assert_eq!(encoded.messages[0].role, "system");
        assert_eq!(encoded.messages[2].role, "assistant");
        assert_eq!(
            encoded.messages[2].tool_calls.as_ref().unwrap()[0].id,
            "c1"
        );
        assert_eq!(encoded.messages[3].role, "tool");
        assert_eq!(encoded.messages[3].tool_call_id.as_deref(), Some("c1"));
        assert!(encoded.stream.is_none());
    }

    #[test]
    fn encode_passes_schema_verbatim() {
        let schema = json!({"type": "object", "properties": {"q": {"type": "string"}}});
        let request = Request {
            tools: Some(vec![Tool::function("search", "find things", schema.clone())]),
            ..Request::new("m", vec![Message::user("hi")])
        };

        let encoded = encode_request(&request, "m", false);
        let tools = encoded.tools.unwrap();
        assert_eq!(tools[0].function.parameters.as_ref().unwrap(), &schema);
    }

    #[test]
    fn encode_tool_choice_modes() {
        for (choice, expected) in [
            (ToolChoice::auto(), json!("auto")),
            (ToolChoice::none(), json!("none")),
            (ToolChoice::required(), json!("required")),
        ] {
            assert_eq!(encode_tool_choice(&choice), expected);
        }

        assert_eq!(
            encode_tool_choice(&ToolChoice::function("f")),
            json!({"type": "function", "function": {"name": "f"}})
        );
    }

    #[test]
    fn encode_image_part_becomes_data_uri() {
        let request = Request::new(
            "m",
            vec![Message::user_with_parts(vec![
                ContentPart::Text { text: "what is this".into() },
                ContentPart::Image {
                    media_type: "image/png".into(),
                    data: "aGk=".into(),
                },
            ])],
        );

        let encoded = encode_request(&request, "m", false);
        let json = serde_json::to_value(&encoded.messages[0]).unwrap();
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,aGk=");
    }

    #[test]
    fn decode_simple_completion() {
        let response: wire::ChatResponse = serde_json::from_value(json!({
            "id": "r1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "m1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        }))
        .unwrap();

        let decoded = decode_response(response, "chatA");
        assert_eq!(decoded.provider, "chatA");
        assert_eq!(decoded.model, "m1");
        assert_eq!(decoded.text(), Some("hello"));
        assert_eq!(decoded.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(
            decoded.usage,
            Some(Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 })
        );
    }

    #[test]
    fn decode_overrides_finish_reason_when_tool_calls_present() {
        let response: wire::ChatResponse = serde_json::from_value(json!({
            "id": "r1",
            "model": "m1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "f", "arguments": "{}"}}]
                },
                "finish_reason": "stop"
            }]
        }))
        .unwrap();

        let decoded = decode_response(response, "p");
        assert_eq!(decoded.choices[0].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn stream_concatenates_content() {
        let mut state = ChatStreamState::new("m1");

        let events = state.apply(&chunk(json!({
            "id": "r1", "model": "m1",
            "choices": [{"index": 0, "delta": {"content": "he"}}]
        })));
        assert!(matches!(&events[0], Event::ContentDelta { text } if text == "he"));

        state.apply(&chunk(json!({
            "choices": [{"index": 0, "delta": {"content": "llo"}}]
        })));
        state.apply(&chunk(json!({
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        })));

        let response = state.into_response("p");
        assert_eq!(response.text(), Some("hello"));
        assert_eq!(response.id, "r1");
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn stream_assembles_tool_call_fragments_by_index() {
        let mut state = ChatStreamState::new("m1");

        let events = state.apply(&chunk(json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "c1", "function": {"name": "f", "arguments": "{\"x\":"}}
            ]}}]
        })));
        let Event::ToolCallDelta { delta } = &events[0] else {
            panic!("expected tool call delta");
        };
        assert_eq!(delta.tool_calls[0].id, "c1");
        assert_eq!(delta.tool_calls[0].function.arguments, "{\"x\":");

        state.apply(&chunk(json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "1}"}}
            ]}}]
        })));

        let response = state.into_response("p");
        let calls = response.tool_calls().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.name, "f");
        assert_eq!(calls[0].function.arguments, "{\"x\":1}");
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn stream_captures_trailing_usage_chunk() {
        let mut state = ChatStreamState::new("m1");
        state.apply(&chunk(json!({
            "choices": [{"index": 0, "delta": {"content": "x"}}]
        })));
        state.apply(&chunk(json!({
            "choices": [],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
        })));

        let response = state.into_response("p");
        let usage = response.usage.unwrap();
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    }

    #[test]
    fn stream_without_usage_reports_none() {
        let mut state = ChatStreamState::new("m1");
        state.apply(&chunk(json!({
            "choices": [{"index": 0, "delta": {"content": "x"}}]
        })));
        assert!(state.into_response("p").usage.is_none());
    }
}
