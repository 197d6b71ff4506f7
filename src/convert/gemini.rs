//! Conversion between canonical types and the Google Generative Language
//! wire format

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::protocol::gemini as wire;
use crate::types::{
    Choice, ContentPart, Delta, Event, FinishReason, FunctionCall, Message, Request, Response, Role,
    Tool, ToolCall, ToolChoice, ToolChoiceMode, Usage,
};

use super::unix_now;

/// Default max output tokens sent when the request omits the knob
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 16_384;

/// Encode a canonical request into the `generateContent` wire format
///
/// The first system message becomes the system instruction. A "none"
/// tool-choice omits the tools block entirely; the other directives are
/// best-effort defaults since this dialect has no equivalent knobs.
pub fn encode_request(request: &Request) -> wire::GenerateRequest {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for message in &request.messages {
        match message.role {
            Role::System => {
                if system_instruction.is_none() {
                    system_instruction = Some(wire::Content {
                        role: None,
                        parts: vec![wire::Part::Text(message.content.clone())],
                    });
                }
            }
            Role::User => contents.push(encode_user(message)),
            Role::Assistant => {
                if let Some(content) = encode_assistant(message) {
                    contents.push(content);
                }
            }
            Role::Tool => contents.push(encode_tool_result(message)),
        }
    }

    let generation_config = Some(encode_generation_config(request));

    let suppress_tools = matches!(&request.tool_choice, Some(ToolChoice::Mode(ToolChoiceMode::None)));
    let tools = if suppress_tools {
        None
    } else {
        request.tools.as_ref().map(|tools| {
            vec![wire::ToolDecl {
                function_declarations: tools.iter().map(encode_tool).collect(),
            }]
        })
    };

    wire::GenerateRequest {
        contents,
        system_instruction,
        generation_config,
        tools,
    }
}

fn encode_user(message: &Message) -> wire::Content {
    let parts = match &message.parts {
        Some(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => wire::Part::Text(text.clone()),
                ContentPart::Image { media_type, data } => wire::Part::InlineData(wire::Blob {
                    mime_type: media_type.clone(),
                    data: data.clone(),
                }),
            })
            .collect(),
        None => vec![wire::Part::Text(message.content.clone())],
    };

    wire::Content {
        role: Some("user".to_owned()),
        parts,
    }
}

fn encode_assistant(message: &Message) -> Option<wire::Content> {
    let mut parts = Vec::new();

    if !message.content.is_empty() {
        parts.push(wire::Part::Text(message.content.clone()));
    }
    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            let args = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
            parts.push(wire::Part::FunctionCall(wire::FunctionCall {
                name: call.function.name.clone(),
                args,
            }));
        }
    }

    if parts.is_empty() {
        return None;
    }

    Some(wire::Content {
        role: Some("model".to_owned()),
        parts,
    })
}

fn encode_tool_result(message: &Message) -> wire::Content {
    // Function responses are keyed by name; fall back to the call id, which
    // this dialect synthesizes from the name anyway
    let name = message
        .name
        .clone()
        .or_else(|| message.tool_call_id.clone())
        .unwrap_or_default();

    let response = match serde_json::from_str::<Value>(&message.content) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({"result": message.content}),
    };

    wire::Content {
        role: Some("function".to_owned()),
        parts: vec![wire::Part::FunctionResponse(wire::FunctionResponse {
            name,
            response,
        })],
    }
}

fn encode_generation_config(request: &Request) -> wire::GenerationConfig {
    wire::GenerationConfig {
        temperature: request.temperature,
        top_p: request.top_p,
        max_output_tokens: Some(request.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS)),
        stop_sequences: request.stop.clone(),
    }
}

fn encode_tool(tool: &Tool) -> wire::FunctionDeclaration {
    wire::FunctionDeclaration {
        name: tool.function.name.clone(),
        description: tool.function.description.clone(),
        parameters: tool.function.parameters.as_ref().map(encode_schema),
    }
}

/// Translate a JSON Schema fragment into the dialect's native schema
///
/// The top level is always an object; `required`, `description`, and string
/// `enum` values survive; unrecognized constructs degrade to untyped nodes.
pub(crate) fn encode_schema(params: &Value) -> wire::Schema {
    let mut schema = wire::Schema {
        kind: Some("OBJECT".to_owned()),
        ..wire::Schema::default()
    };

    if let Some(properties) = params.get("properties").and_then(Value::as_object) {
        let mut encoded = BTreeMap::new();
        for (name, property) in properties {
            encoded.insert(name.clone(), encode_property(property));
        }
        schema.properties = Some(encoded);
    }

    schema.required = decode_required(params);
    schema
}

fn encode_property(property: &Value) -> wire::Schema {
    let mut schema = wire::Schema::default();

    match property.get("type").and_then(Value::as_str) {
        Some("string") => schema.kind = Some("STRING".to_owned()),
        Some("number") => schema.kind = Some("NUMBER".to_owned()),
        Some("integer") => schema.kind = Some("INTEGER".to_owned()),
        Some("boolean") => schema.kind = Some("BOOLEAN".to_owned()),
        Some("array") => {
            schema.kind = Some("ARRAY".to_owned());
            if let Some(items) = property.get("items") {
                schema.items = Some(Box::new(encode_property(items)));
            }
        }
        Some("object") => {
            schema.kind = Some("OBJECT".to_owned());
            if let Some(properties) = property.get("properties").and_then(Value::as_object) {
                let mut encoded = BTreeMap::new();
                for (name, nested) in properties {
                    encoded.insert(name.clone(), encode_property(nested));
                }
                schema.properties = Some(encoded);
            }
            schema.required = decode_required(property);
        }
        // Unknown constructs degrade to untyped
        _ => {}
    }

    if let Some(description) = property.get("description").and_then(Value::as_str) {
        schema.description = Some(description.to_owned());
    }

    if let Some(values) = property.get("enum").and_then(Value::as_array) {
        let strings: Vec<String> = values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        if !strings.is_empty() {
            schema.enum_values = Some(strings);
        }
    }

    schema
}

fn decode_required(value: &Value) -> Option<Vec<String>> {
    let required: Vec<String> = value
        .get("required")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect();
    if required.is_empty() { None } else { Some(required) }
}

/// Decode a `generateContent` response into the canonical shape
///
/// This dialect reports no response id and no per-call tool ids; ids are
/// synthesized from the function name, so two calls to the same function in
/// one turn alias.
pub fn decode_response(response: wire::GenerateResponse, model: &str, provider: &str) -> Response {
    let choices = response
        .candidates
        .iter()
        .enumerate()
        .map(|(position, candidate)| decode_candidate(candidate, position as u32))
        .collect();

    Response {
        id: String::new(),
        object: "chat.completion".to_owned(),
        created: unix_now(),
        model: model.to_owned(),
        provider: provider.to_owned(),
        choices,
        usage: response.usage_metadata.map(decode_usage),
    }
}

fn decode_candidate(candidate: &wire::Candidate, position: u32) -> Choice {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    if let Some(candidate_content) = &candidate.content {
        for part in &candidate_content.parts {
            match part {
                wire::Part::Text(text) => content.push_str(text),
                wire::Part::FunctionCall(call) => tool_calls.push(decode_function_call(call)),
                _ => {}
            }
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        decode_finish_reason(candidate.finish_reason.as_deref())
    } else {
        FinishReason::ToolCalls
    };

    Choice {
        index: candidate.index.unwrap_or(position),
        message: Some(Message {
            role: Role::Assistant,
            content,
            parts: None,
            name: None,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            tool_call_id: None,
        }),
        delta: None,
        finish_reason: Some(finish_reason),
    }
}

fn decode_function_call(call: &wire::FunctionCall) -> ToolCall {
    let arguments = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_owned());
    ToolCall {
        id: call.name.clone(),
        index: None,
        function: FunctionCall {
            name: call.name.clone(),
            arguments,
        },
    }
}

fn decode_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn decode_usage(usage: wire::UsageMetadata) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    }
}

/// Accumulates streamed `generateContent` chunks
///
/// Text parts re-emit as content deltas; function calls arrive whole, so
/// each becomes a single tool-call delta with its complete arguments.
#[derive(Debug)]
pub struct GenerateStreamState {
    model: String,
    content: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl GenerateStreamState {
    /// Start assembling a stream for the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: String::new(),
            tool_calls: Vec::new(),
            finish_reason: None,
            usage: None,
        }
    }

    /// Fold one chunk into the state, returning the events to emit
    pub fn apply(&mut self, chunk: &wire::GenerateResponse) -> Vec<Event> {
        let mut events = Vec::new();

        for candidate in &chunk.candidates {
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    match part {
                        wire::Part::Text(text) => {
                            if text.is_empty() {
                                continue;
                            }
                            self.content.push_str(text);
                            events.push(Event::ContentDelta { text: text.clone() });
                        }
                        wire::Part::FunctionCall(call) => {
                            let tool_call = decode_function_call(call);
                            self.tool_calls.push(tool_call.clone());
                            events.push(Event::ToolCallDelta {
                                delta: Delta {
                                    role: None,
                                    content: None,
                                    tool_calls: vec![tool_call],
                                },
                            });
                        }
                        _ => {}
                    }
                }
            }

            if let Some(reason) = &candidate.finish_reason {
                self.finish_reason = Some(decode_finish_reason(Some(reason)));
            }
        }

        if let Some(usage) = &chunk.usage_metadata {
            self.usage = Some(decode_usage(*usage));
        }

        events
    }

    /// Assemble the final response for the `Done` event
    pub fn into_response(self, provider: &str) -> Response {
        let finish_reason = if self.tool_calls.is_empty() {
            self.finish_reason.unwrap_or(FinishReason::Stop)
        } else {
            FinishReason::ToolCalls
        };

        Response {
            id: String::new(),
            object: "chat.completion".to_owned(),
            created: unix_now(),
            model: self.model,
            provider: provider.to_owned(),
            choices: vec![Choice {
                index: 0,
                message: Some(Message {
                    role: Role::Assistant,
                    content: self.content,
                    parts: None,
                    name: None,
                    tool_calls: if self.tool_calls.is_empty() {
                        None
                    } else {
                        Some(self.tool_calls)
                    },
                    tool_call_id: None,
                }),
                delta: None,
                finish_reason: Some(finish_reason),
            }],
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_extracts_system_instruction() {
        let request = Request::new(
            "",
            vec![Message::system("be helpful"), Message::user("hi")],
        );

        let encoded = encode_request(&request);
        let system = encoded.system_instruction.unwrap();
        assert!(matches!(&system.parts[0], wire::Part::Text(text) if text == "be helpful"));
        assert_eq!(encoded.contents.len(), 1);
        assert_eq!(encoded.contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn encode_assistant_tool_calls_as_function_parts() {
        let request = Request::new(
            "",
            vec![Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "get_weather".into(),
                    index: None,
                    function: FunctionCall {
                        name: "get_weather".into(),
                        arguments: "{\"location\":\"SF\"}".into(),
                    },
                }],
            )],
        );

        let encoded = encode_request(&request);
        assert_eq!(encoded.contents[0].role.as_deref(), Some("model"));
        let wire::Part::FunctionCall(call) = &encoded.contents[0].parts[0] else {
            panic!("expected function call part");
        };
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.args["location"], "SF");
    }

    #[test]
    fn encode_wraps_unparseable_tool_result() {
        let request = Request::new("", vec![Message::tool("get_weather", "sunny, 68F")]);

        let encoded = encode_request(&request);
        let wire::Part::FunctionResponse(response) = &encoded.contents[0].parts[0] else {
            panic!("expected function response part");
        };
        assert_eq!(response.name, "get_weather");
        assert_eq!(response.response["result"], "sunny, 68F");
    }

    #[test]
    fn encode_keeps_object_tool_results() {
        let request = Request::new("", vec![Message::tool("f", "{\"temp\":68}")]);

        let encoded = encode_request(&request);
        let wire::Part::FunctionResponse(response) = &encoded.contents[0].parts[0] else {
            panic!("expected function response part");
        };
        assert_eq!(response.response["temp"], 68);
    }

    #[test]
    fn encode_defaults_max_output_tokens() {
        let request = Request::new("", vec![Message::user("hi")]);
        let config = encode_request(&request).generation_config.unwrap();
        assert_eq!(config.max_output_tokens, Some(DEFAULT_MAX_OUTPUT_TOKENS));
        assert!(config.temperature.is_none());

        let request = Request {
            max_tokens: Some(256),
            ..request
        };
        let config = encode_request(&request).generation_config.unwrap();
        assert_eq!(config.max_output_tokens, Some(256));
    }

    #[test]
    fn encode_none_tool_choice_omits_tools() {
        let request = Request {
            tools: Some(vec![Tool::function("f", "d", json!({"type": "object"}))]),
            tool_choice: Some(ToolChoice::none()),
            ..Request::new("", vec![Message::user("hi")])
        };
        assert!(encode_request(&request).tools.is_none());

        let request = Request {
            tool_choice: Some(ToolChoice::auto()),
            ..request
        };
        assert!(encode_request(&request).tools.is_some());
    }

    #[test]
    fn schema_translation_preserves_types_and_required() {
        let schema = encode_schema(&json!({
            "type": "object",
            "required": ["location"],
            "properties": {
                "location": {"type": "string", "description": "city name"},
                "days": {"type": "integer"},
                "units": {"type": "string", "enum": ["C", "F"]},
                "flags": {"type": "array", "items": {"type": "boolean"}},
                "nested": {
                    "type": "object",
                    "required": ["x"],
                    "properties": {"x": {"type": "number"}}
                }
            }
        }));

        assert_eq!(schema.kind.as_deref(), Some("OBJECT"));
        assert_eq!(schema.required.as_deref(), Some(&["location".to_owned()][..]));

        let properties = schema.properties.unwrap();
        assert_eq!(properties["location"].kind.as_deref(), Some("STRING"));
        assert_eq!(properties["location"].description.as_deref(), Some("city name"));
        assert_eq!(properties["days"].kind.as_deref(), Some("INTEGER"));
        assert_eq!(
            properties["units"].enum_values.as_deref(),
            Some(&["C".to_owned(), "F".to_owned()][..])
        );
        assert_eq!(
            properties["flags"].items.as_ref().unwrap().kind.as_deref(),
            Some("BOOLEAN")
        );
        let nested = &properties["nested"];
        assert_eq!(nested.kind.as_deref(), Some("OBJECT"));
        assert_eq!(nested.required.as_deref(), Some(&["x".to_owned()][..]));
    }

    #[test]
    fn schema_unknown_type_degrades_to_untyped() {
        let schema = encode_schema(&json!({
            "properties": {"weird": {"oneOf": [{"type": "string"}]}}
        }));
        assert!(schema.properties.unwrap()["weird"].kind.is_none());
    }

    #[test]
    fn decode_synthesizes_tool_call_id_from_name() {
        let response: wire::GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_weather", "args": {"location": "SF"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 3, "totalTokenCount": 8}
        }))
        .unwrap();

        let decoded = decode_response(response, "gemini-1.5-flash", "gemini");
        let calls = decoded.tool_calls().unwrap();
        assert_eq!(calls[0].id, "get_weather");
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(decoded.choices[0].finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(decoded.usage.unwrap().total_tokens, 8);
        assert!(decoded.id.is_empty());
    }

    #[test]
    fn decode_maps_safety_to_content_filter() {
        let response: wire::GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]
        }))
        .unwrap();

        let decoded = decode_response(response, "m", "gemini");
        assert_eq!(decoded.choices[0].finish_reason, Some(FinishReason::ContentFilter));
    }

    #[test]
    fn stream_emits_whole_function_calls() {
        let mut state = GenerateStreamState::new("gemini-1.5-flash");

        let chunk: wire::GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "checking "}]}}]
        }))
        .unwrap();
        let events = state.apply(&chunk);
        assert!(matches!(&events[0], Event::ContentDelta { text } if text == "checking "));

        let chunk: wire::GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"functionCall": {"name": "f", "args": {"x": 1}}}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        let events = state.apply(&chunk);
        let Event::ToolCallDelta { delta } = &events[0] else {
            panic!("expected tool call delta");
        };
        assert_eq!(delta.tool_calls[0].id, "f");
        assert_eq!(delta.tool_calls[0].function.arguments, "{\"x\":1}");

        let response = state.into_response("gemini");
        assert_eq!(response.text(), Some("checking "));
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::ToolCalls));
        assert!(response.usage.is_none());
    }
}
