//! Conversion between canonical types and the Anthropic Messages wire format

use serde_json::{Value, json};

use crate::protocol::anthropic as wire;
use crate::types::{
    Choice, ContentPart, Delta, Event, FinishReason, FunctionCall, Message, Request, Response, Role,
    Tool, ToolCall, ToolChoice, ToolChoiceMode, Usage,
};

use super::unix_now;

/// Default max tokens; this dialect requires the field on every request
const DEFAULT_MAX_TOKENS: u32 = 16_384;

/// Encode a canonical request into the messages wire format
///
/// System messages are concatenated (two-newline separator) into the
/// top-level system field and excluded from the message list. Tool-role
/// messages become user-role messages holding a tool-result block.
pub fn encode_request(request: &Request, model: &str, stream: bool) -> wire::MessageRequest {
    let mut system = String::new();
    let mut messages = Vec::new();

    for message in &request.messages {
        match message.role {
            Role::System => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&message.content);
            }
            Role::User => messages.push(encode_user(message)),
            Role::Assistant => messages.push(encode_assistant(message)),
            Role::Tool => messages.push(encode_tool_result(message)),
        }
    }

    wire::MessageRequest {
        model: model.to_owned(),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: if system.is_empty() { None } else { Some(system) },
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop.clone(),
        stream: stream.then_some(true),
        tools: request
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(encode_tool).collect()),
        tool_choice: request.tool_choice.as_ref().map(encode_tool_choice),
    }
}

fn encode_user(message: &Message) -> wire::MessageParam {
    let content = match &message.parts {
        Some(parts) => wire::MessageContent::Blocks(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => wire::ContentBlock::Text { text: text.clone() },
                    ContentPart::Image { media_type, data } => wire::ContentBlock::Image {
                        source: wire::ImageSource {
                            kind: "base64".to_owned(),
                            media_type: media_type.clone(),
                            data: data.clone(),
                        },
                    },
                })
                .collect(),
        ),
        None => wire::MessageContent::Text(message.content.clone()),
    };

    wire::MessageParam {
        role: "user".to_owned(),
        content,
    }
}

fn encode_assistant(message: &Message) -> wire::MessageParam {
    let Some(tool_calls) = &message.tool_calls else {
        return wire::MessageParam {
            role: "assistant".to_owned(),
            content: wire::MessageContent::Text(message.content.clone()),
        };
    };

    let mut blocks = Vec::new();
    if !message.content.is_empty() {
        blocks.push(wire::ContentBlock::Text {
            text: message.content.clone(),
        });
    }
    for call in tool_calls {
        let input = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
        blocks.push(wire::ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input,
        });
    }

    wire::MessageParam {
        role: "assistant".to_owned(),
        content: wire::MessageContent::Blocks(blocks),
    }
}

fn encode_tool_result(message: &Message) -> wire::MessageParam {
    wire::MessageParam {
        role: "user".to_owned(),
        content: wire::MessageContent::Blocks(vec![wire::ContentBlock::ToolResult {
            tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
            content: message.content.clone(),
        }]),
    }
}

fn encode_tool(tool: &Tool) -> wire::ToolParam {
    // The dialect requires a top-level object schema
    let input_schema = match tool.function.parameters.clone() {
        Some(Value::Object(mut map)) => {
            map.insert("type".to_owned(), json!("object"));
            Value::Object(map)
        }
        _ => json!({"type": "object"}),
    };

    wire::ToolParam {
        name: tool.function.name.clone(),
        description: tool.function.description.clone(),
        input_schema,
    }
}

/// Map the canonical tool-choice directive onto this dialect
///
/// There is no "none" mode here; it degrades to "auto", a documented
/// fidelity loss.
fn encode_tool_choice(choice: &ToolChoice) -> wire::ToolChoiceParam {
    match choice {
        ToolChoice::Mode(ToolChoiceMode::Auto | ToolChoiceMode::None) => wire::ToolChoiceParam {
            kind: "auto".to_owned(),
            name: None,
        },
        ToolChoice::Mode(ToolChoiceMode::Required) => wire::ToolChoiceParam {
            kind: "any".to_owned(),
            name: None,
        },
        ToolChoice::Function(named) => wire::ToolChoiceParam {
            kind: "tool".to_owned(),
            name: Some(named.function.name.clone()),
        },
    }
}

/// Decode a messages response into the canonical shape
pub fn decode_response(response: wire::MessageResponse, provider: &str) -> Response {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            wire::ResponseBlock::Text { text } => content.push_str(&text),
            wire::ResponseBlock::ToolUse { id, name, input } => {
                let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_owned());
                tool_calls.push(ToolCall {
                    id,
                    index: None,
                    function: FunctionCall { name, arguments },
                });
            }
        }
    }

    let finish_reason = decode_stop_reason(response.stop_reason.as_deref(), !tool_calls.is_empty());

    Response {
        id: response.id,
        object: "chat.completion".to_owned(),
        created: unix_now(),
        model: response.model,
        provider: provider.to_owned(),
        choices: vec![Choice {
            index: 0,
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
        }],
        usage: Some(decode_usage(response.usage)),
    }
}

fn decode_usage(usage: wire::UsageInfo) -> Usage {
    Usage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
    }
}

fn decode_stop_reason(stop_reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match stop_reason {
        Some("max_tokens") => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

/// Normalizes the explicit block-event stream into the canonical sequence
///
/// Tracks the current content block, announces tool calls when their block
/// opens (id and name are stable from that point), forwards argument JSON
/// fragments, finalizes calls on block stop, and sums usage across the
/// message-start and message-delta events.
#[derive(Debug, Default)]
pub struct MessagesStreamState {
    id: String,
    model: String,
    content: String,
    tool_calls: Vec<ToolCall>,
    current: Option<CurrentTool>,
    next_tool_index: u32,
    stop_reason: Option<String>,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    done: bool,
}

#[derive(Debug)]
struct CurrentTool {
    index: u32,
    id: String,
    name: String,
    arguments: String,
}

impl MessagesStreamState {
    /// Start assembling a stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the backend has signaled the end of the message
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fold one backend event into the state, returning the events to emit
    pub fn apply(&mut self, event: wire::StreamEvent) -> Vec<Event> {
        match event {
            wire::StreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                if let Some(usage) = message.usage {
                    if usage.input_tokens > 0 {
                        self.input_tokens = Some(usage.input_tokens);
                    }
                    if usage.output_tokens > 0 {
                        self.output_tokens = Some(usage.output_tokens);
                    }
                }
                Vec::new()
            }

            wire::StreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                wire::StartBlock::Text { text } => {
                    if text.is_empty() {
                        Vec::new()
                    } else {
                        self.content.push_str(&text);
                        vec![Event::ContentDelta { text }]
                    }
                }
                wire::StartBlock::ToolUse { id, name } => {
                    let index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.current = Some(CurrentTool {
                        index,
                        id: id.clone(),
                        name: name.clone(),
                        arguments: String::new(),
                    });
                    // Announce the call before any argument fragments
                    vec![Event::ToolCallDelta {
                        delta: Delta {
                            role: None,
                            content: None,
                            tool_calls: vec![ToolCall {
                                id,
                                index: Some(index),
                                function: FunctionCall {
                                    name,
                                    arguments: String::new(),
                                },
                            }],
                        },
                    }]
                }
            },

            wire::StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                wire::BlockDelta::TextDelta { text } => {
                    if text.is_empty() {
                        return Vec::new();
                    }
                    self.content.push_str(&text);
                    vec![Event::ContentDelta { text }]
                }
                wire::BlockDelta::InputJsonDelta { partial_json } => {
                    let Some(current) = &mut self.current else {
                        return Vec::new();
                    };
                    current.arguments.push_str(&partial_json);
                    vec![Event::ToolCallDelta {
                        delta: Delta {
                            role: None,
                            content: None,
                            tool_calls: vec![ToolCall {
                                id: current.id.clone(),
                                index: Some(current.index),
                                function: FunctionCall {
                                    name: current.name.clone(),
                                    arguments: partial_json,
                                },
                            }],
                        },
                    }]
                }
            },

            wire::StreamEvent::ContentBlockStop { .. } => {
                if let Some(current) = self.current.take() {
                    self.tool_calls.push(ToolCall {
                        id: current.id,
                        index: Some(current.index),
                        function: FunctionCall {
                            name: current.name,
                            arguments: current.arguments,
                        },
                    });
                }
                Vec::new()
            }

            wire::StreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                if let Some(usage) = usage
                    && usage.output_tokens > 0
                {
                    self.output_tokens = Some(usage.output_tokens);
                }
                Vec::new()
            }

            wire::StreamEvent::MessageStop => {
                self.done = true;
                Vec::new()
            }

            wire::StreamEvent::Ping => Vec::new(),

            wire::StreamEvent::Error { error } => {
                self.done = true;
                vec![Event::Error {
                    error: crate::error::ApiError {
                        provider: "anthropic".to_owned(),
                        status: None,
                        message: error.message,
                        kind: Some(error.kind),
                        cause: None,
                    }
                    .into(),
                }]
            }
        }
    }

    /// Assemble the final response for the `Done` event
    pub fn into_response(self, provider: &str) -> Response {
        let finish_reason = decode_stop_reason(self.stop_reason.as_deref(), !self.tool_calls.is_empty());

        let usage = if self.input_tokens.is_some() || self.output_tokens.is_some() {
            let prompt = self.input_tokens.unwrap_or(0);
            let completion = self.output_tokens.unwrap_or(0);
            Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            })
        } else {
            None
        };

        Response {
            id: self.id,
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
            usage,
        }
    }
}
