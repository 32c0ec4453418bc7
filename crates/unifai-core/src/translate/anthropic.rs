//! Anthropic Messages API dialect

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, UnifaiError};
use crate::schema::SchemaDescriptor;
use crate::types::{
    AssistantMessage, ChatCompletion, ChatMessage, CompletionRequest, ResponseFormat, Role,
    ToolCall,
};

use super::{
    STRUCTURED_TOOL_DESCRIPTION, STRUCTURED_TOOL_NAME, TokenCounts, ToolChoicePolicy,
    UNKNOWN_TOOL_CALL_ID, extract_usage, parse_structured, require_fields, split_system,
    tool_choice_policy,
};

// ── Anthropic wire types ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AnthropicTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<AnthropicToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: AnthropicContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block kinds this crate does not translate (thinking, citations, ...)
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicToolChoice {
    Auto,
    Any,
    Tool { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<AnthropicBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

impl TokenCounts for AnthropicUsage {
    fn input_tokens(&self) -> Option<u64> {
        self.input_tokens
    }

    fn output_tokens(&self) -> Option<u64> {
        self.output_tokens
    }
}

/// Build a Messages API request from a canonical request.
///
/// Consecutive `tool` messages become one user turn holding several
/// `tool_result` blocks, which is how Anthropic expects parallel results.
pub fn build_request(request: &CompletionRequest) -> Result<MessagesRequest> {
    let model = require_fields(request)?;
    let (system, rest) = split_system(&request.messages);

    let mut messages: Vec<AnthropicMessage> = Vec::with_capacity(rest.len());
    for message in rest {
        let converted = to_anthropic_message(message)?;
        if message.role == Role::Tool {
            if let Some(prev) = messages.last_mut().filter(|m| is_tool_result_turn(m)) {
                if let (AnthropicContent::Blocks(prev_blocks), AnthropicContent::Blocks(blocks)) =
                    (&mut prev.content, &converted.content)
                {
                    prev_blocks.extend(blocks.iter().cloned());
                    continue;
                }
            }
        }
        messages.push(converted);
    }

    let mut tools: Vec<AnthropicTool> = request
        .tools
        .iter()
        .filter(|t| t.is_function())
        .map(|t| AnthropicTool {
            name: t.function.name.clone(),
            description: t.function.description.clone(),
            input_schema: t.function.parameters.clone(),
        })
        .collect();

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    let mut tool_choice = match tool_choice_policy(request.tool_choice.as_ref(), &names) {
        ToolChoicePolicy::ProviderDefault => None,
        ToolChoicePolicy::AnyTool => Some(AnthropicToolChoice::Any),
        ToolChoicePolicy::Named(name) => Some(AnthropicToolChoice::Tool { name }),
    };

    let mut response_format = None;
    match &request.response_format {
        None => {}
        Some(ResponseFormat::JsonObject) => {
            response_format = Some(serde_json::json!({"type": "json_object"}));
        }
        Some(ResponseFormat::Schema(schema)) => {
            tools.push(AnthropicTool {
                name: STRUCTURED_TOOL_NAME.to_string(),
                description: STRUCTURED_TOOL_DESCRIPTION.to_string(),
                input_schema: schema.to_json_schema(),
            });
            tool_choice = Some(AnthropicToolChoice::Tool {
                name: STRUCTURED_TOOL_NAME.to_string(),
            });
        }
    }

    Ok(MessagesRequest {
        model: model.to_string(),
        system,
        messages,
        max_tokens: request.max_tokens_or_default(),
        temperature: request.temperature_or_default(),
        tools,
        tool_choice,
        response_format,
    })
}

fn is_tool_result_turn(message: &AnthropicMessage) -> bool {
    match &message.content {
        AnthropicContent::Blocks(blocks) => {
            !blocks.is_empty()
                && blocks
                    .iter()
                    .all(|b| matches!(b, AnthropicBlock::ToolResult { .. }))
        }
        AnthropicContent::Text(_) => false,
    }
}

fn to_anthropic_message(message: &ChatMessage) -> Result<AnthropicMessage> {
    let (role, content) = match message.role {
        Role::Tool => (
            "user",
            AnthropicContent::Blocks(vec![AnthropicBlock::ToolResult {
                tool_use_id: message
                    .tool_call_id
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_TOOL_CALL_ID.to_string()),
                content: message.content.clone(),
            }]),
        ),
        Role::Assistant => match &message.tool_calls {
            Some(calls) if !calls.is_empty() => {
                let mut blocks = Vec::with_capacity(calls.len() + 1);
                if !message.content.is_empty() {
                    blocks.push(AnthropicBlock::Text {
                        text: message.content.clone(),
                    });
                }
                for call in calls {
                    blocks.push(tool_use_block(call)?);
                }
                ("assistant", AnthropicContent::Blocks(blocks))
            }
            _ => (
                "assistant",
                AnthropicContent::Text(message.content.clone()),
            ),
        },
        Role::User | Role::System => ("user", AnthropicContent::Text(message.content.clone())),
    };
    Ok(AnthropicMessage {
        role: role.to_string(),
        content,
    })
}

fn tool_use_block(call: &ToolCall) -> Result<AnthropicBlock> {
    let input: Value = if call.function.arguments.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(&call.function.arguments).map_err(|e| {
            UnifaiError::UnsupportedByProvider {
                provider: "anthropic",
                reason: format!("tool call '{}' has non-JSON arguments: {}", call.id, e),
            }
        })?
    };
    Ok(AnthropicBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input,
    })
}

/// Convert a Messages API response to the canonical shape.
///
/// `structured` is the schema the request asked for, if any; the reply is
/// then expected to carry a `build_result` tool call.
pub fn parse_response(
    response: MessagesResponse,
    structured: Option<&dyn SchemaDescriptor>,
) -> Result<ChatCompletion> {
    let usage = extract_usage(&response.usage)?;

    let message = match structured {
        Some(schema) => {
            let input = response
                .content
                .iter()
                .find_map(|b| match b {
                    AnthropicBlock::ToolUse { name, input, .. } if name == STRUCTURED_TOOL_NAME => {
                        Some(input.clone())
                    }
                    _ => None,
                })
                .ok_or_else(|| {
                    UnifaiError::MalformedResponse(format!(
                        "structured reply has no '{}' tool call",
                        STRUCTURED_TOOL_NAME
                    ))
                })?;
            AssistantMessage {
                parsed: Some(parse_structured(schema, input)?),
                ..AssistantMessage::text("")
            }
        }
        None => {
            let tool_calls: Vec<ToolCall> = response
                .content
                .iter()
                .filter_map(|b| match b {
                    AnthropicBlock::ToolUse { id, name, input } => {
                        Some(ToolCall::function(id.clone(), name.clone(), input))
                    }
                    _ => None,
                })
                .collect();
            if tool_calls.is_empty() {
                let text = response
                    .content
                    .iter()
                    .find_map(|b| match b {
                        AnthropicBlock::Text { text } => Some(text.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                AssistantMessage::text(text)
            } else {
                AssistantMessage {
                    tool_calls: Some(tool_calls),
                    ..AssistantMessage::text("")
                }
            }
        }
    };

    Ok(ChatCompletion::new(
        response.id,
        response.model,
        message,
        response.stop_reason,
        usage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawSchema, TypedSchema};
    use crate::types::{ToolChoice, ToolSpec};
    use serde_json::json;

    fn request(messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest::new(messages).with_model("claude-3-haiku-20240307")
    }

    fn search_tool() -> ToolSpec {
        ToolSpec::function(
            "search",
            "Search the web",
            json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        )
    }

    fn response(content: Vec<AnthropicBlock>, stop_reason: &str) -> MessagesResponse {
        MessagesResponse {
            id: "msg_1".to_string(),
            model: "claude-3-haiku-20240307".to_string(),
            content,
            stop_reason: Some(stop_reason.to_string()),
            usage: AnthropicUsage {
                input_tokens: Some(10),
                output_tokens: Some(5),
            },
        }
    }

    #[test]
    fn test_system_messages_move_to_system_field() {
        let req = request(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
            ChatMessage::system("no emoji"),
        ]);
        let native = build_request(&req).unwrap();
        assert_eq!(native.system.as_deref(), Some("be brief\n\nno emoji"));
        assert_eq!(native.messages.len(), 1);
        assert!(native.messages.iter().all(|m| m.role != "system"));
    }

    #[test]
    fn test_system_field_omitted_when_empty() {
        let native = build_request(&request(vec![ChatMessage::user("hello")])).unwrap();
        assert!(native.system.is_none());
        let body = serde_json::to_value(&native).unwrap();
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_missing_model_is_translation_error() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hello")]);
        assert!(matches!(build_request(&req), Err(UnifaiError::Translation(_))));
    }

    #[test]
    fn test_tool_messages_become_tool_results() {
        let req = request(vec![
            ChatMessage::user("what's the weather"),
            ChatMessage::assistant_tool_calls(
                "",
                vec![
                    ToolCall::function("tu_1", "weather", &json!({"city": "Oslo"})),
                    ToolCall::function("tu_2", "weather", &json!({"city": "Rome"})),
                ],
            ),
            ChatMessage::tool("tu_1", "-3C"),
            ChatMessage {
                tool_call_id: None,
                ..ChatMessage::tool("", "21C")
            },
        ]);
        let native = build_request(&req).unwrap();
        assert_eq!(native.messages.len(), 3);
        assert_eq!(native.messages[1].role, "assistant");
        assert_eq!(native.messages[2].role, "user");
        match &native.messages[2].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(
                    blocks,
                    &vec![
                        AnthropicBlock::ToolResult {
                            tool_use_id: "tu_1".to_string(),
                            content: "-3C".to_string(),
                        },
                        AnthropicBlock::ToolResult {
                            tool_use_id: UNKNOWN_TOOL_CALL_ID.to_string(),
                            content: "21C".to_string(),
                        },
                    ]
                );
            }
            other => panic!("expected blocks, got {:?}", other),
        }
    }

    #[test]
    fn test_assistant_tool_call_with_bad_arguments_is_unsupported() {
        let mut call = ToolCall::function("tu_1", "weather", &json!({}));
        call.function.arguments = "{not json".to_string();
        let req = request(vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant_tool_calls("", vec![call]),
        ]);
        let err = build_request(&req).unwrap_err();
        assert!(matches!(
            err,
            UnifaiError::UnsupportedByProvider {
                provider: "anthropic",
                ..
            }
        ));
        assert!(err.is_fallback_trigger());
    }

    #[test]
    fn test_tool_choice_required_maps_to_any() {
        let req = request(vec![ChatMessage::user("hi")])
            .with_tools(vec![search_tool()])
            .with_tool_choice(ToolChoice::Required);
        let native = build_request(&req).unwrap();
        assert_eq!(native.tool_choice, Some(AnthropicToolChoice::Any));
        let body = serde_json::to_value(&native).unwrap();
        assert_eq!(body["tool_choice"], json!({"type": "any"}));
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_tool_choice_named_tool() {
        let req = request(vec![ChatMessage::user("hi")])
            .with_tools(vec![search_tool()])
            .with_tool_choice(ToolChoice::Function("search".into()));
        let body = serde_json::to_value(build_request(&req).unwrap()).unwrap();
        assert_eq!(body["tool_choice"], json!({"type": "tool", "name": "search"}));
    }

    #[test]
    fn test_tool_choice_for_unknown_tool_is_ignored() {
        let req = request(vec![ChatMessage::user("hi")])
            .with_tools(vec![search_tool()])
            .with_tool_choice(ToolChoice::Function("X".into()));
        let native = build_request(&req).unwrap();
        assert!(native.tool_choice.is_none());
        assert_eq!(native.tools.len(), 1);
    }

    #[test]
    fn test_json_object_format() {
        let req = request(vec![ChatMessage::user("hi")])
            .with_response_format(ResponseFormat::JsonObject);
        let native = build_request(&req).unwrap();
        assert_eq!(native.response_format, Some(json!({"type": "json_object"})));
        assert!(native.tools.is_empty());
    }

    #[test]
    fn test_schema_becomes_forced_build_result_tool() {
        let schema = json!({"type": "object", "properties": {"answer": {"type": "string"}}});
        let req = request(vec![ChatMessage::user("hi")]).with_schema(RawSchema(schema.clone()));
        let native = build_request(&req).unwrap();
        assert_eq!(native.tools.len(), 1);
        assert_eq!(native.tools[0].name, STRUCTURED_TOOL_NAME);
        assert_eq!(native.tools[0].input_schema, schema);
        assert_eq!(
            native.tool_choice,
            Some(AnthropicToolChoice::Tool {
                name: STRUCTURED_TOOL_NAME.to_string()
            })
        );
    }

    #[test]
    fn test_derived_schema_reaches_build_result_tool() {
        #[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
        struct Forecast {
            city: String,
            high: i32,
        }
        let schema = TypedSchema::<Forecast>::derived();
        let expected = schema.to_json_schema();
        let req = request(vec![ChatMessage::user("forecast for Oslo")]).with_schema(schema);

        let native = build_request(&req).unwrap();

        assert_eq!(native.tools[0].name, STRUCTURED_TOOL_NAME);
        assert_eq!(native.tools[0].input_schema, expected);
        assert_eq!(
            native.tools[0].input_schema["properties"]["high"]["type"],
            "integer"
        );
    }

    #[test]
    fn test_parse_text_response() {
        let resp = response(
            vec![
                AnthropicBlock::Text {
                    text: "Hello!".to_string(),
                },
                AnthropicBlock::Text {
                    text: "ignored".to_string(),
                },
            ],
            "end_turn",
        );
        let completion = parse_response(resp, None).unwrap();
        let message = &completion.choices[0].message;
        assert_eq!(message.content, "Hello!");
        assert!(message.tool_calls.is_none());
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(completion.usage.total_tokens, 15);
        assert_eq!(completion.id, "msg_1");
    }

    #[test]
    fn test_parse_tool_use_response() {
        let resp = response(
            vec![
                AnthropicBlock::Text {
                    text: "Let me check.".to_string(),
                },
                AnthropicBlock::ToolUse {
                    id: "tu_1".to_string(),
                    name: "weather".to_string(),
                    input: json!({"city": "Oslo"}),
                },
                AnthropicBlock::ToolUse {
                    id: "tu_2".to_string(),
                    name: "weather".to_string(),
                    input: json!({"city": "Rome", "units": ["C"]}),
                },
            ],
            "tool_use",
        );
        let completion = parse_response(resp, None).unwrap();
        let message = &completion.choices[0].message;
        assert_eq!(message.content, "");
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].id, "tu_2");
        assert_eq!(calls[1].kind, "function");
        let args: Value = serde_json::from_str(&calls[1].function.arguments).unwrap();
        assert_eq!(args, json!({"city": "Rome", "units": ["C"]}));
    }

    #[test]
    fn test_parse_structured_response_validates() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Answer {
            answer: String,
        }
        let schema = TypedSchema::<Answer>::new(json!({"type": "object"}));
        let resp = response(
            vec![AnthropicBlock::ToolUse {
                id: "tu_1".to_string(),
                name: STRUCTURED_TOOL_NAME.to_string(),
                input: json!({"answer": "42", "noise": 1}),
            }],
            "tool_use",
        );
        let completion = parse_response(resp, Some(&schema)).unwrap();
        assert_eq!(
            completion.choices[0].message.parsed,
            Some(json!({"answer": "42"}))
        );

        let bad = response(
            vec![AnthropicBlock::ToolUse {
                id: "tu_1".to_string(),
                name: STRUCTURED_TOOL_NAME.to_string(),
                input: json!({"wrong": true}),
            }],
            "tool_use",
        );
        assert!(matches!(
            parse_response(bad, Some(&schema)),
            Err(UnifaiError::SchemaValidation(_))
        ));
    }

    #[test]
    fn test_parse_structured_without_validator_keeps_raw_input() {
        let schema = RawSchema(json!({"type": "object"}));
        let resp = response(
            vec![AnthropicBlock::ToolUse {
                id: "tu_1".to_string(),
                name: STRUCTURED_TOOL_NAME.to_string(),
                input: json!({"free": "form"}),
            }],
            "tool_use",
        );
        let completion = parse_response(resp, Some(&schema)).unwrap();
        assert_eq!(completion.choices[0].message.parsed, Some(json!({"free": "form"})));
    }

    #[test]
    fn test_parse_structured_without_tool_call_is_malformed() {
        let schema = RawSchema(json!({"type": "object"}));
        let resp = response(
            vec![AnthropicBlock::Text {
                text: "no".to_string(),
            }],
            "end_turn",
        );
        assert!(matches!(
            parse_response(resp, Some(&schema)),
            Err(UnifaiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_missing_usage_is_an_error() {
        let resp: MessagesResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "model": "claude-3-haiku-20240307",
            "content": [{"type": "text", "text": "hi"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 4}
        }))
        .unwrap();
        assert!(matches!(
            parse_response(resp, None),
            Err(UnifaiError::MissingUsage("output_tokens"))
        ));
    }

    #[test]
    fn test_unknown_blocks_deserialize() {
        let resp: MessagesResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "model": "claude-3-haiku-20240307",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "done"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 4, "output_tokens": 1}
        }))
        .unwrap();
        let completion = parse_response(resp, None).unwrap();
        assert_eq!(completion.choices[0].message.content, "done");
    }
}
