//! OpenAI Chat Completions dialect (also spoken by local OpenAI-compatible servers)

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Result, UnifaiError};
use crate::schema::SchemaDescriptor;
use crate::types::{
    AssistantMessage, ChatCompletion, ChatMessage, CompletionRequest, ResponseFormat, Role,
    ToolCall, ToolSpec,
};

use super::{
    STRUCTURED_TOOL_DESCRIPTION, STRUCTURED_TOOL_NAME, TokenCounts, ToolChoicePolicy,
    UNKNOWN_TOOL_CALL_ID, extract_usage, parse_structured, require_fields, split_system,
    tool_choice_policy,
};

/// How a server is asked for schema-constrained output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    /// `response_format: {"type": "json_schema", ..}`
    Native,
    /// A forced `build_result` tool call
    SyntheticTool,
}

/// A Chat Completions request.
///
/// The system prompt is kept apart from `messages` and only rendered as the
/// leading `system` message by [`ChatCompletionsRequest::to_body`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<OpenAiMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: Option<Value>,
    pub response_format: Option<Value>,
}

impl ChatCompletionsRequest {
    /// JSON body for `POST /chat/completions`
    pub fn to_body(&self) -> Result<Value> {
        let mut wire = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system {
            wire.push(OpenAiMessage {
                role: Role::System.to_string(),
                content: Some(system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        wire.extend(self.messages.iter().cloned());

        let mut body = json!({
            "model": self.model,
            "messages": wire,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        if !self.tools.is_empty() {
            body["tools"] = serde_json::to_value(&self.tools)
                .map_err(|e| UnifaiError::Translation(e.to_string()))?;
        }
        if let Some(tool_choice) = &self.tool_choice {
            body["tool_choice"] = tool_choice.clone();
        }
        if let Some(response_format) = &self.response_format {
            body["response_format"] = response_format.clone();
        }
        Ok(body)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionsResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiChoice {
    #[serde(default)]
    pub index: u32,
    pub message: OpenAiChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
}

impl TokenCounts for OpenAiUsage {
    fn input_tokens(&self) -> Option<u64> {
        self.prompt_tokens
    }

    fn output_tokens(&self) -> Option<u64> {
        self.completion_tokens
    }
}

/// Build a Chat Completions request from a canonical request
pub fn build_request(
    request: &CompletionRequest,
    schema_mode: SchemaMode,
) -> Result<ChatCompletionsRequest> {
    let model = require_fields(request)?;
    let (system, rest) = split_system(&request.messages);
    let messages: Vec<OpenAiMessage> = rest.into_iter().map(to_openai_message).collect();

    let mut tools: Vec<ToolSpec> = request
        .tools
        .iter()
        .filter(|t| t.is_function())
        .cloned()
        .collect();

    let names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();
    let mut tool_choice = match tool_choice_policy(request.tool_choice.as_ref(), &names) {
        ToolChoicePolicy::ProviderDefault => None,
        ToolChoicePolicy::AnyTool => Some(json!("required")),
        ToolChoicePolicy::Named(name) => Some(named_tool_choice(&name)),
    };

    let mut response_format = None;
    match (&request.response_format, schema_mode) {
        (None, _) => {}
        (Some(ResponseFormat::JsonObject), _) => {
            response_format = Some(json!({"type": "json_object"}));
        }
        (Some(ResponseFormat::Schema(schema)), SchemaMode::Native) => {
            response_format = Some(json!({
                "type": "json_schema",
                "json_schema": {
                    "name": STRUCTURED_TOOL_NAME,
                    "schema": schema.to_json_schema(),
                }
            }));
        }
        (Some(ResponseFormat::Schema(schema)), SchemaMode::SyntheticTool) => {
            tools.push(ToolSpec::function(
                STRUCTURED_TOOL_NAME,
                STRUCTURED_TOOL_DESCRIPTION,
                schema.to_json_schema(),
            ));
            tool_choice = Some(named_tool_choice(STRUCTURED_TOOL_NAME));
        }
    }

    Ok(ChatCompletionsRequest {
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

fn named_tool_choice(name: &str) -> Value {
    json!({"type": "function", "function": {"name": name}})
}

fn to_openai_message(message: &ChatMessage) -> OpenAiMessage {
    match message.role {
        Role::Tool => OpenAiMessage {
            role: Role::Tool.to_string(),
            content: Some(message.content.clone()),
            tool_calls: None,
            tool_call_id: Some(
                message
                    .tool_call_id
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_TOOL_CALL_ID.to_string()),
            ),
        },
        Role::Assistant => {
            let tool_calls = message.tool_calls.clone().filter(|c| !c.is_empty());
            let content = if message.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(message.content.clone())
            };
            OpenAiMessage {
                role: Role::Assistant.to_string(),
                content,
                tool_calls,
                tool_call_id: None,
            }
        }
        Role::User | Role::System => OpenAiMessage {
            role: message.role.to_string(),
            content: Some(message.content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
    }
}

/// Convert a Chat Completions response to the canonical shape.
///
/// `structured` carries the requested schema and how it was requested, so the
/// structured value is read from the right place.
pub fn parse_response(
    response: ChatCompletionsResponse,
    structured: Option<(&dyn SchemaDescriptor, SchemaMode)>,
) -> Result<ChatCompletion> {
    let usage = extract_usage(&response.usage.unwrap_or_default())?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| UnifaiError::MalformedResponse("response had no choices".to_string()))?;

    let tool_calls = choice.message.tool_calls.filter(|c| !c.is_empty());
    let message = match structured {
        Some((schema, SchemaMode::Native)) => {
            let content = choice.message.content.unwrap_or_default();
            let input: Value = serde_json::from_str(&content).map_err(|e| {
                UnifaiError::SchemaValidation(format!("reply is not JSON: {}", e))
            })?;
            AssistantMessage {
                parsed: Some(parse_structured(schema, input)?),
                ..AssistantMessage::text(content)
            }
        }
        Some((schema, SchemaMode::SyntheticTool)) => {
            let call = tool_calls
                .iter()
                .flatten()
                .find(|c| c.function.name == STRUCTURED_TOOL_NAME)
                .ok_or_else(|| {
                    UnifaiError::MalformedResponse(format!(
                        "structured reply has no '{}' tool call",
                        STRUCTURED_TOOL_NAME
                    ))
                })?;
            let input: Value = serde_json::from_str(&call.function.arguments).map_err(|e| {
                UnifaiError::SchemaValidation(format!("tool arguments are not JSON: {}", e))
            })?;
            AssistantMessage {
                parsed: Some(parse_structured(schema, input)?),
                ..AssistantMessage::text("")
            }
        }
        None => match tool_calls {
            Some(calls) => AssistantMessage {
                tool_calls: Some(calls),
                ..AssistantMessage::text("")
            },
            None => AssistantMessage::text(choice.message.content.unwrap_or_default()),
        },
    };

    let mut completion = ChatCompletion::new(
        response.id,
        response.model,
        message,
        choice.finish_reason,
        usage,
    );
    if let Some(first) = completion.choices.first_mut() {
        first.index = choice.index;
    }
    Ok(completion)
}
