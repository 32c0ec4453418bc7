//! Request/response translation between the canonical shape and provider wire formats
//!
//! Each submodule owns one provider's wire types plus a `build_request` /
//! `parse_response` pair. The helpers here hold the rules every dialect shares:
//! system-prompt extraction, tool-choice resolution, structured output and
//! usage extraction.

pub mod anthropic;
pub mod openai;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, UnifaiError};
use crate::schema::{SchemaDescriptor, Validation};
use crate::types::{ChatMessage, CompletionRequest, Role, ToolChoice, Usage};

/// Name of the synthetic tool used to carry structured output
pub const STRUCTURED_TOOL_NAME: &str = "build_result";
pub const STRUCTURED_TOOL_DESCRIPTION: &str = "build the object";
/// Correlation id for tool results that arrive without one
pub const UNKNOWN_TOOL_CALL_ID: &str = "unknown";

/// Separate system messages from the rest.
///
/// System contents are joined with a blank line in message order;
/// `None` when there are none. Relative order of the other messages is kept.
pub fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
    let mut system = Vec::new();
    let mut rest = Vec::new();
    for message in messages {
        if message.role == Role::System {
            system.push(message.content.as_str());
        } else {
            rest.push(message);
        }
    }
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, rest)
}

/// Model id and message list are the two fields no provider can do without
pub(crate) fn require_fields(request: &CompletionRequest) -> Result<&str> {
    let model = request
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| UnifaiError::Translation("request has no model".to_string()))?;
    if request.messages.is_empty() {
        return Err(UnifaiError::Translation(
            "request has no messages".to_string(),
        ));
    }
    Ok(model)
}

/// Tool-choice policy after checking it against the tools actually sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ToolChoicePolicy {
    ProviderDefault,
    AnyTool,
    Named(String),
}

pub(crate) fn tool_choice_policy(
    choice: Option<&ToolChoice>,
    tool_names: &[&str],
) -> ToolChoicePolicy {
    match choice {
        None | Some(ToolChoice::Auto) => ToolChoicePolicy::ProviderDefault,
        Some(ToolChoice::Required) => ToolChoicePolicy::AnyTool,
        Some(ToolChoice::Function(name)) if tool_names.contains(&name.as_str()) => {
            ToolChoicePolicy::Named(name.clone())
        }
        Some(ToolChoice::Function(name)) => {
            debug!("Ignoring tool_choice for '{}': no such tool in request", name);
            ToolChoicePolicy::ProviderDefault
        }
    }
}

/// Turn the input of a structured reply into the `parsed` value
pub(crate) fn parse_structured(schema: &dyn SchemaDescriptor, input: Value) -> Result<Value> {
    match schema.validate(&input) {
        Validation::Unchecked => Ok(input),
        Validation::Valid(value) => Ok(value),
        Validation::Invalid(reason) => Err(UnifaiError::SchemaValidation(reason)),
    }
}

/// Anything that can report input and output token counts
pub trait TokenCounts {
    fn input_tokens(&self) -> Option<u64>;
    fn output_tokens(&self) -> Option<u64>;
}

impl TokenCounts for Value {
    fn input_tokens(&self) -> Option<u64> {
        self.get("input_tokens").and_then(Value::as_u64)
    }

    fn output_tokens(&self) -> Option<u64> {
        self.get("output_tokens").and_then(Value::as_u64)
    }
}

/// Canonical usage from provider token counts; absent counts are an error, never zero
pub fn extract_usage<U: TokenCounts + ?Sized>(usage: &U) -> Result<Usage> {
    let prompt = usage
        .input_tokens()
        .ok_or(UnifaiError::MissingUsage("input_tokens"))?;
    let completion = usage
        .output_tokens()
        .ok_or(UnifaiError::MissingUsage("output_tokens"))?;
    Ok(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawSchema;
    use serde_json::json;

    #[test]
    fn test_split_system_joins_in_order() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
            ChatMessage::system("answer in French"),
            ChatMessage::assistant("bonjour"),
        ];
        let (system, rest) = split_system(&messages);
        assert_eq!(system.as_deref(), Some("be brief\n\nanswer in French"));
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].role, Role::User);
        assert_eq!(rest[1].role, Role::Assistant);
    }

    #[test]
    fn test_split_system_none_without_system_messages() {
        let messages = vec![ChatMessage::user("hello")];
        let (system, rest) = split_system(&messages);
        assert!(system.is_none());
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_require_fields() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        assert!(matches!(require_fields(&req), Err(UnifaiError::Translation(_))));

        let req = CompletionRequest::new(vec![]).with_model("gpt-4o-mini");
        assert!(matches!(require_fields(&req), Err(UnifaiError::Translation(_))));

        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]).with_model("gpt-4o-mini");
        assert_eq!(require_fields(&req).unwrap(), "gpt-4o-mini");
    }

    #[test]
    fn test_tool_choice_policy() {
        let names = ["search", "fetch"];
        assert_eq!(tool_choice_policy(None, &names), ToolChoicePolicy::ProviderDefault);
        assert_eq!(
            tool_choice_policy(Some(&ToolChoice::Auto), &names),
            ToolChoicePolicy::ProviderDefault
        );
        assert_eq!(
            tool_choice_policy(Some(&ToolChoice::Required), &names),
            ToolChoicePolicy::AnyTool
        );
        assert_eq!(
            tool_choice_policy(Some(&ToolChoice::Function("fetch".into())), &names),
            ToolChoicePolicy::Named("fetch".to_string())
        );
        assert_eq!(
            tool_choice_policy(Some(&ToolChoice::Function("X".into())), &names),
            ToolChoicePolicy::ProviderDefault
        );
    }

    #[test]
    fn test_extract_usage() {
        let usage = extract_usage(&json!({"input_tokens": 10, "output_tokens": 5})).unwrap();
        assert_eq!(
            usage,
            Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15
            }
        );
    }

    #[test]
    fn test_extract_usage_missing_output_fails() {
        let err = extract_usage(&json!({"input_tokens": 10})).unwrap_err();
        assert!(matches!(err, UnifaiError::MissingUsage("output_tokens")));
    }

    #[test]
    fn test_parse_structured_unchecked_passes_input() {
        let schema = RawSchema(json!({"type": "object"}));
        let parsed = parse_structured(&schema, json!({"a": 1})).unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }
}
