//! unifai-core - one chat-completion interface over several LLM providers
//!
//! This crate provides:
//! - Canonical (OpenAI-shaped) request and response types
//! - Translators to and from the Anthropic Messages and OpenAI Chat Completions dialects
//! - Provider adapters over reqwest transports, plus a local OpenAI-compatible server
//! - A registry that builds backends from model identifiers
//! - A fallback dispatcher that tries backends in priority order
//! - A read-only view over normalized responses

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod providers;
pub mod registry;
pub mod schema;
pub mod translate;
pub mod types;
pub mod view;

// Re-export main types for convenience
pub use client::Client;
pub use dispatcher::{FallbackCall, FallbackPath, Resolution};
pub use error::{Result, UnifaiError};
pub use providers::{Backend, BackendHandle, CallArgs, Capability, Operation};
pub use registry::{
    BackendCategory, BackendFactory, DEFAULT_MODELS, HttpBackendFactory, ProviderSettings,
    Registry,
};
pub use schema::{RawSchema, SchemaDescriptor, TypedSchema, Validation};
pub use types::{
    ChatCompletion, ChatMessage, CompletionRequest, ModelList, ResponseFormat, Role, ToolCall,
    ToolChoice, ToolSpec, Usage,
};
pub use view::{Field, ResponseView};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::mem::size_of::<Client>();
        let _ = std::mem::size_of::<Registry>();
        let _ = std::mem::size_of::<ResponseView>();
        let _ = std::mem::size_of::<CompletionRequest>();
        assert_eq!(DEFAULT_MODELS, ["local", "gpt-4o-mini"]);
    }
}
