//! Provider adapters
//!
//! An adapter pairs a provider transport with a translator and implements
//! [`Backend`]: it declares which named operations it supports and answers
//! them with canonical responses. Adapters are composed into a
//! [`Registry`](crate::registry::Registry) and driven by the dispatcher.

pub mod anthropic;
pub mod capability;
#[cfg(test)]
pub(crate) mod mock;
pub mod openai;
pub mod openai_compat;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Result, UnifaiError};
use crate::types::{CompletionRequest, ModelEntry, ModelList};
use crate::view::ResponseView;

pub use capability::{CHAT_API, CallArgs, Capability, Operation};

/// A model as reported by a provider's listing endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteModel {
    pub id: String,
    /// Unix seconds, 0 when the provider does not say
    pub created: i64,
}

pub(crate) fn model_list(models: Vec<RemoteModel>) -> ModelList {
    ModelList::new(
        models
            .into_iter()
            .map(|m| ModelEntry::new(m.id, m.created))
            .collect(),
    )
}

/// Trait that every backend adapter implements
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic", "openai", "local")
    fn provider_name(&self) -> &str;

    /// Capability tree this backend answers
    fn capabilities(&self) -> &'static Capability {
        &CHAT_API
    }

    /// Run one operation
    async fn invoke(&self, operation: Operation, args: CallArgs) -> Result<ResponseView>;
}

/// The completion request an operation needs, or an argument error
pub(crate) fn completion_args(operation: Operation, args: CallArgs) -> Result<CompletionRequest> {
    match args {
        CallArgs::Completion(request) => Ok(request),
        CallArgs::None => Err(UnifaiError::InvalidArguments {
            operation: operation.name(),
            expected: "a completion request",
        }),
    }
}

/// `parse` only makes sense with a structured-output schema
pub(crate) fn require_schema(request: &CompletionRequest) -> Result<()> {
    if request.schema().is_none() {
        return Err(UnifaiError::Translation(
            "parse requires a structured-output schema in response_format".to_string(),
        ));
    }
    Ok(())
}

/// A live backend plus the model id to call it with
#[derive(Clone)]
pub struct BackendHandle {
    /// Model id passed on calls
    pub display_name: String,
    /// Configuration token this backend was built from
    pub category: String,
    pub client: Arc<dyn Backend>,
}

impl BackendHandle {
    pub fn new(
        display_name: impl Into<String>,
        category: impl Into<String>,
        client: Arc<dyn Backend>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            category: category.into(),
            client,
        }
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("display_name", &self.display_name)
            .field("category", &self.category)
            .field("provider", &self.client.provider_name())
            .finish()
    }
}
