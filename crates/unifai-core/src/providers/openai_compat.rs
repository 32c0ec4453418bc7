//! Self-hosted OpenAI-compatible servers (vLLM, llama.cpp, Ollama, LM Studio, etc.)
//!
//! Reuses the Chat Completions adapter with a local base URL and a
//! placeholder key. The model to call is whatever the server lists first.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::openai::{ChatCompletionsApi, OpenAiBackend, OpenAiHttpClient};

pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:8000/v1";
/// Model id used when the server lists nothing
pub const FALLBACK_LOCAL_MODEL: &str = "gpt-3.5-turbo";
/// Local servers ignore the key but the client insists on one
pub const LOCAL_API_KEY: &str = "EMPTY";

/// First model the server lists, or `fallback` when listing fails or is empty
pub async fn discover_default_model(api: &dyn ChatCompletionsApi, fallback: &str) -> String {
    match api.list_models().await {
        Ok(models) => match models.into_iter().next() {
            Some(model) => {
                debug!("Local server default model: {}", model.id);
                model.id
            }
            None => {
                debug!("Local server lists no models, using {}", fallback);
                fallback.to_string()
            }
        },
        Err(e) => {
            warn!("Could not list local models, using {}: {:#}", fallback, e);
            fallback.to_string()
        }
    }
}

/// Build the local backend and resolve the model id to call it with
pub async fn connect_local(
    base_url: &str,
    fallback_model: &str,
    timeout: Duration,
) -> anyhow::Result<(String, OpenAiBackend)> {
    let api: Arc<dyn ChatCompletionsApi> = Arc::new(OpenAiHttpClient::new(
        LOCAL_API_KEY.to_string(),
        base_url.to_string(),
        timeout,
    )?);
    let model = discover_default_model(api.as_ref(), fallback_model).await;
    Ok((model, OpenAiBackend::compatible("local", api)))
}
