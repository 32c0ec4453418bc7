//! Anthropic Messages API adapter

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::translate::anthropic::{MessagesRequest, MessagesResponse, build_request, parse_response};
use crate::view::ResponseView;

use super::{Backend, CallArgs, Operation, RemoteModel, completion_args, model_list, require_schema};

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Transport for the Messages API
#[async_trait]
pub trait MessagesApi: Send + Sync {
    async fn create_message(&self, request: &MessagesRequest) -> anyhow::Result<MessagesResponse>;
    async fn list_models(&self) -> anyhow::Result<Vec<RemoteModel>>;
}

/// reqwest-backed Messages API client
pub struct AnthropicHttpClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for AnthropicHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicHttpClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicHttpClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        if api_key.is_empty() {
            bail!("Anthropic API key is not set");
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MessagesApi for AnthropicHttpClient {
    async fn create_message(&self, request: &MessagesRequest) -> anyhow::Result<MessagesResponse> {
        let url = format!("{}/v1/messages", self.base_url);

        debug!(
            "Anthropic request: model={}, messages={}, tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Anthropic API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;

        debug!(
            "Anthropic response: blocks={}, stop_reason={:?}",
            api_response.content.len(),
            api_response.stop_reason
        );

        Ok(api_response)
    }

    async fn list_models(&self) -> anyhow::Result<Vec<RemoteModel>> {
        let url = format!("{}/v1/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .context("Failed to list Anthropic models")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Anthropic model listing failed with status {}", status);
        }

        let page: ModelPage = response
            .json()
            .await
            .context("Failed to parse Anthropic model listing")?;

        Ok(page
            .data
            .into_iter()
            .map(|m| RemoteModel {
                created: m
                    .created_at
                    .as_deref()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.timestamp())
                    .unwrap_or(0),
                id: m.id,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ModelPage {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    id: String,
    #[serde(default)]
    created_at: Option<String>,
}

/// Backend speaking the Anthropic dialect behind the canonical surface
pub struct AnthropicBackend {
    api: Arc<dyn MessagesApi>,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend").finish_non_exhaustive()
    }
}

impl AnthropicBackend {
    pub fn new(api: Arc<dyn MessagesApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, operation: Operation, args: CallArgs) -> Result<ResponseView> {
        match operation {
            Operation::CreateCompletion | Operation::ParseCompletion => {
                let request = completion_args(operation, args)?;
                if operation == Operation::ParseCompletion {
                    require_schema(&request)?;
                }
                let wire = build_request(&request)?;
                let response = self.api.create_message(&wire).await?;
                let schema = request.schema().map(|s| s.as_ref());
                parse_response(response, schema)?.into_view()
            }
            Operation::ListModels => {
                // A failed listing reads as "no models" rather than an error
                let models = match self.api.list_models().await {
                    Ok(models) => models,
                    Err(e) => {
                        warn!("Anthropic model listing failed: {:#}", e);
                        Vec::new()
                    }
                };
                model_list(models).into_view()
            }
        }
    }
}
