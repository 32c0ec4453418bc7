//! OpenAI Chat Completions adapter

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::translate::openai::{
    ChatCompletionsRequest, ChatCompletionsResponse, SchemaMode, build_request, parse_response,
};
use crate::view::ResponseView;

use super::{Backend, CallArgs, Operation, RemoteModel, completion_args, model_list, require_schema};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Transport for the Chat Completions API
#[async_trait]
pub trait ChatCompletionsApi: Send + Sync {
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionsRequest,
    ) -> anyhow::Result<ChatCompletionsResponse>;
    async fn list_models(&self) -> anyhow::Result<Vec<RemoteModel>>;
}

/// reqwest-backed Chat Completions client.
///
/// `base_url` is the API root including the version segment, e.g.
/// `https://api.openai.com/v1` or `http://localhost:8000/v1`.
pub struct OpenAiHttpClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiHttpClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiHttpClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        if api_key.is_empty() {
            bail!("OpenAI API key is not set");
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatCompletionsApi for OpenAiHttpClient {
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionsRequest,
    ) -> anyhow::Result<ChatCompletionsResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = request.to_body()?;

        debug!(
            "OpenAI request: model={}, messages={}, tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "OpenAI API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: ChatCompletionsResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI API response")?;

        debug!(
            "OpenAI response: choices={}, finish_reason={:?}",
            api_response.choices.len(),
            api_response
                .choices
                .first()
                .and_then(|c| c.finish_reason.as_deref())
        );

        Ok(api_response)
    }

    async fn list_models(&self) -> anyhow::Result<Vec<RemoteModel>> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .context("Failed to list models")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Model listing at {} failed with status {}", url, status);
        }

        let page: ModelPage = response
            .json()
            .await
            .context("Failed to parse model listing")?;

        Ok(page
            .data
            .into_iter()
            .map(|m| RemoteModel {
                id: m.id,
                created: m.created.unwrap_or(0),
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
    created: Option<i64>,
}

/// Backend speaking the Chat Completions dialect.
///
/// Used for the OpenAI cloud and, with a different name and schema mode,
/// for self-hosted OpenAI-compatible servers.
pub struct OpenAiBackend {
    api: Arc<dyn ChatCompletionsApi>,
    name: String,
    schema_mode: SchemaMode,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("name", &self.name)
            .field("schema_mode", &self.schema_mode)
            .finish()
    }
}

impl OpenAiBackend {
    /// The OpenAI cloud: structured output through native `json_schema`
    pub fn cloud(api: Arc<dyn ChatCompletionsApi>) -> Self {
        Self {
            api,
            name: "openai".to_string(),
            schema_mode: SchemaMode::Native,
        }
    }

    /// An OpenAI-compatible server: structured output through a forced tool call
    pub fn compatible(name: impl Into<String>, api: Arc<dyn ChatCompletionsApi>) -> Self {
        Self {
            api,
            name: name.into(),
            schema_mode: SchemaMode::SyntheticTool,
        }
    }

    pub fn schema_mode(&self) -> SchemaMode {
        self.schema_mode
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, operation: Operation, args: CallArgs) -> Result<ResponseView> {
        match operation {
            Operation::CreateCompletion | Operation::ParseCompletion => {
                let request = completion_args(operation, args)?;
                if operation == Operation::ParseCompletion {
                    require_schema(&request)?;
                }
                let wire = build_request(&request, self.schema_mode)?;
                let response = self.api.create_chat_completion(&wire).await?;
                let structured = request.schema().map(|s| (s.as_ref(), self.schema_mode));
                parse_response(response, structured)?.into_view()
            }
            Operation::ListModels => {
                let models = self.api.list_models().await?;
                model_list(models).into_view()
            }
        }
    }
}
