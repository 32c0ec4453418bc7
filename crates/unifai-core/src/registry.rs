//! Backend registry: builds one live backend per configured identifier

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::providers::anthropic::{AnthropicBackend, AnthropicHttpClient, DEFAULT_ANTHROPIC_BASE_URL};
use crate::providers::openai::{DEFAULT_OPENAI_BASE_URL, OpenAiBackend, OpenAiHttpClient};
use crate::providers::openai_compat::{
    DEFAULT_LOCAL_BASE_URL, FALLBACK_LOCAL_MODEL, connect_local,
};
use crate::providers::{Backend, BackendHandle};

/// Identifiers used when none are configured, in priority order
pub const DEFAULT_MODELS: [&str; 2] = ["local", "gpt-4o-mini"];
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|s| s.to_string()).collect()
}

/// Which adapter an identifier selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCategory {
    /// `claude*`
    Anthropic,
    /// The literal `local`
    Local,
    /// Anything else, taken as an OpenAI model id
    Cloud,
}

impl BackendCategory {
    pub fn of(identifier: &str) -> Self {
        if identifier.starts_with("claude") {
            Self::Anthropic
        } else if identifier == "local" {
            Self::Local
        } else {
            Self::Cloud
        }
    }
}

/// Builds a backend for one identifier, returning the model id to call it with
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn build(
        &self,
        category: BackendCategory,
        identifier: &str,
    ) -> anyhow::Result<(String, Arc<dyn Backend>)>;
}

/// Endpoints and credentials for the HTTP backends
#[derive(Clone)]
pub struct ProviderSettings {
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub local_base_url: String,
    pub local_fallback_model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ProviderSettings")
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("local_base_url", &self.local_base_url)
            .field("local_fallback_model", &self.local_fallback_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            local_base_url: DEFAULT_LOCAL_BASE_URL.to_string(),
            local_fallback_model: FALLBACK_LOCAL_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ProviderSettings {
    /// Defaults with API keys taken from `ANTHROPIC_API_KEY` / `OPENAI_API_KEY`
    pub fn from_env() -> Self {
        let read = |var: &str| std::env::var(var).ok().filter(|v| !v.is_empty());
        Self {
            anthropic_api_key: read("ANTHROPIC_API_KEY"),
            openai_api_key: read("OPENAI_API_KEY"),
            ..Self::default()
        }
    }
}

/// Factory producing reqwest-backed backends
#[derive(Debug, Clone, Default)]
pub struct HttpBackendFactory {
    settings: ProviderSettings,
}

impl HttpBackendFactory {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BackendFactory for HttpBackendFactory {
    async fn build(
        &self,
        category: BackendCategory,
        identifier: &str,
    ) -> anyhow::Result<(String, Arc<dyn Backend>)> {
        let s = &self.settings;
        match category {
            BackendCategory::Anthropic => {
                let client = AnthropicHttpClient::new(
                    s.anthropic_api_key.clone().unwrap_or_default(),
                    s.anthropic_base_url.clone(),
                    s.timeout,
                )?;
                let backend: Arc<dyn Backend> = Arc::new(AnthropicBackend::new(Arc::new(client)));
                Ok((identifier.to_string(), backend))
            }
            BackendCategory::Local => {
                let (model, backend) =
                    connect_local(&s.local_base_url, &s.local_fallback_model, s.timeout).await?;
                let backend: Arc<dyn Backend> = Arc::new(backend);
                Ok((model, backend))
            }
            BackendCategory::Cloud => {
                let client = OpenAiHttpClient::new(
                    s.openai_api_key.clone().unwrap_or_default(),
                    s.openai_base_url.clone(),
                    s.timeout,
                )?;
                let backend: Arc<dyn Backend> = Arc::new(OpenAiBackend::cloud(Arc::new(client)));
                Ok((identifier.to_string(), backend))
            }
        }
    }
}

/// Live backends in fallback priority order
#[derive(Debug, Clone, Default)]
pub struct Registry {
    backends: Vec<BackendHandle>,
}

impl Registry {
    /// Build a backend for each identifier in order.
    ///
    /// Identifiers whose construction fails are logged and left out, so the
    /// result may be shorter than the input, or empty.
    pub async fn initialize(identifiers: &[String], factory: &dyn BackendFactory) -> Self {
        let mut backends = Vec::with_capacity(identifiers.len());

        for identifier in identifiers {
            let category = BackendCategory::of(identifier);
            debug!("Initializing backend '{}' as {:?}", identifier, category);

            match factory.build(category, identifier).await {
                Ok((model, client)) => {
                    info!(
                        "Backend ready: {} ({}) via {}",
                        model,
                        identifier,
                        client.provider_name()
                    );
                    backends.push(BackendHandle::new(model, identifier.clone(), client));
                }
                Err(e) => {
                    warn!("Skipping backend '{}': {:#}", identifier, e);
                }
            }
        }

        if backends.is_empty() {
            warn!("No backends could be initialized");
        }

        Self { backends }
    }

    pub fn from_handles(backends: Vec<BackendHandle>) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &[BackendHandle] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
