//! Unified client over a prioritized list of backends

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::dispatcher::{FallbackCall, FallbackPath, Resolution};
use crate::error::{Result, UnifaiError};
use crate::providers::{CallArgs, Operation};
use crate::registry::{BackendFactory, HttpBackendFactory, ProviderSettings, Registry, default_models};
use crate::types::{ChatMessage, CompletionRequest};
use crate::view::ResponseView;

const CREATE_PATH: &str = "chat.completions.create";
const PARSE_PATH: &str = "beta.chat.completions.parse";
const LIST_PATH: &str = "models.list";

/// Chat-completion client that falls back across backends.
///
/// Backends are built from the identifiers on first use and shared
/// read-only afterwards.
pub struct Client {
    identifiers: Vec<String>,
    factory: Option<Arc<dyn BackendFactory>>,
    registry: OnceCell<Registry>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("identifiers", &self.identifiers)
            .field("initialized", &self.registry.initialized())
            .finish()
    }
}

impl Client {
    /// Client over `identifiers`; an empty list means the default models
    pub fn new(identifiers: Vec<String>, factory: Arc<dyn BackendFactory>) -> Self {
        let identifiers = if identifiers.is_empty() {
            default_models()
        } else {
            identifiers
        };
        Self {
            identifiers,
            factory: Some(factory),
            registry: OnceCell::new(),
        }
    }

    /// Client over `identifiers` with HTTP backends configured by `settings`
    pub fn with_settings(identifiers: Vec<String>, settings: ProviderSettings) -> Self {
        Self::new(identifiers, Arc::new(HttpBackendFactory::new(settings)))
    }

    /// Client over an already built registry
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            identifiers: registry
                .backends()
                .iter()
                .map(|b| b.category.clone())
                .collect(),
            factory: None,
            registry: OnceCell::new_with(Some(registry)),
        }
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Live backends, built on first call
    pub async fn registry(&self) -> &Registry {
        self.registry
            .get_or_init(|| async {
                match &self.factory {
                    Some(factory) => {
                        debug!("Initializing backends: {:?}", self.identifiers);
                        Registry::initialize(&self.identifiers, factory.as_ref()).await
                    }
                    None => Registry::default(),
                }
            })
            .await
    }

    /// Resolve the first segment of a capability path
    pub async fn resolve(&self, segment: &str) -> Result<Resolution> {
        FallbackPath::root(self.registry().await.backends()).resolve(segment)
    }

    /// Resolve a dotted path such as `chat.completions.create` to a callable
    pub async fn resolve_operation(&self, dotted: &str) -> Result<FallbackCall> {
        let mut segments = dotted.split('.');
        let first = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UnifaiError::AttributeNotFound(dotted.to_string()))?;

        let mut resolution = self.resolve(first).await?;
        for segment in segments {
            resolution = resolution.resolve(segment)?;
        }
        resolution.into_call()
    }

    pub async fn create_completion(&self, request: CompletionRequest) -> Result<ResponseView> {
        self.resolve_operation(CREATE_PATH)
            .await?
            .call(CallArgs::Completion(request))
            .await
    }

    /// Completion whose reply is parsed against the request's schema
    pub async fn parse_completion(&self, request: CompletionRequest) -> Result<ResponseView> {
        self.resolve_operation(PARSE_PATH)
            .await?
            .call(CallArgs::Completion(request))
            .await
    }

    pub async fn list_models(&self) -> Result<ResponseView> {
        self.resolve_operation(LIST_PATH)
            .await?
            .call(CallArgs::None)
            .await
    }

    /// Model id of the first backend that answers a minimal completion
    pub async fn get_active_model(&self) -> Option<String> {
        for backend in self.registry().await.backends() {
            let probe = CompletionRequest::new(vec![
                ChatMessage::system("respond with 'world'"),
                ChatMessage::user("hello"),
            ])
            .with_model(backend.display_name.clone())
            .with_max_tokens(20)
            .with_temperature(0.0);

            match backend
                .client
                .invoke(Operation::CreateCompletion, CallArgs::Completion(probe))
                .await
            {
                Ok(_) => {
                    info!("Active model: {} ({})", backend.display_name, backend.category);
                    return Some(backend.display_name.clone());
                }
                Err(e) => warn!(
                    "Probe failed for {} ({}): {}",
                    backend.display_name, backend.category, e
                ),
            }
        }
        None
    }
}
