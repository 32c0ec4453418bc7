//! Error taxonomy for translation, resolution and fallback

use thiserror::Error;

pub type Result<T, E = UnifaiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum UnifaiError {
    /// The canonical request cannot be expressed as a provider request
    #[error("translation error: {0}")]
    Translation(String),

    /// The provider reply did not carry a token count we need
    #[error("response usage is missing '{0}'")]
    MissingUsage(&'static str),

    /// A view or resolved value has no such key
    #[error("no attribute '{0}'")]
    AttributeNotFound(String),

    /// No live backend exposes the requested capability
    #[error("none of the backends implement '{0}'")]
    NoBackendImplements(String),

    /// Every backend was tried and the last one failed with `source`
    #[error("all fallback attempts failed for '{operation}': {source}")]
    AllFallbacksFailed {
        operation: String,
        #[source]
        source: Box<UnifaiError>,
    },

    /// The operation was invoked with arguments it does not accept
    #[error("operation '{operation}' expects {expected}")]
    InvalidArguments {
        operation: &'static str,
        expected: &'static str,
    },

    /// The request is valid but this provider's dialect cannot carry it
    #[error("unsupported by {provider}: {reason}")]
    UnsupportedByProvider {
        provider: &'static str,
        reason: String,
    },

    /// The provider replied, but not in a shape we can normalize
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// A structured reply was rejected by the caller's schema validator
    #[error("structured output failed validation: {0}")]
    SchemaValidation(String),

    /// Transport or provider-side failure
    #[error("provider error: {0:#}")]
    Provider(#[from] anyhow::Error),
}

impl UnifaiError {
    /// Whether trying the next backend could help.
    ///
    /// A request that cannot be translated is malformed for every backend,
    /// so it is surfaced instead of being retried.
    pub fn is_fallback_trigger(&self) -> bool {
        !matches!(
            self,
            Self::Translation(_) | Self::InvalidArguments { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_errors_are_not_retried() {
        assert!(!UnifaiError::Translation("no messages".into()).is_fallback_trigger());
        assert!(
            !UnifaiError::InvalidArguments {
                operation: "create",
                expected: "a completion request",
            }
            .is_fallback_trigger()
        );
        assert!(UnifaiError::MissingUsage("output_tokens").is_fallback_trigger());
        assert!(
            UnifaiError::UnsupportedByProvider {
                provider: "anthropic",
                reason: "non-JSON tool arguments".into(),
            }
            .is_fallback_trigger()
        );
        assert!(UnifaiError::Provider(anyhow::anyhow!("status 500")).is_fallback_trigger());
    }

    #[test]
    fn test_all_fallbacks_failed_reports_last_error() {
        let err = UnifaiError::AllFallbacksFailed {
            operation: "create".to_string(),
            source: Box::new(UnifaiError::Provider(anyhow::anyhow!("status 503"))),
        };
        let msg = err.to_string();
        assert!(msg.contains("'create'"));
        assert!(msg.contains("status 503"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
