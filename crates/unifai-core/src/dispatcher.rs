//! Fallback dispatcher
//!
//! Resolution walks every live backend's capability tree one path segment at
//! a time. Backends that cannot resolve a segment are dropped; once every
//! survivor sits on an operation the path becomes a [`FallbackCall`], which
//! tries the backends strictly in priority order until one succeeds.

use tracing::{debug, info, warn};

use crate::error::{Result, UnifaiError};
use crate::providers::{BackendHandle, CallArgs, Capability, Operation};
use crate::view::ResponseView;

/// Outcome of resolving one more segment
#[derive(Debug)]
pub enum Resolution {
    /// Some backends still sit on a namespace
    Path(FallbackPath),
    /// Every surviving backend reached an operation
    Call(FallbackCall),
}

impl Resolution {
    pub fn resolve(self, segment: &str) -> Result<Resolution> {
        match self {
            Self::Path(path) => path.resolve(segment),
            // Operations have no children, so nothing survives
            Self::Call(call) => {
                debug!("'{}' has no member '{}'", call.path, segment);
                Err(UnifaiError::NoBackendImplements(segment.to_string()))
            }
        }
    }

    pub fn into_call(self) -> Result<FallbackCall> {
        match self {
            Self::Call(call) => Ok(call),
            Self::Path(path) => Err(UnifaiError::AttributeNotFound(format!(
                "'{}' is a namespace, not an operation",
                path.path
            ))),
        }
    }
}

/// Resolution in progress: each surviving backend with the node it reached
#[derive(Debug)]
pub struct FallbackPath {
    path: String,
    nodes: Vec<(&'static Capability, BackendHandle)>,
}

impl FallbackPath {
    /// Start at the root of every backend's tree, in priority order
    pub fn root(backends: &[BackendHandle]) -> Self {
        Self {
            path: String::new(),
            nodes: backends
                .iter()
                .map(|b| (b.client.capabilities(), b.clone()))
                .collect(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of backends still in play
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn resolve(self, segment: &str) -> Result<Resolution> {
        let path = if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.path, segment)
        };

        let mut survivors = Vec::with_capacity(self.nodes.len());
        for (node, backend) in self.nodes {
            match node.child(segment) {
                Some(child) => survivors.push((child, backend)),
                None => warn!(
                    "Backend {} ({}) has no '{}', dropping it",
                    backend.display_name, backend.category, path
                ),
            }
        }

        if survivors.is_empty() {
            return Err(UnifaiError::NoBackendImplements(segment.to_string()));
        }

        let operations: Option<Vec<Operation>> =
            survivors.iter().map(|(node, _)| node.as_operation()).collect();

        match operations {
            Some(operations) => Ok(Resolution::Call(FallbackCall {
                path,
                targets: operations
                    .into_iter()
                    .zip(survivors.into_iter().map(|(_, backend)| backend))
                    .collect(),
            })),
            None => Ok(Resolution::Path(FallbackPath {
                path,
                nodes: survivors,
            })),
        }
    }
}

/// A resolved operation across backends, tried in order
#[derive(Debug, Clone)]
pub struct FallbackCall {
    path: String,
    targets: Vec<(Operation, BackendHandle)>,
}

impl FallbackCall {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Backends that will be tried, in order
    pub fn backends(&self) -> impl Iterator<Item = &BackendHandle> {
        self.targets.iter().map(|(_, backend)| backend)
    }

    pub async fn call(&self, args: CallArgs) -> Result<ResponseView> {
        let mut last_error = None;

        for (idx, (operation, backend)) in self.targets.iter().enumerate() {
            // Fill the model per attempt so one backend's id never reaches the next
            let attempt = if operation.takes_model() && args.model().is_none() {
                args.with_model(&backend.display_name)
            } else {
                args.clone()
            };

            debug!(
                "Calling {} on {} via {} ({}/{})",
                self.path,
                backend.display_name,
                backend.client.provider_name(),
                idx + 1,
                self.targets.len()
            );

            match backend.client.invoke(*operation, attempt).await {
                Ok(response) => {
                    if idx > 0 {
                        info!(
                            "{} succeeded on fallback backend {} ({})",
                            self.path, backend.display_name, backend.category
                        );
                    }
                    return Ok(response);
                }
                Err(e) if !e.is_fallback_trigger() => return Err(e),
                Err(e) => {
                    warn!(
                        "Backend {} ({}) failed on {}: {}",
                        backend.display_name, backend.category, self.path, e
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(UnifaiError::AllFallbacksFailed {
                operation: self.path.clone(),
                source: Box::new(e),
            }),
            None => Err(UnifaiError::NoBackendImplements(self.path.clone())),
        }
    }
}
