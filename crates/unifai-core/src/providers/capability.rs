//! Named capabilities a backend exposes
//!
//! Every adapter publishes a static tree of namespaces ending in operations,
//! e.g. `chat.completions.create`. The dispatcher walks these trees one
//! segment at a time instead of reflecting over live objects.

use crate::types::CompletionRequest;

/// Leaf operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateCompletion,
    ParseCompletion,
    ListModels,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateCompletion => "create",
            Self::ParseCompletion => "parse",
            Self::ListModels => "list",
        }
    }

    /// Whether the operation takes a model id, which the dispatcher fills in
    /// per backend when the caller leaves it out
    pub fn takes_model(&self) -> bool {
        match self {
            Self::CreateCompletion | Self::ParseCompletion => true,
            Self::ListModels => false,
        }
    }
}

/// A node in a capability tree
#[derive(Debug)]
pub enum Capability {
    Namespace(&'static [(&'static str, Capability)]),
    Operation(Operation),
}

impl Capability {
    pub fn child(&self, segment: &str) -> Option<&Capability> {
        match self {
            Self::Namespace(children) => children
                .iter()
                .find(|(name, _)| *name == segment)
                .map(|(_, node)| node),
            Self::Operation(_) => None,
        }
    }

    pub fn as_operation(&self) -> Option<Operation> {
        match self {
            Self::Operation(op) => Some(*op),
            Self::Namespace(_) => None,
        }
    }
}

/// The OpenAI-client surface every adapter in this crate exposes
pub static CHAT_API: Capability = Capability::Namespace(&[
    (
        "chat",
        Capability::Namespace(&[(
            "completions",
            Capability::Namespace(&[(
                "create",
                Capability::Operation(Operation::CreateCompletion),
            )]),
        )]),
    ),
    (
        "beta",
        Capability::Namespace(&[(
            "chat",
            Capability::Namespace(&[(
                "completions",
                Capability::Namespace(&[(
                    "parse",
                    Capability::Operation(Operation::ParseCompletion),
                )]),
            )]),
        )]),
    ),
    (
        "models",
        Capability::Namespace(&[("list", Capability::Operation(Operation::ListModels))]),
    ),
]);

/// Arguments handed to an operation
#[derive(Debug, Clone, Default)]
pub enum CallArgs {
    #[default]
    None,
    Completion(CompletionRequest),
}

impl CallArgs {
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Completion(request) => request.model.as_deref(),
            Self::None => None,
        }
    }

    /// Copy of these arguments with `model` filled in
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            Self::Completion(request) => Self::Completion(request.clone().with_model(model)),
            Self::None => Self::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn walk(path: &str) -> Option<&'static Capability> {
        path.split('.').try_fold(&CHAT_API, |node, segment| node.child(segment))
    }

    #[test]
    fn test_chat_api_paths() {
        assert_eq!(
            walk("chat.completions.create").and_then(Capability::as_operation),
            Some(Operation::CreateCompletion)
        );
        assert_eq!(
            walk("beta.chat.completions.parse").and_then(Capability::as_operation),
            Some(Operation::ParseCompletion)
        );
        assert_eq!(
            walk("models.list").and_then(Capability::as_operation),
            Some(Operation::ListModels)
        );
        assert!(walk("chat.completions").unwrap().as_operation().is_none());
        assert!(walk("chat.nope").is_none());
        assert!(walk("models.list.more").is_none());
    }

    #[test]
    fn test_operation_flags() {
        assert!(Operation::CreateCompletion.takes_model());
        assert!(Operation::ParseCompletion.takes_model());
        assert!(!Operation::ListModels.takes_model());
        assert_eq!(Operation::CreateCompletion.name(), "create");
    }

    #[test]
    fn test_call_args_with_model() {
        let args = CallArgs::Completion(CompletionRequest::new(vec![ChatMessage::user("hi")]));
        assert_eq!(args.model(), None);
        let filled = args.with_model("gpt-4o-mini");
        assert_eq!(filled.model(), Some("gpt-4o-mini"));
        assert_eq!(args.model(), None);
        assert_eq!(CallArgs::None.with_model("x").model(), None);
    }
}
