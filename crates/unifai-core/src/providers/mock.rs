//! Scripted backend for dispatcher and client tests

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, UnifaiError};
use crate::types::{AssistantMessage, ChatCompletion, Usage};
use crate::view::ResponseView;

use super::{Backend, CHAT_API, CallArgs, Capability, Operation, RemoteModel, model_list};

/// Only `chat.completions.create`
pub(crate) static CREATE_ONLY: Capability = Capability::Namespace(&[(
    "chat",
    Capability::Namespace(&[(
        "completions",
        Capability::Namespace(&[("create", Capability::Operation(Operation::CreateCompletion))]),
    )]),
)]);

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Reply(&'static str),
    Fail,
    Reject,
}

pub(crate) struct MockBackend {
    pub name: &'static str,
    pub outcome: Outcome,
    pub tree: &'static Capability,
    pub calls: AtomicUsize,
    pub seen_models: Mutex<Vec<Option<String>>>,
}

impl MockBackend {
    pub fn new(name: &'static str, outcome: Outcome) -> Self {
        Self {
            name,
            outcome,
            tree: &CHAT_API,
            calls: AtomicUsize::new(0),
            seen_models: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tree(mut self, tree: &'static Capability) -> Self {
        self.tree = tree;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_models(&self) -> Vec<Option<String>> {
        self.seen_models.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn provider_name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> &'static Capability {
        self.tree
    }

    async fn invoke(&self, operation: Operation, args: CallArgs) -> Result<ResponseView> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_models
            .lock()
            .unwrap()
            .push(args.model().map(str::to_string));

        match self.outcome {
            Outcome::Fail => Err(UnifaiError::Provider(anyhow!("{} is down", self.name))),
            Outcome::Reject => Err(UnifaiError::Translation("unsupported request".to_string())),
            Outcome::Reply(text) => match operation {
                Operation::ListModels => model_list(vec![RemoteModel {
                    id: self.name.to_string(),
                    created: 0,
                }])
                .into_view(),
                Operation::CreateCompletion | Operation::ParseCompletion => ChatCompletion::new(
                    format!("{}-1", self.name),
                    args.model().unwrap_or(self.name),
                    AssistantMessage::text(text),
                    Some("stop".to_string()),
                    Usage {
                        prompt_tokens: 1,
                        completion_tokens: 1,
                        total_tokens: 2,
                    },
                )
                .into_view(),
            },
        }
    }
}
