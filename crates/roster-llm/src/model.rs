//! Language model abstraction

use crate::types::{CompletionRequest, ModelReply};
use async_trait::async_trait;
use roster_core::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Trait for calling a language model (allows faking in tests)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one completion over the request's history
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply>;

    /// Name used in logs
    fn name(&self) -> &str {
        "model"
    }
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for Arc<M> {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        (**self).complete(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<ModelReply> + Send + Sync;

/// Fake model whose replies are computed from the request
///
/// The responder sees the whole history, so a script can decide what to do
/// next from the tool results it already received. That keeps the fake
/// deterministic across concurrent branches and across suspend/resume.
#[derive(Clone)]
pub struct ScriptedModel {
    responder: Arc<Responder>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<ModelReply> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of completions served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(request)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
