//! Request lifecycle: one question in, one answer (or failure) out.
//!
//! The lifecycle owns no display state of its own. It mutates the caller's
//! [`ViewState`] when a question is accepted (busy on, previous answer
//! cleared). The result comes back through a callback, and applying it with
//! [`ViewState::settle`] shows the answer or error and turns busy off.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ServiceError;

/// Marks failure text so it can't be mistaken for an answer.
pub const FAILURE_PREFIX: &str = "Error: ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single question, always sent as a system message followed by a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_text: String,
}

/// What a completion service hands back on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatResult {
    Success { text: String, usage: TokenUsage },
    Failure { message: String },
}

impl ChatResult {
    pub fn failure(reason: impl std::fmt::Display) -> Self {
        ChatResult::Failure {
            message: format!("{FAILURE_PREFIX}{reason}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChatResult::Success { .. })
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ServiceError>;
}

/// The observable outputs of the chat window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub response: String,
    pub usage: TokenUsage,
    pub input: String,
    pub busy: bool,
    pub failed: bool,
}

impl ViewState {
    fn begin(&mut self) {
        self.busy = true;
        self.response.clear();
        self.usage = TokenUsage::default();
        self.failed = false;
    }

    /// Apply a finished exchange. Always leaves the view idle.
    pub fn settle(&mut self, result: &ChatResult) {
        match result {
            ChatResult::Success { text, usage } => {
                self.response = text.clone();
                self.usage = *usage;
                self.failed = false;
            }
            ChatResult::Failure { message } => {
                self.response = message.clone();
                self.usage = TokenUsage::default();
                self.failed = true;
            }
        }
        self.busy = false;
    }

    pub fn reset(&mut self) {
        self.response.clear();
        self.usage = TokenUsage::default();
        self.input.clear();
        self.failed = false;
    }
}

/// Carries the reply callback into the worker task.
///
/// Exactly one result reaches the UI however the task ends: a guard dropped
/// before delivering (task aborted, runtime shutting down) reports a failure,
/// so the view is never left busy.
struct ReplyGuard<F: FnOnce(ChatResult)> {
    on_reply: Option<F>,
}

impl<F: FnOnce(ChatResult)> ReplyGuard<F> {
    fn new(on_reply: F) -> Self {
        Self {
            on_reply: Some(on_reply),
        }
    }

    fn deliver(mut self, result: ChatResult) {
        if let Some(on_reply) = self.on_reply.take() {
            on_reply(result);
        }
    }
}

impl<F: FnOnce(ChatResult)> Drop for ReplyGuard<F> {
    fn drop(&mut self) {
        if let Some(on_reply) = self.on_reply.take() {
            warn!("Request task ended without a reply");
            on_reply(ChatResult::failure(
                "request was interrupted before a reply arrived",
            ));
        }
    }
}

#[derive(Clone)]
pub struct RequestLifecycle {
    service: Arc<dyn CompletionService>,
    system_prompt: String,
}

impl RequestLifecycle {
    pub fn new(service: Arc<dyn CompletionService>, system_prompt: impl Into<String>) -> Self {
        Self {
            service,
            system_prompt: system_prompt.into(),
        }
    }

    /// Build the request for `user_text`, or `None` when there is nothing to ask.
    ///
    /// Only surrounding whitespace is trimmed; line breaks inside the question are kept.
    pub fn prepare(&self, user_text: &str) -> Option<ChatRequest> {
        let trimmed = user_text.trim();
        if trimmed.is_empty() {
            return None;
        }

        Some(ChatRequest {
            system_prompt: self.system_prompt.clone(),
            user_text: trimmed.to_string(),
        })
    }

    /// Ask one question in the background.
    ///
    /// Blank input is a no-op and returns `None` without touching `view`.
    /// Otherwise `view` goes busy with its previous answer cleared, and
    /// `on_reply` is called once from the worker task with the result. The
    /// caller routes it back to the UI loop and applies it with
    /// [`ViewState::settle`]. The handle is only needed to abort the request;
    /// dropping it detaches the task.
    pub fn submit<F>(
        &self,
        view: &mut ViewState,
        user_text: &str,
        on_reply: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(ChatResult) + Send + 'static,
    {
        let request = self.prepare(user_text)?;

        view.begin();
        let reply = ReplyGuard::new(on_reply);
        let service = Arc::clone(&self.service);
        Some(tokio::spawn(async move {
            let result = execute(service, request).await;
            reply.deliver(result);
        }))
    }

    pub fn reset(&self, view: &mut ViewState) {
        view.reset();
    }
}

async fn execute(service: Arc<dyn CompletionService>, request: ChatRequest) -> ChatResult {
    info!(
        chars = request.user_text.chars().count(),
        "Sending question to completion service"
    );

    let call = AssertUnwindSafe(async { service.complete(&request).await }).catch_unwind();

    match call.await {
        Ok(Ok(completion)) => {
            debug!(
                prompt_tokens = completion.usage.prompt_tokens,
                completion_tokens = completion.usage.completion_tokens,
                total_tokens = completion.usage.total_tokens,
                "Completion received"
            );
            ChatResult::Success {
                text: completion.text,
                usage: completion.usage,
            }
        }
        Ok(Err(err)) => {
            warn!(error = %err, auth = err.is_auth(), "Completion request failed");
            ChatResult::failure(err)
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(reason = reason.as_str(), "Completion service panicked");
            ChatResult::failure(ServiceError::Unexpected(format!(
                "completion service crashed: {reason}"
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
