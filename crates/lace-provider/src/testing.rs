//! A scripted `ProviderPort` for exercising the `Agent` state machine
//! without a real vendor, mirroring the teacher's `test_utils::mocks`
//! placement convention.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, ProviderResult};
use crate::message::{Message, Response, ToolDefinition};
use crate::port::{ProviderPort, TokenSender};

/// Replays a fixed sequence of responses (and, optionally, errors) in
/// order, one per call. Panics if exhausted, which surfaces test bugs
/// (a missing scripted turn) loudly rather than silently.
pub struct ScriptedProvider {
    name: String,
    model: String,
    streaming: bool,
    script: Mutex<Vec<ProviderResult<Response>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ProviderResult<Response>>) -> Self {
        Self {
            name: "scripted".to_string(),
            model: "scripted-model".to_string(),
            streaming: true,
            script: Mutex::new(script),
        }
    }

    pub fn non_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    fn next(&self) -> ProviderResult<Response> {
        // `blocking_lock` is safe here: the mutex is never held across an
        // await point and contention is impossible in tests (single caller).
        let mut guard = self
            .script
            .try_lock()
            .expect("ScriptedProvider must not be called concurrently");
        if guard.is_empty() {
            panic!("ScriptedProvider script exhausted");
        }
        guard.remove(0)
    }
}

#[async_trait]
impl ProviderPort for ScriptedProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn create_response(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> ProviderResult<Response> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.next()
    }

    async fn create_streaming_response(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        cancel: &CancellationToken,
        tokens: TokenSender,
    ) -> ProviderResult<Response> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let response = self.next()?;
        for word in response.content.split_whitespace() {
            if cancel.is_cancelled() {
                break;
            }
            tokens.send(format!("{word} "));
        }
        Ok(response)
    }
}
