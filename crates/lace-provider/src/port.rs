//! `ProviderPort` (§4.F): the abstract contract a concrete vendor adapter
//! implements. Wire formats of specific vendors are out of scope; this
//! crate only defines the interface the core consumes.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderResult;
use crate::message::{Message, Response, ToolDefinition};

/// Handed to `create_streaming_response` so the adapter can emit a `token`
/// event per chunk without the core needing a long-lived global bus (§9).
/// The channel is created fresh per call and dropped when the call ends.
#[derive(Clone)]
pub struct TokenSender(mpsc::UnboundedSender<String>);

impl TokenSender {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self(sender)
    }

    /// Best-effort: a closed receiver (the Agent stopped listening) is not
    /// an error for the adapter.
    pub fn send(&self, token: impl Into<String>) {
        let _ = self.0.send(token.into());
    }
}

#[async_trait]
pub trait ProviderPort: Send + Sync {
    fn provider_name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn supports_streaming(&self) -> bool;

    /// Non-streaming call. Must not mutate `messages`/`tools`.
    async fn create_response(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> ProviderResult<Response>;

    /// Streaming call: emits a `token` event per chunk via `tokens`, then
    /// returns the final assembled response. Cancellation is cooperative:
    /// implementations check `cancel` between chunks and at I/O boundaries.
    async fn create_streaming_response(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
        tokens: TokenSender,
    ) -> ProviderResult<Response>;
}
