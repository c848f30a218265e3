//! `NonInteractiveRunner` (§4.M): a one-shot driver for `--prompt` style
//! invocations. Starts an Agent, sends a single message, streams tokens to
//! a writer, and resolves once the turn (and any queued follow-ups) reach
//! `conversation_complete` or the Agent raises `error`.
//!
//! Grounded on the teacher's `agent/src/runner.rs` once-listener pattern,
//! adapted from Node-style event emitters to a `broadcast::Receiver` loop.

use std::io::Write;

use crate::agent::{Agent, SendOptions};
use crate::error::AgentResult;
use crate::events::AgentEventKind;

/// Drives one Agent through a single prompt to completion, writing
/// streamed tokens to `out` as they arrive.
pub struct NonInteractiveRunner<'a> {
    agent: &'a Agent,
}

impl<'a> NonInteractiveRunner<'a> {
    pub fn new(agent: &'a Agent) -> Self {
        Self { agent }
    }

    /// §4.M: start the agent, send `prompt`, forward tokens to `out` until
    /// `agent_token` stops arriving for this response, write a terminating
    /// newline at `agent_response_complete`, and resolve on
    /// `conversation_complete` (Ok) or `error` (Err). Always attempts
    /// `agent.stop()` afterward; a failure there is logged, never
    /// propagated over the turn's own result.
    pub async fn run(&self, prompt: impl Into<String>, mut out: impl Write) -> AgentResult<()> {
        self.agent.start().await?;
        let mut events = self.agent.subscribe();

        let send_result = self.agent.send_message(prompt, SendOptions::default()).await;
        let result = match send_result {
            Ok(()) => self.drain_until_complete(&mut events, &mut out).await,
            Err(err) => Err(err),
        };

        self.agent.stop().await;
        result
    }

    async fn drain_until_complete(
        &self,
        events: &mut tokio::sync::broadcast::Receiver<crate::events::AgentEvent>,
        out: &mut impl Write,
    ) -> AgentResult<()> {
        loop {
            match events.recv().await {
                Ok(event) => match event.kind {
                    AgentEventKind::AgentToken { token } => {
                        let _ = out.write_all(token.as_bytes());
                        let _ = out.flush();
                    }
                    AgentEventKind::AgentResponseComplete { .. } => {
                        let _ = out.write_all(b"\n");
                        let _ = out.flush();
                    }
                    AgentEventKind::ConversationComplete => return Ok(()),
                    AgentEventKind::Error { error, phase } => {
                        return Err(crate::error::AgentError::Internal(format!("{phase}: {error}")));
                    }
                    _ => {}
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return Err(crate::error::AgentError::Internal(
                        "agent event stream closed before conversation_complete".to_string(),
                    ));
                }
            }
        }
    }
}

/// Best-effort stop used by callers that already have their own result in
/// hand and only want `agent.stop()`'s side effects, not its failure mode
/// to override that result (§4.M "stop errors are logged, not propagated").
pub async fn stop_best_effort(agent: &Agent) {
    agent.stop().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lace_core::ThreadId;
    use lace_core::store::InMemoryThreadStore;
    use lace_provider::{ProviderPort, Response, ScriptedProvider};
    use lace_tools::{ApprovalGate, ToolExecutor, ToolRegistry};
    use std::sync::Arc;

    async fn new_agent(script: Vec<lace_provider::ProviderResult<Response>>) -> Agent {
        let store: Arc<dyn lace_core::ThreadStore> = Arc::new(InMemoryThreadStore::new());
        let thread_id = ThreadId::from_raw("lace_20250101_abc123");
        store.create_thread(&thread_id).await.unwrap();
        let approval = Arc::new(ApprovalGate::new(store.clone()));
        let temp = tempfile::tempdir().unwrap();
        let executor = Arc::new(ToolExecutor::new(ToolRegistry::new(), approval, temp.path().to_path_buf()));
        let provider: Arc<dyn ProviderPort> = Arc::new(ScriptedProvider::new(script).non_streaming());
        Agent::new(thread_id, store, provider, executor, crate::config::EngineConfig::default())
    }

    #[tokio::test]
    async fn run_writes_response_then_newline_and_resolves() {
        let agent = new_agent(vec![Ok(Response { content: "hello world".into(), ..Default::default() })]).await;
        let runner = NonInteractiveRunner::new(&agent);
        let mut out = Vec::new();
        runner.run("hi", &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\n");
    }

    #[tokio::test]
    async fn provider_error_surfaces_as_runner_error() {
        let agent = new_agent(vec![Err(lace_provider::ProviderError::AuthError("bad key".into()))]).await;
        let runner = NonInteractiveRunner::new(&agent);
        let mut out = Vec::new();
        let result = runner.run("hi", &mut out).await;
        assert!(result.is_err());
    }
}
