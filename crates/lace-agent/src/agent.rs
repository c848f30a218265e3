//! The `Agent` turn state machine (§4.I): drives Provider -> Tool ->
//! Provider recursion over a single thread, emitting lifecycle events as it
//! moves through `idle -> thinking -> streaming -> tool_execution -> idle`.
//!
//! Grounded on the teacher's `agent/src/agent/execution.rs` +
//! `execution/transitions.rs` split (state transitions as a sequential
//! async function rather than an explicit transition table), generalized
//! to the spec's four-state machine and single-writer-per-thread model.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lace_core::{
    ApprovalDecision, Event, EventKind, ThreadId, ThreadStore, ToolApprovalResponseData,
    ToolCallData, ToolResultStatus,
};
use lace_provider::{
    BudgetCheck, Message, ProviderPort, Response, RetryPolicy, Role, TokenBudget, TokenSender,
    ToolCallRequest, ToolDefinition, ToolResultMessage,
};
use lace_tools::{ExecutionOutcome, ToolExecutor};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::error::{AgentError, AgentResult};
use crate::events::{AgentEvent, AgentEventKind, EventBus};
use crate::message_queue::MessageQueue;
use crate::state::AgentState;

/// Options a caller passes with a message, mirroring §4.H's `send(text,
/// options)` contract.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Enqueue rather than raise if the agent is busy.
    pub queue: bool,
    /// Reserve the queue's single high-priority head slot.
    pub priority: bool,
}

impl SendOptions {
    pub fn queued() -> Self {
        Self { queue: true, priority: false }
    }

    pub fn high_priority() -> Self {
        Self { queue: true, priority: true }
    }
}

/// Everything a turn needs that does not change once the Agent is built.
struct AgentInner {
    thread_id: ThreadId,
    store: Arc<dyn ThreadStore>,
    provider: Arc<dyn ProviderPort>,
    tool_executor: Arc<ToolExecutor>,
    retry_policy: RetryPolicy,
    token_budget: AsyncMutex<Option<TokenBudget>>,
    config: EngineConfig,
    working_directory: Option<PathBuf>,
    bus: EventBus,
    queue: MessageQueue,
    state: parking_lot::Mutex<AgentState>,
    busy: AtomicBool,
    started: AtomicBool,
    cancel: CancellationToken,
    /// Single-writer-per-thread enforcement (§5): only one turn may touch
    /// this thread's events at a time.
    turn_lock: Arc<AsyncMutex<()>>,
}

/// A cheap, `Clone`-able handle onto a running turn state machine. Cloning
/// shares the same underlying thread, queue, and event bus -- the pattern
/// the teacher uses for its `AgentHandle` facade, minus the actor-mesh
/// machinery this crate doesn't need.
#[derive(Clone)]
pub struct Agent(Arc<AgentInner>);

impl Agent {
    pub fn new(
        thread_id: ThreadId,
        store: Arc<dyn ThreadStore>,
        provider: Arc<dyn ProviderPort>,
        tool_executor: Arc<ToolExecutor>,
        config: EngineConfig,
    ) -> Self {
        Self::with_working_directory(thread_id, store, provider, tool_executor, config, None)
    }

    pub fn with_working_directory(
        thread_id: ThreadId,
        store: Arc<dyn ThreadStore>,
        provider: Arc<dyn ProviderPort>,
        tool_executor: Arc<ToolExecutor>,
        config: EngineConfig,
        working_directory: Option<PathBuf>,
    ) -> Self {
        let token_budget = config.token_budget.map(TokenBudget::new);
        Self(Arc::new(AgentInner {
            thread_id,
            store,
            provider,
            tool_executor,
            retry_policy: RetryPolicy::new(config.retry),
            token_budget: AsyncMutex::new(token_budget),
            working_directory,
            config,
            bus: EventBus::new(),
            queue: MessageQueue::new(),
            state: parking_lot::Mutex::new(AgentState::Idle),
            busy: AtomicBool::new(false),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            turn_lock: Arc::new(AsyncMutex::new(())),
        }))
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.0.thread_id
    }

    pub fn state(&self) -> AgentState {
        *self.0.state.lock()
    }

    pub fn queue_stats(&self) -> crate::message_queue::QueueStats {
        self.0.queue.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.0.bus.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.0.cancel.clone()
    }

    pub async fn start(&self) -> AgentResult<()> {
        self.0.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Idempotent: cancels any in-flight work and marks the agent stopped.
    /// Does not delete the thread or its events.
    pub async fn stop(&self) {
        self.0.cancel.cancel();
        self.0.started.store(false, Ordering::SeqCst);
    }

    fn require_started(&self) -> AgentResult<()> {
        if self.0.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AgentError::NotStarted)
        }
    }

    fn transition(&self, to: AgentState) {
        let from = {
            let mut state = self.0.state.lock();
            let from = *state;
            *state = to;
            from
        };
        self.0.bus.publish(self.0.thread_id.as_str(), AgentEventKind::StateChange { from, to });
    }

    /// §4.H: `send(text, options)`. Delivers immediately if idle, otherwise
    /// enqueues (or, per the resolved open question in DESIGN.md, always
    /// enqueues rather than raising when busy and `queue` was not set).
    #[instrument(skip(self, text))]
    pub async fn send_message(&self, text: impl Into<String>, opts: SendOptions) -> AgentResult<()> {
        self.require_started()?;
        let text = text.into();

        if self
            .0
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let agent = self.clone();
            tokio::spawn(async move {
                agent.drive(DriveKind::NewMessage(text)).await;
            });
            return Ok(());
        }

        // Busy: enqueue regardless of `opts.queue` (DESIGN.md: a second
        // top-level message never raises; it always joins the queue).
        let _ = opts.queue;
        let len = self.0.queue.enqueue(text, opts.priority);
        self.0.bus.publish(
            self.0.thread_id.as_str(),
            AgentEventKind::MessageQueued { queue_length: len },
        );
        Ok(())
    }

    /// Appends a `TOOL_APPROVAL_RESPONSE` for `tool_call_id` and resumes the
    /// suspended turn (§4.E step 4 / §7 `ApprovalPending`).
    pub async fn submit_approval(
        &self,
        tool_call_id: impl Into<String>,
        decision: ApprovalDecision,
    ) -> AgentResult<()> {
        self.require_started()?;
        let tool_call_id = tool_call_id.into();
        self.0
            .store
            .append_event(
                &self.0.thread_id,
                EventKind::ToolApprovalResponse(ToolApprovalResponseData { tool_call_id, decision }),
            )
            .await?;

        if self
            .0
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let agent = self.clone();
            tokio::spawn(async move {
                agent.drive(DriveKind::ResumePending).await;
            });
        }
        Ok(())
    }

    /// Owns the turn lock for one or more turns: the initial message (or
    /// pending-approval resumption), then drains the queue until empty,
    /// emitting `queue_processing_start`/`queue_processing_complete` once
    /// per drain, finally `conversation_complete`.
    async fn drive(&self, first: DriveKind) {
        let _guard = self.0.turn_lock.lock().await;

        let first_result = match first {
            DriveKind::NewMessage(text) => self.run_single_turn(text).await,
            DriveKind::ResumePending => self.resume_pending_calls().await,
        };
        self.report_turn_outcome(first_result);

        if !self.0.queue.is_empty() {
            self.0.bus.publish(self.0.thread_id.as_str(), AgentEventKind::QueueProcessingStart);
            while let Some(message) = self.0.queue.pop_front() {
                let result = self.run_single_turn(message.text).await;
                self.report_turn_outcome(result);
            }
            self.0
                .bus
                .publish(self.0.thread_id.as_str(), AgentEventKind::QueueProcessingComplete);
        }

        self.0.bus.publish(self.0.thread_id.as_str(), AgentEventKind::ConversationComplete);
        self.0.busy.store(false, Ordering::SeqCst);
    }

    fn report_turn_outcome(&self, result: AgentResult<TurnOutcome>) {
        match result {
            Ok(_) => {}
            Err(err) => {
                self.0.bus.publish(
                    self.0.thread_id.as_str(),
                    AgentEventKind::Error {
                        error: err.to_string(),
                        phase: "provider_response".to_string(),
                    },
                );
            }
        }
    }

    /// Steps 1-6 of the turn algorithm (§4.I) for one inbound text.
    async fn run_single_turn(&self, text: String) -> AgentResult<TurnOutcome> {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.0
                .store
                .append_event(&self.0.thread_id, EventKind::UserMessage(trimmed.to_string()))
                .await?;
        }
        self.continue_turn().await
    }

    /// Resumes a turn that previously suspended on `ApprovalPending`: finds
    /// every `TOOL_CALL` still missing its `TOOL_RESULT` (in thread order)
    /// and resolves each through the executor's `resume_pending`, which
    /// blocks (up to the configured approval timeout) on the decision that
    /// `submit_approval` just persisted.
    async fn resume_pending_calls(&self) -> AgentResult<TurnOutcome> {
        let events = self.0.store.get_events(&self.0.thread_id).await?;
        let orphaned = orphaned_tool_calls(&events);
        if orphaned.is_empty() {
            return Ok(TurnOutcome::Complete);
        }

        self.transition(AgentState::ToolExecution);
        for call in &orphaned {
            let outcome = self
                .0
                .tool_executor
                .resume_pending(
                    &self.0.thread_id,
                    call,
                    self.0.working_directory.clone(),
                    self.0.cancel.clone(),
                )
                .await?;
            match outcome {
                ExecutionOutcome::Result(result) => {
                    self.0
                        .store
                        .append_event(&self.0.thread_id, EventKind::ToolResult(result))
                        .await?;
                    self.0.bus.publish(
                        self.0.thread_id.as_str(),
                        AgentEventKind::ToolCallCompleted { tool_call_id: call.id.clone() },
                    );
                }
                ExecutionOutcome::Pending => {
                    self.transition(AgentState::Idle);
                    return Ok(TurnOutcome::Suspended);
                }
            }
        }

        self.transition(AgentState::Thinking);
        self.continue_turn().await
    }

    /// Steps 2-6: build messages, call the provider, append the reply,
    /// execute any tool calls, and recurse (empty-text) until a response
    /// carries no tool calls.
    async fn continue_turn(&self) -> AgentResult<TurnOutcome> {
        loop {
            self.transition(AgentState::Thinking);
            self.0.bus.publish(self.0.thread_id.as_str(), AgentEventKind::AgentThinkingStart);

            let events = self.0.store.get_events(&self.0.thread_id).await?;
            let messages = build_messages(&events);
            let tools = self.tool_definitions();

            let response = match self.call_provider(&messages, &tools).await {
                Ok(response) => response,
                Err(AgentError::Provider(lace_provider::ProviderError::Cancelled)) => {
                    // Benign end-of-turn (§4.I Cancellation): `call_provider`
                    // already appended an AGENT_MESSAGE with whatever tokens
                    // were streamed before the cancellation landed.
                    self.transition(AgentState::Idle);
                    return Ok(TurnOutcome::Cancelled);
                }
                Err(err) => {
                    self.transition(AgentState::Idle);
                    return Err(err);
                }
            };
            self.0
                .bus
                .publish(self.0.thread_id.as_str(), AgentEventKind::AgentThinkingComplete);

            self.0
                .store
                .append_event(&self.0.thread_id, EventKind::AgentMessage(response.content.clone()))
                .await?;
            self.0.bus.publish(
                self.0.thread_id.as_str(),
                AgentEventKind::AgentResponseComplete { content: response.content.clone() },
            );

            if !response.has_tool_calls() {
                self.transition(AgentState::Idle);
                return Ok(TurnOutcome::Complete);
            }

            self.transition(AgentState::ToolExecution);
            for call in &response.tool_calls {
                let call_data = ToolCallData {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                };
                self.0
                    .store
                    .append_event(&self.0.thread_id, EventKind::ToolCall(call_data.clone()))
                    .await?;
                self.0.bus.publish(
                    self.0.thread_id.as_str(),
                    AgentEventKind::ToolCallStarted { tool_call_id: call.id.clone(), name: call.name.clone() },
                );

                let outcome = self
                    .0
                    .tool_executor
                    .execute(
                        &self.0.thread_id,
                        &call_data,
                        self.0.working_directory.clone(),
                        self.0.cancel.clone(),
                    )
                    .await?;
                match outcome {
                    ExecutionOutcome::Result(result) => {
                        self.0
                            .store
                            .append_event(&self.0.thread_id, EventKind::ToolResult(result))
                            .await?;
                        self.0.bus.publish(
                            self.0.thread_id.as_str(),
                            AgentEventKind::ToolCallCompleted { tool_call_id: call.id.clone() },
                        );
                    }
                    ExecutionOutcome::Pending => {
                        // Suspend: do not execute remaining calls in this
                        // response. `submit_approval` drives the rest.
                        self.transition(AgentState::Idle);
                        return Ok(TurnOutcome::Suspended);
                    }
                }
            }
            // loop back to step 2 with no new input (the recursion in §4.I
            // step 6).
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.0
            .tool_executor
            .registry()
            .names()
            .into_iter()
            .filter_map(|name| self.0.tool_executor.registry().find(&name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Wraps a single provider call with token-budget enforcement (§4.G),
    /// retry-with-backoff (§4.G), and, for streaming providers, token
    /// forwarding (§9 "no long-lived global bus": the channel lives only
    /// for this call).
    async fn call_provider(&self, messages: &[Message], tools: &[ToolDefinition]) -> AgentResult<Response> {
        {
            let mut budget_guard = self.0.token_budget.lock().await;
            if let Some(budget) = budget_guard.as_mut() {
                let estimate = estimate_tokens(messages);
                match budget.check(estimate) {
                    BudgetCheck::Exceeded => {
                        self.0.bus.publish(
                            self.0.thread_id.as_str(),
                            AgentEventKind::TokenBudgetWarning { used: budget.used(), max: budget.limit() },
                        );
                        return Err(AgentError::BudgetExceeded);
                    }
                    BudgetCheck::Warning => {
                        self.0.bus.publish(
                            self.0.thread_id.as_str(),
                            AgentEventKind::TokenBudgetWarning { used: budget.used(), max: budget.limit() },
                        );
                    }
                    BudgetCheck::Ok => {}
                }
            }
        }

        let cancel = self.0.cancel.clone();

        let response = if self.0.provider.supports_streaming() && self.0.config.stream_responses {
            self.transition(AgentState::Streaming);
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            let forward_agent = self.clone();
            let forward = tokio::spawn(async move {
                let mut accumulated = String::new();
                while let Some(token) = rx.recv().await {
                    accumulated.push_str(&token);
                    forward_agent.0.bus.publish(
                        forward_agent.0.thread_id.as_str(),
                        AgentEventKind::AgentToken { token },
                    );
                }
                accumulated
            });

            let provider = self.0.provider.clone();
            let messages = messages.to_vec();
            let tools = tools.to_vec();
            let result = self
                .0
                .retry_policy
                .run(
                    &cancel,
                    |status| self.emit_retry(status),
                    |_attempt| {
                        let provider = provider.clone();
                        let messages = messages.clone();
                        let tools = tools.clone();
                        let cancel = cancel.clone();
                        let tokens = TokenSender::new(tx.clone());
                        async move { provider.create_streaming_response(&messages, &tools, &cancel, tokens).await }
                    },
                )
                .await;
            drop(tx);
            let accumulated = forward.await.unwrap_or_default();

            if let Err(AgentError::Provider(lace_provider::ProviderError::Cancelled)) = &result {
                if !accumulated.is_empty() {
                    self.0
                        .store
                        .append_event(&self.0.thread_id, EventKind::AgentMessage(accumulated.clone()))
                        .await?;
                    self.0.bus.publish(
                        self.0.thread_id.as_str(),
                        AgentEventKind::AgentResponseComplete { content: accumulated },
                    );
                }
            }
            result
        } else {
            self.0
                .retry_policy
                .run(
                    &cancel,
                    |status| self.emit_retry(status),
                    |_attempt| self.0.provider.create_response(messages, tools, &cancel),
                )
                .await
        };

        let response = response?;
        if let Some(usage) = response.usage {
            let mut budget_guard = self.0.token_budget.lock().await;
            if let Some(budget) = budget_guard.as_mut() {
                budget.record(usage);
            }
        }
        Ok(response)
    }

    fn emit_retry(&self, status: lace_provider::RetryStatus) {
        self.0.bus.publish(
            self.0.thread_id.as_str(),
            AgentEventKind::RetryStatus {
                is_retrying: status.is_retrying,
                attempt: status.attempt,
                max_attempts: status.max_attempts,
                delay_ms: status.delay_ms,
                error_type: status.error_type,
            },
        );
    }
}

enum DriveKind {
    NewMessage(String),
    ResumePending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnOutcome {
    Complete,
    Suspended,
    Cancelled,
}

/// Every `TOOL_CALL` in thread order that has no matching `TOOL_RESULT` yet.
fn orphaned_tool_calls(events: &[Event]) -> Vec<ToolCallData> {
    let resolved: HashSet<&str> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ToolResult(r) => Some(r.id.as_str()),
            _ => None,
        })
        .collect();
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ToolCall(c) if !resolved.contains(c.id.as_str()) => Some(c.clone()),
            _ => None,
        })
        .collect()
}

/// Builds the provider-facing message sequence from thread events (§4.I
/// step 2): system prompts first, then the conversation, dropping every
/// administrative event kind. Orphaned `TOOL_CALL`/`TOOL_RESULT` events
/// (tolerated per the spec) are folded into a synthesized assistant/user
/// message rather than dropped, so tool history stays visible.
fn build_messages(events: &[Event]) -> Vec<Message> {
    let mut messages = Vec::new();
    for event in events {
        match &event.kind {
            EventKind::SystemPrompt(text) | EventKind::UserSystemPrompt(text) => {
                messages.push(Message::system(text.clone()));
            }
            EventKind::UserMessage(text) => messages.push(Message::user(text.clone())),
            EventKind::AgentMessage(text) => messages.push(Message::assistant(text.clone())),
            EventKind::ToolCall(call) => {
                let request = ToolCallRequest {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                };
                match messages.last_mut() {
                    Some(m) if m.role == Role::Assistant => m.tool_calls.push(request),
                    _ => {
                        let mut synthesized = Message::assistant("");
                        synthesized.tool_calls.push(request);
                        messages.push(synthesized);
                    }
                }
            }
            EventKind::ToolResult(result) => {
                let content = result
                    .content
                    .iter()
                    .map(|block| block.as_text())
                    .collect::<Vec<_>>()
                    .join("\n");
                let trm = ToolResultMessage { tool_call_id: result.id.clone(), content };
                match messages.last_mut() {
                    Some(m) if m.role == Role::User => m.tool_results.push(trm),
                    _ => {
                        let mut synthesized = Message::user("");
                        synthesized.tool_results.push(trm);
                        messages.push(synthesized);
                    }
                }
            }
            EventKind::ToolApprovalRequest(_)
            | EventKind::ToolApprovalResponse(_)
            | EventKind::LocalSystemMessage(_)
            | EventKind::Compaction(_) => {
                // Administrative / UI-only events never reach the model.
            }
        }
    }
    messages
}

/// A coarse, non-tokenizer-backed estimate (chars / 4), adequate for the
/// pre-flight budget check the spec requires (§4.G: "estimated tokens").
/// A precise count comes back from the provider's own `Usage` afterward.
fn estimate_tokens(messages: &[Message]) -> u64 {
    let chars: usize = messages
        .iter()
        .map(|m| m.content.len() + m.tool_calls.iter().map(|t| t.arguments.to_string().len()).sum::<usize>())
        .sum();
    (chars / 4).max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use lace_core::{ContentBlock, ToolResultData};
    use lace_core::store::InMemoryThreadStore;
    use lace_provider::{ProviderResult, ScriptedProvider};
    use lace_tools::ApprovalGate;
    use std::time::Duration;

    async fn new_agent(
        script: Vec<ProviderResult<Response>>,
        registry: lace_tools::ToolRegistry,
    ) -> (Agent, Arc<dyn ThreadStore>, ThreadId) {
        let store: Arc<dyn ThreadStore> = Arc::new(InMemoryThreadStore::new());
        let thread_id = ThreadId::from_raw("lace_20250101_abc123");
        store.create_thread(&thread_id).await.unwrap();
        let approval = Arc::new(ApprovalGate::new(store.clone()));
        let temp = tempfile::tempdir().unwrap();
        let executor = Arc::new(ToolExecutor::new(registry, approval, temp.path().to_path_buf()));
        let provider: Arc<dyn ProviderPort> = Arc::new(ScriptedProvider::new(script));
        let agent = Agent::new(thread_id.clone(), store.clone(), provider, executor, EngineConfig::default());
        (agent, store, thread_id)
    }

    async fn wait_for_idle(agent: &Agent) {
        for _ in 0..200 {
            if agent.state() == AgentState::Idle && !agent.0.busy.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("agent never returned to idle");
    }

    #[tokio::test]
    async fn send_before_start_raises_not_started() {
        let (agent, _, _) = new_agent(vec![Ok(Response { content: "hi".into(), ..Default::default() })], lace_tools::ToolRegistry::new()).await;
        let result = agent.send_message("hello", SendOptions::default()).await;
        assert!(matches!(result, Err(AgentError::NotStarted)));
    }

    #[tokio::test]
    async fn simple_turn_appends_user_and_agent_messages() {
        let (agent, store, thread_id) = new_agent(
            vec![Ok(Response { content: "hi there".into(), ..Default::default() })],
            lace_tools::ToolRegistry::new(),
        )
        .await;
        agent.start().await.unwrap();
        agent.send_message("hello", SendOptions::default()).await.unwrap();
        wait_for_idle(&agent).await;

        let events = store.get_events(&thread_id).await.unwrap();
        assert!(matches!(&events[0].kind, EventKind::UserMessage(t) if t == "hello"));
        assert!(matches!(&events[1].kind, EventKind::AgentMessage(t) if t == "hi there"));
    }

    #[tokio::test]
    async fn tool_call_response_recurses_until_no_more_calls() {
        let call_response = Response {
            content: "let me check".into(),
            tool_calls: vec![lace_provider::ToolCallRequest {
                id: "call-1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({"message": "hi"}),
            }],
            ..Default::default()
        };
        let final_response = Response { content: "done".into(), ..Default::default() };

        struct EchoTool;
        #[async_trait::async_trait]
        impl lace_tools::Tool for EchoTool {
            fn name(&self) -> &str {
                "echo"
            }
            fn description(&self) -> &str {
                "echo"
            }
            fn input_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }
            fn annotations(&self) -> lace_tools::ToolAnnotations {
                lace_tools::ToolAnnotations::builder().read_only(true)
            }
            async fn execute_validated(
                &self,
                args: serde_json::Value,
                _ctx: &lace_tools::ToolContext,
            ) -> Result<Vec<ContentBlock>, lace_tools::ToolError> {
                Ok(vec![ContentBlock::text(args["message"].as_str().unwrap_or_default())])
            }
        }
        let mut registry = lace_tools::ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let (agent, store, thread_id) = new_agent(vec![Ok(call_response), Ok(final_response)], registry).await;
        agent.start().await.unwrap();
        agent.send_message("please check", SendOptions::default()).await.unwrap();
        wait_for_idle(&agent).await;

        let events = store.get_events(&thread_id).await.unwrap();
        let tool_results: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::ToolResult(_)))
            .collect();
        assert_eq!(tool_results.len(), 1);
        if let EventKind::ToolResult(r) = &tool_results[0].kind {
            assert_eq!(r.status, ToolResultStatus::Completed);
            assert_eq!(r.content[0].as_text(), "hi");
        }
        let last_agent_message = events
            .iter()
            .rev()
            .find_map(|e| match &e.kind {
                EventKind::AgentMessage(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_agent_message, "done");
    }

    #[tokio::test]
    async fn destructive_tool_call_suspends_then_resumes_on_approval() {
        struct DestructiveTool;
        #[async_trait::async_trait]
        impl lace_tools::Tool for DestructiveTool {
            fn name(&self) -> &str {
                "rm"
            }
            fn description(&self) -> &str {
                "destructive"
            }
            fn input_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }
            fn annotations(&self) -> lace_tools::ToolAnnotations {
                lace_tools::ToolAnnotations::builder().destructive(true)
            }
            async fn execute_validated(
                &self,
                _args: serde_json::Value,
                _ctx: &lace_tools::ToolContext,
            ) -> Result<Vec<ContentBlock>, lace_tools::ToolError> {
                Ok(vec![ContentBlock::text("removed")])
            }
        }
        let mut registry = lace_tools::ToolRegistry::new();
        registry.register(Arc::new(DestructiveTool));

        let call_response = Response {
            content: "removing".into(),
            tool_calls: vec![lace_provider::ToolCallRequest {
                id: "call-1".into(),
                name: "rm".into(),
                arguments: serde_json::json!({}),
            }],
            ..Default::default()
        };
        let final_response = Response { content: "done".into(), ..Default::default() };
        let (agent, store, thread_id) = new_agent(vec![Ok(call_response), Ok(final_response)], registry).await;
        agent.start().await.unwrap();
        agent.send_message("clean up", SendOptions::default()).await.unwrap();

        // give the spawned turn time to reach the approval-pending suspension
        tokio::time::sleep(Duration::from_millis(50)).await;
        let events = store.get_events(&thread_id).await.unwrap();
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::ToolApprovalRequest(_))));
        assert!(!events.iter().any(|e| matches!(e.kind, EventKind::ToolResult(_))));

        agent
            .submit_approval("call-1", ApprovalDecision::AllowOnce)
            .await
            .unwrap();
        wait_for_idle(&agent).await;

        let events = store.get_events(&thread_id).await.unwrap();
        assert!(events.iter().any(|e| matches!(&e.kind, EventKind::ToolResult(r) if r.status == ToolResultStatus::Completed)));
        let last_agent_message = events
            .iter()
            .rev()
            .find_map(|e| match &e.kind {
                EventKind::AgentMessage(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_agent_message, "done");
    }

    #[tokio::test]
    async fn busy_agent_queues_then_drains_in_order() {
        let responses = (0..4)
            .map(|i| Ok(Response { content: format!("reply {i}"), ..Default::default() }))
            .collect();
        let (agent, store, thread_id) = new_agent(responses, lace_tools::ToolRegistry::new()).await;
        agent.start().await.unwrap();

        agent.send_message("first", SendOptions::default()).await.unwrap();
        agent.send_message("Queued 1", SendOptions::queued()).await.unwrap();
        agent.send_message("Queued 2", SendOptions::queued()).await.unwrap();
        agent.send_message("Queued 3", SendOptions::queued()).await.unwrap();

        wait_for_idle(&agent).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stats = agent.queue_stats();
        assert_eq!(stats.queue_length, 0);

        let events = store.get_events(&thread_id).await.unwrap();
        let user_messages: Vec<String> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::UserMessage(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(user_messages, vec!["first", "Queued 1", "Queued 2", "Queued 3"]);
    }

    #[tokio::test]
    async fn high_priority_message_jumps_the_queue_before_drain() {
        let responses = (0..4)
            .map(|i| Ok(Response { content: format!("reply {i}"), ..Default::default() }))
            .collect();
        let (agent, store, thread_id) = new_agent(responses, lace_tools::ToolRegistry::new()).await;
        agent.start().await.unwrap();

        agent.send_message("first", SendOptions::default()).await.unwrap();
        agent.send_message("Normal 1", SendOptions::queued()).await.unwrap();
        agent.send_message("Normal 2", SendOptions::queued()).await.unwrap();
        agent.send_message("URGENT", SendOptions::high_priority()).await.unwrap();
        agent.send_message("Normal 3", SendOptions::queued()).await.unwrap();

        let stats = agent.queue_stats();
        assert_eq!(stats.queue_length, 4);
        assert_eq!(stats.high_priority_count, 1);

        wait_for_idle(&agent).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = store.get_events(&thread_id).await.unwrap();
        let user_messages: Vec<String> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::UserMessage(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(user_messages, vec!["first", "URGENT", "Normal 1", "Normal 2", "Normal 3"]);
    }

    #[test]
    fn build_messages_synthesizes_assistant_for_orphaned_tool_call() {
        let thread_id = ThreadId::from_raw("t");
        let events = vec![Event {
            id: lace_core::EventId::new(),
            thread_id: thread_id.clone(),
            timestamp: 1,
            kind: EventKind::ToolCall(ToolCallData {
                id: "call-1".into(),
                name: "bash".into(),
                arguments: serde_json::json!({"command": "ls"}),
            }),
        }];
        let messages = build_messages(&events);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].tool_calls.len(), 1);
    }

    #[test]
    fn orphaned_tool_calls_skips_resolved_ones() {
        let thread_id = ThreadId::from_raw("t");
        let call = Event {
            id: lace_core::EventId::new(),
            thread_id: thread_id.clone(),
            timestamp: 1,
            kind: EventKind::ToolCall(ToolCallData {
                id: "call-1".into(),
                name: "bash".into(),
                arguments: serde_json::json!({}),
            }),
        };
        let result = Event {
            id: lace_core::EventId::new(),
            thread_id: thread_id.clone(),
            timestamp: 2,
            kind: EventKind::ToolResult(ToolResultData {
                id: "call-1".into(),
                content: vec![ContentBlock::text("ok")],
                status: ToolResultStatus::Completed,
            }),
        };
        assert!(orphaned_tool_calls(&[call.clone(), result]).is_empty());
        assert_eq!(orphaned_tool_calls(&[call]).len(), 1);
    }
}
