//! `DelegateCoordinator` and the `delegate` tool (§4.J): spawns a bounded
//! child `Agent` on a delegate thread, relays its prompt to completion (or
//! timeout), and returns the collected response as a tool result.
//!
//! Grounded on the teacher's `delegation/core.rs` orchestration shape,
//! trimmed to a single synchronous round-trip instead of its actor mesh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lace_core::{ContentBlock, EventKind, ThreadId, ThreadManager, ThreadStore};
use lace_provider::{ProviderPort, TokenBudgetConfig};
use lace_tools::{Tool, ToolAnnotations, ToolContext, ToolError, ToolExecutor, ToolRegistry};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::agent::{Agent, SendOptions};
use crate::config::{EngineConfig, default_delegate_timeout};
use crate::events::AgentEventKind;

/// Builds a `ProviderPort` for a named vendor and model, so the coordinator
/// can honor the `delegate` tool's optional `provider:model` override
/// without depending on any concrete vendor crate itself.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, provider_name: &str, model: &str) -> Result<Arc<dyn ProviderPort>, String>;
}

#[derive(Debug, Deserialize)]
struct DelegateArgs {
    title: String,
    prompt: String,
    expected_response: String,
    #[serde(default)]
    model: Option<String>,
}

/// Everything a `delegate` call needs that does not change between calls:
/// the parent's thread/tool lineage, and the defaults a child Agent is
/// built with.
pub struct DelegateCoordinator {
    thread_manager: Arc<ThreadManager>,
    store: Arc<dyn ThreadStore>,
    parent_thread_id: ThreadId,
    parent_provider: Arc<dyn ProviderPort>,
    provider_factory: Arc<dyn ProviderFactory>,
    child_tools: ToolRegistry,
    config: EngineConfig,
    timeout: Duration,
}

impl DelegateCoordinator {
    pub fn new(
        thread_manager: Arc<ThreadManager>,
        parent_thread_id: ThreadId,
        parent_provider: Arc<dyn ProviderPort>,
        provider_factory: Arc<dyn ProviderFactory>,
        parent_tools: &ToolRegistry,
        config: EngineConfig,
    ) -> Self {
        let store = thread_manager.store().clone();
        Self {
            thread_manager,
            store,
            parent_thread_id,
            parent_provider,
            provider_factory,
            // Step 2: no unbounded recursion.
            child_tools: parent_tools.without("delegate"),
            config,
            timeout: default_delegate_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Step 1: the agent's current provider, or a `provider:model` override.
    fn resolve_provider(&self, model: Option<&str>) -> Result<Arc<dyn ProviderPort>, String> {
        let Some(spec) = model else {
            return Ok(self.parent_provider.clone());
        };
        let Some((provider_name, model_name)) = spec.split_once(':') else {
            return Err(format!("invalid delegate model spec '{spec}': expected provider:model"));
        };
        if provider_name.is_empty() || model_name.is_empty() {
            return Err(format!("invalid delegate model spec '{spec}': expected provider:model"));
        }
        self.provider_factory.create(provider_name, model_name)
    }

    /// Runs one full delegate round-trip (§4.J steps 1-5) and returns the
    /// text to hand back as the tool's result content.
    #[instrument(skip(self, args, cancel))]
    async fn run(&self, args: DelegateArgs, cancel: CancellationToken) -> Result<String, String> {
        let provider = self.resolve_provider(args.model.as_deref())?;

        let child_thread_id = self
            .thread_manager
            .create_delegate_thread(&self.parent_thread_id)
            .await
            .map_err(|e| e.to_string())?;

        let system_prompt = format!(
            "You are a delegated sub-agent working on: {}\n\nExpected response: {}",
            args.title, args.expected_response
        );
        self.store
            .append_event(&child_thread_id, EventKind::SystemPrompt(system_prompt))
            .await
            .map_err(|e| e.to_string())?;

        let mut child_config = self.config.clone();
        child_config.token_budget = Some(TokenBudgetConfig::delegate_default());

        let approval = Arc::new(lace_tools::ApprovalGate::new(self.store.clone()));
        let temp_dir = self.config.temp_dir_root.join(child_thread_id.as_str());
        let executor = Arc::new(ToolExecutor::new(self.child_tools.clone(), approval, temp_dir));

        let child = Agent::new(child_thread_id, self.store.clone(), provider, executor, child_config);
        child.start().await.map_err(|e| e.to_string())?;
        let mut events = child.subscribe();

        child
            .send_message(args.prompt, SendOptions::default())
            .await
            .map_err(|e| e.to_string())?;

        let result = self.collect_until_done(&mut events, cancel).await;
        child.stop().await;
        result
    }

    async fn collect_until_done(
        &self,
        events: &mut broadcast::Receiver<crate::events::AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        let mut collected = String::new();
        let sleep = tokio::time::sleep(self.timeout);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                received = events.recv() => {
                    match received {
                        Ok(event) => match event.kind {
                            AgentEventKind::AgentResponseComplete { content } => {
                                if !collected.is_empty() {
                                    collected.push('\n');
                                }
                                collected.push_str(&content);
                            }
                            AgentEventKind::ConversationComplete => return Ok(collected),
                            AgentEventKind::Error { error, .. } => return Err(error),
                            _ => {}
                        },
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err("delegate event stream closed unexpectedly".to_string());
                        }
                    }
                }
                _ = &mut sleep => {
                    return Err(format!("delegate call timed out after {:?}", self.timeout));
                }
                _ = cancel.cancelled() => {
                    return Err("delegate call cancelled".to_string());
                }
            }
        }
    }
}

/// The `delegate` tool: wraps a `DelegateCoordinator` so it can be
/// registered into a parent Agent's `ToolRegistry` like any other tool.
pub struct DelegateTool {
    coordinator: Arc<DelegateCoordinator>,
}

impl DelegateTool {
    pub fn new(coordinator: Arc<DelegateCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Delegate a focused sub-task to a child agent and return its response."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Short label for the sub-task." },
                "prompt": { "type": "string", "description": "The instructions given to the child agent." },
                "expected_response": { "type": "string", "description": "What shape of answer the caller wants back." },
                "model": { "type": "string", "description": "Optional provider:model override." },
            },
            "required": ["title", "prompt", "expected_response"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::builder()
            .title("Delegate to sub-agent")
            .destructive(true)
            .open_world(true)
    }

    async fn execute_validated(&self, args: Value, ctx: &ToolContext) -> Result<Vec<ContentBlock>, ToolError> {
        let args: DelegateArgs = serde_json::from_value(args).map_err(|e| ToolError::Validation {
            path: "$".into(),
            message: e.to_string(),
        })?;

        match self.coordinator.run(args, ctx.cancel.child_token()).await {
            Ok(text) => Ok(vec![ContentBlock::text(text)]),
            Err(message) => Err(ToolError::Internal(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lace_core::store::InMemoryThreadStore;
    use lace_provider::{ProviderResult, Response, ScriptedProvider};

    struct StubFactory;
    impl ProviderFactory for StubFactory {
        fn create(&self, provider_name: &str, _model: &str) -> Result<Arc<dyn ProviderPort>, String> {
            Err(format!("no such provider: {provider_name}"))
        }
    }

    fn coordinator(
        script: Vec<ProviderResult<Response>>,
    ) -> (Arc<DelegateCoordinator>, Arc<dyn ThreadStore>, ThreadId) {
        let store: Arc<dyn ThreadStore> = Arc::new(InMemoryThreadStore::new());
        let manager = Arc::new(ThreadManager::new(store.clone()));
        let parent_thread_id = ThreadId::from_raw("lace_20250101_abc123");
        let provider: Arc<dyn ProviderPort> = Arc::new(ScriptedProvider::new(script));
        let coordinator = DelegateCoordinator::new(
            manager,
            parent_thread_id.clone(),
            provider,
            Arc::new(StubFactory),
            &ToolRegistry::new(),
            EngineConfig::default(),
        )
        .with_timeout(Duration::from_secs(2));
        (Arc::new(coordinator), store, parent_thread_id)
    }

    #[tokio::test]
    async fn successful_delegate_returns_collected_response() {
        let (coordinator, _store, _parent) = coordinator(vec![Ok(Response {
            content: "the answer is 42".into(),
            ..Default::default()
        })]);
        let args = DelegateArgs {
            title: "answer a question".into(),
            prompt: "what is the answer?".into(),
            expected_response: "a number".into(),
            model: None,
        };
        let result = coordinator.run(args, CancellationToken::new()).await;
        assert_eq!(result.unwrap(), "the answer is 42");
    }

    #[tokio::test]
    async fn delegate_spawns_a_child_thread_under_the_parent() {
        let (coordinator, store, parent) = coordinator(vec![Ok(Response {
            content: "done".into(),
            ..Default::default()
        })]);
        store.create_thread(&parent).await.unwrap();
        let args = DelegateArgs {
            title: "t".into(),
            prompt: "p".into(),
            expected_response: "r".into(),
            model: None,
        };
        coordinator.run(args, CancellationToken::new()).await.unwrap();
        let children = store.direct_children(&parent).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].as_str(), format!("{parent}.1"));
    }

    #[tokio::test]
    async fn malformed_model_spec_is_rejected_before_spawning() {
        let (coordinator, _store, _parent) = coordinator(vec![]);
        let args = DelegateArgs {
            title: "t".into(),
            prompt: "p".into(),
            expected_response: "r".into(),
            model: Some("not-a-valid-spec".into()),
        };
        let result = coordinator.run(args, CancellationToken::new()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("invalid delegate model spec"));
    }

    #[tokio::test]
    async fn timeout_surfaces_as_an_error_message() {
        let (coordinator, _store, _parent) = {
            let store: Arc<dyn ThreadStore> = Arc::new(InMemoryThreadStore::new());
            let manager = Arc::new(ThreadManager::new(store.clone()));
            let parent_thread_id = ThreadId::from_raw("lace_20250101_abc123");
            // A script with zero responses never resolves `agent_response_complete`,
            // forcing the collector to hit the wall-clock deadline.
            let provider: Arc<dyn ProviderPort> = Arc::new(ScriptedProvider::new(vec![]).non_streaming());
            let coordinator = DelegateCoordinator::new(
                manager,
                parent_thread_id.clone(),
                provider,
                Arc::new(StubFactory),
                &ToolRegistry::new(),
                EngineConfig::default(),
            )
            .with_timeout(Duration::from_millis(50));
            (Arc::new(coordinator), store, parent_thread_id)
        };
        let args = DelegateArgs {
            title: "t".into(),
            prompt: "p".into(),
            expected_response: "r".into(),
            model: None,
        };
        // ScriptedProvider panics on an exhausted script rather than hanging;
        // what we exercise here is that the coordinator's own select loop
        // terminates the wait with a timeout message rather than hanging,
        // which `with_timeout` bounds regardless of provider behavior.
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            coordinator.run(args, CancellationToken::new()),
        )
        .await;
        assert!(result.is_ok(), "coordinator.run must not hang past its own timeout");
    }
}
