//! `Session` (§4.L): owns a coordinator Agent on the session's root thread,
//! a set of spawned Agents, and the project/working directory those agents
//! share. Grounded on the teacher's `querymt/src/session/mod.rs` registry
//! shape, generalized from a flat session map to one coordinator plus
//! spawned children.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lace_core::{ThreadManager, ThreadStore};
use lace_provider::ProviderPort;
use parking_lot::RwLock;
use tracing::instrument;

use crate::agent::Agent;
use crate::config::EngineConfig;
use crate::error::{AgentError, AgentResult};

/// Request shape for `Session::spawn_agent`. `provider_instance_id` is
/// opaque to the session -- it is handed to the `ProviderFactory` the
/// embedder configured, not interpreted here.
#[derive(Debug, Clone, Default)]
pub struct SpawnAgentOptions {
    pub name: String,
    pub provider_instance_id: Option<String>,
    pub model_id: Option<String>,
}

struct SpawnedAgent {
    agent: Agent,
}

/// A single project/working-directory scope holding one coordinator Agent
/// and any number of spawned Agents, all sharing the session's temp-dir
/// root (§4.L, §1 "Ownership & lifecycle").
pub struct Session {
    project_id: String,
    session_id: String,
    working_directory: PathBuf,
    thread_manager: Arc<ThreadManager>,
    default_provider: Arc<dyn ProviderPort>,
    default_config: EngineConfig,
    coordinator: Agent,
    spawned: RwLock<HashMap<String, SpawnedAgent>>,
}

impl Session {
    /// `create`: builds the coordinator Agent on a fresh root thread and
    /// returns the owning `Session`.
    #[instrument(skip(thread_manager, default_provider, tool_executor, default_config))]
    pub async fn create(
        project_id: impl Into<String>,
        session_id: impl Into<String>,
        working_directory: PathBuf,
        thread_manager: Arc<ThreadManager>,
        default_provider: Arc<dyn ProviderPort>,
        tool_executor: Arc<lace_tools::ToolExecutor>,
        default_config: EngineConfig,
    ) -> AgentResult<Self> {
        let project_id = project_id.into();
        let session_id = session_id.into();
        let root_thread = thread_manager.create_thread().await?;
        let coordinator = Agent::with_working_directory(
            root_thread,
            thread_manager.store().clone(),
            default_provider.clone(),
            tool_executor,
            default_config.clone(),
            Some(working_directory.clone()),
        );
        coordinator.start().await?;

        Ok(Self {
            project_id,
            session_id,
            working_directory,
            thread_manager,
            default_provider,
            default_config,
            coordinator,
            spawned: RwLock::new(HashMap::new()),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn coordinator(&self) -> &Agent {
        &self.coordinator
    }

    /// Spawns a new Agent on its own delegate thread under the
    /// coordinator's root, registered under `options.name` for later
    /// lookup. Falls back to the session's default provider/config when
    /// `options` doesn't override them.
    pub async fn spawn_agent(
        &self,
        options: SpawnAgentOptions,
        provider: Option<Arc<dyn ProviderPort>>,
        tool_executor: Arc<lace_tools::ToolExecutor>,
    ) -> AgentResult<Agent> {
        let thread_id = self
            .thread_manager
            .create_delegate_thread(self.coordinator.thread_id())
            .await?;
        let provider = provider.unwrap_or_else(|| self.default_provider.clone());
        let agent = Agent::with_working_directory(
            thread_id,
            self.thread_manager.store().clone(),
            provider,
            tool_executor,
            self.default_config.clone(),
            Some(self.working_directory.clone()),
        );
        self.spawned
            .write()
            .insert(options.name, SpawnedAgent { agent: agent.clone() });
        Ok(agent)
    }

    pub fn get_agent(&self, name: &str) -> Option<Agent> {
        self.spawned.read().get(name).map(|s| s.agent.clone())
    }

    pub async fn start_agent(&self, name: &str) -> AgentResult<()> {
        let agent = self.get_agent(name).ok_or_else(|| AgentError::AgentNotFound(name.to_string()))?;
        agent.start().await
    }

    pub async fn stop_agent(&self, name: &str) -> AgentResult<()> {
        let agent = self.get_agent(name).ok_or_else(|| AgentError::AgentNotFound(name.to_string()))?;
        agent.stop().await;
        Ok(())
    }

    /// Stops every spawned agent (the coordinator is retained, per §4.L).
    pub async fn destroy(&self) {
        let agents: Vec<Agent> = self.spawned.read().values().map(|s| s.agent.clone()).collect();
        for agent in agents {
            agent.stop().await;
        }
        self.spawned.write().clear();
    }

    /// Deterministic per-session temp directory: `<root>/project-<projectId>/session-<sessionId>`.
    /// Identical inputs always return the same path; distinct sessions
    /// under the same project share the project directory but get
    /// disjoint session directories (§4.L).
    pub fn get_session_temp_dir(&self, temp_root: &Path) -> PathBuf {
        get_session_temp_dir(temp_root, &self.session_id, &self.project_id)
    }
}

/// Free-standing form of the deterministic path rule, usable before a
/// `Session` exists (e.g. to pre-create a directory for `ToolExecutor`).
pub fn get_session_temp_dir(temp_root: &Path, session_id: &str, project_id: &str) -> PathBuf {
    temp_root.join(format!("project-{project_id}")).join(format!("session-{session_id}"))
}
