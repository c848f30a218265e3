//! The Agent turn state machine, message queue, delegation, and session
//! orchestration (§4.H-§4.M). Built on `lace-core`'s event model and
//! `lace-provider`'s abstract provider port; owns no vendor-specific wire
//! format or CLI parsing -- those stay external collaborators (§1).

pub mod agent;
pub mod config;
pub mod delegate;
pub mod error;
pub mod events;
pub mod message_queue;
pub mod options;
pub mod runner;
pub mod session;
pub mod state;

pub use agent::{Agent, SendOptions};
pub use config::{EngineConfig, default_delegate_timeout};
pub use delegate::{DelegateCoordinator, DelegateTool, ProviderFactory};
pub use error::{AgentError, AgentResult};
pub use events::{AgentEvent, AgentEventKind, EventBus};
pub use message_queue::{MessageQueue, QueueStats, QueuedMessage};
pub use options::RunnerOptions;
pub use runner::NonInteractiveRunner;
pub use session::{Session, SpawnAgentOptions, get_session_temp_dir};
pub use state::AgentState;
