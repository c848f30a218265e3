use serde::{Deserialize, Serialize};

/// The four states of an agent's turn, per the state machine table (§4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Thinking,
    Streaming,
    ToolExecution,
}
