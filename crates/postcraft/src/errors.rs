use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised while a role dispatches a tool call. These are reported back
/// to the model as tool output rather than aborting the run.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Failures that abort a topic-to-post run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("{role} produced no message")]
    EmptyConversation { role: String },

    #[error("{role} exceeded {max_turns} model turns without finishing")]
    TurnLimitExceeded { role: String, max_turns: usize },
}
