use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Tool '{tool}' failed: {cause}")]
    ToolExecution { tool: String, cause: String },

    #[error("No messages found in conversation")]
    NoMessages,

    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    #[error("Turn exceeded the limit of {0} model invocations")]
    TurnLimitExceeded(usize),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn tool_execution<T: Into<String>>(tool: T, cause: impl std::fmt::Display) -> Self {
        AgentError::ToolExecution {
            tool: tool.into(),
            cause: cause.to_string(),
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AgentError::UnknownTool("weather".into()).to_string(),
            "Tool not found: weather"
        );
        assert_eq!(
            AgentError::tool_execution("search", "timed out").to_string(),
            "Tool 'search' failed: timed out"
        );
        assert_eq!(
            AgentError::TurnLimitExceeded(25).to_string(),
            "Turn exceeded the limit of 25 model invocations"
        );
    }
}
