use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::ToolCall;
use crate::tools::ToolRegistry;

/// What to do when a registered tool fails while running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolFailurePolicy {
    /// Answer the call with a tool message describing the error, so the model can react
    #[default]
    Report,
    /// Fail the turn
    Abort,
}

/// Runs tool calls against a registry and wraps each result as a tool message
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run a single tool call
    pub async fn execute(&self, tool_call: &ToolCall) -> AgentResult<Message> {
        let handler = self
            .registry
            .get(&tool_call.name)
            .ok_or_else(|| AgentError::UnknownTool(tool_call.name.clone()))?;

        tracing::info!(tool = %tool_call.name, id = %tool_call.id, "executing tool call");

        let output = handler
            .invoke(tool_call.arguments.clone())
            .await
            .map_err(|e| AgentError::tool_execution(&tool_call.name, format!("{:#}", e)))?;

        let content = serde_json::to_string(&output)
            .map_err(|e| AgentError::tool_execution(&tool_call.name, e))?;

        Ok(Message::tool(content, &tool_call.id, &tool_call.name))
    }

    /// Run every call of an assistant message in request order, one result message per call.
    ///
    /// Tool names are all checked before anything runs, so an unknown tool leaves no
    /// partial results behind.
    pub async fn execute_all(
        &self,
        tool_calls: &[ToolCall],
        policy: ToolFailurePolicy,
    ) -> AgentResult<Vec<Message>> {
        if let Some(unknown) = tool_calls
            .iter()
            .find(|call| !self.registry.contains(&call.name))
        {
            return Err(AgentError::UnknownTool(unknown.name.clone()));
        }

        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            match self.execute(call).await {
                Ok(message) => results.push(message),
                Err(AgentError::ToolExecution { tool, cause })
                    if policy == ToolFailurePolicy::Report =>
                {
                    tracing::warn!(tool = %tool, %cause, "tool call failed, reporting to model");
                    results.push(Message::tool(
                        format!("Error: {}", cause),
                        &call.id,
                        &call.name,
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }
}
