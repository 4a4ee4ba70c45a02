use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::role::Role;
use super::tool::ToolCall;
use crate::errors::{AgentError, AgentResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
/// A message to or from an LLM
///
/// Each role carries only the fields that make sense for it: tool calls can only be
/// requested by the assistant, and only tool messages answer a specific call.
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
        name: String,
    },
}

impl Message {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create an assistant message with text and no tool calls
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message requesting the given tool calls, rejecting duplicate ids
    pub fn assistant_with_tool_calls<S: Into<String>>(
        content: S,
        tool_calls: Vec<ToolCall>,
    ) -> AgentResult<Self> {
        let message = Message::Assistant {
            content: content.into(),
            tool_calls,
        };
        message.validate()?;
        Ok(message)
    }

    /// Create the result message answering the tool call `tool_call_id`
    pub fn tool<C, I, N>(content: C, tool_call_id: I, name: N) -> Self
    where
        C: Into<String>,
        I: Into<String>,
        N: Into<String>,
    {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: name.into(),
        }
    }

    /// Add a tool call to an assistant message. Other roles are returned unchanged.
    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        if let Message::Assistant { tool_calls, .. } = &mut self {
            tool_calls.push(tool_call);
        }
        self
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content.as_str(),
        }
    }

    /// The tool calls requested by this message, empty for anything but the assistant
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls.as_slice(),
            _ => &[],
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant { .. })
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// Check the role-specific fields
    pub fn validate(&self) -> AgentResult<()> {
        match self {
            Message::Assistant { tool_calls, .. } => {
                let mut seen = HashSet::new();
                for call in tool_calls {
                    if call.id.is_empty() {
                        return Err(AgentError::InvalidParameters(format!(
                            "tool call for '{}' has an empty id",
                            call.name
                        )));
                    }
                    if !seen.insert(call.id.as_str()) {
                        return Err(AgentError::InvalidParameters(format!(
                            "duplicate tool call id '{}'",
                            call.id
                        )));
                    }
                }
                Ok(())
            }
            Message::Tool {
                tool_call_id, name, ..
            } => {
                if tool_call_id.is_empty() || name.is_empty() {
                    return Err(AgentError::InvalidParameters(
                        "tool message requires a tool_call_id and a name".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
