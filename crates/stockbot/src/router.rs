use serde::Serialize;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;

/// Where the turn goes after a model response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Route {
    DispatchTools,
    Terminate,
}

/// Decide the next step from the latest message of a conversation.
///
/// Only an assistant message with pending tool calls sends the turn to the executor.
pub fn route(messages: &[Message]) -> AgentResult<Route> {
    let latest = messages.last().ok_or(AgentError::NoMessages)?;
    if latest.has_tool_calls() {
        Ok(Route::DispatchTools)
    } else {
        Ok(Route::Terminate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolCall;
    use serde_json::json;

    #[test]
    fn test_empty_conversation() {
        assert_eq!(route(&[]), Err(AgentError::NoMessages));
    }

    #[test]
    fn test_tool_calls_dispatch() {
        let messages = vec![
            Message::user("What is AAPL trading at?"),
            Message::assistant("").with_tool_call(ToolCall::new(
                "1",
                "search",
                json!({"query": "AAPL stock price"}),
            )),
        ];
        assert_eq!(route(&messages), Ok(Route::DispatchTools));
    }

    #[test]
    fn test_plain_answer_terminates() {
        let messages = vec![Message::user("hi"), Message::assistant("Hello!")];
        assert_eq!(route(&messages), Ok(Route::Terminate));
    }

    #[test]
    fn test_only_latest_message_matters() {
        let messages = vec![
            Message::assistant("").with_tool_call(ToolCall::new("1", "search", json!({}))),
            Message::tool("{}", "1", "search"),
            Message::assistant("done"),
        ];
        assert_eq!(route(&messages), Ok(Route::Terminate));
    }
}
