use std::collections::HashSet;
use std::sync::Arc;

use crate::conversation::{ConversationStore, InMemoryStore};
use crate::errors::{AgentError, AgentResult};
use crate::executor::{ToolExecutor, ToolFailurePolicy};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::prompt_template::system_prompt;
use crate::providers::base::Provider;
use crate::router::{route, Route};
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_CYCLES: usize = 25;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Replaces the built-in system prompt when set
    pub system_prompt: Option<String>,
    /// Model invocations allowed within a single turn
    pub max_cycles: usize,
    pub tool_failure_policy: ToolFailurePolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_cycles: DEFAULT_MAX_CYCLES,
            tool_failure_policy: ToolFailurePolicy::default(),
        }
    }
}

/// Steps of a single turn. `Done` and `Failed` end it.
#[derive(Debug, Clone, PartialEq)]
enum TurnState {
    AwaitModel,
    Route,
    DispatchTools,
    Done(String),
    Failed(AgentError),
}

/// Agent drives a conversation between the user, the model and the registered tools
pub struct Agent {
    provider: Box<dyn Provider>,
    executor: ToolExecutor,
    store: Arc<dyn ConversationStore>,
    tools: Vec<Tool>,
    system_prompt: String,
    config: AgentConfig,
}

impl Agent {
    /// Create a new Agent with the specified provider and tools, keeping conversations in memory
    pub fn new(provider: Box<dyn Provider>, registry: ToolRegistry) -> AgentResult<Self> {
        let tools = registry.tools();
        let system_prompt =
            system_prompt(&tools).map_err(|e| AgentError::Internal(e.to_string()))?;

        Ok(Self {
            provider,
            executor: ToolExecutor::new(registry),
            store: Arc::new(InMemoryStore::new()),
            tools,
            system_prompt,
            config: AgentConfig::default(),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        if let Some(prompt) = &config.system_prompt {
            self.system_prompt = prompt.clone();
        }
        self.config = config;
        self
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn history(&self, thread_id: &str) -> Option<Vec<Message>> {
        self.store.history(thread_id).await
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        self.store.thread_ids().await
    }

    /// Answer `user_text` on `thread_id`, calling tools as often as the model asks for them.
    ///
    /// The thread stays locked for the whole turn, so concurrent turns on the same thread
    /// run one after the other. Messages appended before a failure are kept.
    pub async fn run_turn(&self, thread_id: &str, user_text: &str) -> AgentResult<String> {
        let conversation = self.store.get_or_create(thread_id).await;
        let _turn = conversation.begin_turn().await;
        conversation.append(Message::user(user_text));

        tracing::info!(thread_id, messages = conversation.len(), "turn started");

        let mut cycles = 0;
        let mut state = TurnState::AwaitModel;
        loop {
            state = match state {
                TurnState::AwaitModel if cycles >= self.config.max_cycles => {
                    TurnState::Failed(AgentError::TurnLimitExceeded(self.config.max_cycles))
                }
                TurnState::AwaitModel => {
                    cycles += 1;
                    match self.invoke_model(&conversation.snapshot()).await {
                        Ok(reply) => {
                            tracing::debug!(
                                thread_id,
                                cycle = cycles,
                                tool_calls = reply.tool_calls().len(),
                                "model responded"
                            );
                            conversation.append(reply);
                            TurnState::Route
                        }
                        Err(e) => TurnState::Failed(e),
                    }
                }
                TurnState::Route => match route(&conversation.snapshot()) {
                    Ok(Route::DispatchTools) => TurnState::DispatchTools,
                    Ok(Route::Terminate) => TurnState::Done(
                        conversation
                            .last()
                            .map(|message| message.content().to_string())
                            .unwrap_or_default(),
                    ),
                    Err(e) => TurnState::Failed(e),
                },
                TurnState::DispatchTools => {
                    let tool_calls = conversation
                        .last()
                        .map(|message| message.tool_calls().to_vec())
                        .unwrap_or_default();
                    match self
                        .executor
                        .execute_all(&tool_calls, self.config.tool_failure_policy)
                        .await
                    {
                        Ok(results) => {
                            for result in results {
                                conversation.append(result);
                            }
                            TurnState::AwaitModel
                        }
                        Err(e) => TurnState::Failed(e),
                    }
                }
                TurnState::Done(text) => {
                    tracing::info!(thread_id, cycles, "turn finished");
                    return Ok(text);
                }
                TurnState::Failed(error) => {
                    tracing::error!(thread_id, cycles, %error, "turn failed");
                    return Err(error);
                }
            };
        }
    }

    /// Call the model with the full conversation.
    ///
    /// The system prompt is only sent while the conversation holds exactly one message,
    /// that is on the first model call of a brand new thread. Later calls, including the
    /// ones after tool results in that same first turn, go without it.
    async fn invoke_model(&self, history: &[Message]) -> AgentResult<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if history.len() == 1 && !self.system_prompt.is_empty() {
            messages.push(Message::system(self.system_prompt.clone()));
        }
        messages.extend(without_unanswered_calls(history));

        let (reply, usage) = self
            .provider
            .complete(&messages, &self.tools)
            .await
            .map_err(|e| AgentError::ModelInvocation(format!("{:#}", e)))?;

        if !reply.is_assistant() {
            return Err(AgentError::ModelInvocation(format!(
                "expected an assistant message, got a {} message",
                reply.role()
            )));
        }
        reply
            .validate()
            .map_err(|e| AgentError::ModelInvocation(e.to_string()))?;

        tracing::debug!(
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "model usage"
        );
        Ok(reply)
    }
}

/// Drop tool calls that never got a result, as left behind by a failed turn.
///
/// Models reject a tool call that is not followed by its result. The stored history
/// keeps these calls; only the model input leaves them out, along with assistant
/// messages that end up with neither text nor calls.
fn without_unanswered_calls(messages: &[Message]) -> Vec<Message> {
    let answered: HashSet<&str> = messages.iter().filter_map(|m| m.tool_call_id()).collect();

    messages
        .iter()
        .filter_map(|message| match message {
            Message::Assistant {
                content,
                tool_calls,
            } if tool_calls.iter().any(|call| !answered.contains(call.id.as_str())) => {
                let kept: Vec<_> = tool_calls
                    .iter()
                    .filter(|call| answered.contains(call.id.as_str()))
                    .cloned()
                    .collect();
                tracing::debug!(
                    dropped = tool_calls.len() - kept.len(),
                    "leaving unanswered tool calls out of the model input"
                );
                if content.is_empty() && kept.is_empty() {
                    None
                } else {
                    Some(Message::Assistant {
                        content: content.clone(),
                        tool_calls: kept,
                    })
                }
            }
            _ => Some(message.clone()),
        })
        .collect()
}
