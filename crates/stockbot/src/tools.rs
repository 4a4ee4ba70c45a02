use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result as AnyhowResult;
use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;
use crate::providers::utils::sanitize_function_name;

pub mod search;

/// Core trait that defines a capability the model can invoke
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The definition advertised to the model. Its name is the registry key.
    fn tool(&self) -> Tool;

    /// Run the tool with the model supplied arguments, returning any serializable value
    async fn invoke(&self, arguments: Value) -> AnyhowResult<Value>;
}

/// Maps tool names to their handlers. Built once, read-only afterwards.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    // Registration order, so the model always sees tools in the same order
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Definitions of every registered tool, in registration order
    pub fn tools(&self) -> Vec<Tool> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|handler| handler.tool())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistryBuilder {
    pub fn with_tool<T: ToolHandler + 'static>(mut self, handler: T) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn with_shared_tool(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> AgentResult<ToolRegistry> {
        let mut registry = ToolRegistry::default();
        for handler in self.handlers {
            let name = handler.tool().name;
            if name.is_empty() {
                return Err(AgentError::InvalidParameters(
                    "tool name must not be empty".to_string(),
                ));
            }
            if sanitize_function_name(&name) != name {
                return Err(AgentError::InvalidParameters(format!(
                    "tool name '{}' may only contain letters, digits, '_' and '-'",
                    name
                )));
            }
            if registry.handlers.contains_key(&name) {
                return Err(AgentError::InvalidParameters(format!(
                    "Duplicate tool name: {}",
                    name
                )));
            }
            registry.order.push(name.clone());
            registry.handlers.insert(name, handler);
        }
        Ok(registry)
    }
}
