use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
///
/// Every message sequence it is asked to complete is recorded, so tests can check
/// exactly what the model would have seen.
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<Result<Message, String>>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            requests: Arc::default(),
        }
    }

    /// Queue a failed completion after the already configured responses
    pub fn with_error<S: Into<String>>(self, error: S) -> Self {
        lock(&self.responses).push_back(Err(error.into()));
        self
    }

    pub fn with_message(self, message: Message) -> Self {
        lock(&self.responses).push_back(Ok(message));
        self
    }

    /// The message sequences received so far, one entry per completion
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, messages: &[Message], _tools: &[Tool]) -> Result<(Message, Usage)> {
        lock(&self.requests).push(messages.to_vec());

        match lock(&self.responses).pop_front() {
            Some(Ok(message)) => Ok((message, Usage::default())),
            Some(Err(error)) => Err(anyhow!(error)),
            // Return empty response if no more pre-configured responses
            None => Ok((Message::assistant(""), Usage::default())),
        }
    }
}
