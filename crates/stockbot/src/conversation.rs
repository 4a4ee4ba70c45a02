//! Conversation state, keyed by thread id
//!
//! A conversation only ever grows: messages are appended and never edited or removed.
//! Every thread has its own turn lock, so a whole turn can hold the thread while
//! other threads keep making progress.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::models::message::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    thread_id: String,
    messages: Vec<Message>,
    #[serde(with = "chrono::serde::ts_seconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new<S: Into<String>>(thread_id: S) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

/// One thread: a turn lock plus the conversation it guards.
///
/// Running a turn holds `turn` until the turn ends, which keeps turns on the same thread
/// one after the other. The messages sit behind their own short-lived lock, so readers
/// get a snapshot without waiting for a running turn.
pub struct ConversationHandle {
    turn: Mutex<()>,
    conversation: StdRwLock<Conversation>,
}

impl ConversationHandle {
    pub fn new<S: Into<String>>(thread_id: S) -> Self {
        Self {
            turn: Mutex::new(()),
            conversation: StdRwLock::new(Conversation::new(thread_id)),
        }
    }

    /// Wait for any running turn on this thread, then hold the thread until the guard drops
    pub async fn begin_turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    pub fn append(&self, message: Message) {
        write(&self.conversation).append(message);
    }

    /// A copy of the messages so far
    pub fn snapshot(&self) -> Vec<Message> {
        read(&self.conversation).messages().to_vec()
    }

    pub fn len(&self) -> usize {
        read(&self.conversation).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.conversation).is_empty()
    }

    pub fn last(&self) -> Option<Message> {
        read(&self.conversation).last().cloned()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        read(&self.conversation).updated_at()
    }
}

// Appends are single pushes, so a poisoned lock still holds a consistent conversation
fn read(lock: &StdRwLock<Conversation>) -> RwLockReadGuard<'_, Conversation> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(lock: &StdRwLock<Conversation>) -> RwLockWriteGuard<'_, Conversation> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A conversation shared between the store and whoever is running a turn on it
pub type SharedConversation = Arc<ConversationHandle>;

/// Backing storage for conversations
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Get the conversation for `thread_id`, creating an empty one if it does not exist yet
    async fn get_or_create(&self, thread_id: &str) -> SharedConversation;

    /// Append a message to the conversation for `thread_id`
    async fn append(&self, thread_id: &str, message: Message) {
        self.get_or_create(thread_id).await.append(message);
    }

    /// A copy of the messages of an existing thread. Does not wait for a running turn.
    async fn history(&self, thread_id: &str) -> Option<Vec<Message>>;

    /// All known thread ids, sorted
    async fn thread_ids(&self) -> Vec<String>;
}

/// Keeps every conversation in process memory for the lifetime of the store
#[derive(Default)]
pub struct InMemoryStore {
    threads: RwLock<HashMap<String, SharedConversation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, thread_id: &str) -> Option<SharedConversation> {
        self.threads.read().await.get(thread_id).cloned()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_or_create(&self, thread_id: &str) -> SharedConversation {
        if let Some(conversation) = self.get(thread_id).await {
            return conversation;
        }

        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(thread_id, "creating conversation");
                Arc::new(ConversationHandle::new(thread_id))
            })
            .clone()
    }

    async fn history(&self, thread_id: &str) -> Option<Vec<Message>> {
        Some(self.get(thread_id).await?.snapshot())
    }

    async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = InMemoryStore::new();
        let first = store.get_or_create("a").await;
        first.append(Message::user("hello"));

        let second = store.get_or_create("a").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = InMemoryStore::new();
        store.append("a", Message::user("one")).await;
        store.append("a", Message::assistant("two")).await;
        store.append("a", Message::user("three")).await;

        let history = store.history("a").await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let store = InMemoryStore::new();
        store.append("A", Message::user("for a")).await;
        store.append("B", Message::user("for b")).await;
        store.append("B", Message::assistant("reply b")).await;

        assert_eq!(store.history("A").await.unwrap(), vec![Message::user("for a")]);
        assert_eq!(store.history("B").await.unwrap().len(), 2);
        assert_eq!(store.thread_ids().await, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_thread_has_no_history() {
        let store = InMemoryStore::new();
        assert!(store.history("missing").await.is_none());
        assert!(store.thread_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_held_thread_does_not_block_others() {
        let store = InMemoryStore::new();
        let a = store.get_or_create("A").await;
        let _turn = a.begin_turn().await;

        // Another thread id is still writable while "A" is locked
        store.append("B", Message::user("independent")).await;
        assert_eq!(store.history("B").await.unwrap().len(), 1);

        let b = store.get_or_create("B").await;
        let second_turn = tokio::time::timeout(Duration::from_millis(100), b.begin_turn()).await;
        assert!(second_turn.is_ok());
    }

    #[tokio::test]
    async fn test_history_does_not_wait_for_running_turn() {
        let store = InMemoryStore::new();
        let a = store.get_or_create("A").await;
        let _turn = a.begin_turn().await;
        a.append(Message::user("in flight"));

        let history = tokio::time::timeout(Duration::from_millis(100), store.history("A"))
            .await
            .expect("history blocked on the turn lock");
        assert_eq!(history, Some(vec![Message::user("in flight")]));

        // A second turn on the same thread does wait
        let second_turn = tokio::time::timeout(Duration::from_millis(50), a.begin_turn()).await;
        assert!(second_turn.is_err());
    }

    #[test]
    fn test_append_updates_timestamp() {
        let mut conversation = Conversation::new("t");
        let created = conversation.created_at();
        conversation.append(Message::user("hi"));
        assert!(conversation.updated_at() >= created);
        assert_eq!(conversation.thread_id(), "t");
        assert_eq!(conversation.last(), Some(&Message::user("hi")));
    }
}
