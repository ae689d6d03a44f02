//! Conversation context: the message history a turn reads and appends to.
//!
//! The turn loop only ever appends. Truncation, persistence and token
//! accounting policies belong to the implementation behind the trait.

use std::sync::{Mutex, PoisonError};

use crate::message::{Message, Role};

/// Storage for the active conversation.
pub trait ConversationContext: Send + Sync {
    /// Append a message.
    fn add_message(&self, message: Message);

    /// The active history. With `include_tools = false`, tool messages are
    /// dropped and tool calls are stripped from assistant messages, for
    /// models that cannot accept them.
    fn messages(&self, include_tools: bool) -> Vec<Message>;

    /// Drop all history.
    fn clear(&self);

    /// Rough token count of the active history.
    fn estimated_tokens(&self) -> usize;

    /// Whether the conversation has grown long enough that a fresh chat
    /// would serve the user better.
    fn needs_new_chat(&self) -> bool {
        false
    }
}

/// A simple in-process context. Good for the CLI and for tests.
#[derive(Debug)]
pub struct InMemoryContext {
    messages: Mutex<Vec<Message>>,
    new_chat_threshold_tokens: usize,
}

impl InMemoryContext {
    pub fn new(new_chat_threshold_tokens: usize) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            new_chat_threshold_tokens,
        }
    }

    /// Replace the whole history, e.g. when loading a saved chat.
    pub fn replace(&self, messages: Vec<Message>) {
        *self.messages.lock().unwrap_or_else(PoisonError::into_inner) = messages;
    }

    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryContext {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl ConversationContext for InMemoryContext {
    fn add_message(&self, message: Message) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    fn messages(&self, include_tools: bool) -> Vec<Message> {
        let guard = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        if include_tools {
            return guard.clone();
        }

        guard
            .iter()
            .filter(|m| m.role != Role::Tool)
            .filter_map(|m| {
                let mut m = m.clone();
                if !m.tool_calls.is_empty() {
                    m.tool_calls.clear();
                    if m.content.is_empty() {
                        return None;
                    }
                }
                Some(m)
            })
            .collect()
    }

    fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn estimated_tokens(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|m| m.content.estimated_tokens())
            .sum()
    }

    fn needs_new_chat(&self) -> bool {
        self.estimated_tokens() > self.new_chat_threshold_tokens
    }
}
