//! Ordered conversation history.

use crate::core::message::{ChatMessage, MessageContent};

/// Insertion-ordered message history. Entries are never reordered or
/// deduplicated; the only in-place edit is rewriting the text of a trailing
/// assistant message.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replaces the text of the last message when it is an assistant text
    /// message, otherwise appends a new assistant message carrying `text`.
    ///
    /// Returns `true` when an existing message was rewritten.
    pub fn replace_last_assistant_or_append(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if let Some(last) = self.messages.last_mut() {
            if last.is_assistant() && last.content.is_text() {
                last.content = MessageContent::Text(text);
                return true;
            }
        }
        self.messages.push(ChatMessage::assistant(text));
        false
    }

    pub fn all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
