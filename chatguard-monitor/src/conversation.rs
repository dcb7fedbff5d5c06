//! Append-only conversation log
//!
//! Messages are numbered by the log on append: `sequence_index` starts at 0
//! and is gapless. Messages are shared (`Arc`) with analysis windows rather
//! than copied.

use crate::error::{MonitorError, Result};
use std::sync::Arc;

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub text: String,
    /// Position in the conversation (0-based)
    pub sequence_index: usize,
}

/// Ordered record of one session's messages
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<Arc<Message>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, assigning the next sequence index
    ///
    /// Empty senders and blank text are rejected and leave the log untouched.
    pub fn append(&mut self, sender: &str, text: &str) -> Result<Arc<Message>> {
        let sender = sender.trim();
        if sender.is_empty() {
            return Err(MonitorError::InvalidMessage(
                "sender must not be empty".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(MonitorError::InvalidMessage(
                "message text must not be empty".to_string(),
            ));
        }

        let message = Arc::new(Message {
            sender: sender.to_string(),
            text: text.to_string(),
            sequence_index: self.messages.len(),
        });
        self.messages.push(Arc::clone(&message));
        Ok(message)
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Discard all messages; numbering restarts at 0
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
