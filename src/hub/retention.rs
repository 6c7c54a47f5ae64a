//! Retention buffer for late-joiner replay
//!
//! Keeps the most recent content messages so that a subscriber connecting
//! after they were sent still sees recent history. The buffer is a bounded
//! FIFO: once `limit` entries are held, each push evicts the oldest one.

use std::collections::VecDeque;

use super::message::Message;

/// Bounded history of recent content messages
#[derive(Debug)]
pub struct RetentionBuffer {
    /// Maximum number of retained messages (0 disables retention)
    limit: usize,
    /// Retained messages, oldest first
    messages: VecDeque<Message>,
}

impl RetentionBuffer {
    /// Create a buffer holding at most `limit` messages
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            messages: VecDeque::with_capacity(limit.min(1024)),
        }
    }

    /// Whether retention is enabled
    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Record a message
    ///
    /// Pings and messages pushed into a disabled buffer are ignored.
    /// Returns true if the message was retained.
    pub fn push(&mut self, message: &Message) -> bool {
        if !self.is_enabled() || message.is_ping() {
            return false;
        }

        self.messages.push_back(message.clone());
        while self.messages.len() > self.limit {
            self.messages.pop_front();
        }
        true
    }

    /// Copy of the retained messages, oldest first
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if nothing is retained
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Configured limit
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Drop all retained messages
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
