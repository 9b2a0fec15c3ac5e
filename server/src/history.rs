//! Append-only chat history replayed to newcomers

use shared::START_NEW_MESSAGES;

/// Every message delivered during this server run, in processing order
///
/// Retention is unbounded for the lifetime of the process.
#[derive(Debug, Default, Clone)]
pub struct ChatHistory {
    messages: Vec<String>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Backlog for a freshly accepted connection
    ///
    /// Yields the whole history followed by the start-of-new-messages marker.
    pub fn replay(&self) -> impl Iterator<Item = String> + '_ {
        self.messages
            .iter()
            .cloned()
            .chain(std::iter::once(START_NEW_MESSAGES.to_string()))
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
