use shared::{domain::MessageId, protocol::Message};

use crate::error::ChatError;

/// Ordered, ID-keyed message list for the currently joined room.
///
/// Every operation is synchronous and total: well-formed input never panics,
/// and a rejected input leaves the store exactly as it was. Relative order is
/// the order of first appearance since the most recent [`replace_all`].
///
/// [`replace_all`]: MessageStore::replace_all
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards prior content and loads a server-provided snapshot, keeping
    /// the server's order. Duplicate IDs within the snapshot collapse to the
    /// first position with the last content, matching [`upsert`] semantics.
    ///
    /// [`upsert`]: MessageStore::upsert
    pub fn replace_all(&mut self, messages: Vec<Message>) -> Result<(), ChatError> {
        if let Some(bad) = messages.iter().find(|m| m.id.as_str().trim().is_empty()) {
            return Err(ChatError::Validation(format!(
                "snapshot message from {:?} is missing an id",
                bad.author
            )));
        }
        self.messages.clear();
        for message in messages {
            // IDs were validated above, so this cannot fail.
            let _ = self.upsert(message);
        }
        Ok(())
    }

    /// Replaces the message with the same ID in place, or appends it.
    pub fn upsert(&mut self, message: Message) -> Result<(), ChatError> {
        if message.id.as_str().trim().is_empty() {
            return Err(ChatError::Validation(
                "message id must not be empty".to_string(),
            ));
        }
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => *slot = message,
            None => self.messages.push(message),
        }
        Ok(())
    }

    /// Applies an edit notification: replaces the text of the matching
    /// message, leaving ID, author and attachment untouched. An absent ID is
    /// a no-op; returns whether anything changed.
    pub fn apply_edit(&mut self, update: &Message) -> Result<bool, ChatError> {
        if update.id.as_str().trim().is_empty() {
            return Err(ChatError::Validation(
                "message id must not be empty".to_string(),
            ));
        }
        match self.messages.iter_mut().find(|m| m.id == update.id) {
            Some(slot) => {
                slot.text = update.text.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes the message with the given ID; a no-op when absent. Returns
    /// whether anything was removed.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != *id);
        self.messages.len() != before
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == *id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
