use std::sync::Arc;

use shared::{
    domain::{MessageId, RoomId},
    protocol::NewMessage,
};
use tracing::{info, warn};

use crate::{api::MessageApi, error::ChatError, session::Shared};

/// The single in-flight mutation marker. Exactly one of these may be active
/// per session; disallowed transitions are rejected with
/// [`ChatError::MutationInFlight`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PendingMutation {
    #[default]
    None,
    Sending,
    Uploading,
    Editing(MessageId),
    Deleting(MessageId),
}

impl std::fmt::Display for PendingMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("no mutation"),
            Self::Sending => f.write_str("a send"),
            Self::Uploading => f.write_str("an upload"),
            Self::Editing(id) => write!(f, "an edit of message {id}"),
            Self::Deleting(id) => write!(f, "a delete of message {id}"),
        }
    }
}

/// The at-most-one in-progress local edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    pub id: MessageId,
    pub text: String,
}

pub(crate) struct MutationTicket {
    pub(crate) room: RoomId,
    pub(crate) author: String,
    pub(crate) epoch: u64,
}

/// Serializes user-initiated write actions against the API.
///
/// Mutation endpoints confirm only that a request was accepted; message
/// content always arrives through the event channel, so none of these calls
/// writes the message store directly. A failed request leaves the store and
/// the local drafts exactly as they were.
pub struct MutationCoordinator {
    shared: Arc<Shared>,
    api: Arc<dyn MessageApi>,
}

impl MutationCoordinator {
    pub(crate) fn new(shared: Arc<Shared>, api: Arc<dyn MessageApi>) -> Self {
        Self { shared, api }
    }

    /// Issues a creation request for the given text. The echo of the created
    /// message arrives via the channel; on failure the draft is kept so the
    /// user can retry.
    pub async fn send(&self, text: &str) -> Result<(), ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Validation(
                "message text must not be empty".to_string(),
            ));
        }

        let ticket = {
            let mut state = self.shared.state.lock().await;
            let room = state.joined_room().cloned().ok_or(ChatError::NotJoined)?;
            if state.staged_file.is_some() {
                return Err(ChatError::Validation(
                    "a file is staged; publish or clear it before sending text".to_string(),
                ));
            }
            state.try_begin(PendingMutation::Sending)?;
            state.draft = trimmed.to_string();
            MutationTicket {
                room,
                author: state.user.clone(),
                epoch: state.epoch,
            }
        };

        let draft = NewMessage {
            author: ticket.author,
            text: trimmed.to_string(),
            room: ticket.room,
            locator: None,
        };
        let result = self.api.create_message(&draft).await;

        let mut state = self.shared.state.lock().await;
        state.clear_pending_if(ticket.epoch);
        match result {
            Ok(created) => {
                if state.epoch == ticket.epoch {
                    state.draft.clear();
                }
                info!(id = %created.id, "send accepted; awaiting channel echo");
                Ok(())
            }
            Err(err) => {
                warn!("send failed: {err}");
                Err(ChatError::SendFailed(err))
            }
        }
    }

    /// Opens the edit buffer for a message. Purely local; always succeeds.
    pub async fn start_edit(&self, id: &MessageId, current_text: &str) {
        let mut state = self.shared.state.lock().await;
        state.edit = Some(EditBuffer {
            id: id.clone(),
            text: current_text.to_string(),
        });
        state.actions_for = None;
    }

    /// Discards the edit buffer. Purely local; always succeeds.
    pub async fn cancel_edit(&self) {
        let mut state = self.shared.state.lock().await;
        state.edit = None;
        state.actions_for = None;
    }

    /// Issues an edit request. The list itself is updated later by the
    /// `edit_message` event, never by this call; success only clears the edit
    /// buffer, failure keeps it for retry or cancel.
    pub async fn save_edit(&self, id: &MessageId, new_text: &str) -> Result<(), ChatError> {
        let trimmed = new_text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Validation(
                "edited text must not be empty".to_string(),
            ));
        }

        let epoch = {
            let mut state = self.shared.state.lock().await;
            if state.joined_room().is_none() {
                return Err(ChatError::NotJoined);
            }
            state.try_begin(PendingMutation::Editing(id.clone()))?;
            state.epoch
        };

        // The response body is the server-normalized message; the
        // authoritative copy still arrives through the event channel.
        let result = self.api.update_message(id, trimmed).await;

        let mut state = self.shared.state.lock().await;
        state.clear_pending_if(epoch);
        match result {
            Ok(_updated) => {
                if state.epoch == epoch {
                    if state.edit.as_ref().is_some_and(|e| e.id == *id) {
                        state.edit = None;
                    }
                    state.actions_for = None;
                }
                Ok(())
            }
            Err(err) => {
                warn!(id = %id, "edit failed: {err}");
                Err(ChatError::EditFailed {
                    id: id.clone(),
                    source: err,
                })
            }
        }
    }

    /// Issues a delete request. Removal from the list is event-driven; this
    /// call only clears the action-menu selection, on success and on failure
    /// alike.
    pub async fn delete(&self, id: &MessageId) -> Result<(), ChatError> {
        let epoch = {
            let mut state = self.shared.state.lock().await;
            if state.joined_room().is_none() {
                return Err(ChatError::NotJoined);
            }
            state.try_begin(PendingMutation::Deleting(id.clone()))?;
            state.epoch
        };

        let result = self.api.delete_message(id).await;

        let mut state = self.shared.state.lock().await;
        state.clear_pending_if(epoch);
        if state.epoch == epoch && state.actions_for.as_ref() == Some(id) {
            state.actions_for = None;
        }
        result.map_err(|err| {
            warn!(id = %id, "delete failed: {err}");
            ChatError::DeleteFailed {
                id: id.clone(),
                source: err,
            }
        })
    }

    pub async fn set_draft(&self, text: &str) {
        self.shared.state.lock().await.draft = text.to_string();
    }

    pub async fn draft(&self) -> String {
        self.shared.state.lock().await.draft.clone()
    }

    pub async fn edit_buffer(&self) -> Option<EditBuffer> {
        self.shared.state.lock().await.edit.clone()
    }

    /// Toggles the per-message action menu selection.
    pub async fn toggle_actions(&self, id: &MessageId) {
        let mut state = self.shared.state.lock().await;
        state.actions_for = if state.actions_for.as_ref() == Some(id) {
            None
        } else {
            Some(id.clone())
        };
    }

    pub async fn actions_for(&self) -> Option<MessageId> {
        self.shared.state.lock().await.actions_for.clone()
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
