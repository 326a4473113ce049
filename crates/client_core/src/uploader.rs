use std::sync::Arc;

use shared::protocol::NewMessage;
use tracing::{info, warn};

use crate::{
    api::{MessageApi, SelectedFile},
    error::ChatError,
    mutation::{MutationTicket, PendingMutation},
    session::Shared,
};

/// Sequences the two-phase "store file, then publish message" workflow as one
/// logical operation.
///
/// The pending-mutation marker is held across both phases, blocking every
/// concurrent send, edit and delete. A phase-1 failure issues no creation
/// request and keeps the staged file for retry. A phase-2 failure leaves the
/// stored file orphaned server-side; the client does not clean it up.
pub struct AttachmentUploader {
    shared: Arc<Shared>,
    api: Arc<dyn MessageApi>,
}

impl AttachmentUploader {
    pub(crate) fn new(shared: Arc<Shared>, api: Arc<dyn MessageApi>) -> Self {
        Self { shared, api }
    }

    /// Stages a file for the next [`publish`](Self::publish), replacing any
    /// previously staged one.
    pub async fn select_file(&self, file: SelectedFile) {
        self.shared.state.lock().await.staged_file = Some(file);
    }

    pub async fn clear_file(&self) {
        self.shared.state.lock().await.staged_file = None;
    }

    pub async fn staged_file(&self) -> Option<SelectedFile> {
        self.shared.state.lock().await.staged_file.clone()
    }

    /// Runs both phases, strictly sequential and non-interruptible once
    /// started. Attachment messages are published with empty text.
    pub async fn publish(&self) -> Result<(), ChatError> {
        let (ticket, file) = {
            let mut state = self.shared.state.lock().await;
            let room = state.joined_room().cloned().ok_or(ChatError::NotJoined)?;
            let Some(file) = state.staged_file.clone() else {
                return Err(ChatError::Validation(
                    "no file staged for publishing".to_string(),
                ));
            };
            state.try_begin(PendingMutation::Uploading)?;
            (
                MutationTicket {
                    room,
                    author: state.user.clone(),
                    epoch: state.epoch,
                },
                file,
            )
        };

        let locator = match self.api.upload_file(&file).await {
            Ok(locator) => locator,
            Err(err) => {
                let mut state = self.shared.state.lock().await;
                state.clear_pending_if(ticket.epoch);
                warn!(filename = %file.filename, "upload failed: {err}");
                return Err(ChatError::UploadFailed(err));
            }
        };
        info!(filename = %file.filename, locator = %locator, "file stored; publishing message");

        let draft = NewMessage {
            author: ticket.author,
            text: String::new(),
            room: ticket.room,
            locator: Some(locator.clone()),
        };
        let result = self.api.create_message(&draft).await;

        let mut state = self.shared.state.lock().await;
        state.clear_pending_if(ticket.epoch);
        match result {
            Ok(created) => {
                if state.epoch == ticket.epoch {
                    state.staged_file = None;
                    state.draft.clear();
                }
                info!(id = %created.id, "attachment published; awaiting channel echo");
                Ok(())
            }
            Err(err) => {
                warn!(locator = %locator, "publish failed; stored file is orphaned server-side");
                Err(ChatError::PublishFailed(err))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/uploader_tests.rs"]
mod tests;
