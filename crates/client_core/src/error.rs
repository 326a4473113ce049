use shared::domain::{MessageId, RoomId};
use thiserror::Error;

use crate::mutation::PendingMutation;

/// Failure taxonomy for the session core.
///
/// Network and API failures are caught at the component that issued the
/// request and surfaced as one of these variants; they never propagate past
/// that component and never leave the message store in a partial state.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to join room {room}: {source}")]
    JoinFailed {
        room: RoomId,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to send message: {0}")]
    SendFailed(#[source] anyhow::Error),
    #[error("failed to save edit for message {id}: {source}")]
    EditFailed {
        id: MessageId,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to delete message {id}: {source}")]
    DeleteFailed {
        id: MessageId,
        #[source]
        source: anyhow::Error,
    },
    #[error("file upload failed: {0}")]
    UploadFailed(#[source] anyhow::Error),
    #[error("file stored but message publish failed: {0}")]
    PublishFailed(#[source] anyhow::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("rejected: {0} already in flight")]
    MutationInFlight(PendingMutation),
    #[error("not joined to a room")]
    NotJoined,
    #[error("already joined or joining a room")]
    AlreadyJoined,
}
