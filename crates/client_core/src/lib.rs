//! Session synchronization core for a room-scoped chat client.
//!
//! Keeps a locally-held, ordered message list consistent with a remote source
//! of truth reachable through a request/response API and a push-event
//! channel. The [`SessionController`] owns room membership and the list;
//! the [`MutationCoordinator`] serializes user-initiated writes; the
//! [`AttachmentUploader`] sequences the two-phase upload-then-publish
//! workflow. Message content only ever changes through confirmed snapshot
//! loads and channel events, so a failed mutation can never corrupt the list.

pub mod api;
pub mod channel;
pub mod error;
pub mod mutation;
pub mod session;
pub mod store;
pub mod uploader;

pub use api::{HttpApi, MessageApi, SelectedFile};
pub use channel::{handler, ChannelClient, EventHandler, EventKind, EventTransport, WsTransport};
pub use error::ChatError;
pub use mutation::{EditBuffer, MutationCoordinator, PendingMutation};
pub use session::{Membership, SessionController, SessionEvent};
pub use store::MessageStore;
pub use uploader::AttachmentUploader;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
