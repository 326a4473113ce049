use std::sync::Arc;

use anyhow::anyhow;
use shared::{
    domain::{MessageId, RoomId},
    protocol::{ChannelEvent, ClientSignal, Message},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    api::{MessageApi, SelectedFile},
    channel::{handler, ChannelClient, EventKind, EventTransport},
    error::ChatError,
    mutation::{EditBuffer, MutationCoordinator, PendingMutation},
    store::MessageStore,
    uploader::AttachmentUploader,
};

/// Room membership of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Idle,
    Joining { room: RoomId },
    Joined { room: RoomId },
}

/// Notifications for the presentation layer, mirroring confirmed state
/// changes. The list itself is read through [`SessionController::messages`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SnapshotLoaded { room: RoomId, count: usize },
    MessageReceived(Message),
    MessageEdited(Message),
    MessageDeleted(MessageId),
    Left,
    Error(String),
}

/// All session state lives behind one mutex, so every store operation and
/// every pending-mutation check-and-set is atomic relative to the others.
pub(crate) struct SessionState {
    pub(crate) membership: Membership,
    pub(crate) user: String,
    /// Bumped on every join and leave; awaited results carry the epoch they
    /// started under and are discarded on mismatch (stale-response guard).
    pub(crate) epoch: u64,
    pub(crate) store: MessageStore,
    pub(crate) pending: PendingMutation,
    pub(crate) draft: String,
    pub(crate) staged_file: Option<SelectedFile>,
    pub(crate) edit: Option<EditBuffer>,
    pub(crate) actions_for: Option<MessageId>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            membership: Membership::Idle,
            user: String::new(),
            epoch: 0,
            store: MessageStore::new(),
            pending: PendingMutation::None,
            draft: String::new(),
            staged_file: None,
            edit: None,
            actions_for: None,
        }
    }
}

impl SessionState {
    pub(crate) fn joined_room(&self) -> Option<&RoomId> {
        match &self.membership {
            Membership::Joined { room } => Some(room),
            _ => None,
        }
    }

    /// The atomic single-in-flight guard: succeeds only when no mutation is
    /// pending. Callers hold the session lock, so two competing calls cannot
    /// both pass.
    pub(crate) fn try_begin(&mut self, next: PendingMutation) -> Result<(), ChatError> {
        if self.pending != PendingMutation::None {
            return Err(ChatError::MutationInFlight(self.pending.clone()));
        }
        self.pending = next;
        Ok(())
    }

    pub(crate) fn clear_pending_if(&mut self, epoch: u64) {
        if self.epoch == epoch {
            self.pending = PendingMutation::None;
        }
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    async fn apply_created(&self, epoch: u64, message: Message) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        let Some(room) = state.joined_room() else {
            return;
        };
        if message.room != *room {
            info!(room = %message.room, "discarding creation event for another room");
            return;
        }
        match state.store.upsert(message.clone()) {
            Ok(()) => {
                let _ = self.events.send(SessionEvent::MessageReceived(message));
            }
            Err(err) => {
                let _ = self
                    .events
                    .send(SessionEvent::Error(format!("invalid creation event: {err}")));
            }
        }
    }

    async fn apply_edited(&self, epoch: u64, message: Message) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        let Some(room) = state.joined_room() else {
            return;
        };
        if message.room != *room {
            info!(room = %message.room, "discarding edit event for another room");
            return;
        }
        match state.store.apply_edit(&message) {
            Ok(true) => {
                let _ = self.events.send(SessionEvent::MessageEdited(message));
            }
            Ok(false) => {}
            Err(err) => {
                let _ = self
                    .events
                    .send(SessionEvent::Error(format!("invalid edit event: {err}")));
            }
        }
    }

    async fn apply_deleted(&self, epoch: u64, id: MessageId) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch || state.joined_room().is_none() {
            return;
        }
        if state.store.remove(&id) {
            let _ = self.events.send(SessionEvent::MessageDeleted(id));
        }
    }
}

/// Top-level state machine owning room membership, the message store and the
/// channel handler registrations. Re-enterable indefinitely across room
/// switches within one process lifetime.
pub struct SessionController {
    pub(crate) shared: Arc<Shared>,
    api: Arc<dyn MessageApi>,
    channel: ChannelClient,
}

impl SessionController {
    pub fn new(api: Arc<dyn MessageApi>, transport: Arc<dyn EventTransport>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::default()),
            events,
        });
        Arc::new(Self {
            shared,
            api,
            channel: ChannelClient::new(transport),
        })
    }

    /// A handle for user-initiated send/edit/delete actions, sharing this
    /// session's state and in-flight guard.
    pub fn coordinator(&self) -> MutationCoordinator {
        MutationCoordinator::new(Arc::clone(&self.shared), Arc::clone(&self.api))
    }

    /// A handle for the two-phase attachment workflow, sharing this session's
    /// state and in-flight guard.
    pub fn uploader(&self) -> AttachmentUploader {
        AttachmentUploader::new(Arc::clone(&self.shared), Arc::clone(&self.api))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub async fn membership(&self) -> Membership {
        self.shared.state.lock().await.membership.clone()
    }

    pub async fn pending(&self) -> PendingMutation {
        self.shared.state.lock().await.pending.clone()
    }

    /// Cloned snapshot of the joined list, in arrival order.
    pub async fn messages(&self) -> Vec<Message> {
        self.shared.state.lock().await.store.messages().to_vec()
    }

    /// Joins a room: signals the channel, fetches the snapshot, then wires
    /// the channel handlers. A join while already joining or joined is
    /// rejected without a second fetch.
    pub async fn join(&self, user: &str, room: &str) -> Result<(), ChatError> {
        let user = user.trim();
        let token = room.trim();
        if user.is_empty() || token.is_empty() {
            return Err(ChatError::Validation(
                "user name and room token must not be empty".to_string(),
            ));
        }
        let room = RoomId::new(token);

        let epoch = {
            let mut state = self.shared.state.lock().await;
            if state.membership != Membership::Idle {
                return Err(ChatError::AlreadyJoined);
            }
            state.epoch += 1;
            state.membership = Membership::Joining { room: room.clone() };
            state.user = user.to_string();
            state.epoch
        };

        // Fire-and-forget: "joined" stays an optimistic local transition.
        if let Err(err) = self
            .channel
            .emit(ClientSignal::JoinRoom { room: room.clone() })
            .await
        {
            warn!(room = %room, "join signal emit failed: {err}");
        }

        let snapshot = self.api.fetch_messages(&room).await;

        let mut state = self.shared.state.lock().await;
        if state.epoch != epoch {
            info!(room = %room, "discarding stale join snapshot");
            return Ok(());
        }
        match snapshot {
            Ok(messages) => {
                if let Err(err) = state.store.replace_all(messages) {
                    state.membership = Membership::Idle;
                    return Err(ChatError::JoinFailed {
                        room,
                        source: anyhow!(err),
                    });
                }
                let count = state.store.len();
                state.membership = Membership::Joined { room: room.clone() };
                drop(state);
                self.register_channel_handlers(epoch).await;
                info!(room = %room, count, "joined room");
                let _ = self
                    .shared
                    .events
                    .send(SessionEvent::SnapshotLoaded { room, count });
                Ok(())
            }
            Err(err) => {
                state.membership = Membership::Idle;
                Err(ChatError::JoinFailed { room, source: err })
            }
        }
    }

    /// Leaves the current room: unsubscribes every channel handler and clears
    /// the list together with all pending and transient state. Idempotent.
    pub async fn leave(&self) {
        self.channel.unsubscribe_all().await;
        let was_joined = {
            let mut state = self.shared.state.lock().await;
            let was_joined = state.membership != Membership::Idle;
            state.epoch += 1;
            state.membership = Membership::Idle;
            state.store.clear();
            state.pending = PendingMutation::None;
            state.draft.clear();
            state.staged_file = None;
            state.edit = None;
            state.actions_for = None;
            was_joined
        };
        if was_joined {
            info!("left room");
            let _ = self.shared.events.send(SessionEvent::Left);
        }
    }

    async fn register_channel_handlers(&self, epoch: u64) {
        let shared = Arc::clone(&self.shared);
        self.channel
            .subscribe(
                EventKind::ReceiveMessage,
                handler(move |event| {
                    let shared = Arc::clone(&shared);
                    async move {
                        if let ChannelEvent::ReceiveMessage { message } = event {
                            shared.apply_created(epoch, message).await;
                        }
                    }
                }),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        self.channel
            .subscribe(
                EventKind::EditMessage,
                handler(move |event| {
                    let shared = Arc::clone(&shared);
                    async move {
                        if let ChannelEvent::EditMessage { message } = event {
                            shared.apply_edited(epoch, message).await;
                        }
                    }
                }),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        self.channel
            .subscribe(
                EventKind::DeleteMessage,
                handler(move |event| {
                    let shared = Arc::clone(&shared);
                    async move {
                        if let ChannelEvent::DeleteMessage { id } = event {
                            shared.apply_deleted(epoch, id).await;
                        }
                    }
                }),
            )
            .await;
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
