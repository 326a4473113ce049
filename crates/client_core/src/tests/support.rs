use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{MessageId, RoomId},
    protocol::{ChannelEvent, ClientSignal, Message, NewMessage},
};
use tokio::sync::{broadcast, Mutex, Notify};

use crate::{
    api::{MessageApi, SelectedFile},
    channel::EventTransport,
};

pub(crate) fn msg(id: &str, room: &str, author: &str, text: &str) -> Message {
    Message {
        id: MessageId::from(id),
        room: RoomId::from(room),
        author: author.to_string(),
        text: text.to_string(),
        locator: None,
        sent_at: None,
    }
}

pub(crate) fn png_file(name: &str) -> SelectedFile {
    SelectedFile {
        filename: name.to_string(),
        mime_type: Some("image/png".to_string()),
        bytes: vec![0x89, 0x50, 0x4e, 0x47],
    }
}

/// Scriptable `MessageApi` double: per-room snapshots, per-operation failure
/// switches, optional gates that hold a call open until the test releases it,
/// and a record of every request issued.
pub(crate) struct FakeApi {
    pub snapshots: Mutex<HashMap<String, Vec<Message>>>,
    pub fetch_gates: Mutex<HashMap<String, Arc<Notify>>>,
    pub create_gate: Mutex<Option<Arc<Notify>>>,
    pub upload_gate: Mutex<Option<Arc<Notify>>>,
    pub fail_fetch: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fetch_calls: AtomicU64,
    pub created: Mutex<Vec<NewMessage>>,
    pub updated: Mutex<Vec<(MessageId, String)>>,
    pub deleted: Mutex<Vec<MessageId>>,
    pub uploaded: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshots: Mutex::new(HashMap::new()),
            fetch_gates: Mutex::new(HashMap::new()),
            create_gate: Mutex::new(None),
            upload_gate: Mutex::new(None),
            fail_fetch: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_upload: AtomicBool::new(false),
            fetch_calls: AtomicU64::new(0),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            uploaded: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub async fn set_snapshot(&self, room: &str, messages: Vec<Message>) {
        self.snapshots
            .lock()
            .await
            .insert(room.to_string(), messages);
    }

    /// Holds the next snapshot fetch for `room` open until the returned
    /// handle is notified.
    pub async fn gate_fetch(&self, room: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.fetch_gates
            .lock()
            .await
            .insert(room.to_string(), Arc::clone(&gate));
        gate
    }

    pub async fn gate_create(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    pub async fn gate_upload(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.upload_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl MessageApi for FakeApi {
    async fn fetch_messages(&self, room: &RoomId) -> Result<Vec<Message>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.fetch_gates.lock().await.get(room.as_str()).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(anyhow!("snapshot fetch refused"));
        }
        Ok(self
            .snapshots
            .lock()
            .await
            .get(room.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn create_message(&self, draft: &NewMessage) -> Result<Message> {
        let gate = self.create_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("creation refused"));
        }
        self.created.lock().await.push(draft.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Message {
            id: MessageId::new(format!("srv-{n}")),
            room: draft.room.clone(),
            author: draft.author.clone(),
            text: draft.text.clone(),
            locator: draft.locator.clone(),
            sent_at: None,
        })
    }

    async fn update_message(&self, id: &MessageId, text: &str) -> Result<Message> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(anyhow!("edit refused"));
        }
        self.updated
            .lock()
            .await
            .push((id.clone(), text.to_string()));
        Ok(Message {
            id: id.clone(),
            room: RoomId::from("unused"),
            author: "server".to_string(),
            text: text.to_string(),
            locator: None,
            sent_at: None,
        })
    }

    async fn delete_message(&self, id: &MessageId) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(anyhow!("delete refused"));
        }
        self.deleted.lock().await.push(id.clone());
        Ok(())
    }

    async fn upload_file(&self, file: &SelectedFile) -> Result<String> {
        let gate = self.upload_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(anyhow!("upload refused"));
        }
        self.uploaded.lock().await.push(file.filename.clone());
        Ok(format!("/files/{}", file.filename))
    }
}

/// In-memory `EventTransport`: tests push inbound events and inspect emitted
/// signals.
pub(crate) struct FakeTransport {
    events: broadcast::Sender<ChannelEvent>,
    pub signals: Mutex<Vec<ClientSignal>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            signals: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl EventTransport for FakeTransport {
    async fn emit(&self, signal: ClientSignal) -> Result<()> {
        self.signals.lock().await.push(signal);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}

/// Polls `check` until it passes or two seconds elapse.
pub(crate) async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), deadline)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}
