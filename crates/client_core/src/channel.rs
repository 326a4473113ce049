use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::protocol::{ChannelEvent, ClientSignal};
use tokio::{
    net::TcpStream,
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::warn;
use url::Url;

/// The inbound event kinds delivered by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ReceiveMessage,
    EditMessage,
    DeleteMessage,
}

fn kind_of(event: &ChannelEvent) -> EventKind {
    match event {
        ChannelEvent::ReceiveMessage { .. } => EventKind::ReceiveMessage,
        ChannelEvent::EditMessage { .. } => EventKind::EditMessage,
        ChannelEvent::DeleteMessage { .. } => EventKind::DeleteMessage,
    }
}

/// Observable contract of the persistent push-event connection. Reconnect and
/// backoff belong to the implementation, not to this interface.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Fire-and-forget notification; no acknowledgement is awaited.
    async fn emit(&self, signal: ClientSignal) -> Result<()>;
    /// Inbound events, in delivery order.
    fn events(&self) -> broadcast::Receiver<ChannelEvent>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// One persistent WebSocket connection shared across the process lifetime.
pub struct WsTransport {
    writer: Mutex<WsSink>,
    events: broadcast::Sender<ChannelEvent>,
    reader_task: JoinHandle<()>,
}

impl WsTransport {
    /// Connects to the event channel of the given `http(s)://` server.
    pub async fn connect(server_url: &str) -> Result<Self> {
        let ws_url = websocket_url(server_url)?;
        let (stream, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (writer, mut reader) = stream.split();
        let (events, _) = broadcast::channel(1024);

        let fanout = events.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<ChannelEvent>(&text) {
                            Ok(event) => {
                                let _ = fanout.send(event);
                            }
                            Err(err) => warn!("channel: dropping malformed event frame: {err}"),
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("channel: websocket receive failed: {err}");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            writer: Mutex::new(writer),
            events,
            reader_task,
        })
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[async_trait]
impl EventTransport for WsTransport {
    async fn emit(&self, signal: ClientSignal) -> Result<()> {
        let text = serde_json::to_string(&signal)?;
        self.writer
            .lock()
            .await
            .send(WsMessage::Text(text))
            .await
            .context("websocket send failed")?;
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}

fn websocket_url(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(anyhow!("unsupported server url scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|()| anyhow!("failed to derive websocket scheme for {server_url}"))?;
    Ok(url)
}

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A registered event handler. Runs to completion before the next event is
/// dispatched.
pub type EventHandler = Box<dyn Fn(ChannelEvent) -> HandlerFuture + Send + Sync>;

/// Adapts an async closure into an [`EventHandler`].
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(ChannelEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |event| Box::pin(f(event)))
}

/// Thin wrapper over one event-channel connection.
///
/// At most one handler is registered per event kind: re-subscribing replaces
/// the previous handler, never stacks, so repeated join/leave cycles cannot
/// accumulate duplicate handlers. Dispatch preserves delivery order.
pub struct ChannelClient {
    transport: Arc<dyn EventTransport>,
    handlers: Arc<Mutex<HashMap<EventKind, EventHandler>>>,
    pump: JoinHandle<()>,
}

impl ChannelClient {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        let handlers: Arc<Mutex<HashMap<EventKind, EventHandler>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let mut rx = transport.events();
        let dispatch = Arc::clone(&handlers);
        let pump = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let fut = {
                            let guard = dispatch.lock().await;
                            guard.get(&kind_of(&event)).map(|h| h(event))
                        };
                        if let Some(fut) = fut {
                            fut.await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "channel: event dispatch lagged behind delivery");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self {
            transport,
            handlers,
            pump,
        }
    }

    /// Registers the handler for an event kind, replacing any previous one.
    pub async fn subscribe(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.lock().await.insert(kind, handler);
    }

    /// Removes every registered handler.
    pub async fn unsubscribe_all(&self) {
        self.handlers.lock().await.clear();
    }

    pub async fn emit(&self, signal: ClientSignal) -> Result<()> {
        self.transport.emit(signal).await
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
