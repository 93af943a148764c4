//! Client handle and event delivery.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use drawroom_core::config::ClientConfig;
use drawroom_core::protocol::ClientFrame;
use drawroom_core::types::{ConnectionId, RoomId};

use crate::supervisor::{ConnectionState, Supervisor};

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("not joined to a room")]
    NotJoined,

    #[error("outbound queue is full")]
    QueueFull,

    #[error("client has shut down")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Change in room membership as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantEvent {
    /// Members already present when the join was acknowledged.
    Current { participants: Vec<ConnectionId> },
    Joined { user_id: ConnectionId, name: String },
    Left { user_id: ConnectionId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub user_id: ConnectionId,
    pub name: String,
    pub message: String,
}

/// Callbacks for inbound room traffic. All methods default to no-ops.
///
/// Callbacks run on the supervisor task and should not block.
pub trait RoomEventHandler: Send + Sync + 'static {
    fn on_draw(&self, _user_id: ConnectionId, _draw_data: Value) {}

    fn on_participant_event(&self, _event: ParticipantEvent) {}

    fn on_chat(&self, _message: ChatMessage) {}
}

impl RoomEventHandler for () {}

/// Owned form of every handler callback, for channel-based consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Draw { user_id: ConnectionId, draw_data: Value },
    Participant(ParticipantEvent),
    Chat(ChatMessage),
}

impl RoomEventHandler for mpsc::UnboundedSender<ClientEvent> {
    fn on_draw(&self, user_id: ConnectionId, draw_data: Value) {
        let _ = self.send(ClientEvent::Draw { user_id, draw_data });
    }

    fn on_participant_event(&self, event: ParticipantEvent) {
        let _ = self.send(ClientEvent::Participant(event));
    }

    fn on_chat(&self, message: ChatMessage) {
        let _ = self.send(ClientEvent::Chat(message));
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:3000/ws`.
    pub url: String,
    pub room_id: RoomId,
    /// Display name sent with the join and with every chat message.
    pub name: String,
    pub reconnect_delay: Duration,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>, room_id: impl Into<RoomId>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            room_id: room_id.into(),
            name: name.into(),
            reconnect_delay: Duration::from_millis(5_000),
        }
    }

    pub fn from_config(config: &ClientConfig, room_id: impl Into<RoomId>, name: impl Into<String>) -> Self {
        Self {
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            ..Self::new(config.url.clone(), room_id, name)
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Handle to a supervised room membership.
///
/// Dropping the handle stops the supervisor; [`RoomClient::shutdown`] does the
/// same and waits for it to finish.
pub struct RoomClient {
    name: String,
    outbound: mpsc::Sender<ClientFrame>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RoomClient {
    /// Spawn the supervisor and start connecting. Must be called inside a Tokio runtime.
    pub fn connect<H: RoomEventHandler>(options: ClientOptions, handler: H) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let name = options.name.clone();

        let supervisor = Supervisor::new(
            options,
            Arc::new(handler),
            state_tx,
            outbound_rx,
            cancel.clone(),
        );
        let task = tokio::spawn(supervisor.run());

        Self {
            name,
            outbound: outbound_tx,
            state: state_rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch channel that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the client reaches `target`. Returns `Err(Closed)` if the
    /// supervisor exits first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), ClientError> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    pub fn send_draw(&self, draw_data: Value) -> Result<(), ClientError> {
        self.enqueue(ClientFrame::Draw { draw_data })
    }

    pub fn send_chat(&self, message: impl Into<String>) -> Result<(), ClientError> {
        self.enqueue(ClientFrame::Chat {
            name: self.name.clone(),
            message: message.into(),
        })
    }

    fn enqueue(&self, frame: ClientFrame) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Joined {
            return Err(ClientError::NotJoined);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::Closed,
        })
    }

    /// Stop reconnecting, close the socket and wait for the supervisor to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    const WAIT: Duration = Duration::from_secs(5);

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn next_json<S>(ws: &mut S) -> serde_json::Value
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    fn ack() -> Message {
        Message::Text(r#"{"type":"current_participants","participants":[]}"#.into())
    }

    #[test]
    fn test_options_from_config() {
        let config = ClientConfig {
            url: "ws://example:1/ws".into(),
            reconnect_delay_ms: 250,
        };
        let options = ClientOptions::from_config(&config, "lobby", "ann");
        assert_eq!(options.url, "ws://example:1/ws");
        assert_eq!(options.room_id, RoomId::from("lobby"));
        assert_eq!(options.reconnect_delay, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_join_then_exchange_frames() {
        let (listener, url) = bind().await;
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let client = RoomClient::connect(ClientOptions::new(url, "lobby", "ann"), events_tx);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let join = next_json(&mut ws).await;
        assert_eq!(join["type"], "join");
        assert_eq!(join["roomId"], "lobby");
        assert_eq!(join["name"], "ann");

        assert_eq!(client.send_chat("too early"), Err(ClientError::NotJoined));

        ws.send(ack()).await.unwrap();
        tokio::time::timeout(WAIT, client.wait_for_state(ConnectionState::Joined))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ClientEvent::Participant(ParticipantEvent::Current {
                participants: vec![]
            })
        );

        client.send_chat("hi").unwrap();
        let chat = next_json(&mut ws).await;
        assert_eq!(chat["type"], "chat");
        assert_eq!(chat["name"], "ann");
        assert_eq!(chat["message"], "hi");

        let peer = ConnectionId::new();
        let draw = serde_json::json!({ "type": "draw", "userId": peer, "drawData": { "x": 3 } });
        ws.send(Message::Text(draw.to_string().into())).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ClientEvent::Draw {
                user_id: peer,
                draw_data: serde_json::json!({ "x": 3 }),
            }
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejoins_after_server_drop() {
        let (listener, url) = bind().await;
        let options = ClientOptions::new(url, "lobby", "ann").with_reconnect_delay(Duration::from_millis(50));
        let client = RoomClient::connect(options, ());
        let mut states = client.subscribe_state();

        let (stream, _) = listener.accept().await.unwrap();
        let mut first = tokio_tungstenite::accept_async(stream).await.unwrap();
        assert_eq!(next_json(&mut first).await["type"], "join");
        first.send(ack()).await.unwrap();
        tokio::time::timeout(WAIT, client.wait_for_state(ConnectionState::Joined))
            .await
            .unwrap()
            .unwrap();

        drop(first);
        tokio::time::timeout(WAIT, states.wait_for(|s| *s != ConnectionState::Joined))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(client.send_draw(serde_json::json!({})), Err(ClientError::NotJoined));

        // Same room and name on the fresh connection.
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let mut second = tokio_tungstenite::accept_async(stream).await.unwrap();
        let join = next_json(&mut second).await;
        assert_eq!(join["type"], "join");
        assert_eq!(join["roomId"], "lobby");
        assert_eq!(join["name"], "ann");

        second.send(ack()).await.unwrap();
        tokio::time::timeout(WAIT, client.wait_for_state(ConnectionState::Joined))
            .await
            .unwrap()
            .unwrap();

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_retry_delay() {
        let (listener, url) = bind().await;
        drop(listener);

        let options = ClientOptions::new(url, "lobby", "ann").with_reconnect_delay(Duration::from_secs(60));
        let client = RoomClient::connect(options, ());

        // The dial fails immediately and the supervisor parks in its delay.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.state(), ConnectionState::Disconnected);

        tokio::time::timeout(WAIT, client.shutdown()).await.unwrap();
    }
}
