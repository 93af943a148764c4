//! WebSocket connection lifecycle and teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use drawroom_core::protocol::ServerFrame;
use drawroom_core::types::{ConnectionId, RoomId};

use crate::limiter::ConnectionPermit;
use crate::registry::RoomRegistry;
use crate::router;
use crate::state::GatewayState;

/// Send side of one connection's bounded outbound queue.
///
/// Delivery never waits: a full or closed queue drops the message for this
/// peer only and bumps its drop counter.
#[derive(Clone)]
pub struct PeerSender {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    dropped: Arc<AtomicU64>,
}

impl PeerSender {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an already-serialized frame. Returns `false` if it was dropped.
    pub fn try_deliver(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and queue a single frame.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.try_deliver(Arc::new(json)),
            Err(e) => {
                tracing::error!(%e, kind = frame.kind(), "Failed to serialize frame");
                false
            }
        }
    }

    /// Messages dropped for this peer so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Per-connection protocol state owned by the read loop.
pub struct Session {
    sender: PeerSender,
    room: Option<RoomId>,
    name: Option<String>,
    closed: bool,
}

impl Session {
    pub fn new(sender: PeerSender) -> Self {
        Self {
            sender,
            room: None,
            name: None,
            closed: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.sender.id()
    }

    pub fn sender(&self) -> &PeerSender {
        &self.sender
    }

    /// Room joined by the last successful `join`, if any.
    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn take_room(&mut self) -> Option<RoomId> {
        self.room.take()
    }

    pub(crate) fn set_membership(&mut self, room: RoomId, name: String) {
        self.room = Some(room);
        self.name = Some(name);
    }

    /// Release room membership and announce the departure.
    ///
    /// Only the first call has any effect; returns whether this call did the
    /// teardown.
    pub async fn close(&mut self, registry: &RoomRegistry) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;

        if let Some(room) = self.room.take() {
            let outcome = router::leave_room(registry, &room, self.id()).await;
            debug!(conn_id = %self.id(), room = %room, ?outcome, "Left room on close");
        }
        true
    }
}

enum Inbound {
    Frame(Result<Message, axum::Error>),
    Ended,
    IdleTimeout,
}

async fn next_inbound(ws_rx: &mut SplitStream<WebSocket>, idle: Option<Duration>) -> Inbound {
    match idle {
        Some(limit) => match tokio::time::timeout(limit, ws_rx.next()).await {
            Ok(Some(frame)) => Inbound::Frame(frame),
            Ok(None) => Inbound::Ended,
            Err(_) => Inbound::IdleTimeout,
        },
        None => match ws_rx.next().await {
            Some(frame) => Inbound::Frame(frame),
            None => Inbound::Ended,
        },
    }
}

/// Handle a new WebSocket connection.
pub async fn handle_ws_connection(
    state: Arc<GatewayState>,
    ws: WebSocket,
    permit: Option<ConnectionPermit>,
) {
    let conn_id = ConnectionId::new();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(state.gateway.send_buffer.max(1));
    let mut session = Session::new(PeerSender::new(conn_id, tx));
    state.connection_opened();

    // Writer task: drains this connection's queue into the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    let idle = state.gateway.idle_timeout_secs.map(Duration::from_secs);
    let shutdown = state.shutdown.clone();

    loop {
        let inbound = tokio::select! {
            inbound = next_inbound(&mut ws_rx, idle) => inbound,
            _ = &mut send_task => {
                debug!(conn_id = %conn_id, "Writer stopped, closing connection");
                break;
            }
            _ = shutdown.cancelled() => {
                debug!(conn_id = %conn_id, "Server shutting down, closing connection");
                break;
            }
        };

        match inbound {
            Inbound::Frame(Ok(Message::Text(text))) => {
                router::handle_text(&state.registry, &mut session, text.as_str()).await;
            }
            Inbound::Frame(Ok(Message::Binary(_))) => {
                debug!(conn_id = %conn_id, "Ignoring binary frame");
            }
            Inbound::Frame(Ok(Message::Close(_))) => {
                debug!(conn_id = %conn_id, "Client requested close");
                break;
            }
            Inbound::Frame(Ok(_)) => {
                // Ping/pong are answered by axum
            }
            Inbound::Frame(Err(e)) => {
                warn!(conn_id = %conn_id, %e, "WebSocket error");
                break;
            }
            Inbound::Ended => break,
            Inbound::IdleTimeout => {
                info!(conn_id = %conn_id, "Idle timeout, closing connection");
                break;
            }
        }
    }

    session.close(&state.registry).await;
    send_task.abort();
    state.connection_closed();
    drop(permit);
    info!(
        conn_id = %conn_id,
        dropped = session.sender().drop_count(),
        "WebSocket connection closed"
    );
}
