//! Reconnection supervisor.
//!
//! Drives one logical room membership through
//! `Disconnected → Connecting → Joined`, redialing after a fixed delay
//! whenever the transport drops. Each dial is a fresh connection on the
//! server, so the join handshake is replayed every time.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drawroom_core::protocol::{ClientFrame, ServerFrame};

use crate::client::{ChatMessage, ClientError, ClientOptions, ParticipantEvent, RoomEventHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Joined,
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Starting a connection attempt.
    Dial,
    /// The server acknowledged the join with its participant list.
    JoinAcknowledged,
    /// The transport closed or could not be opened.
    TransportClosed,
}

impl ConnectionState {
    /// Next state for `event`. Events that don't apply leave the state unchanged.
    pub fn next(self, event: SupervisorEvent) -> Self {
        match (self, event) {
            (Self::Disconnected, SupervisorEvent::Dial) => Self::Connecting,
            (Self::Connecting, SupervisorEvent::JoinAcknowledged) => Self::Joined,
            (Self::Connecting | Self::Joined, SupervisorEvent::TransportClosed) => Self::Disconnected,
            (state, _) => state,
        }
    }
}

pub(crate) struct Supervisor<H> {
    options: ClientOptions,
    handler: Arc<H>,
    state: watch::Sender<ConnectionState>,
    outbound: mpsc::Receiver<ClientFrame>,
    cancel: CancellationToken,
}

impl<H: RoomEventHandler> Supervisor<H> {
    pub(crate) fn new(
        options: ClientOptions,
        handler: Arc<H>,
        state: watch::Sender<ConnectionState>,
        outbound: mpsc::Receiver<ClientFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            options,
            handler,
            state,
            outbound,
            cancel,
        }
    }

    pub(crate) async fn run(mut self) {
        let cancel = self.cancel.clone();
        let mut failed_attempts: u64 = 0;

        loop {
            apply(&self.state, SupervisorEvent::Dial);

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.session() => result,
            };
            let joined = *self.state.borrow() == ConnectionState::Joined;
            failed_attempts = failure_streak(failed_attempts, joined);
            match result {
                Ok(()) => info!(room = %self.options.room_id, failed_attempts, "Connection closed by server"),
                Err(e) => warn!(room = %self.options.room_id, failed_attempts, %e, "Connection lost"),
            }
            apply(&self.state, SupervisorEvent::TransportClosed);

            if !self.wait_before_retry(&cancel).await {
                break;
            }
        }

        apply(&self.state, SupervisorEvent::TransportClosed);
        debug!(room = %self.options.room_id, "Supervisor stopped");
    }

    /// One connection: dial, join, then pump frames until the transport ends.
    async fn session(&mut self) -> Result<(), ClientError> {
        let (ws, _) = connect_async(self.options.url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws.split();
        debug!(url = %self.options.url, "Connected, sending join");

        let join = ClientFrame::Join {
            room_id: self.options.room_id.clone(),
            name: self.options.name.clone(),
        };
        send_frame(&mut ws_tx, &join).await?;

        let handler = &self.handler;
        let state = &self.state;
        let outbound = &mut self.outbound;

        loop {
            tokio::select! {
                inbound = ws_rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => handle_inbound(handler.as_ref(), state, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
                },
                Some(frame) = outbound.recv() => send_frame(&mut ws_tx, &frame).await?,
            }
        }
    }

    /// Sleep out the retry delay. Frames queued meanwhile are discarded.
    ///
    /// Returns `false` if the client was shut down instead.
    async fn wait_before_retry(&mut self, cancel: &CancellationToken) -> bool {
        let delay = tokio::time::sleep(self.options.reconnect_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut delay => return true,
                frame = self.outbound.recv() => match frame {
                    Some(frame) => debug!(kind = frame.kind(), "Dropping frame while disconnected"),
                    None => return false,
                },
            }
        }
    }
}

/// Consecutive sessions that ended without reaching `Joined`.
fn failure_streak(previous: u64, reached_joined: bool) -> u64 {
    if reached_joined { 0 } else { previous + 1 }
}

fn apply(state: &watch::Sender<ConnectionState>, event: SupervisorEvent) {
    state.send_if_modified(|current| {
        let next = current.next(event);
        if next == *current {
            return false;
        }
        debug!(from = ?*current, to = ?next, "Connection state changed");
        *current = next;
        true
    });
}

async fn send_frame<S>(ws_tx: &mut S, frame: &ClientFrame) -> Result<(), ClientError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame).map_err(|e| ClientError::Transport(e.to_string()))?;
    ws_tx
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))
}

fn handle_inbound<H: RoomEventHandler>(
    handler: &H,
    state: &watch::Sender<ConnectionState>,
    text: &str,
) {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(%e, "Ignoring unrecognized server frame");
            return;
        }
    };

    match frame {
        ServerFrame::CurrentParticipants { participants } => {
            apply(state, SupervisorEvent::JoinAcknowledged);
            handler.on_participant_event(ParticipantEvent::Current { participants });
        }
        ServerFrame::ParticipantJoined { user_id, name } => {
            handler.on_participant_event(ParticipantEvent::Joined { user_id, name });
        }
        ServerFrame::ParticipantLeft { user_id } => {
            handler.on_participant_event(ParticipantEvent::Left { user_id });
        }
        ServerFrame::Draw { user_id, draw_data } => handler.on_draw(user_id, draw_data),
        ServerFrame::Chat {
            user_id,
            name,
            message,
        } => handler.on_chat(ChatMessage {
            user_id,
            name,
            message,
        }),
    }
}
