//! Broadcast router: decodes client frames and fans them out to a room.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use drawroom_core::protocol::{ClientFrame, ServerFrame};
use drawroom_core::types::{ConnectionId, RoomId};

use crate::connection::{PeerSender, Session};
use crate::registry::{LeaveOutcome, RoomRegistry};

/// Decode one text frame and dispatch it.
///
/// Malformed frames and unknown kinds are logged and dropped; the connection
/// stays open either way.
pub async fn handle_text(registry: &RoomRegistry, session: &mut Session, text: &str) {
    match ClientFrame::decode(text) {
        Ok(Some(frame)) => dispatch(registry, session, frame).await,
        Ok(None) => {
            debug!(conn_id = %session.id(), "Ignoring frame of unknown type");
        }
        Err(e) => {
            warn!(conn_id = %session.id(), %e, "Dropping malformed frame");
            #[cfg(feature = "metrics")]
            crate::metrics::record_malformed_frame();
        }
    }
}

/// Apply a decoded client frame on behalf of `session`.
pub async fn dispatch(registry: &RoomRegistry, session: &mut Session, frame: ClientFrame) {
    if session.is_closed() {
        return;
    }

    #[cfg(feature = "metrics")]
    crate::metrics::record_frame(frame.kind());

    match frame {
        ClientFrame::Join { room_id, name } => join_room(registry, session, room_id, name).await,
        ClientFrame::Draw { draw_data } => {
            let Some(room) = session.room() else {
                debug!(conn_id = %session.id(), "Dropping draw sent before join");
                return;
            };
            let frame = ServerFrame::Draw {
                user_id: session.id(),
                draw_data,
            };
            broadcast(registry, room, session.id(), &frame).await;
        }
        ClientFrame::Chat { name, message } => {
            let Some(room) = session.room() else {
                debug!(conn_id = %session.id(), "Dropping chat sent before join");
                return;
            };
            let frame = ServerFrame::Chat {
                user_id: session.id(),
                name,
                message,
            };
            broadcast(registry, room, session.id(), &frame).await;
        }
    }
}

async fn join_room(registry: &RoomRegistry, session: &mut Session, room_id: RoomId, name: String) {
    let conn_id = session.id();

    if let Some(previous) = session.take_room() {
        let outcome = leave_room(registry, &previous, conn_id).await;
        debug!(conn_id = %conn_id, room = %previous, ?outcome, "Left previous room");
    }

    // Both frames are queued under the room lock, so the joiner's snapshot
    // precedes any later presence event and existing members hear of the
    // joiner exactly once.
    let joined = ServerFrame::ParticipantJoined {
        user_id: conn_id,
        name: name.clone(),
    };
    let participants = registry
        .join(&room_id, session.sender().clone(), |joiner, existing| {
            joiner.send_frame(&ServerFrame::CurrentParticipants {
                participants: existing.iter().map(PeerSender::id).collect(),
            });
            fan_out(existing, &joined);
        })
        .await;
    info!(
        conn_id = %conn_id,
        room = %room_id,
        name = %name,
        others = participants.len(),
        "Joined room"
    );
    session.set_membership(room_id, name);
}

/// Remove `conn_id` from `room_id` and tell the remaining members.
pub(crate) async fn leave_room(
    registry: &RoomRegistry,
    room_id: &RoomId,
    conn_id: ConnectionId,
) -> LeaveOutcome {
    let left = ServerFrame::ParticipantLeft { user_id: conn_id };
    registry
        .leave(room_id, conn_id, |remaining| {
            fan_out(remaining, &left);
        })
        .await
}

/// Send `frame` to every member of `room_id` except `sender`.
///
/// Returns the number of members the frame was queued for.
pub async fn broadcast(
    registry: &RoomRegistry,
    room_id: &RoomId,
    sender: ConnectionId,
    frame: &ServerFrame,
) -> usize {
    let members = registry.members_excluding(room_id, sender).await;
    fan_out(&members, frame)
}

/// Serialize once and queue for each recipient, skipping any that can't take it.
pub fn fan_out(members: &[PeerSender], frame: &ServerFrame) -> usize {
    if members.is_empty() {
        return 0;
    }

    let msg = match serde_json::to_string(frame) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            error!(%e, kind = frame.kind(), "Failed to serialize frame");
            return 0;
        }
    };

    let mut sent = 0;
    for member in members {
        if member.try_deliver(msg.clone()) {
            sent += 1;
        } else {
            debug!(recipient = %member.id(), kind = frame.kind(), "Recipient not writable, skipped");
            #[cfg(feature = "metrics")]
            crate::metrics::record_dropped_delivery();
        }
    }
    debug!(kind = frame.kind(), sent, total = members.len(), "Fan-out");
    sent
}
