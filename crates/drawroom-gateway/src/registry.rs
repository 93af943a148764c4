//! Room registry: which connections are in which room.
//!
//! The room table is only locked long enough to find, create, or delete a
//! room. Membership changes take the room's own lock, so joins and leaves in
//! unrelated rooms never contend. A room is removed from the table while its
//! lock is still held by the leave that emptied it and is flagged `closed`, so
//! a join that raced that leave retries against a fresh room instead of
//! landing in a dead one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use drawroom_core::types::{ConnectionId, RoomId};

use crate::connection::PeerSender;

#[derive(Default)]
struct Room {
    members: HashMap<ConnectionId, PeerSender>,
    closed: bool,
}

/// Result of [`RoomRegistry::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection was not in the room (or the room does not exist).
    NotMember,
    /// Removed; the room still has `remaining` members.
    Left { remaining: usize },
    /// Removed the last member; the room no longer exists.
    Emptied,
}

impl LeaveOutcome {
    pub fn room_now_empty(&self) -> bool {
        matches!(self, Self::Emptied)
    }
}

/// Concurrency-safe room → members mapping.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<Mutex<Room>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `member` to `room_id`, creating the room if needed.
    ///
    /// `announce` runs under the room lock with the joiner and the members
    /// already present, before the joiner is inserted. Anything it queues is
    /// therefore ordered against every other join and leave in the room.
    /// Returns the ids of those existing members.
    pub async fn join<F>(&self, room_id: &RoomId, member: PeerSender, announce: F) -> Vec<ConnectionId>
    where
        F: FnOnce(&PeerSender, &[PeerSender]),
    {
        let mut announce = Some(announce);
        loop {
            let room = self.room_or_create(room_id).await;
            let mut guard = room.lock().await;
            if guard.closed {
                // Emptied and unlinked while we waited for the lock.
                continue;
            }

            let joiner = member.id();
            let existing: Vec<PeerSender> = guard
                .members
                .values()
                .filter(|m| m.id() != joiner)
                .cloned()
                .collect();
            if let Some(announce) = announce.take() {
                announce(&member, &existing);
            }
            guard.members.insert(joiner, member);
            return existing.iter().map(PeerSender::id).collect();
        }
    }

    /// Remove `conn_id` from `room_id`, deleting the room if it is now empty.
    ///
    /// When members remain, `announce` runs with them under the room lock.
    pub async fn leave<F>(&self, room_id: &RoomId, conn_id: ConnectionId, announce: F) -> LeaveOutcome
    where
        F: FnOnce(&[PeerSender]),
    {
        let Some(room) = self.rooms.read().await.get(room_id).cloned() else {
            return LeaveOutcome::NotMember;
        };

        let mut guard = room.lock().await;
        if guard.members.remove(&conn_id).is_none() {
            return LeaveOutcome::NotMember;
        }
        if !guard.members.is_empty() {
            let remaining: Vec<PeerSender> = guard.members.values().cloned().collect();
            announce(&remaining);
            return LeaveOutcome::Left {
                remaining: remaining.len(),
            };
        }

        guard.closed = true;
        let mut rooms = self.rooms.write().await;
        if rooms.get(room_id).is_some_and(|r| Arc::ptr_eq(r, &room)) {
            rooms.remove(room_id);
            debug!(room = %room_id, "Room deleted");
            #[cfg(feature = "metrics")]
            crate::metrics::set_rooms(rooms.len());
        }
        LeaveOutcome::Emptied
    }

    /// Send handles for every member of `room_id` except `exclude`.
    pub async fn members_excluding(
        &self,
        room_id: &RoomId,
        exclude: ConnectionId,
    ) -> Vec<PeerSender> {
        let Some(room) = self.rooms.read().await.get(room_id).cloned() else {
            return Vec::new();
        };

        let guard = room.lock().await;
        guard
            .members
            .values()
            .filter(|m| m.id() != exclude)
            .cloned()
            .collect()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    pub async fn member_count(&self, room_id: &RoomId) -> usize {
        let Some(room) = self.rooms.read().await.get(room_id).cloned() else {
            return 0;
        };
        let guard = room.lock().await;
        guard.members.len()
    }

    async fn room_or_create(&self, room_id: &RoomId) -> Arc<Mutex<Room>> {
        if let Some(room) = self.rooms.read().await.get(room_id) {
            return room.clone();
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                debug!(room = %room_id, "Room created");
                Arc::new(Mutex::new(Room::default()))
            })
            .clone();
        #[cfg(feature = "metrics")]
        crate::metrics::set_rooms(rooms.len());
        room
    }
}
