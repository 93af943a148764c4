//! Reconnecting client for Drawroom rooms.
//!
//! [`RoomClient`] keeps one room membership alive across dropped connections.
//! Inbound events go to a [`RoomEventHandler`] supplied at construction;
//! outbound draw and chat frames go through the client handle.

pub mod client;
pub mod supervisor;

pub use client::{
    ChatMessage, ClientError, ClientEvent, ClientOptions, ParticipantEvent, RoomClient,
    RoomEventHandler,
};
pub use supervisor::ConnectionState;
