//! WebSocket relay for shared drawing rooms.
//!
//! The gateway accepts WebSocket clients, tracks which room each one is in,
//! and relays presence, draw, and chat frames between members of the same
//! room. Draw payloads are forwarded as-is.

pub mod connection;
pub mod limiter;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;

pub use registry::{LeaveOutcome, RoomRegistry};
pub use server::{build_router, serve, start_gateway};
pub use state::GatewayState;
