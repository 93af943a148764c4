//! Per-IP cap on concurrent WebSocket connections.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

type ActiveMap = Arc<Mutex<HashMap<IpAddr, u32>>>;

/// Counts open connections per client IP and refuses new ones past the cap.
pub struct ConnectionLimiter {
    max_connections_per_ip: u32,
    active: ActiveMap,
}

/// Held for the lifetime of one admitted connection; releases its slot on drop.
pub struct ConnectionPermit {
    ip: IpAddr,
    active: ActiveMap,
}

impl ConnectionLimiter {
    pub fn new(max_connections_per_ip: u32) -> Self {
        Self {
            max_connections_per_ip,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Admit a connection from `ip`, or `None` if it already has the maximum open.
    pub fn try_acquire(&self, ip: IpAddr) -> Option<ConnectionPermit> {
        let mut map = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let count = map.entry(ip).or_default();

        if *count >= self.max_connections_per_ip {
            warn!(%ip, count = *count, limit = self.max_connections_per_ip,
                "Rejected: too many connections from IP");
            return None;
        }

        *count += 1;
        Some(ConnectionPermit {
            ip,
            active: self.active.clone(),
        })
    }

    /// Connections currently open from `ip`.
    pub fn active(&self, ip: IpAddr) -> u32 {
        let map = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(&ip).copied().unwrap_or(0)
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let mut map = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = map.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                map.remove(&self.ip);
            }
        }
    }
}
