//! Gateway shared state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;

use drawroom_core::config::{Config, GatewayConfig};

use crate::limiter::ConnectionLimiter;
use crate::registry::RoomRegistry;

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Resolved `gateway` section (defaults filled in).
    pub gateway: GatewayConfig,
    pub registry: RoomRegistry,
    pub limiter: Option<ConnectionLimiter>,
    /// Cancelled when the server begins shutting down; open connections tear down.
    pub shutdown: CancellationToken,
    #[cfg(feature = "metrics")]
    pub prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
    connections: AtomicUsize,
}

impl GatewayState {
    pub fn new(config: Arc<Config>) -> Self {
        let gateway = config.gateway();
        let limiter = gateway.max_connections_per_ip.map(ConnectionLimiter::new);

        Self {
            config,
            gateway,
            registry: RoomRegistry::new(),
            limiter,
            shutdown: CancellationToken::new(),
            #[cfg(feature = "metrics")]
            prometheus: None,
            connections: AtomicUsize::new(0),
        }
    }

    #[cfg(feature = "metrics")]
    pub fn with_prometheus(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Currently open WebSocket connections.
    pub fn open_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        crate::metrics::record_ws_connect();
    }

    pub(crate) fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        crate::metrics::record_ws_disconnect();
    }
}
