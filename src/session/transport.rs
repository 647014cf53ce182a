// ABOUTME: Transport seam between session coordinators and client connections
// The outlet lets the multiplexer swap the connection under a live coordinator

use super::events::ServerEvent;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection {0} is closed")]
    Closed(String),
}

/// One client connection able to receive server events.
pub trait Transport: Send + Sync {
    fn id(&self) -> &str;

    fn emit(&self, event: ServerEvent) -> Result<(), TransportError>;
}

/// Transport feeding a channel; the receiving side owns the actual socket writer.
#[derive(Debug)]
pub struct ChannelTransport {
    id: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelTransport {
    pub fn new(id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: id.into(), tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn emit(&self, event: ServerEvent) -> Result<(), TransportError> {
        self.tx
            .send(event)
            .map_err(|_| TransportError::Closed(self.id.clone()))
    }
}

/// Rebindable handle on the current transport of a session.
///
/// Clones share the binding, so everything holding an outlet follows a rebind.
#[derive(Clone)]
pub struct Outlet {
    current: Arc<RwLock<Arc<dyn Transport>>>,
}

impl Outlet {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            current: Arc::new(RwLock::new(transport)),
        }
    }

    /// Point the outlet at a new connection. Returns the id of the previous one.
    pub fn rebind(&self, transport: Arc<dyn Transport>) -> String {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = current.id().to_string();
        debug!("Rebinding outlet from {} to {}", previous, transport.id());
        *current = transport;
        previous
    }

    pub fn transport_id(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .id()
            .to_string()
    }

    /// Emit on the current transport. A closed connection only loses the event.
    pub fn emit(&self, event: ServerEvent) {
        let transport = self.current.read().unwrap_or_else(PoisonError::into_inner).clone();
        let name = event.name();
        if let Err(e) = transport.emit(event) {
            warn!("Dropped '{}' event: {}", name, e);
        }
    }
}

impl std::fmt::Debug for Outlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outlet")
            .field("transport", &self.transport_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlet_follows_rebind() {
        let (first, mut first_rx) = ChannelTransport::new("conn-1");
        let (second, mut second_rx) = ChannelTransport::new("conn-2");

        let outlet = Outlet::new(Arc::new(first));
        let shared = outlet.clone();
        outlet.emit(ServerEvent::Next);

        assert_eq!(shared.rebind(Arc::new(second)), "conn-1");
        assert_eq!(outlet.transport_id(), "conn-2");
        outlet.emit(ServerEvent::Completed);

        assert_eq!(first_rx.try_recv().unwrap(), ServerEvent::Next);
        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv().unwrap(), ServerEvent::Completed);
    }

    #[test]
    fn test_emit_on_closed_transport_is_dropped() {
        let (transport, rx) = ChannelTransport::new("conn-1");
        drop(rx);
        assert_eq!(
            transport.emit(ServerEvent::Next),
            Err(TransportError::Closed("conn-1".to_string()))
        );
        // Outlet swallows it
        Outlet::new(Arc::new(transport)).emit(ServerEvent::Next);
    }
}
