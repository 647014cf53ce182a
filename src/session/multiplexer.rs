// ABOUTME: Maps user identities to session coordinators across reconnects
// Also follows container state changes to end sessions whose container is destroyed

use super::coordinator::{Coordinator, SessionServices};
use super::transport::Transport;
use crate::docker::{ContainerState, StateChange};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Multiplexer {
    services: SessionServices,
    sessions: RwLock<HashMap<String, Arc<Coordinator>>>,
    /// Last container state seen per tutorial
    container_states: RwLock<HashMap<String, ContainerState>>,
}

impl Multiplexer {
    pub fn new(services: SessionServices) -> Self {
        Self {
            services,
            sessions: RwLock::new(HashMap::new()),
            container_states: RwLock::new(HashMap::new()),
        }
    }

    /// Coordinator for `identity`, bound to `transport`.
    ///
    /// A known identity keeps its coordinator (and its attached shell); only the connection changes.
    pub fn connect(&self, identity: &str, transport: Arc<dyn Transport>) -> Arc<Coordinator> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(coordinator) = sessions.get(identity) {
            coordinator.rebind(transport);
            return Arc::clone(coordinator);
        }

        info!("New session for {} on connection {}", identity, transport.id());
        let coordinator = Arc::new(Coordinator::new(identity, self.services.clone(), transport));
        sessions.insert(identity.to_string(), Arc::clone(&coordinator));
        coordinator
    }

    pub fn session(&self, identity: &str) -> Option<Arc<Coordinator>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn container_state(&self, tutorial_id: &str) -> Option<ContainerState> {
        self.container_states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tutorial_id)
            .copied()
    }

    /// Follow container state changes until the cache goes away or the multiplexer is dropped.
    pub fn watch(self: &Arc<Self>, mut changes: broadcast::Receiver<StateChange>) -> JoinHandle<()> {
        let multiplexer: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => match multiplexer.upgrade() {
                        Some(multiplexer) => multiplexer.on_state_change(&change),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} container state changes", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Stopped watching container states");
        })
    }

    pub fn on_state_change(&self, change: &StateChange) {
        self.container_states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(change.session_id.clone(), change.state);

        if change.state != ContainerState::Destroying {
            return;
        }

        let attached: Vec<Arc<Coordinator>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.tutorial_id().as_deref() == Some(change.session_id.as_str()))
            .cloned()
            .collect();

        for coordinator in attached {
            info!(
                "Container of {} is being destroyed, ending session of {}",
                change.session_id,
                coordinator.identity()
            );
            coordinator.end();
        }
    }
}
