// ABOUTME: Per-tutorial container lifecycle cache with change notifications
// Avoids list-then-inspect round trips on every container lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the change notification channel. Slow listeners lag, they never block updates.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Opaque reference to a container known by the engine (its id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerState {
    /// Nothing built or created yet
    Undefined,
    ImageBuilt,
    ContainerCreated,
    Started,
    Stopped,
    Destroying,
}

impl ContainerState {
    /// States in which the cache entry must carry a container handle.
    pub fn has_container(self) -> bool {
        matches!(
            self,
            ContainerState::ContainerCreated | ContainerState::Started | ContainerState::Stopped
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ContainerState::Undefined => "undefined",
            ContainerState::ImageBuilt => "image built",
            ContainerState::ContainerCreated => "container created",
            ContainerState::Started => "container started",
            ContainerState::Stopped => "container stopped",
            ContainerState::Destroying => "destroying",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Emitted to every listener when an entry changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub session_id: String,
    pub state: ContainerState,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("State '{state}' of '{session_id}' requires a container handle")]
    MissingHandle {
        session_id: String,
        state: ContainerState,
    },
}

#[derive(Debug, Clone)]
struct CacheEntry {
    state: ContainerState,
    container: Option<ContainerHandle>,
}

/// The container state cache.
///
/// Invariant: an entry holds a container handle if and only if its state is
/// `ContainerCreated`, `Started` or `Stopped`.
#[derive(Debug)]
pub struct ContainerStateCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    changes: broadcast::Sender<StateChange>,
}

impl Default for ContainerStateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerStateCache {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Record a new state for the given session.
    ///
    /// The handle is mandatory when entering `ContainerCreated`; `Started` and `Stopped` carry the
    /// existing handle forward when none is given. States without a container drop the handle.
    pub fn update(
        &self,
        session_id: &str,
        state: ContainerState,
        handle: Option<ContainerHandle>,
    ) -> Result<(), CacheError> {
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let existing = entries.get(session_id).and_then(|e| e.container.clone());

            let container = match state {
                ContainerState::ContainerCreated => handle,
                ContainerState::Started | ContainerState::Stopped => handle.or(existing),
                _ => None,
            };

            if state.has_container() && container.is_none() {
                return Err(CacheError::MissingHandle {
                    session_id: session_id.to_string(),
                    state,
                });
            }

            entries.insert(session_id.to_string(), CacheEntry { state, container });
        }

        debug!("{}: {}", session_id, state);
        // No receivers is fine
        let _ = self.changes.send(StateChange {
            session_id: session_id.to_string(),
            state,
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Remove the entry. Returns true if there was one.
    pub fn remove(&self, session_id: &str) -> bool {
        debug!("{}: container removed", session_id);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some()
    }

    pub fn state(&self, session_id: &str) -> Option<ContainerState> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map(|e| e.state)
    }

    pub fn container(&self, session_id: &str) -> Option<ContainerHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .and_then(|e| e.container.clone())
    }

    /// Listen on state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [ContainerState; 6] = [
        ContainerState::Undefined,
        ContainerState::ImageBuilt,
        ContainerState::ContainerCreated,
        ContainerState::Started,
        ContainerState::Stopped,
        ContainerState::Destroying,
    ];

    fn assert_invariant(cache: &ContainerStateCache, id: &str) {
        let has_container = cache.container(id).is_some();
        let expected = cache.state(id).is_some_and(ContainerState::has_container);
        assert_eq!(has_container, expected, "invariant broken for state {:?}", cache.state(id));
    }

    #[test]
    fn test_missing_entry_reads_as_none() {
        let cache = ContainerStateCache::new();
        assert_eq!(cache.state("dev"), None);
        assert_eq!(cache.container("dev"), None);
        assert!(!cache.remove("dev"));
    }

    #[test]
    fn test_run_cycle_carries_handle_forward() {
        let cache = ContainerStateCache::new();
        let handle = ContainerHandle::new("abc123");

        cache.update("dev", ContainerState::ImageBuilt, None).unwrap();
        assert_invariant(&cache, "dev");

        cache.update("dev", ContainerState::ContainerCreated, Some(handle.clone())).unwrap();
        cache.update("dev", ContainerState::Started, None).unwrap();
        assert_eq!(cache.state("dev"), Some(ContainerState::Started));
        assert_eq!(cache.container("dev"), Some(handle.clone()));

        cache.update("dev", ContainerState::Stopped, None).unwrap();
        assert_eq!(cache.container("dev"), Some(handle));
        assert_invariant(&cache, "dev");

        cache.update("dev", ContainerState::Destroying, None).unwrap();
        assert_eq!(cache.container("dev"), None);
        assert_invariant(&cache, "dev");

        assert!(cache.remove("dev"));
        assert_eq!(cache.state("dev"), None);
    }

    #[test]
    fn test_created_requires_handle() {
        let cache = ContainerStateCache::new();
        let err = cache.update("dev", ContainerState::ContainerCreated, None).unwrap_err();
        assert_eq!(
            err,
            CacheError::MissingHandle {
                session_id: "dev".to_string(),
                state: ContainerState::ContainerCreated,
            }
        );
        assert_eq!(cache.state("dev"), None);
    }

    #[test]
    fn test_started_without_known_handle_is_rejected() {
        let cache = ContainerStateCache::new();
        cache.update("dev", ContainerState::ImageBuilt, None).unwrap();
        assert!(cache.update("dev", ContainerState::Started, None).is_err());
        assert_eq!(cache.state("dev"), Some(ContainerState::ImageBuilt));
    }

    #[test]
    fn test_invariant_holds_for_every_transition() {
        let cache = ContainerStateCache::new();
        for from in ALL_STATES {
            for to in ALL_STATES {
                let handle = from.has_container().then(|| ContainerHandle::new("c1"));
                cache.update("dev", from, handle).unwrap();
                let handle = (to == ContainerState::ContainerCreated).then(|| ContainerHandle::new("c2"));
                let _ = cache.update("dev", to, handle);
                assert_invariant(&cache, "dev");
            }
        }
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let cache = ContainerStateCache::new();
        let mut rx = cache.subscribe();

        cache.update("dev", ContainerState::ImageBuilt, None).unwrap();
        cache.update("dev", ContainerState::Destroying, None).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.session_id, "dev");
        assert_eq!(first.state, ContainerState::ImageBuilt);
        assert_eq!(rx.recv().await.unwrap().state, ContainerState::Destroying);
    }
}
