//! Live connection storage shared by the accept loop, the connection tasks
//! and the watchdog.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::{Connection, ConnectionId, ConnectionState};

/// Every connection between accept and the end of its task.
///
/// A single mutex guards the map. It is never held across an `.await`:
/// callers that do I/O work on a [`Registry::snapshot`].
#[derive(Debug, Default)]
pub struct Registry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        self.lock().insert(conn.id(), conn);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.lock().remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Point-in-time copy of every registered connection.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.lock().values().cloned().collect()
    }

    /// Connections currently in the `Open` state.
    pub fn open_connections(&self) -> Vec<Arc<Connection>> {
        self.snapshot()
            .into_iter()
            .filter(|conn| conn.state() == ConnectionState::Open)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a connection from the registry when dropped.
///
/// Owned by the connection's task, so removal happens on every exit path.
pub(crate) struct Registration {
    registry: Arc<Registry>,
    id: ConnectionId,
}

impl Registration {
    pub(crate) fn new(registry: Arc<Registry>, conn: Arc<Connection>) -> Self {
        let id = conn.id();
        registry.insert(conn);
        Self { registry, id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
