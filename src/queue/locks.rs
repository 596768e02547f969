//! Per-client admission locks.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

/// Set of client identities that currently own a queued or running task.
#[derive(Debug, Clone, Default)]
pub struct ClientLocks {
    held: Arc<DashMap<String, Instant>>,
}

impl ClientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lock for `client_id`.
    ///
    /// Returns `None` if the client already holds one. The lock is released
    /// when the returned lease is dropped.
    pub fn try_acquire(&self, client_id: &str) -> Option<ClientLease> {
        match self.held.entry(client_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(ClientLease {
                    held: Arc::clone(&self.held),
                    client_id: client_id.to_string(),
                })
            }
        }
    }

    pub fn is_locked(&self, client_id: &str) -> bool {
        self.held.contains_key(client_id)
    }

    /// Number of clients with a task in flight.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Proof of admission for one client. Dropping it releases the lock.
#[derive(Debug)]
pub struct ClientLease {
    held: Arc<DashMap<String, Instant>>,
    client_id: String,
}

impl ClientLease {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        self.held.remove(&self.client_id);
    }
}
