//! Connection bookkeeping for the multi-client server
//!
//! This module owns the set of live connection handles on the server side:
//! - Registration of connections newly accepted by the transport
//! - Lazy eviction of handles invalidated by a disconnect
//! - Capacity enforcement for the configured client limit
//! - Stable per-tick iteration order for reproducible event processing
//!
//! A handle is a weak reference into the transport's own connection table;
//! the transport owns the actual socket state. Handles are never removed
//! the moment a disconnect is observed — they are flagged not-live and
//! reaped by the cleanup pass at the start of the next tick.

use shared::PeerId;

/// One live (or recently dead) connection as the server sees it.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionHandle {
    /// Stable identifier assigned by the transport.
    pub id: PeerId,
    /// Cleared when a disconnect for this handle has been drained.
    live: bool,
}

impl ConnectionHandle {
    fn new(id: PeerId) -> Self {
        Self { id, live: true }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Tracks every client connection the server currently knows about.
///
/// Iteration order is the registration order as mutated by swap-removal;
/// it carries no protocol meaning but stays consistent within a tick so
/// event processing is reproducible.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Vec<ConnectionHandle>,
    max_clients: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry with the given capacity limit.
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: Vec::with_capacity(max_clients),
            max_clients,
        }
    }

    /// Registers a newly accepted connection. Returns false when the
    /// registry is at capacity or already holds the id.
    pub fn insert(&mut self, id: PeerId) -> bool {
        if self.is_full() || self.connections.iter().any(|c| c.id == id) {
            return false;
        }
        self.connections.push(ConnectionHandle::new(id));
        true
    }

    /// Flags a handle as no longer live. The handle stays in place until
    /// the next cleanup pass so event draining order is not perturbed
    /// mid-tick. Returns false if the id is unknown.
    pub fn invalidate(&mut self, id: PeerId) -> bool {
        match self.connections.iter_mut().find(|c| c.id == id) {
            Some(handle) => {
                handle.live = false;
                true
            }
            None => false,
        }
    }

    /// Evicts every handle whose live flag has been cleared. Run once at
    /// the start of every tick, before new accepts and event draining.
    /// Swap-removal is fine here, connection order carries no meaning.
    pub fn cleanup(&mut self) {
        let mut i = 0;
        while i < self.connections.len() {
            if !self.connections[i].live {
                self.connections.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Whether the id refers to a currently live handle.
    pub fn is_live(&self, id: PeerId) -> bool {
        self.connections
            .iter()
            .any(|c| c.id == id && c.live)
    }

    /// Ids of all live handles, in registry order.
    pub fn ids(&self) -> Vec<PeerId> {
        self.connections
            .iter()
            .filter(|c| c.live)
            .map(|c| c.id)
            .collect()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.connections.iter().filter(|c| c.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_len() {
        let mut registry = ConnectionRegistry::new(4);
        assert!(registry.is_empty());

        assert!(registry.insert(0));
        assert!(registry.insert(1));
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert_eq!(registry.ids(), vec![0, 1]);
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut registry = ConnectionRegistry::new(4);
        assert!(registry.insert(7));
        assert!(!registry.insert(7));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut registry = ConnectionRegistry::new(1);
        assert!(registry.insert(0));
        assert!(registry.is_full());
        assert!(!registry.insert(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalidate_keeps_handle_until_cleanup() {
        let mut registry = ConnectionRegistry::new(4);
        registry.insert(0);
        registry.insert(1);

        assert!(registry.invalidate(0));
        assert!(!registry.is_live(0));
        assert!(registry.is_live(1));
        assert_eq!(registry.ids(), vec![1]);
        assert_eq!(registry.len(), 1);

        registry.cleanup();
        assert_eq!(registry.ids(), vec![1]);
        assert!(!registry.invalidate(0));
    }

    #[test]
    fn test_invalidate_unknown_id() {
        let mut registry = ConnectionRegistry::new(4);
        assert!(!registry.invalidate(99));
    }

    #[test]
    fn test_cleanup_frees_capacity() {
        let mut registry = ConnectionRegistry::new(1);
        registry.insert(0);
        registry.invalidate(0);
        registry.cleanup();

        assert!(registry.is_empty());
        assert!(registry.insert(1));
    }

    #[test]
    fn test_cleanup_evicts_multiple() {
        let mut registry = ConnectionRegistry::new(8);
        for id in 0..5 {
            registry.insert(id);
        }
        registry.invalidate(1);
        registry.invalidate(3);
        registry.cleanup();

        let mut ids = registry.ids();
        ids.sort();
        assert_eq!(ids, vec![0, 2, 4]);
    }
}
