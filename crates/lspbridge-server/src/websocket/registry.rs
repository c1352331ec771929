//! Set of connected clients and fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use lspbridge_core::{ConnectionId, Message};
use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::metrics::WS_BROADCAST_DROPS_TOTAL;
use crate::websocket::connection::ClientConnection;

/// Registry of live client connections.
///
/// Holds weak references: the session task owns each connection, and an
/// entry whose session is gone is pruned on the next broadcast.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ConnectionId, Weak<ClientConnection>>>,
    reserved: AtomicUsize,
}

/// A claimed slot for a client that is still upgrading.
///
/// Counts against the connection limit until dropped. Drop it after the
/// connection is [added](ClientRegistry::add).
#[must_use = "the slot is released when the reservation is dropped"]
pub struct SlotReservation {
    registry: Arc<ClientRegistry>,
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        let _ = self.registry.reserved.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub fn add(&self, connection: &Arc<ClientConnection>) {
        let id = connection.id.clone();
        let _ = self
            .clients
            .write()
            .insert(id.clone(), Arc::downgrade(connection));
        debug!(conn_id = %id, "client registered");
    }

    /// Unregister a connection. Returns whether it was present.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.clients.write().remove(id).is_some();
        if removed {
            debug!(conn_id = %id, "client unregistered");
        }
        removed
    }

    /// Claim a slot if fewer than `max` clients are registered or upgrading.
    ///
    /// The check and the claim happen under the write lock, so concurrent
    /// upgrades cannot overshoot `max`.
    pub fn try_reserve(self: &Arc<Self>, max: usize) -> Option<SlotReservation> {
        let clients = self.clients.write();
        if clients.len() + self.reserved.load(Ordering::Acquire) >= max {
            return None;
        }
        let _ = self.reserved.fetch_add(1, Ordering::AcqRel);
        drop(clients);
        Some(SlotReservation {
            registry: Arc::clone(self),
        })
    }

    /// Slots claimed by clients that have not registered yet.
    pub fn pending_count(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Number of registered clients.
    pub fn connection_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Send `message` to every registered client.
    ///
    /// Serializes once. A client that cannot take the message is closed and
    /// removed; the others are unaffected. Returns the number of clients the
    /// message was queued for.
    pub fn broadcast(&self, message: &Message) -> usize {
        let text = match message.to_json() {
            Ok(text) => Arc::new(text),
            Err(err) => {
                error!(error = %err, "failed to serialize message for broadcast");
                return 0;
            }
        };

        let targets: Vec<(ConnectionId, Weak<ClientConnection>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, conn)| (id.clone(), conn.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, weak) in targets {
            let Some(conn) = weak.upgrade() else {
                failed.push(id);
                continue;
            };
            match conn.send(Arc::clone(&text)) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(conn_id = %id, error = %err, "dropping client after failed send");
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    conn.close();
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut clients = self.clients.write();
            for id in &failed {
                let _ = clients.remove(id);
            }
        }
        delivered
    }

    /// Close every client and empty the registry.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.clients.write().drain().collect();
        for (_, weak) in drained {
            if let Some(conn) = weak.upgrade() {
                conn.close();
            }
        }
    }
}
