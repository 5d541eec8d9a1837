use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::utils::sharded::ShardedMap;

use super::events::PushMessage;

/// Handle returned by [`RealtimeHub::register`]; pass it back to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub user_id: u64,
    pub id: Uuid,
}

/// Who is connected right now, and how to reach each of their sockets.
///
/// A user may hold several connections (tabs, devices). Outbound queues are
/// bounded; a connection that cannot take a frame immediately is dropped
/// from the registry, which closes its socket and makes the client reconnect
/// and reconcile.
pub struct RealtimeHub {
    connections: ShardedMap<u64, HashMap<Uuid, mpsc::Sender<String>>>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self {
            connections: ShardedMap::default(),
        }
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: u64, outbound: mpsc::Sender<String>) -> Registration {
        let id = Uuid::new_v4();
        self.connections.write(&user_id, |users| {
            users.entry(user_id).or_default().insert(id, outbound);
        });
        debug!(user_id, connection_id = %id, "Connection registered");
        Registration { user_id, id }
    }

    /// Safe to call more than once, or after the hub already dropped the
    /// connection.
    pub fn unregister(&self, registration: Registration) {
        let removed = self.connections.write(&registration.user_id, |users| {
            let Some(conns) = users.get_mut(&registration.user_id) else {
                return false;
            };
            let removed = conns.remove(&registration.id).is_some();
            if conns.is_empty() {
                users.remove(&registration.user_id);
            }
            removed
        });
        if removed {
            debug!(user_id = registration.user_id, connection_id = %registration.id, "Connection unregistered");
        }
    }

    /// Queues `message` on every connection of `user_id` without waiting.
    /// Returns how many connections accepted it.
    pub fn publish(&self, user_id: u64, message: &PushMessage) -> usize {
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                error!(user_id, "Failed to encode push message: {}", e);
                return 0;
            }
        };

        self.connections.write(&user_id, |users| {
            let Some(conns) = users.get_mut(&user_id) else {
                return 0;
            };

            let mut delivered = 0;
            conns.retain(|id, tx| match tx.try_send(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(user_id, connection_id = %id, "Outbound queue full, dropping connection");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(user_id, connection_id = %id, "Connection already closed");
                    false
                }
            });
            if conns.is_empty() {
                users.remove(&user_id);
            }
            delivered
        })
    }

    pub fn publish_to_many(&self, user_ids: &[u64], message: &PushMessage) -> usize {
        user_ids.iter().map(|&u| self.publish(u, message)).sum()
    }

    /// Total live connections across all users.
    pub fn connection_count(&self) -> usize {
        self.connections.sum_by(HashMap::len)
    }

    /// Drops every connection. Each socket closes and its client reconnects
    /// and reconciles; used when pushes may have been missed wholesale.
    pub fn disconnect_all(&self) -> usize {
        self.connections.drain_all().iter().map(HashMap::len).sum()
    }

    pub fn is_online(&self, user_id: u64) -> bool {
        self.connections
            .read(&user_id, |users| users.get(&user_id).is_some_and(|c| !c.is_empty()))
    }
}
