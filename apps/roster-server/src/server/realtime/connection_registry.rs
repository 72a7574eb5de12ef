use std::collections::HashMap;

use roster_core::UserId;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::server::core::{ConnectionControl, Identity};

pub(crate) const EVICTION_CLOSE_REASON: &str = "session_replaced";

/// One live, authenticated connection as the registry sees it.
#[derive(Debug)]
pub(crate) struct ConnectionRecord {
    pub(crate) user_id: UserId,
    pub(crate) display_name: String,
    pub(crate) connected_at_unix: i64,
    pub(crate) sender: mpsc::Sender<String>,
    pub(crate) control: watch::Sender<ConnectionControl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegisterOutcome {
    pub(crate) evicted: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegistryError {
    DuplicateConnection,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateConnection => f.write_str("duplicate_connection"),
        }
    }
}

/// Authoritative set of live connections, indexed by connection id with a
/// derived per-user index. Both indices are only ever mutated together;
/// the owner wraps this state in a single lock so every operation below is
/// atomic with respect to every other one.
#[derive(Default)]
pub(crate) struct RegistryState {
    connections: HashMap<Uuid, ConnectionRecord>,
    user_index: HashMap<UserId, Uuid>,
}

impl RegistryState {
    /// Insert a freshly authenticated connection. A prior session for the
    /// same user is evicted in the same step: its record is removed and its
    /// transport is signaled to close before the new record becomes visible.
    pub(crate) fn register(
        &mut self,
        connection_id: Uuid,
        identity: Identity,
        connected_at_unix: i64,
        sender: mpsc::Sender<String>,
        control: watch::Sender<ConnectionControl>,
    ) -> Result<RegisterOutcome, RegistryError> {
        if self.connections.contains_key(&connection_id) {
            return Err(RegistryError::DuplicateConnection);
        }

        let evicted = self.user_index.get(&identity.user_id).copied();
        if let Some(evicted_id) = evicted {
            if let Some(prior) = self.connections.remove(&evicted_id) {
                // Teardown of the old transport is best-effort and finishes
                // in that connection's own task.
                let _ = prior.control.send(ConnectionControl::Close {
                    reason: EVICTION_CLOSE_REASON,
                });
            }
        }

        self.connections.insert(
            connection_id,
            ConnectionRecord {
                user_id: identity.user_id,
                display_name: identity.display_name,
                connected_at_unix,
                sender,
                control,
            },
        );
        self.user_index.insert(identity.user_id, connection_id);
        debug_assert!(self.indices_consistent());

        Ok(RegisterOutcome { evicted })
    }

    /// Remove a connection if it is still present. Disconnect notifications
    /// may arrive after an eviction already removed the record, so a miss is
    /// a no-op rather than an error.
    pub(crate) fn unregister(&mut self, connection_id: Uuid) -> Option<ConnectionRecord> {
        let record = self.connections.remove(&connection_id)?;
        // After an eviction the user index already points at the successor
        // connection; only drop the entry that still belongs to us.
        if self.user_index.get(&record.user_id) == Some(&connection_id) {
            self.user_index.remove(&record.user_id);
        }
        debug_assert!(self.indices_consistent());
        Some(record)
    }

    pub(crate) fn connection_ids(&self) -> Vec<Uuid> {
        self.connections.keys().copied().collect()
    }

    pub(crate) fn display_name_of(&self, connection_id: Uuid) -> Option<&str> {
        self.connections
            .get(&connection_id)
            .map(|record| record.display_name.as_str())
    }

    pub(crate) fn senders(&self) -> impl Iterator<Item = (Uuid, &mpsc::Sender<String>)> {
        self.connections
            .iter()
            .map(|(connection_id, record)| (*connection_id, &record.sender))
    }

    pub(crate) fn control_of(
        &self,
        connection_id: Uuid,
    ) -> Option<&watch::Sender<ConnectionControl>> {
        self.connections
            .get(&connection_id)
            .map(|record| &record.control)
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Holds iff every user-index entry points at a live record carrying that
    /// user and each user owns exactly one live connection.
    pub(crate) fn indices_consistent(&self) -> bool {
        self.user_index.len() == self.connections.len()
            && self.user_index.iter().all(|(user_id, connection_id)| {
                self.connections
                    .get(connection_id)
                    .is_some_and(|record| record.user_id == *user_id)
            })
    }
}
